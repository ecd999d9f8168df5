//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::maps::DEFAULT_MAPS_PATH;
use crate::resolver::DEFAULT_MODULE;

#[derive(Parser)]
#[command(
    name = "dlboot",
    version,
    about = "Find the C library's dlopen/dlsym by reading ELF metadata from memory",
    after_help = "\
EXAMPLES:
    dlboot resolve                               Resolve in this process
    dlboot resolve --json                        Same, as JSON
    dlboot locate --maps /proc/1234/maps         Base of libc in another process
    dlboot probe libm.so.6 cos                   Open a library through the resolved dlopen"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Find a module's base mapping in a mapping report
    Locate {
        /// Mapping report to scan (any process)
        #[arg(long, value_name = "FILE", default_value = DEFAULT_MAPS_PATH)]
        maps: PathBuf,

        /// Path substring identifying the module
        #[arg(short, long, default_value = DEFAULT_MODULE)]
        module: String,
    },

    /// Resolve dlopen/dlsym in this process
    Resolve {
        #[command(flatten)]
        target: TargetArgs,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve, then open LIBRARY and look up SYMBOL through the resolved functions
    Probe {
        #[command(flatten)]
        target: TargetArgs,

        /// Library to open, as passed to dlopen
        library: String,

        /// Symbol to look up in the opened library
        symbol: String,
    },
}

#[derive(clap::Args)]
pub struct TargetArgs {
    /// Path substring identifying the C library
    #[arg(short, long, default_value = DEFAULT_MODULE)]
    pub module: String,

    /// Fallback base address (hex) used when the C library is not in the
    /// mapping report
    #[arg(long, value_name = "ADDR", value_parser = parse_address)]
    pub interp_base: Option<u64>,

    /// Do not default the fallback base to the program interpreter (AT_BASE)
    #[arg(long)]
    pub no_auxv: bool,
}

/// Parse an address given as `0x`-prefixed or bare hexadecimal
///
/// # Errors
/// Returns a message for clap if the text is not hexadecimal.
pub fn parse_address(text: &str) -> Result<u64, String> {
    let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")).unwrap_or(text);
    u64::from_str_radix(digits, 16).map_err(|e| format!("invalid address {text:?}: {e}"))
}
