//! # dlboot - Main Entry Point
//!
//! Three subcommands:
//! - **locate**: scan any mapping report for a module's base (no memory access)
//! - **resolve**: find `dlopen`/`dlsym` in this process and print them
//! - **probe**: resolve, then open a library and look up a symbol through the
//!   resolved functions

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::ffi::{CStr, CString, NulError};
use std::path::Path;

use dlboot::cli::{Args, Command, TargetArgs};
use dlboot::maps::{MapsConfig, MapsLocator, DEFAULT_MAPS_PATH};
use dlboot::preflight::{interpreter_base, run_preflight_checks};
use dlboot::{ResolvedSymbols, Resolver, ResolverConfig};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<NulError>().is_some() {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Locate { maps, module } => {
            let locator = MapsLocator::new(MapsConfig::default().with_path(&maps));
            let found = locator
                .find_module_base(&module)
                .with_context(|| format!("Locating {module:?} in {}", maps.display()))?;
            println!("{found}");
        }
        Command::Resolve { target, json } => {
            let symbols = resolve(&target, args.quiet)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&symbols)?);
            } else {
                println!("dlopen  0x{:x}", symbols.open_fn);
                println!("dlsym   0x{:x}", symbols.lookup_fn);
            }
        }
        Command::Probe { target, library, symbol } => {
            let symbols = resolve(&target, args.quiet)?;
            let address = probe(&symbols, &library, &symbol)?;
            if !args.quiet {
                println!("{library}: opened via 0x{:x}", symbols.open_fn);
            }
            println!("{symbol} @ 0x{address:x}");
        }
    }

    Ok(())
}

/// Resolve in this process, with the fallback base taken from the flags or
/// the program interpreter
fn resolve(target: &TargetArgs, quiet: bool) -> Result<ResolvedSymbols> {
    run_preflight_checks(Path::new(DEFAULT_MAPS_PATH), quiet)?;

    let fallback = target.interp_base.or_else(|| {
        if target.no_auxv {
            None
        } else {
            interpreter_base()
        }
    });
    if let Some(base) = fallback {
        debug!("fallback base 0x{base:x}");
    }

    let config = ResolverConfig::default().with_module(target.module.as_str());
    // SAFETY: the default mapping report describes this process, and the
    // fallback is either AT_BASE or an address the user vouched for
    #[allow(unsafe_code)]
    let resolver = unsafe { Resolver::current_process(config) };
    resolver.resolve(fallback).with_context(|| {
        format!(
            "Could not resolve dlopen/dlsym from {:?} (set RUST_LOG=debug for details)",
            target.module
        )
    })
}

/// Open `library` and look up `symbol` through the resolved entry points
#[allow(unsafe_code)]
fn probe(symbols: &ResolvedSymbols, library: &str, symbol: &str) -> Result<u64> {
    let library_c = CString::new(library).context("LIBRARY contains a NUL byte")?;
    let symbol_c = CString::new(symbol).context("SYMBOL contains a NUL byte")?;

    // SAFETY: the addresses were resolved against this process's own memory,
    // and the C library stays mapped for the life of the process
    let (dlopen, dlsym) = unsafe { (symbols.dlopen(), symbols.dlsym()) };

    // SAFETY: both arguments are valid NUL-terminated strings
    let handle = unsafe { dlopen(library_c.as_ptr(), libc::RTLD_NOW) };
    if handle.is_null() {
        anyhow::bail!("dlopen({library}) failed: {}", last_loader_error());
    }
    info!("{library} handle {handle:p}");

    // SAFETY: `handle` came from a successful dlopen
    let address = unsafe { dlsym(handle, symbol_c.as_ptr()) };
    if address.is_null() {
        anyhow::bail!("dlsym({symbol}) failed: {}", last_loader_error());
    }
    Ok(address as u64)
}

#[allow(unsafe_code)]
fn last_loader_error() -> String {
    // SAFETY: dlerror returns null or a string valid until the next loader call
    let message = unsafe { libc::dlerror() };
    if message.is_null() {
        "unknown error".to_string()
    } else {
        // SAFETY: non-null dlerror results are NUL-terminated
        unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
    }
}
