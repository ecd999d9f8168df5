//! Pre-flight checks for dlboot
//!
//! Validates the environment before resolving in the current process.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // getauxval() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Run all pre-flight checks before resolving
///
/// # Errors
/// Fails if the platform is unsupported or the mapping report is unreadable.
pub fn run_preflight_checks(maps_path: &Path, quiet: bool) -> Result<()> {
    check_platform()?;
    check_maps_readable(maps_path)?;
    if !quiet && interpreter_base().is_none() {
        eprintln!("warning: no program interpreter (static binary?), fallback base unavailable");
    }
    Ok(())
}

/// Resolution reads live ELF metadata, which only exists on ELF platforms
fn check_platform() -> Result<()> {
    if !cfg!(target_os = "linux") {
        bail!(
            "Unsupported platform: {}\n\n\
             dlboot reads /proc/<pid>/maps and ELF images, which requires Linux.",
            std::env::consts::OS
        );
    }
    Ok(())
}

/// Check that the mapping report can be read
///
/// # Errors
/// Returns an error describing the likely cause if the file is unreadable.
pub fn check_maps_readable(maps_path: &Path) -> Result<()> {
    std::fs::File::open(maps_path).with_context(|| {
        format!(
            "Cannot read {}\n\n\
             This usually means:\n\
             - The process doesn't exist\n\
             - Permission denied (another user's process)\n\
             - /proc is not mounted",
            maps_path.display()
        )
    })?;
    Ok(())
}

/// Load address of the program interpreter (`AT_BASE`), if there is one
///
/// Statically linked programs have no interpreter and report 0.
#[cfg(target_os = "linux")]
#[must_use]
pub fn interpreter_base() -> Option<u64> {
    // SAFETY: getauxval has no preconditions
    let base = u64::from(unsafe { libc::getauxval(libc::AT_BASE) });
    (base != 0).then_some(base)
}

#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn interpreter_base() -> Option<u64> {
    None
}
