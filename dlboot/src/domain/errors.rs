//! Structured error types for dlboot
//!
//! Using thiserror for automatic Display implementation and error chaining.
//! `ResolveError` is diagnostic detail; callers of the resolver only ever see
//! `ResolutionFailed`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Failed to read mapping report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed mapping line: {0:?}")]
    MapsLine(String),

    #[error("Bad ELF magic at 0x{0:x}")]
    BadMagic(u64),

    #[error("Invalid module at 0x{base:x}: {reason}")]
    Format { base: u64, reason: &'static str },

    #[error("{what} at 0x{addr:x} lies outside loadable range [0x{lo:x}, 0x{hi:x})")]
    Bounds { what: &'static str, addr: u64, lo: u64, hi: u64 },

    #[error("Unreadable memory at 0x{0:x}")]
    Unreadable(u64),

    #[error("No mapping matching {0:?} with file offset 0")]
    ModuleNotFound(String),

    #[error("Symbol {0} not found")]
    SymbolNotFound(String),
}

/// The single failure outcome surfaced by `Resolver::resolve`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Failed to resolve the C library's dlopen/dlsym entry points")]
pub struct ResolutionFailed;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_error_display() {
        let err = ResolveError::Bounds { what: "DT_SYMTAB", addr: 0x5000, lo: 0x1000, hi: 0x2000 };
        assert_eq!(
            err.to_string(),
            "DT_SYMTAB at 0x5000 lies outside loadable range [0x1000, 0x2000)"
        );
    }

    #[test]
    fn test_io_error_keeps_source() {
        let err = ResolveError::Io {
            path: PathBuf::from("/nonexistent/maps"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/nonexistent/maps"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
