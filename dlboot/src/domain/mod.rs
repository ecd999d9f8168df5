//! Domain model for dlboot
//!
//! This module contains core domain types and errors that provide:
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{DlopenFn, DlsymFn, ModuleBase, ResolvedSymbols, SymbolKind};

pub use errors::{ResolutionFailed, ResolveError};
