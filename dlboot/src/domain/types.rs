//! Domain types shared by the locator, the ELF reader and the resolver

use serde::Serialize;
use std::ffi::{c_char, c_int, c_void};
use std::fmt;

/// Signature of `dlopen` (and glibc's private `__libc_dlopen_mode`).
pub type DlopenFn = unsafe extern "C" fn(*const c_char, c_int) -> *mut c_void;

/// Signature of `dlsym`.
pub type DlsymFn = unsafe extern "C" fn(*mut c_void, *const c_char) -> *mut c_void;

/// Where a module's first page is mapped, and the file backing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleBase {
    pub base_address: u64,
    pub path: String,
}

impl fmt::Display for ModuleBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x} @ {}", self.base_address, self.path)
    }
}

/// Absolute addresses of the two loader entry points.
///
/// Only ever constructed with both addresses present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedSymbols {
    pub open_fn: u64,
    pub lookup_fn: u64,
}

impl ResolvedSymbols {
    /// Reinterpret `open_fn` as a callable `dlopen`.
    ///
    /// # Safety
    /// The addresses must have been resolved against the current process's
    /// own memory, and the module they came from must still be mapped.
    #[allow(unsafe_code)]
    #[must_use]
    pub unsafe fn dlopen(&self) -> DlopenFn {
        // SAFETY: caller guarantees `open_fn` is a live function with this ABI
        unsafe { std::mem::transmute::<usize, DlopenFn>(self.open_fn as usize) }
    }

    /// Reinterpret `lookup_fn` as a callable `dlsym`.
    ///
    /// # Safety
    /// Same contract as [`ResolvedSymbols::dlopen`].
    #[allow(unsafe_code)]
    #[must_use]
    pub unsafe fn dlsym(&self) -> DlsymFn {
        // SAFETY: caller guarantees `lookup_fn` is a live function with this ABI
        unsafe { std::mem::transmute::<usize, DlsymFn>(self.lookup_fn as usize) }
    }
}

impl fmt::Display for ResolvedSymbols {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dlopen=0x{:x} dlsym=0x{:x}", self.open_fn, self.lookup_fn)
    }
}

/// Symbol type from the low nibble of `st_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    NoType,
    Object,
    Function,
    Section,
    File,
    Common,
    Tls,
    IndirectFunction,
    Other(u8),
}

impl SymbolKind {
    #[must_use]
    pub fn from_st_type(st_type: u8) -> Self {
        use object::elf;
        match st_type {
            elf::STT_NOTYPE => Self::NoType,
            elf::STT_OBJECT => Self::Object,
            elf::STT_FUNC => Self::Function,
            elf::STT_SECTION => Self::Section,
            elf::STT_FILE => Self::File,
            elf::STT_COMMON => Self::Common,
            elf::STT_TLS => Self::Tls,
            elf::STT_GNU_IFUNC => Self::IndirectFunction,
            other => Self::Other(other),
        }
    }

    /// Function or indirect-function symbols are the only ones whose value is
    /// a code address.
    #[must_use]
    pub fn is_callable(self) -> bool {
        matches!(self, Self::Function | Self::IndirectFunction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_kind_callable() {
        assert!(SymbolKind::from_st_type(object::elf::STT_FUNC).is_callable());
        assert!(SymbolKind::from_st_type(object::elf::STT_GNU_IFUNC).is_callable());
        assert!(!SymbolKind::from_st_type(object::elf::STT_OBJECT).is_callable());
        assert!(!SymbolKind::from_st_type(object::elf::STT_NOTYPE).is_callable());
        assert_eq!(SymbolKind::from_st_type(13), SymbolKind::Other(13));
    }

    #[test]
    fn test_resolved_symbols_display() {
        let resolved = ResolvedSymbols { open_fn: 0x7f00_0000_1000, lookup_fn: 0x7f00_0000_2000 };
        assert_eq!(resolved.to_string(), "dlopen=0x7f0000001000 dlsym=0x7f0000002000");
    }

    #[test]
    fn test_module_base_serializes() {
        let base = ModuleBase { base_address: 0x1000, path: "/lib/libc.so.6".to_string() };
        let json = serde_json::to_string(&base).unwrap();
        assert_eq!(json, r#"{"base_address":4096,"path":"/lib/libc.so.6"}"#);
    }
}
