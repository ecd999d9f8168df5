//! # Dynamic Symbol Lookup
//!
//! Two hash table formats index a module's dynamic symbol table:
//!
//! - **`legacy`**: `DT_HASH`, the System V bucket/chain table. Every symbol
//!   (imports included) is reachable through it.
//! - **`accelerated`**: `DT_GNU_HASH`, which puts a bloom filter in front of
//!   the buckets so most misses cost one word read. Only defined symbols
//!   from `symoffset` onwards are indexed.
//!
//! Modern toolchains often emit only `DT_GNU_HASH`; older or minimal C
//! libraries only `DT_HASH`. Both implement [`SymbolLookup`] and return the
//! same [`SymbolEntry`] for a symbol present in both.

pub mod accelerated;
pub mod legacy;
pub mod modulo;

pub use accelerated::{accelerated_hash, AcceleratedHashTable};
pub use legacy::{legacy_hash, LegacyHashTable};
pub use modulo::{hash_mod, shift_subtract_mod};

use object::read::elf::Sym as _;

use crate::domain::SymbolKind;
use crate::elf::{endian, AddressSpace, ElfModule, ElfSym};

/// A hash-table lookup over a module's dynamic symbols
pub trait SymbolLookup {
    /// First symbol whose name is exactly `name`, if any
    fn lookup<M: AddressSpace + ?Sized>(
        &self,
        module: &ElfModule<'_, M>,
        name: &[u8],
    ) -> Option<SymbolEntry>;
}

/// A decoded dynamic symbol table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolEntry {
    pub index: u32,
    pub name_offset: u32,
    /// Module-relative address for defined symbols
    pub value: u64,
    pub size: u64,
    pub kind: SymbolKind,
    pub binding: u8,
    pub section_index: u16,
    /// Raw `DT_VERSYM` entry, when the module has a version table
    pub version: Option<u16>,
}

impl SymbolEntry {
    #[must_use]
    pub fn from_raw(index: u32, sym: &ElfSym, version: Option<u16>) -> Self {
        let endian = endian();
        Self {
            index,
            name_offset: sym.st_name(endian),
            value: sym.st_value(endian).into(),
            size: sym.st_size(endian).into(),
            kind: SymbolKind::from_st_type(sym.st_type()),
            binding: sym.st_bind(),
            section_index: sym.st_shndx(endian),
            version,
        }
    }

    /// Defined in this module, as opposed to an import
    #[must_use]
    pub fn is_defined(&self) -> bool {
        self.section_index != object::elf::SHN_UNDEF
    }

    /// Hidden versions (`VERSYM_HIDDEN`) are not the default binding for a name
    #[must_use]
    pub fn is_hidden_version(&self) -> bool {
        self.version.is_some_and(|v| v & object::elf::VERSYM_HIDDEN != 0)
    }
}
