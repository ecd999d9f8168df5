//! Descriptor of a mapped ELF module built from its base address

use log::debug;
use object::elf;
use object::read::elf::{Dyn as _, FileHeader as _, ProgramHeader as _};
use std::mem::size_of;

use super::memory::{read_unchecked, AddressSpace, LoadRange, MappedView};
use super::{endian, ElfDyn, ElfHeader, ElfPhdr, ElfSym};
use crate::domain::ResolveError;
use crate::symbols::{AcceleratedHashTable, LegacyHashTable, SymbolEntry, SymbolLookup};

/// An ELF module mapped at `base`, with its dynamic tables located
///
/// Cheap to build and never cached: the resolver makes a fresh one per
/// attempt. All addresses it holds are absolute and inside [`LoadRange`].
#[derive(Debug)]
pub struct ElfModule<'m, M: AddressSpace + ?Sized> {
    view: MappedView<'m, M>,
    program_headers: u64,
    program_header_count: u16,
    dynamic: u64,
    string_table: u64,
    string_table_size: Option<u64>,
    symbol_table: u64,
    legacy: Option<LegacyHashTable>,
    accelerated: Option<AcceleratedHashTable>,
    versions: Option<u64>,
}

/// Raw `PT_DYNAMIC` contents before validation
#[derive(Default)]
struct DynamicTags {
    string_table: Option<u64>,
    string_table_size: Option<u64>,
    symbol_table: Option<u64>,
    legacy: Option<LegacyHashTable>,
    accelerated: Option<AcceleratedHashTable>,
    versions: Option<u64>,
}

impl<'m, M: AddressSpace + ?Sized> ElfModule<'m, M> {
    /// Locate the dynamic tables of the module whose ELF header is at `base`
    ///
    /// The header and program headers are trusted as found. Everything
    /// reached through `PT_DYNAMIC` must fall inside the union of the
    /// `PT_LOAD` segments.
    ///
    /// # Errors
    /// - `ResolveError::BadMagic` if `base` does not start with `\x7fELF`
    /// - `ResolveError::Format` if there is no loadable segment, no
    ///   `PT_DYNAMIC`, no symbol or string table, or neither hash table
    /// - `ResolveError::Bounds` if any dynamic pointer leaves the loadable range
    /// - `ResolveError::Unreadable` if the address space has no bytes at `base`
    pub fn build(memory: &'m M, base: u64) -> Result<Self, ResolveError> {
        let endian = endian();
        let format = |reason| ResolveError::Format { base, reason };

        let header: &ElfHeader = read_unchecked(memory, base)?;
        if header.e_ident.magic != elf::ELFMAG {
            return Err(ResolveError::BadMagic(base));
        }

        let phoff: u64 = header.e_phoff(endian).into();
        let program_header_count = header.e_phnum(endian);
        let stride = u64::from(header.e_phentsize(endian));
        if stride < size_of::<ElfPhdr>() as u64 {
            return Err(format("program header entries too small"));
        }
        let program_headers = base.wrapping_add(phoff);
        debug!(
            "module 0x{base:x}: phoff=0x{phoff:x} phnum={program_header_count} phentsize={stride}"
        );

        let mut lo = u64::MAX;
        let mut hi = 0;
        let mut dynamic_vaddr = None;
        for i in 0..u64::from(program_header_count) {
            let phdr: &ElfPhdr = read_unchecked(memory, program_headers.wrapping_add(i * stride))?;
            let vaddr: u64 = phdr.p_vaddr(endian).into();
            match phdr.p_type(endian) {
                elf::PT_LOAD => {
                    let seg_lo = base.wrapping_add(vaddr);
                    let seg_hi = seg_lo.saturating_add(phdr.p_memsz(endian).into());
                    lo = lo.min(seg_lo);
                    hi = hi.max(seg_hi);
                }
                elf::PT_DYNAMIC if dynamic_vaddr.is_none() => dynamic_vaddr = Some(vaddr),
                _ => {}
            }
        }
        if lo >= hi {
            return Err(format("no loadable segments"));
        }

        let view = MappedView::new(memory, base, LoadRange { lo, hi });
        let dynamic = base.wrapping_add(dynamic_vaddr.ok_or_else(|| format("no PT_DYNAMIC"))?);
        view.require("PT_DYNAMIC", dynamic, size_of::<ElfDyn>() as u64)?;
        debug!("module 0x{base:x}: load range [0x{lo:x}, 0x{hi:x}) PT_DYNAMIC @ 0x{dynamic:x}");

        let tags = Self::walk_dynamic(&view, dynamic)?;
        let string_table = tags.string_table.ok_or_else(|| format("no DT_STRTAB"))?;
        let symbol_table = tags.symbol_table.ok_or_else(|| format("no DT_SYMTAB"))?;
        if tags.legacy.is_none() && tags.accelerated.is_none() {
            return Err(format("neither DT_HASH nor DT_GNU_HASH"));
        }
        debug!(
            "module 0x{base:x}: dynsym=0x{symbol_table:x} dynstr=0x{string_table:x} \
             gnu_hash={} sysv_hash={}",
            tags.accelerated.is_some(),
            tags.legacy.is_some()
        );

        Ok(Self {
            view,
            program_headers,
            program_header_count,
            dynamic,
            string_table,
            string_table_size: tags.string_table_size,
            symbol_table,
            legacy: tags.legacy,
            accelerated: tags.accelerated,
            versions: tags.versions,
        })
    }

    fn walk_dynamic(view: &MappedView<'m, M>, dynamic: u64) -> Result<DynamicTags, ResolveError> {
        let endian = endian();
        let mut tags = DynamicTags::default();

        let mut addr = dynamic;
        loop {
            let entry: &ElfDyn = view.read_pod("dynamic entry", addr)?;
            let tag: u64 = entry.d_tag(endian).into();
            if tag == u64::from(elf::DT_NULL) {
                break;
            }
            let value: u64 = entry.d_val(endian).into();

            match entry.tag32(endian) {
                Some(elf::DT_STRTAB) => {
                    let ptr = view.resolve_pointer(value);
                    view.require("DT_STRTAB", ptr, 1)?;
                    tags.string_table = Some(ptr);
                }
                Some(elf::DT_STRSZ) => tags.string_table_size = Some(value),
                Some(elf::DT_SYMTAB) => {
                    let ptr = view.resolve_pointer(value);
                    view.require("DT_SYMTAB", ptr, size_of::<ElfSym>() as u64)?;
                    tags.symbol_table = Some(ptr);
                }
                Some(elf::DT_HASH) => {
                    let ptr = view.resolve_pointer(value);
                    tags.legacy = Some(LegacyHashTable::parse(view, ptr)?);
                }
                Some(elf::DT_GNU_HASH) => {
                    let ptr = view.resolve_pointer(value);
                    tags.accelerated = Some(AcceleratedHashTable::parse(view, ptr)?);
                }
                Some(elf::DT_VERSYM) => {
                    let ptr = view.resolve_pointer(value);
                    view.require("DT_VERSYM", ptr, 2)?;
                    tags.versions = Some(ptr);
                }
                _ => {}
            }

            addr = addr.wrapping_add(size_of::<ElfDyn>() as u64);
        }
        Ok(tags)
    }

    #[must_use]
    pub fn base(&self) -> u64 {
        self.view.base()
    }

    #[must_use]
    pub fn load_range(&self) -> LoadRange {
        self.view.range()
    }

    #[must_use]
    pub fn view(&self) -> &MappedView<'m, M> {
        &self.view
    }

    #[must_use]
    pub fn program_headers(&self) -> (u64, u16) {
        (self.program_headers, self.program_header_count)
    }

    #[must_use]
    pub fn dynamic(&self) -> u64 {
        self.dynamic
    }

    #[must_use]
    pub fn string_table(&self) -> u64 {
        self.string_table
    }

    #[must_use]
    pub fn symbol_table(&self) -> u64 {
        self.symbol_table
    }

    #[must_use]
    pub fn version_table(&self) -> Option<u64> {
        self.versions
    }

    #[must_use]
    pub fn legacy_table(&self) -> Option<&LegacyHashTable> {
        self.legacy.as_ref()
    }

    #[must_use]
    pub fn accelerated_table(&self) -> Option<&AcceleratedHashTable> {
        self.accelerated.as_ref()
    }

    /// Decode dynamic symbol `index`, with its version entry if there is one
    ///
    /// # Errors
    /// `ResolveError::Bounds` if the entry lies outside the loadable range.
    pub fn symbol(&self, index: u32) -> Result<SymbolEntry, ResolveError> {
        let offset = u64::from(index) * size_of::<ElfSym>() as u64;
        let sym: &ElfSym = self.view.read_pod("symbol", self.symbol_table.wrapping_add(offset))?;

        let version = match self.versions {
            Some(table) => {
                Some(self.view.read_u16("DT_VERSYM entry", table + 2 * u64::from(index))?)
            }
            None => None,
        };
        Ok(SymbolEntry::from_raw(index, sym, version))
    }

    /// Whether the string at `name_offset` in the string table is exactly `name`
    ///
    /// Offset 0 (the empty name) never matches. Reads stay inside the
    /// loadable range and, when `DT_STRSZ` is known, inside the string table.
    #[must_use]
    pub fn name_matches(&self, name_offset: u32, name: &[u8]) -> bool {
        if name_offset == 0 {
            return false;
        }
        let len = name.len() + 1;
        if let Some(size) = self.string_table_size {
            if u64::from(name_offset) + len as u64 > size {
                return false;
            }
        }
        let addr = self.string_table + u64::from(name_offset);
        match self.view.bytes("symbol name", addr, len) {
            Ok(bytes) => bytes[..name.len()] == *name && bytes[name.len()] == 0,
            Err(_) => false,
        }
    }

    /// The NUL-terminated string at `name_offset`, without the terminator
    #[must_use]
    pub fn symbol_name(&self, name_offset: u32) -> Option<&'m [u8]> {
        let addr = self.string_table + u64::from(name_offset);
        let mut limit = self.view.range().hi;
        if let Some(size) = self.string_table_size {
            limit = limit.min(self.string_table.saturating_add(size));
        }
        let len = usize::try_from(limit.checked_sub(addr)?).ok()?;
        let bytes = self.view.bytes("symbol name", addr, len).ok()?;
        let end = bytes.iter().position(|&b| b == 0)?;
        Some(&bytes[..end])
    }

    /// Look `name` up through `DT_HASH`; `None` if the module has no such table
    #[must_use]
    pub fn lookup_legacy(&self, name: &str) -> Option<SymbolEntry> {
        self.legacy.as_ref()?.lookup(self, name.as_bytes())
    }

    /// Look `name` up through `DT_GNU_HASH`; `None` if the module has no such table
    #[must_use]
    pub fn lookup_accelerated(&self, name: &str) -> Option<SymbolEntry> {
        self.accelerated.as_ref()?.lookup(self, name.as_bytes())
    }

    /// Bloom-accelerated lookup first, then the legacy table
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<SymbolEntry> {
        self.lookup_accelerated(name).or_else(|| self.lookup_legacy(name))
    }
}
