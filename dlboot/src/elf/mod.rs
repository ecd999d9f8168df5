//! # In-Memory ELF Reading
//!
//! A shared object that the dynamic loader has already mapped still carries
//! its ELF metadata in its first loadable segment:
//!
//! ```text
//! base ─▶ ┌──────────────────┐
//!         │ ELF header       │ e_phoff ─┐
//!         ├──────────────────┤          │
//!         │ program headers  │ ◀────────┘  PT_LOAD ... PT_DYNAMIC
//!         ├──────────────────┤
//!         │ .dynsym .dynstr  │ ◀─┐
//!         │ .hash .gnu.hash  │ ◀─┤ DT_SYMTAB / DT_STRTAB / DT_HASH /
//!         │ .gnu.version     │ ◀─┤ DT_GNU_HASH / DT_VERSYM
//!         │ ...              │   │
//!         │ .dynamic         │ ──┘
//!         └──────────────────┘
//! ```
//!
//! [`ElfModule::build`] walks this chain from nothing but a base address.
//! The record layouts come from the `object` crate (`object::elf`), read in
//! the native class and byte order of the running process. After the program
//! headers every read is checked against the union of the `PT_LOAD`
//! segments, because the image is only validated heuristically.

pub mod memory;
pub mod module;

use object::elf;
use object::NativeEndian;

#[cfg(target_pointer_width = "64")]
mod native {
    use super::{elf, NativeEndian};

    pub type ElfHeader = elf::FileHeader64<NativeEndian>;
    pub type ElfPhdr = elf::ProgramHeader64<NativeEndian>;
    pub type ElfDyn = elf::Dyn64<NativeEndian>;
    pub type ElfSym = elf::Sym64<NativeEndian>;
}

#[cfg(target_pointer_width = "32")]
mod native {
    use super::{elf, NativeEndian};

    pub type ElfHeader = elf::FileHeader32<NativeEndian>;
    pub type ElfPhdr = elf::ProgramHeader32<NativeEndian>;
    pub type ElfDyn = elf::Dyn32<NativeEndian>;
    pub type ElfSym = elf::Sym32<NativeEndian>;
}

pub use native::{ElfDyn, ElfHeader, ElfPhdr, ElfSym};

pub use memory::{AddressSpace, LoadRange, MappedView, ProcessMemory};
pub use module::ElfModule;

/// Byte order of the running process, which is also that of every module
/// it has mapped
#[must_use]
pub fn endian() -> NativeEndian {
    NativeEndian::default()
}
