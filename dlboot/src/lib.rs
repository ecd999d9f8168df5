//! # dlboot - Bootstrap dlopen/dlsym Without the Dynamic Linker
//!
//! dlboot finds the C library's `dlopen` and `dlsym` in the current process by
//! reading memory directly: the mapping report says where the library is,
//! and the library's own ELF metadata says where its symbols are. Code that
//! runs before (or outside) normal symbol binding, such as injected payloads
//! or minimal launchers, can then load further modules through the regular
//! loader.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────┐
//! │   /proc/self/maps     │  7f10...-7f10... r-xp 00000000 ... /lib/libc.so.6
//! └───────────┬───────────┘
//!             │ first offset-zero line matching "libc"
//!             ▼
//! ┌───────────────────────┐    ┌───────────────────────────────────────┐
//! │     MapsLocator       │───▶│              ElfModule                │
//! │  (memoized base)      │    │ header → PT_LOAD range, PT_DYNAMIC →  │
//! └───────────────────────┘    │ DT_SYMTAB DT_STRTAB DT_HASH           │
//!                              │ DT_GNU_HASH DT_VERSYM (bounds-checked)│
//!                              └───────────────────┬───────────────────┘
//!                                                  ▼
//! ┌───────────────────────┐    ┌───────────────────────────────────────┐
//! │       Resolver        │◀───│             SymbolLookup              │
//! │ __libc_dlopen_mode /  │    │  DT_GNU_HASH (bloom) then DT_HASH     │
//! │ dlopen, dlsym → cache │    └───────────────────────────────────────┘
//! └───────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`maps`]: mapping report parsing and the memoizing [`maps::MapsLocator`]
//! - [`elf`]: the [`elf::AddressSpace`] abstraction, bounds-checked
//!   [`elf::MappedView`], and [`elf::ElfModule`]
//! - [`symbols`]: `DT_HASH` and `DT_GNU_HASH` lookups
//! - [`resolver`]: orchestration and the once-per-context result cache
//! - [`domain`]: shared types and errors
//! - `testing` (feature `testing`): synthetic ELF images for exercising all
//!   of the above
//! - [`cli`], [`preflight`]: the `dlboot` binary's front end
//!
//! ## Typical Usage
//!
//! ```rust,no_run
//! // SAFETY: no fallback base is passed
//! let symbols = unsafe { dlboot::resolver::resolve_in_process(None) }?;
//! println!("dlopen @ 0x{:x}", symbols.open_fn);
//! # Ok::<(), dlboot::domain::ResolutionFailed>(())
//! ```
//!
//! ## Key Concepts
//!
//! - **Offset-zero mapping**: the mapping holding the file's first page, and
//!   therefore its ELF header; its start is the module base
//! - **Loadable range**: union of the `PT_LOAD` segments; every pointer taken
//!   from the dynamic section must land inside it
//! - **Relative or absolute**: dynamic tag values are used as-is when already
//!   inside the loadable range, otherwise the base is added

// Expose modules for testing
pub mod cli;
pub mod domain;
pub mod elf;
pub mod maps;
pub mod preflight;
pub mod resolver;
pub mod symbols;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use domain::{ModuleBase, ResolutionFailed, ResolveError, ResolvedSymbols};
pub use resolver::{Resolver, ResolverConfig};
