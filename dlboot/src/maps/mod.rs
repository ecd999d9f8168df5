//! # Module Base Location
//!
//! Every ELF module the kernel or the dynamic loader maps into a process
//! shows up in `/proc/<pid>/maps`. The mapping whose file offset is zero
//! holds the first page of the file, which starts with the ELF header, so its
//! start address is the module's load base.
//!
//! ```text
//! 7f1000000000-7f1000020000 r-xp 00000000 08:01 1234 /lib/libc.so.6   <- base
//! 7f1000020000-7f1000030000 r--p 00020000 08:01 1234 /lib/libc.so.6
//! ```
//!
//! - **`memory_maps`**: parsing of single report lines into [`MapRecord`]
//! - **`locator`**: [`MapsLocator`], which scans a bounded read of the report
//!   and memoizes the first match
//!
//! ## Limitations
//!
//! - The report is read into a bounded buffer (64 KiB by default); a module
//!   whose mapping lies past the cut-off is not found
//! - Matching is by substring, so `libc` also matches `libcrypt`; the first
//!   matching line in report order wins

pub mod locator;
pub mod memory_maps;

pub use locator::{
    find_in_report, read_report, MapsConfig, MapsLocator, DEFAULT_MAPS_BUFFER, DEFAULT_MAPS_PATH,
};
pub use memory_maps::MapRecord;
