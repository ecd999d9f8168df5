//! Byte-level access to mapped module memory
//!
//! Everything the ELF reader looks at goes through an [`AddressSpace`], and
//! once the loadable range of a module is known, through a [`MappedView`]
//! that refuses any access outside it.

use crate::domain::ResolveError;
use object::pod::{self, Pod};
use std::mem::size_of;

/// A source of bytes addressed by absolute virtual address
pub trait AddressSpace {
    /// `len` bytes starting at `addr`, or `None` if that span is not backed.
    fn read(&self, addr: u64, len: usize) -> Option<&[u8]>;
}

impl<T: AddressSpace + ?Sized> AddressSpace for &T {
    fn read(&self, addr: u64, len: usize) -> Option<&[u8]> {
        (**self).read(addr, len)
    }
}

/// The current process's own address space
#[derive(Debug)]
pub struct ProcessMemory {
    _private: (),
}

impl ProcessMemory {
    /// # Safety
    /// Every address later handed to [`AddressSpace::read`] must be readable
    /// in this process. The resolver only reads the ELF header at a base taken
    /// from this process's own mapping report (or a caller-vouched fallback),
    /// the program headers it points to, and spans inside the module's
    /// loadable segments.
    #[allow(unsafe_code)]
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl AddressSpace for ProcessMemory {
    #[allow(unsafe_code)]
    fn read(&self, addr: u64, len: usize) -> Option<&[u8]> {
        if addr == 0 {
            return None;
        }
        let start = usize::try_from(addr).ok()?;
        start.checked_add(len)?;
        // SAFETY: readability of [addr, addr + len) is the contract of `ProcessMemory::new`
        Some(unsafe { std::slice::from_raw_parts(start as *const u8, len) })
    }
}

/// Half-open address range `[lo, hi)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadRange {
    pub lo: u64,
    pub hi: u64,
}

impl LoadRange {
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.lo && addr < self.hi
    }

    /// Whether `[addr, addr + len)` lies fully inside the range
    #[must_use]
    pub fn contains_span(&self, addr: u64, len: u64) -> bool {
        addr >= self.lo && addr.checked_add(len).is_some_and(|end| end <= self.hi)
    }
}

/// Bounds-checked reads within a module's loadable range
#[derive(Debug)]
pub struct MappedView<'m, M: AddressSpace + ?Sized> {
    memory: &'m M,
    base: u64,
    range: LoadRange,
}

impl<'m, M: AddressSpace + ?Sized> MappedView<'m, M> {
    #[must_use]
    pub fn new(memory: &'m M, base: u64, range: LoadRange) -> Self {
        Self { memory, base, range }
    }

    #[must_use]
    pub fn base(&self) -> u64 {
        self.base
    }

    #[must_use]
    pub fn range(&self) -> LoadRange {
        self.range
    }

    /// Turn a raw dynamic-tag value into an address
    ///
    /// Values already inside the loadable range are taken as absolute
    /// (relocated in place by the loader); anything else is an offset from
    /// the module base.
    #[must_use]
    pub fn resolve_pointer(&self, raw: u64) -> u64 {
        if self.range.contains(raw) {
            raw
        } else {
            self.base.wrapping_add(raw)
        }
    }

    /// # Errors
    /// `ResolveError::Bounds` if `[addr, addr + len)` leaves the loadable range.
    pub fn require(&self, what: &'static str, addr: u64, len: u64) -> Result<(), ResolveError> {
        if self.range.contains_span(addr, len) {
            Ok(())
        } else {
            Err(ResolveError::Bounds { what, addr, lo: self.range.lo, hi: self.range.hi })
        }
    }

    /// # Errors
    /// `ResolveError::Bounds` outside the loadable range, `ResolveError::Unreadable`
    /// if the address space has no bytes there.
    pub fn bytes(&self, what: &'static str, addr: u64, len: usize) -> Result<&'m [u8], ResolveError> {
        self.require(what, addr, len as u64)?;
        self.memory.read(addr, len).ok_or(ResolveError::Unreadable(addr))
    }

    /// # Errors
    /// Same as [`MappedView::bytes`].
    pub fn read_pod<T: Pod>(&self, what: &'static str, addr: u64) -> Result<&'m T, ResolveError> {
        let bytes = self.bytes(what, addr, size_of::<T>())?;
        pod::from_bytes::<T>(bytes).map(|(value, _)| value).map_err(|()| ResolveError::Unreadable(addr))
    }

    /// # Errors
    /// Same as [`MappedView::bytes`].
    pub fn read_u16(&self, what: &'static str, addr: u64) -> Result<u16, ResolveError> {
        self.array(what, addr).map(u16::from_ne_bytes)
    }

    /// # Errors
    /// Same as [`MappedView::bytes`].
    pub fn read_u32(&self, what: &'static str, addr: u64) -> Result<u32, ResolveError> {
        self.array(what, addr).map(u32::from_ne_bytes)
    }

    /// Read one native machine word (the ELF class of the running process)
    ///
    /// # Errors
    /// Same as [`MappedView::bytes`].
    pub fn read_word(&self, what: &'static str, addr: u64) -> Result<u64, ResolveError> {
        self.array(what, addr).map(|raw| usize::from_ne_bytes(raw) as u64)
    }

    fn array<const N: usize>(&self, what: &'static str, addr: u64) -> Result<[u8; N], ResolveError> {
        self.bytes(what, addr, N)?.try_into().map_err(|_| ResolveError::Unreadable(addr))
    }
}

/// Read a plain-old-data record straight from an address space, unchecked
/// against any load range
///
/// Only used for the ELF header and program headers, before the loadable
/// range is known.
pub(crate) fn read_unchecked<'m, T: Pod, M: AddressSpace + ?Sized>(
    memory: &'m M,
    addr: u64,
) -> Result<&'m T, ResolveError> {
    let bytes = memory.read(addr, size_of::<T>()).ok_or(ResolveError::Unreadable(addr))?;
    pod::from_bytes::<T>(bytes).map(|(value, _)| value).map_err(|()| ResolveError::Unreadable(addr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SyntheticImage;

    #[test]
    fn test_load_range_contains() {
        let range = LoadRange { lo: 0x1000, hi: 0x2000 };

        assert!(range.contains(0x1000));
        assert!(range.contains(0x1FFF));
        assert!(!range.contains(0x0FFF));
        assert!(!range.contains(0x2000));

        assert!(range.contains_span(0x1FF0, 0x10));
        assert!(!range.contains_span(0x1FF0, 0x11));
        assert!(!range.contains_span(u64::MAX - 1, 4));
    }

    #[test]
    fn test_resolve_pointer_policy() {
        let image = SyntheticImage::new(0x7f00_0000_0000, vec![0; 0x100]);
        let range = LoadRange { lo: 0x7f00_0000_0000, hi: 0x7f00_0000_0100 };
        let view = MappedView::new(&image, 0x7f00_0000_0000, range);

        // relative offset
        assert_eq!(view.resolve_pointer(0x40), 0x7f00_0000_0040);
        // already relocated
        assert_eq!(view.resolve_pointer(0x7f00_0000_0040), 0x7f00_0000_0040);
    }

    #[test]
    fn test_view_rejects_out_of_range() {
        let mut bytes = vec![0; 0x100];
        bytes[0x10..0x14].copy_from_slice(&0xdead_beef_u32.to_ne_bytes());
        let image = SyntheticImage::new(0x1000, bytes);
        let view = MappedView::new(&image, 0x1000, LoadRange { lo: 0x1000, hi: 0x1080 });

        assert_eq!(view.read_u32("word", 0x1010).unwrap(), 0xdead_beef);
        // backed by the image but outside the load range
        let err = view.read_u32("word", 0x1090).unwrap_err();
        assert!(matches!(err, ResolveError::Bounds { what: "word", .. }));
        // straddles the end of the range
        assert!(view.read_u32("word", 0x107e).is_err());
    }

    #[test]
    fn test_fixed_width_reads() {
        let mut bytes = vec![0; 0x40];
        bytes[0x00..0x02].copy_from_slice(&0xbeef_u16.to_ne_bytes());
        bytes[0x08..0x0c].copy_from_slice(&0x0102_0304_u32.to_ne_bytes());
        bytes[0x10..0x10 + size_of::<usize>()].copy_from_slice(&0x1234_usize.to_ne_bytes());
        let image = SyntheticImage::new(0x4000, bytes);
        let view = MappedView::new(&image, 0x4000, LoadRange { lo: 0x4000, hi: 0x4040 });

        assert_eq!(view.read_u16("half", 0x4000).unwrap(), 0xbeef);
        assert_eq!(view.read_u32("word", 0x4008).unwrap(), 0x0102_0304);
        assert_eq!(view.read_word("machine word", 0x4010).unwrap(), 0x1234);
        assert!(view.read_u16("half", 0x403f).is_err());
        assert!(view.read_word("machine word", 0x403c).is_err());
    }
}
