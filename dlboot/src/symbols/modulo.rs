//! Bucket reduction for the hash tables
//!
//! Both lookups reduce a 32-bit hash modulo a count read from the image. A
//! count of zero is degenerate and reduces everything to 0.

/// `a mod m`, with `m == 0` giving 0
#[inline]
#[must_use]
pub fn hash_mod(a: u32, m: u32) -> u32 {
    #[cfg(target_arch = "arm")]
    {
        shift_subtract_mod(a, m)
    }
    #[cfg(not(target_arch = "arm"))]
    {
        a.checked_rem(m).unwrap_or(0)
    }
}

/// Division-free `a mod m` for targets whose `%` is a libcall
///
/// Repeatedly subtracts the largest power-of-two multiple of `m` that does
/// not exceed what is left of `a`. Same results as [`hash_mod`].
#[must_use]
pub fn shift_subtract_mod(mut a: u32, m: u32) -> u32 {
    if m == 0 {
        return 0;
    }
    while a >= m {
        let mut t = m;
        while t <= a >> 1 {
            t <<= 1;
        }
        a -= t;
    }
    a
}
