//! Memory mapping report parsing
//!
//! This module parses individual lines of a `/proc/<pid>/maps` report. Each
//! line describes one mapping:
//!
//! ```text
//! 7f1000000000-7f1000020000 r-xp 00000000 08:01 1234      /lib/libc.so.6
//! start        end          perms offset dev  inode     [path]
//! ```

use crate::domain::ResolveError;

/// One parsed mapping line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRecord<'a> {
    pub start: u64,
    pub end: u64,
    pub perms: [u8; 4],
    pub offset: u64,
    pub path: Option<&'a str>,
}

impl<'a> MapRecord<'a> {
    /// Parse a single report line
    ///
    /// The path may contain spaces (and a trailing ` (deleted)` marker); it is
    /// everything after the inode field with leading padding removed.
    ///
    /// # Errors
    /// Returns `ResolveError::MapsLine` if the address range, permissions or
    /// offset fields are missing or not hexadecimal.
    pub fn parse(line: &'a str) -> Result<Self, ResolveError> {
        let malformed = || ResolveError::MapsLine(line.to_string());

        let mut rest = line;
        let range = next_field(&mut rest).ok_or_else(malformed)?;
        let (start, end) = range.split_once('-').ok_or_else(malformed)?;
        let start = u64::from_str_radix(start, 16).map_err(|_| malformed())?;
        let end = u64::from_str_radix(end, 16).map_err(|_| malformed())?;

        let perms: [u8; 4] = next_field(&mut rest)
            .and_then(|p| p.as_bytes().try_into().ok())
            .ok_or_else(malformed)?;

        let offset = next_field(&mut rest)
            .and_then(|o| u64::from_str_radix(o, 16).ok())
            .ok_or_else(malformed)?;

        // dev and inode
        next_field(&mut rest);
        next_field(&mut rest);

        let path = rest.trim_start();
        let path = if path.is_empty() { None } else { Some(path) };

        Ok(Self { start, end, perms, offset, path })
    }

    /// The permission field as text, e.g. `r-xp`
    #[must_use]
    pub fn perms_str(&self) -> &str {
        std::str::from_utf8(&self.perms).unwrap_or("????")
    }

    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.perms[2] == b'x'
    }
}

/// Split off the next space-delimited field, skipping leading padding.
fn next_field<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let trimmed = rest.trim_start_matches(' ');
    if trimmed.is_empty() {
        *rest = trimmed;
        return None;
    }
    let (field, tail) = trimmed.split_once(' ').unwrap_or((trimmed, ""));
    *rest = tail;
    Some(field)
}
