//! Locate a loaded module's base mapping in a mapping report

use log::{debug, info};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::memory_maps::MapRecord;
use crate::domain::{ModuleBase, ResolveError};

/// Mapping report of the calling process
pub const DEFAULT_MAPS_PATH: &str = "/proc/self/maps";

/// Upper bound on how much of the report is read
pub const DEFAULT_MAPS_BUFFER: usize = 64 * 1024;

/// Where to read the mapping report from and how much of it to keep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapsConfig {
    pub path: PathBuf,
    pub buffer_size: usize,
}

impl Default for MapsConfig {
    fn default() -> Self {
        Self { path: PathBuf::from(DEFAULT_MAPS_PATH), buffer_size: DEFAULT_MAPS_BUFFER }
    }
}

impl MapsConfig {
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }
}

/// Finds a module's offset-zero mapping and remembers it
///
/// The first successful lookup is memoized for the lifetime of the locator;
/// failures are not, so a later call re-reads the report. The memo belongs to
/// the needle that found it: a lookup with a different needle scans the
/// report afresh and never replaces the memoized value.
#[derive(Debug, Default)]
pub struct MapsLocator {
    config: MapsConfig,
    cache: Mutex<Option<(String, ModuleBase)>>,
}

impl MapsLocator {
    #[must_use]
    pub fn new(config: MapsConfig) -> Self {
        Self { config, cache: Mutex::new(None) }
    }

    #[must_use]
    pub fn config(&self) -> &MapsConfig {
        &self.config
    }

    /// The memoized module base, if a lookup has already succeeded
    #[must_use]
    pub fn cached(&self) -> Option<ModuleBase> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.as_ref().map(|(_, base)| base.clone())
    }

    /// Find the base mapping of the first module whose path contains `needle`
    ///
    /// A repeated call with the same needle after a success returns the
    /// memoized value without touching the report. A different needle scans
    /// the report again and leaves the memoized value alone.
    ///
    /// # Errors
    /// `ResolveError::Io` if the report cannot be read, and
    /// `ResolveError::ModuleNotFound` if no offset-zero line matches.
    pub fn find_module_base(&self, needle: &str) -> Result<ModuleBase, ResolveError> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((cached_needle, base)) = cache.as_ref() {
            if cached_needle == needle {
                return Ok(base.clone());
            }
        }

        let report = read_report(&self.config.path, self.config.buffer_size)?;
        let base = find_in_report(&report, needle)
            .ok_or_else(|| ResolveError::ModuleNotFound(needle.to_string()))?;
        info!("{needle} base {base}");

        if cache.is_none() {
            *cache = Some((needle.to_string(), base.clone()));
        }
        Ok(base)
    }
}

/// Read at most `limit` bytes of the report
///
/// Anything past the limit is silently dropped; a module mapped beyond that
/// point will not be found.
///
/// # Errors
/// Returns `ResolveError::Io` if the file cannot be opened or read.
pub fn read_report(path: &Path, limit: usize) -> Result<String, ResolveError> {
    let io_error = |source| ResolveError::Io { path: path.to_path_buf(), source };

    let file = File::open(path).map_err(io_error)?;
    let mut buf = Vec::with_capacity(limit.min(DEFAULT_MAPS_BUFFER));
    file.take(limit as u64).read_to_end(&mut buf).map_err(io_error)?;

    if buf.len() == limit {
        debug!("{} truncated at {limit} bytes", path.display());
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Scan report text for the first offset-zero mapping whose path contains `needle`
#[must_use]
pub fn find_in_report(report: &str, needle: &str) -> Option<ModuleBase> {
    for line in report.lines() {
        if !line.contains(needle) {
            continue;
        }

        let record = match MapRecord::parse(line) {
            Ok(record) => record,
            Err(e) => {
                debug!("skipping: {e}");
                continue;
            }
        };

        let Some(path) = record.path else {
            continue;
        };
        if record.offset == 0 && path.contains(needle) {
            return Some(ModuleBase { base_address: record.start, path: path.to_string() });
        }
    }
    None
}
