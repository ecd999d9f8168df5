//! Resolve the C library's `dlopen`/`dlsym` without the dynamic linker
//!
//! ```text
//! MapsLocator ──base──▶ ElfModule::build ──▶ lookup(candidate)... ──▶ ResolvedSymbols
//!      │                                          │
//!      └─ not found: caller's interpreter base    └─ FUNC / GNU_IFUNC only
//! ```

use log::{debug, info, warn};
use std::sync::{Mutex, OnceLock, PoisonError};

use crate::domain::{ResolutionFailed, ResolveError, ResolvedSymbols};
use crate::elf::{AddressSpace, ElfModule, ProcessMemory};
use crate::maps::{MapsConfig, MapsLocator};

/// Path substring identifying the C library in the mapping report
pub const DEFAULT_MODULE: &str = "libc";

/// glibc's private entry point first, then the public one
pub const OPEN_CANDIDATES: [&str; 2] = ["__libc_dlopen_mode", "dlopen"];

pub const LOOKUP_CANDIDATES: [&str; 1] = ["dlsym"];

/// What to look for and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub maps: MapsConfig,
    pub module: String,
    pub open_candidates: Vec<String>,
    pub lookup_candidates: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            maps: MapsConfig::default(),
            module: DEFAULT_MODULE.to_string(),
            open_candidates: OPEN_CANDIDATES.iter().map(ToString::to_string).collect(),
            lookup_candidates: LOOKUP_CANDIDATES.iter().map(ToString::to_string).collect(),
        }
    }
}

impl ResolverConfig {
    #[must_use]
    pub fn with_maps(mut self, maps: MapsConfig) -> Self {
        self.maps = maps;
        self
    }

    #[must_use]
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    #[must_use]
    pub fn with_open_candidates<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.open_candidates = names.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_lookup_candidates<S: Into<String>>(
        mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Self {
        self.lookup_candidates = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Resolution context: owns the module-base memo and the result cache
///
/// `resolve` holds the result lock for its whole run, so concurrent callers
/// are serialized and at most one of them does the work.
#[derive(Debug)]
pub struct Resolver<M: AddressSpace> {
    config: ResolverConfig,
    locator: MapsLocator,
    memory: M,
    resolved: Mutex<Option<ResolvedSymbols>>,
}

impl<M: AddressSpace> Resolver<M> {
    #[must_use]
    pub fn new(config: ResolverConfig, memory: M) -> Self {
        let locator = MapsLocator::new(config.maps.clone());
        Self { config, locator, memory, resolved: Mutex::new(None) }
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    #[must_use]
    pub fn locator(&self) -> &MapsLocator {
        &self.locator
    }

    /// The cached result of an earlier successful `resolve`
    #[must_use]
    pub fn resolved(&self) -> Option<ResolvedSymbols> {
        *self.resolved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Find both entry points, or fail as a whole
    ///
    /// `fallback_base` is used only when the mapping report has no match
    /// for the configured module, e.g. under musl where the program
    /// interpreter is the C library.
    ///
    /// # Errors
    /// `ResolutionFailed` for any failure; the cause is logged.
    pub fn resolve(&self, fallback_base: Option<u64>) -> Result<ResolvedSymbols, ResolutionFailed> {
        let mut resolved = self.resolved.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(symbols) = *resolved {
            return Ok(symbols);
        }

        match self.try_resolve(fallback_base) {
            Ok(symbols) => {
                info!("resolved {symbols}");
                *resolved = Some(symbols);
                Ok(symbols)
            }
            Err(e) => {
                warn!("{e}");
                Err(ResolutionFailed)
            }
        }
    }

    fn try_resolve(&self, fallback_base: Option<u64>) -> Result<ResolvedSymbols, ResolveError> {
        let base = match self.locator.find_module_base(&self.config.module) {
            Ok(module) => module.base_address,
            Err(e) => {
                let Some(fallback) = fallback_base else {
                    return Err(e);
                };
                info!("{e}; falling back to interpreter base 0x{fallback:x}");
                fallback
            }
        };

        let module = ElfModule::build(&self.memory, base)?;
        let open_fn = find_function(&module, &self.config.open_candidates)?;
        let lookup_fn = find_function(&module, &self.config.lookup_candidates)?;
        Ok(ResolvedSymbols { open_fn, lookup_fn })
    }
}

impl Resolver<ProcessMemory> {
    /// A resolver reading this process's own memory
    ///
    /// # Safety
    /// `config.maps` must describe the current process, and any fallback base
    /// later passed to [`Resolver::resolve`] must be the address of a mapped
    /// ELF image in this process.
    #[allow(unsafe_code)]
    #[must_use]
    pub unsafe fn current_process(config: ResolverConfig) -> Self {
        // SAFETY: forwarded to the caller
        Self::new(config, unsafe { ProcessMemory::new() })
    }
}

/// Absolute address of the first candidate that is a defined function
///
/// # Errors
/// `ResolveError::SymbolNotFound` if no candidate qualifies.
pub fn find_function<M: AddressSpace + ?Sized>(
    module: &ElfModule<'_, M>,
    candidates: &[String],
) -> Result<u64, ResolveError> {
    for name in candidates {
        match module.lookup(name) {
            Some(symbol) if symbol.kind.is_callable() && symbol.is_defined() => {
                let addr = module.base().wrapping_add(symbol.value);
                debug!("{name} @ 0x{addr:x} (index {}, version {:?})", symbol.index, symbol.version);
                return Ok(addr);
            }
            Some(symbol) => {
                debug!("{name}: rejected {:?} symbol (section {})", symbol.kind, symbol.section_index);
            }
            None => debug!("{name}: not found"),
        }
    }
    Err(ResolveError::SymbolNotFound(candidates.join(" / ")))
}

static PROCESS_RESOLVER: OnceLock<Resolver<ProcessMemory>> = OnceLock::new();

#[allow(unsafe_code)]
fn process_resolver() -> &'static Resolver<ProcessMemory> {
    // SAFETY: the default configuration reads /proc/self/maps; fallback bases
    // only reach it through `resolve_in_process`, whose caller vouches for them
    PROCESS_RESOLVER.get_or_init(|| unsafe { Resolver::current_process(ResolverConfig::default()) })
}

/// Resolve against the current process with the default configuration,
/// once per process
///
/// # Safety
/// `fallback_base`, if given, must be the base address of a mapped ELF
/// image (normally the program interpreter, `AT_BASE`).
///
/// # Errors
/// `ResolutionFailed` if either entry point cannot be found.
#[allow(unsafe_code)]
pub unsafe fn resolve_in_process(
    fallback_base: Option<u64>,
) -> Result<ResolvedSymbols, ResolutionFailed> {
    process_resolver().resolve(fallback_base)
}

/// Result of an earlier successful [`resolve_in_process`]
#[must_use]
pub fn resolved_in_process() -> Option<ResolvedSymbols> {
    PROCESS_RESOLVER.get().and_then(Resolver::resolved)
}
