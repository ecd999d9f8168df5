//! `DT_HASH`: the original System V symbol hash table
//!
//! ```text
//! [nbucket][nchain][bucket 0 .. nbucket-1][chain 0 .. nchain-1]
//! ```
//!
//! `bucket[h % nbucket]` is the first symbol index to try; `chain[i]` is the
//! next one after symbol `i`, with 0 ending the chain. `nchain` equals the
//! number of entries in the dynamic symbol table.

use log::debug;

use super::modulo::hash_mod;
use super::{SymbolEntry, SymbolLookup};
use crate::domain::ResolveError;
use crate::elf::{AddressSpace, ElfModule, MappedView};

/// Decomposed `DT_HASH` table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyHashTable {
    pub bucket_count: u32,
    pub chain_count: u32,
    pub buckets: u64,
    pub chains: u64,
}

impl LegacyHashTable {
    /// Decompose the table at `addr`; both arrays must lie inside the view.
    ///
    /// # Errors
    /// `ResolveError::Bounds` if the header or either array leaves the
    /// loadable range.
    pub fn parse<M: AddressSpace + ?Sized>(
        view: &MappedView<'_, M>,
        addr: u64,
    ) -> Result<Self, ResolveError> {
        let bucket_count = view.read_u32("DT_HASH nbucket", addr)?;
        let chain_count = view.read_u32("DT_HASH nchain", addr + 4)?;

        let buckets = addr + 8;
        let buckets_len = 4 * u64::from(bucket_count);
        view.require("DT_HASH buckets", buckets, buckets_len)?;

        let chains = buckets + buckets_len;
        view.require("DT_HASH chains", chains, 4 * u64::from(chain_count))?;

        Ok(Self { bucket_count, chain_count, buckets, chains })
    }
}

/// The System V ELF hash
#[must_use]
pub fn legacy_hash(name: &[u8]) -> u32 {
    let mut hash: u32 = 0;
    for &byte in name {
        hash = (hash << 4).wrapping_add(u32::from(byte));
        let high = hash & 0xF000_0000;
        if high != 0 {
            hash ^= high >> 24;
        }
        hash &= !high;
    }
    hash
}

impl SymbolLookup for LegacyHashTable {
    fn lookup<M: AddressSpace + ?Sized>(
        &self,
        module: &ElfModule<'_, M>,
        name: &[u8],
    ) -> Option<SymbolEntry> {
        if self.bucket_count == 0 {
            return None;
        }
        let view = module.view();

        let bucket = hash_mod(legacy_hash(name), self.bucket_count);
        let mut index = view.read_u32("DT_HASH bucket", self.buckets + 4 * u64::from(bucket)).ok()?;

        // A well-formed chain visits each symbol at most once
        let mut remaining = self.chain_count;
        while index != 0 {
            if index >= self.chain_count || remaining == 0 {
                debug!("DT_HASH chain corrupt at index {index}");
                return None;
            }
            remaining -= 1;

            let symbol = module.symbol(index).ok()?;
            if module.name_matches(symbol.name_offset, name) {
                return Some(symbol);
            }
            index = view.read_u32("DT_HASH chain", self.chains + 4 * u64::from(index)).ok()?;
        }
        None
    }
}
