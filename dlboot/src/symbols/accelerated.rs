//! `DT_GNU_HASH`: bloom-filtered symbol hash table
//!
//! ```text
//! [nbuckets][symoffset][bloom_size][bloom_shift]
//! [bloom word 0 .. bloom_size-1]        native machine words
//! [bucket 0 .. nbuckets-1]              u32 symbol indices
//! [chain ...]                           u32 hashes, one per symbol >= symoffset
//! ```
//!
//! The bloom filter rejects most absent names with a single word read. Chain
//! entries hold each symbol's hash with the low bit replaced by an
//! end-of-chain flag.

use log::debug;
use std::mem::size_of;

use super::modulo::hash_mod;
use super::{SymbolEntry, SymbolLookup};
use crate::domain::ResolveError;
use crate::elf::{AddressSpace, ElfModule, MappedView};

/// Bits per bloom word, which matches the ELF class of the process
const WORD_BITS: u32 = usize::BITS;

/// Decomposed `DT_GNU_HASH` table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceleratedHashTable {
    pub bucket_count: u32,
    pub symbol_offset: u32,
    pub bloom_words: u32,
    pub bloom_shift: u32,
    pub bloom: u64,
    pub buckets: u64,
    pub chains: u64,
}

impl AcceleratedHashTable {
    /// Decompose the table at `addr`; the header, bloom words and buckets
    /// must lie inside the view.
    ///
    /// # Errors
    /// `ResolveError::Bounds` if any fixed-size part leaves the loadable range.
    pub fn parse<M: AddressSpace + ?Sized>(
        view: &MappedView<'_, M>,
        addr: u64,
    ) -> Result<Self, ResolveError> {
        let bucket_count = view.read_u32("DT_GNU_HASH nbuckets", addr)?;
        let symbol_offset = view.read_u32("DT_GNU_HASH symoffset", addr + 4)?;
        let bloom_words = view.read_u32("DT_GNU_HASH bloom_size", addr + 8)?;
        let bloom_shift = view.read_u32("DT_GNU_HASH bloom_shift", addr + 12)?;

        let bloom = addr + 16;
        let bloom_len = u64::from(bloom_words) * size_of::<usize>() as u64;
        view.require("DT_GNU_HASH bloom", bloom, bloom_len)?;

        let buckets = bloom + bloom_len;
        let buckets_len = 4 * u64::from(bucket_count);
        view.require("DT_GNU_HASH buckets", buckets, buckets_len)?;

        // Chain length is implied by the symbol count; entries are checked as read
        let chains = buckets + buckets_len;

        Ok(Self { bucket_count, symbol_offset, bloom_words, bloom_shift, bloom, buckets, chains })
    }

    /// Bloom filter test for a precomputed hash
    ///
    /// `false` proves the name is absent; `true` only means it may be present.
    ///
    /// # Errors
    /// Propagates a bounds failure reading the bloom word.
    pub fn bloom_admits<M: AddressSpace + ?Sized>(
        &self,
        view: &MappedView<'_, M>,
        hash: u32,
    ) -> Result<bool, ResolveError> {
        let word_index = hash_mod(hash / WORD_BITS, self.bloom_words);
        let word = view.read_word(
            "DT_GNU_HASH bloom word",
            self.bloom + u64::from(word_index) * size_of::<usize>() as u64,
        )?;

        let low = hash % WORD_BITS;
        let high = hash.checked_shr(self.bloom_shift).unwrap_or(0) % WORD_BITS;
        let mask = (1u64 << low) | (1u64 << high);
        Ok(word & mask == mask)
    }
}

/// The GNU (djb2) symbol hash
#[must_use]
pub fn accelerated_hash(name: &[u8]) -> u32 {
    name.iter().fold(5381u32, |hash, &byte| hash.wrapping_mul(33).wrapping_add(u32::from(byte)))
}

impl SymbolLookup for AcceleratedHashTable {
    fn lookup<M: AddressSpace + ?Sized>(
        &self,
        module: &ElfModule<'_, M>,
        name: &[u8],
    ) -> Option<SymbolEntry> {
        if self.bucket_count == 0 || self.bloom_words == 0 {
            return None;
        }
        let view = module.view();
        let hash = accelerated_hash(name);

        if !self.bloom_admits(view, hash).ok()? {
            return None;
        }

        let bucket = hash_mod(hash, self.bucket_count);
        let mut index =
            view.read_u32("DT_GNU_HASH bucket", self.buckets + 4 * u64::from(bucket)).ok()?;
        if index == 0 {
            return None;
        }
        if index < self.symbol_offset {
            debug!("DT_GNU_HASH bucket {bucket} points below symoffset");
            return None;
        }

        loop {
            let slot = u64::from(index - self.symbol_offset);
            let stored = view.read_u32("DT_GNU_HASH chain", self.chains + 4 * slot).ok()?;

            if (stored | 1) == (hash | 1) {
                let symbol = module.symbol(index).ok()?;
                if module.name_matches(symbol.name_offset, name) {
                    return Some(symbol);
                }
            }
            if stored & 1 != 0 {
                return None;
            }
            index = index.checked_add(1)?;
        }
    }
}
