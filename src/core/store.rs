//! Approximate k-mer counting store: a fixed-capacity array of saturating
//! counters addressed by multiple hash probes per key.
//!
//! Collisions make counts approximate (reads may over-count, never
//! under-count relative to the true frequency of the probed cells); capacity
//! and cell width are fixed at construction and never resized.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Capability set the query algorithms depend on. Concrete stores differ in
/// threading strategy, not in semantics.
pub trait CountStore {
    /// Record one observation of `key`. Safe for concurrent producers.
    fn increment(&self, key: u64);
    /// Approximate count for `key`, saturating at `max_value()`. Safe for
    /// unsynchronized concurrent readers once producers have been joined.
    fn read(&self, key: u64) -> u32;
    fn cells(&self) -> u64;
    fn bits_per_cell(&self) -> u32;
    fn hashes(&self) -> u32;

    fn max_value(&self) -> u32 {
        if self.bits_per_cell() >= 32 {
            u32::MAX
        } else {
            (1u32 << self.bits_per_cell()) - 1
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub cells: u64,
    pub bits: u32,
    pub hashes: u32,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cells < 2 || !self.cells.is_power_of_two() {
            bail!("cell count must be a power of two >= 2, got {}", self.cells);
        }
        if !matches!(self.bits, 1 | 2 | 4 | 8 | 16 | 32) {
            bail!("cell width must be one of 1/2/4/8/16/32 bits, got {}", self.bits);
        }
        if self.hashes < 1 || self.hashes > 8 {
            bail!("hash count must be in 1..=8, got {}", self.hashes);
        }
        Ok(())
    }

    pub fn bytes(&self) -> u64 {
        self.cells * self.bits as u64 / 8
    }
}

/// Largest power-of-two cell count whose table fits in `budget_bytes`.
pub fn cells_for_budget(budget_bytes: u64, bits: u32) -> Result<u64> {
    let total_bits = budget_bytes.saturating_mul(8);
    let cells = total_bits / bits as u64;
    if cells < 2 {
        bail!(
            "memory budget of {} bytes cannot hold a table of {}-bit cells",
            budget_bytes,
            bits
        );
    }
    let cells = if cells.is_power_of_two() {
        cells
    } else {
        cells.next_power_of_two() >> 1
    };
    Ok(cells)
}

// splitmix64 finalizer; decorrelates the low bits of packed 2-bit keys
// before masking to the table.
#[inline]
fn mix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58476d1ce4e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

const H2_SEED: u64 = 0x9e3779b97f4a7c15;

/// Lock-free counting store: cells packed into `AtomicU64` words, saturating
/// CAS increments, min-of-probes reads. Probes are derived by double hashing
/// from one avalanche of the key; the stride is forced odd so every probe
/// sequence covers the power-of-two table.
pub struct AtomicCountStore {
    words: Vec<AtomicU64>,
    config: StoreConfig,
    mask: u64,
    cell_max: u64,
    cells_per_word: u32,
}

impl AtomicCountStore {
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let cells_per_word = 64 / config.bits;
        let word_count = (config.cells / cells_per_word as u64).max(1) as usize;
        let mut words = Vec::with_capacity(word_count);
        words.resize_with(word_count, || AtomicU64::new(0));
        Ok(Self {
            words,
            mask: config.cells - 1,
            cell_max: (1u64 << config.bits) - 1,
            cells_per_word,
            config,
        })
    }

    pub fn with_budget(budget_bytes: u64, bits: u32, hashes: u32) -> Result<Self> {
        let cells = cells_for_budget(budget_bytes, bits)?;
        Self::new(StoreConfig { cells, bits, hashes })
    }

    pub fn config(&self) -> StoreConfig {
        self.config
    }

    #[inline]
    fn probe(&self, h1: u64, h2: u64, i: u32) -> (usize, u32) {
        let cell = h1.wrapping_add((i as u64).wrapping_mul(h2)) & self.mask;
        let word = (cell / self.cells_per_word as u64) as usize;
        let shift = (cell % self.cells_per_word as u64) as u32 * self.config.bits;
        (word, shift)
    }

    /// Copy out the backing words. Only meaningful after producers have been
    /// joined; used for persistence.
    pub fn snapshot_words(&self) -> Vec<u64> {
        self.words.iter().map(|w| w.load(Ordering::Relaxed)).collect()
    }

    /// Rebuild a store from a words snapshot taken with the same config.
    pub fn from_words(config: StoreConfig, words: Vec<u64>) -> Result<Self> {
        config.validate()?;
        let expected = (config.cells / (64 / config.bits) as u64).max(1) as usize;
        if words.len() != expected {
            bail!(
                "count table has {} words, expected {} for {} cells of {} bits",
                words.len(),
                expected,
                config.cells,
                config.bits
            );
        }
        let mut store = Self::new(config)?;
        store.words = words.into_iter().map(AtomicU64::new).collect();
        Ok(store)
    }

    /// Fraction of cells holding a nonzero count. Diagnostic only.
    pub fn occupancy(&self) -> f64 {
        let mut used = 0u64;
        for w in &self.words {
            let mut word = w.load(Ordering::Relaxed);
            while word != 0 {
                let shift = word.trailing_zeros() / self.config.bits * self.config.bits;
                if (word >> shift) & self.cell_max != 0 {
                    used += 1;
                }
                word &= !(self.cell_max << shift);
            }
        }
        used as f64 / self.config.cells as f64
    }
}

impl CountStore for AtomicCountStore {
    fn increment(&self, key: u64) {
        let h1 = mix64(key);
        let h2 = mix64(key ^ H2_SEED) | 1;
        for i in 0..self.config.hashes {
            let (word_idx, shift) = self.probe(h1, h2, i);
            let word = &self.words[word_idx];
            let mut current = word.load(Ordering::Relaxed);
            loop {
                let cell = (current >> shift) & self.cell_max;
                if cell == self.cell_max {
                    break;
                }
                let next = current + (1u64 << shift);
                match word.compare_exchange_weak(
                    current,
                    next,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break,
                    Err(actual) => current = actual,
                }
            }
        }
    }

    fn read(&self, key: u64) -> u32 {
        let h1 = mix64(key);
        let h2 = mix64(key ^ H2_SEED) | 1;
        let mut min = self.cell_max;
        for i in 0..self.config.hashes {
            let (word_idx, shift) = self.probe(h1, h2, i);
            let word = self.words[word_idx].load(Ordering::Relaxed);
            let cell = (word >> shift) & self.cell_max;
            if cell < min {
                min = cell;
                if min == 0 {
                    break;
                }
            }
        }
        min as u32
    }

    fn cells(&self) -> u64 {
        self.config.cells
    }

    fn bits_per_cell(&self) -> u32 {
        self.config.bits
    }

    fn hashes(&self) -> u32 {
        self.config.hashes
    }
}
