//! Read-classification facade: k-mer configuration plus a counting store,
//! exposing the query operations used to screen reads.
//!
//! All queries are read-only and safe for concurrent callers once the store
//! has been populated (the population join is the synchronization boundary).
//! Degenerate input never errors: too-short or empty sequences return the
//! neutral value for each operation.

use crate::core::codec::{self, KmerWindows, QualWindows};
use crate::core::store::{AtomicCountStore, CountStore, StoreConfig};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

const ARTIFACT_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Small k-mer length, 1..=32.
    pub k: usize,
    /// Logical large k-mer length, k..=32. Equal to `k` disables big-k
    /// aggregation.
    pub kbig: usize,
    pub bits: u32,
    pub hashes: u32,
    /// Consecutive high-count windows required before a rejection test fails.
    pub min_streak: u32,
    /// Canonicalize keys against their reverse complement.
    pub rcomp: bool,
}

impl FilterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.k < 1 || self.k > codec::K_MAX {
            bail!("k must be in 1..=32, got {}", self.k);
        }
        if self.kbig < self.k || self.kbig > codec::K_MAX {
            bail!("kbig must be in {}..=32, got {}", self.k, self.kbig);
        }
        if self.min_streak < 1 {
            bail!("min-streak must be >= 1");
        }
        Ok(())
    }

    /// Number of small-k windows composing one big-k window.
    pub fn small_per_big(&self) -> usize {
        self.kbig - self.k + 1
    }
}

/// Per-base quality gating parameters for the quality-aware scans.
#[derive(Clone, Copy, Debug)]
pub struct QualityGate {
    pub phred_offset: u8,
    pub min_qual: u8,
    pub min_prob: f64,
}

pub struct KmerFilter<S: CountStore = AtomicCountStore> {
    config: FilterConfig,
    store: S,
}

impl<S: CountStore> KmerFilter<S> {
    pub fn from_parts(config: FilterConfig, store: S) -> Result<Self> {
        config.validate()?;
        if store.bits_per_cell() != config.bits || store.hashes() != config.hashes {
            bail!(
                "store shape ({} bits, {} hashes) does not match filter config ({} bits, {} hashes)",
                store.bits_per_cell(),
                store.hashes(),
                config.bits,
                config.hashes
            );
        }
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    fn canonical(&self, key: u64) -> u64 {
        if self.config.rcomp {
            key.max(codec::reverse_complement(key, self.config.k))
        } else {
            key
        }
    }

    #[inline]
    fn windows<'a>(&self, seq: &'a [u8]) -> KmerWindows<'a> {
        KmerWindows::new(seq, self.config.k, self.config.rcomp)
    }

    /// Approximate count for a raw (not yet canonicalized) small-k key.
    pub fn count(&self, key: u64) -> u32 {
        self.store.read(self.canonical(key))
    }

    /// Minimum length a sequence needs before a rejection test can fail.
    fn rejectable_len(&self) -> usize {
        self.config.k + self.config.min_streak as usize - 1
    }

    /// Contamination screen: false as soon as `min_streak` consecutive
    /// windows all read at or above `threshold`. Breaks and low windows
    /// reset the streak; short sequences pass trivially.
    pub fn passes(&self, seq: &[u8], threshold: u32) -> bool {
        if seq.len() < self.rejectable_len() {
            return true;
        }
        self.passes_scan(self.windows(seq), threshold)
    }

    /// Quality-aware variant of [`passes`]: windows whose bases fall below
    /// the gate are treated as breaks.
    pub fn passes_qual(&self, seq: &[u8], qual: &[u8], gate: &QualityGate, threshold: u32) -> bool {
        if seq.len() < self.rejectable_len() || seq.len() != qual.len() {
            return true;
        }
        let windows = QualWindows::new(
            seq,
            qual,
            self.config.k,
            self.config.rcomp,
            gate.phred_offset,
            gate.min_qual,
            gate.min_prob,
        );
        self.passes_scan(windows, threshold)
    }

    fn passes_scan(&self, windows: impl Iterator<Item = Option<u64>>, threshold: u32) -> bool {
        let mut streak = 0u32;
        for w in windows {
            match w {
                Some(key) if self.store.read(key) >= threshold => {
                    streak += 1;
                    if streak >= self.config.min_streak {
                        return false;
                    }
                }
                _ => streak = 0,
            }
        }
        true
    }

    /// Materialize per-window canonical keys into a caller-owned buffer;
    /// `None` marks a broken window. One entry per window position.
    pub fn fill_keys(&self, seq: &[u8], out: &mut Vec<Option<u64>>) {
        out.clear();
        out.extend(self.windows(seq));
    }

    /// Buffered variant of [`passes`] with sparse streak verification: only
    /// every `min_streak`-th window is read from the store; a high sample
    /// expands backward and forward to confirm a genuine run. Any run of
    /// `min_streak` windows contains a sampled position, so no true streak
    /// is missed.
    pub fn passes_buffered(&self, seq: &[u8], buf: &mut Vec<Option<u64>>, threshold: u32) -> bool {
        if seq.len() < self.rejectable_len() {
            return true;
        }
        self.fill_keys(seq, buf);
        let m = self.config.min_streak as usize;
        let n = buf.len();
        let high =
            |slot: &Option<u64>| matches!(slot, Some(key) if self.store.read(*key) >= threshold);

        let mut i = m - 1;
        while i < n {
            if high(&buf[i]) {
                let mut run = 1usize;
                let mut j = i;
                while j > 0 && high(&buf[j - 1]) {
                    run += 1;
                    if run >= m {
                        return false;
                    }
                    j -= 1;
                }
                let mut j = i;
                while j + 1 < n && high(&buf[j + 1]) {
                    run += 1;
                    if run >= m {
                        return false;
                    }
                    j += 1;
                }
            }
            i += m;
        }
        true
    }

    /// Minimum count over the first and last `range` valid windows, or None
    /// when the sequence has no valid window.
    fn edge_min_counts(&self, seq: &[u8], range: usize) -> Option<(u32, u32)> {
        let range = range.max(1);
        let mut left_min = u32::MAX;
        let mut left_seen = 0usize;
        let mut tail: VecDeque<u32> = VecDeque::with_capacity(range);
        for w in self.windows(seq) {
            let Some(key) = w else { continue };
            let c = self.store.read(key);
            if left_seen < range {
                left_min = left_min.min(c);
                left_seen += 1;
            }
            if tail.len() == range {
                tail.pop_front();
            }
            tail.push_back(c);
        }
        if left_seen == 0 {
            return None;
        }
        let right_min = tail.iter().copied().min().unwrap_or(0);
        Some((left_min, right_min))
    }

    /// Low-complexity / adapter-remnant heuristic: junk iff both edges of
    /// the read are essentially absent from the reference (edge minima < 2).
    /// Degenerate reads (shorter than k, or all-ambiguous) are junk.
    pub fn is_junk(&self, seq: &[u8], range: usize) -> bool {
        match self.edge_min_counts(seq, range) {
            Some((left, right)) => left < 2 && right < 2,
            None => true,
        }
    }

    /// Pair variant: a pair is kept when either mate anchors strongly on its
    /// left side; it is junk when no mate does and at least one mate shows a
    /// weak right-side signal. A degenerate mate delegates to the other.
    pub fn is_junk_pair(&self, r1: &[u8], r2: &[u8], range: usize) -> bool {
        match (
            self.edge_min_counts(r1, range),
            self.edge_min_counts(r2, range),
        ) {
            (None, None) => true,
            (Some(_), None) => self.is_junk(r1, range),
            (None, Some(_)) => self.is_junk(r2, range),
            (Some((l1, rt1)), Some((l2, rt2))) => {
                let strong_left = l1 > 1 || l2 > 1;
                let weak_right = rt1 < 3 || rt2 < 3;
                !strong_left && weak_right
            }
        }
    }

    /// Mean of collision-smoothed window counts; 0.0 for degenerate input.
    pub fn average_count(&self, seq: &[u8]) -> f64 {
        let counts = self
            .windows(seq)
            .map(|w| w.map(|key| self.store.read(key)));
        smoothed_mean(counts)
    }

    /// Fraction of valid windows reading at or above `threshold`. In smooth
    /// mode a window only counts when its predecessor is also high, damping
    /// one-window collision spikes.
    pub fn high_count_fraction(&self, seq: &[u8], threshold: u32, smooth: bool) -> f64 {
        let mut valid = 0u64;
        let mut hits = 0u64;
        let mut prev_high = false;
        for w in self.windows(seq) {
            match w {
                Some(key) => {
                    valid += 1;
                    let high = self.store.read(key) >= threshold;
                    if if smooth { high && prev_high } else { high } {
                        hits += 1;
                    }
                    prev_high = high;
                }
                None => prev_high = false,
            }
        }
        if valid == 0 {
            return 0.0;
        }
        hits as f64 / valid as f64
    }

    /// One count per base position, aligned with the input: 0 while the
    /// trailing window is not yet full or broken. Returns the number of
    /// valid windows.
    pub fn fill_counts(&self, seq: &[u8], out: &mut Vec<u32>) -> usize {
        out.clear();
        out.resize((self.config.k - 1).min(seq.len()), 0);
        let mut valid = 0usize;
        for w in self.windows(seq) {
            match w {
                Some(key) => {
                    valid += 1;
                    out.push(self.store.read(key));
                }
                None => out.push(0),
            }
        }
        valid
    }

    /// Big-k counts by aggregation: the per-position small-k counts, reduced
    /// by a sliding-window minimum of width `small_per_big` (a big k-mer is
    /// only as frequent as its rarest constituent). Output is shortened by
    /// `small_per_big - 1` entries; returns the number of valid big windows.
    pub fn fill_counts_big(&self, seq: &[u8], out: &mut Vec<u32>) -> usize {
        let spb = self.config.small_per_big();
        out.clear();
        out.resize((self.config.k - 1).min(seq.len()), 0);
        let mut run = 0usize;
        let mut valid_big = 0usize;
        for w in self.windows(seq) {
            match w {
                Some(key) => {
                    run += 1;
                    if run >= spb {
                        valid_big += 1;
                    }
                    out.push(self.store.read(key));
                }
                None => {
                    run = 0;
                    out.push(0);
                }
            }
        }
        if spb == 1 {
            return valid_big;
        }
        if out.len() < spb {
            out.clear();
            return 0;
        }
        sliding_min(out, spb);
        valid_big
    }

    /// Approximate count for a single kbig-wide key: minimum over its
    /// overlapping small-k sub-keys, stopping early at 0.
    pub fn count_big(&self, kmer: u64) -> u32 {
        let spb = self.config.small_per_big();
        let mask = codec::mask_for(self.config.k);
        let mut min = u32::MAX;
        for i in 0..spb {
            let sub = (kmer >> (2 * i)) & mask;
            let c = self.count(sub);
            if c == 0 {
                return 0;
            }
            min = min.min(c);
        }
        min
    }
}

/// Sliding-window minimum of width `w`, in place, via a monotonic deque.
/// `values` shrinks by `w - 1` entries.
fn sliding_min(values: &mut Vec<u32>, w: usize) {
    debug_assert!(w >= 2 && values.len() >= w);
    let mut deque: VecDeque<(usize, u32)> = VecDeque::with_capacity(w);
    for i in 0..values.len() {
        let v = values[i];
        while deque.back().is_some_and(|&(_, back)| back >= v) {
            deque.pop_back();
        }
        deque.push_back((i, v));
        if i + 1 >= w {
            let out_idx = i + 1 - w;
            if deque.front().is_some_and(|&(idx, _)| idx < out_idx) {
                deque.pop_front();
            }
            values[out_idx] = deque.front().map(|&(_, v)| v).unwrap_or(0);
        }
    }
    values.truncate(values.len() - (w - 1));
}

/// Collision-smoothed accumulation: each window contributes
/// `min(prev, max(prev2, current))`; the final window of every unbroken run
/// contributes its raw count. A one-window spike unsupported by either
/// neighbor is clipped to the better-supported neighbor.
fn smoothed_mean(counts: impl Iterator<Item = Option<u32>>) -> f64 {
    let mut sum = 0u64;
    let mut windows = 0u64;
    let mut prev: Option<u32> = None;
    let mut prev2: Option<u32> = None;
    for c in counts {
        match c {
            Some(c) => {
                windows += 1;
                if let Some(p) = prev {
                    sum += p.min(prev2.unwrap_or(0).max(c)) as u64;
                }
                prev2 = prev;
                prev = Some(c);
            }
            None => {
                if let Some(p) = prev {
                    sum += p as u64;
                }
                prev = None;
                prev2 = None;
            }
        }
    }
    if let Some(p) = prev {
        sum += p as u64;
    }
    sum as f64 / windows.max(1) as f64
}

#[derive(Serialize, Deserialize)]
struct FilterArtifact {
    version: u32,
    config: FilterConfig,
    store: StoreConfig,
    words: Vec<u64>,
}

impl KmerFilter<AtomicCountStore> {
    /// Empty filter sized to a byte budget; populate through
    /// [`crate::core::populate`] before querying.
    pub fn with_budget(config: FilterConfig, budget_bytes: u64) -> Result<Self> {
        config.validate()?;
        let store = AtomicCountStore::with_budget(budget_bytes, config.bits, config.hashes)?;
        Self::from_parts(config, store)
    }

    /// Serialize configuration plus the full count table. The format is
    /// opaque and versioned; no cross-version compatibility is promised.
    pub fn save(&self, path: &Path) -> Result<()> {
        let artifact = FilterArtifact {
            version: ARTIFACT_VERSION,
            config: self.config,
            store: self.store.config(),
            words: self.store.snapshot_words(),
        };
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        bincode::serialize_into(BufWriter::new(file), &artifact)
            .with_context(|| format!("failed to write filter to {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let artifact: FilterArtifact = bincode::deserialize_from(BufReader::new(file))
            .with_context(|| format!("failed to read filter from {}", path.display()))?;
        if artifact.version != ARTIFACT_VERSION {
            bail!(
                "filter artifact {} has version {}, expected {}",
                path.display(),
                artifact.version,
                ARTIFACT_VERSION
            );
        }
        let store = AtomicCountStore::from_words(artifact.store, artifact.words)?;
        Self::from_parts(artifact.config, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::encode_kmer;
    use std::collections::HashSet;

    // 30 bases, all 5-mer windows distinct; checked by distinct_windows().
    const SEQ: &[u8] = b"ACGTAGGCTACCTGATCAAGGTTCACGGTA";

    fn filter(k: usize, min_streak: u32) -> KmerFilter {
        let config = FilterConfig {
            k,
            kbig: k,
            bits: 8,
            hashes: 2,
            min_streak,
            rcomp: false,
        };
        let store = AtomicCountStore::new(StoreConfig {
            cells: 1 << 16,
            bits: 8,
            hashes: 2,
        })
        .unwrap();
        KmerFilter::from_parts(config, store).unwrap()
    }

    fn window_keys(f: &KmerFilter, seq: &[u8]) -> Vec<u64> {
        let mut buf = Vec::new();
        f.fill_keys(seq, &mut buf);
        buf.into_iter().map(|w| w.unwrap()).collect()
    }

    fn bump(f: &KmerFilter, key: u64, times: u32) {
        for _ in 0..times {
            f.store().increment(key);
        }
    }

    #[test]
    fn distinct_windows() {
        let f = filter(5, 3);
        let keys = window_keys(&f, SEQ);
        let set: HashSet<u64> = keys.iter().copied().collect();
        assert_eq!(set.len(), keys.len());
    }

    #[test]
    fn config_validation() {
        let bad = FilterConfig { k: 33, kbig: 33, bits: 8, hashes: 2, min_streak: 1, rcomp: true };
        assert!(bad.validate().is_err());
        let bad = FilterConfig { k: 8, kbig: 6, bits: 8, hashes: 2, min_streak: 1, rcomp: true };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn short_sequences_pass_trivially() {
        let f = filter(5, 3);
        assert!(f.passes(b"", 1));
        assert!(f.passes(b"ACG", 1));
        // k + min_streak - 1 = 7; a 6-base read cannot host a streak of 3.
        assert!(f.passes(b"ACGTAC", 0));
    }

    #[test]
    fn streak_threshold() {
        let f = filter(5, 3);
        let keys = window_keys(&f, SEQ);
        // Streak of exactly 3 at windows 5..=7 rejects.
        for &w in &[5usize, 6, 7] {
            bump(&f, keys[w], 1);
        }
        assert!(!f.passes(SEQ, 1));
        let mut buf = Vec::new();
        assert!(!f.passes_buffered(SEQ, &mut buf, 1));

        // Streak of 2 does not.
        let f = filter(5, 3);
        let keys = window_keys(&f, SEQ);
        for &w in &[5usize, 6] {
            bump(&f, keys[w], 1);
        }
        assert!(f.passes(SEQ, 1));
        assert!(f.passes_buffered(SEQ, &mut buf, 1));
    }

    #[test]
    fn streak_resets_on_break() {
        let f = filter(4, 3);
        let mut seq = SEQ.to_vec();
        let keys: Vec<Option<u64>> = KmerWindows::new(&seq, 4, false).collect();
        // Windows 3,4 and 9,10 do not touch base 8, so their keys survive
        // the mutation below: two high windows, a break, two more high
        // windows, never three in a row.
        for &w in &[3usize, 4, 9, 10] {
            bump(&f, keys[w].unwrap(), 1);
        }
        seq[8] = b'N';
        assert!(f.passes(&seq, 1));
        // Fill the gap: the unbroken sequence now rejects, the broken one
        // still resets at the N and passes.
        for &w in &[5usize, 6, 7, 8] {
            bump(&f, keys[w].unwrap(), 1);
        }
        assert!(!f.passes(SEQ, 1));
        assert!(f.passes(&seq, 1));
        // The sparse pass sees the broken windows as sentinels and agrees.
        let mut buf = Vec::new();
        assert!(!f.passes_buffered(SEQ, &mut buf, 1));
        assert!(buf.iter().all(|w| w.is_some()));
        assert!(f.passes_buffered(&seq, &mut buf, 1));
        assert!(buf[5..=8].iter().all(|w| w.is_none()));
    }

    #[test]
    fn sparse_matches_streaming() {
        // Pseudo-random population; sparse and streaming verdicts must agree.
        let f = filter(5, 3);
        let keys = window_keys(&f, SEQ);
        let mut state = 0x2545F4914F6CDD1Du64;
        for &key in &keys {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            bump(&f, key, (state >> 60) as u32);
        }
        let mut buf = Vec::new();
        for threshold in 0..6 {
            assert_eq!(
                f.passes(SEQ, threshold),
                f.passes_buffered(SEQ, &mut buf, threshold),
                "threshold {threshold}"
            );
        }
    }

    #[test]
    fn junk_detection() {
        let f = filter(5, 1);
        let keys = window_keys(&f, SEQ);
        // Nothing populated: both edges absent -> junk.
        assert!(f.is_junk(SEQ, 2));
        // Strong left edge rescues the read.
        bump(&f, keys[0], 2);
        bump(&f, keys[1], 2);
        assert!(!f.is_junk(SEQ, 2));
        // Degenerate input.
        assert!(f.is_junk(b"AC", 2));
        assert!(f.is_junk(b"NNNNNNNN", 2));
    }

    #[test]
    fn junk_pair_logic() {
        let f = filter(5, 1);
        let keys = window_keys(&f, SEQ);
        let last = keys.len() - 1;
        // No anchors anywhere, weak right sides -> pair junk.
        assert!(f.is_junk_pair(SEQ, SEQ, 2));
        // A strong left anchor on either mate keeps the pair.
        bump(&f, keys[0], 2);
        bump(&f, keys[1], 2);
        assert!(!f.is_junk_pair(SEQ, SEQ, 2));
        // Strong right sides alone also keep the pair (no weak right mate).
        let f = filter(5, 1);
        let keys = window_keys(&f, SEQ);
        bump(&f, keys[last], 3);
        bump(&f, keys[last - 1], 3);
        assert!(!f.is_junk_pair(SEQ, SEQ, 2));
        // Degenerate mate delegates to the other.
        let f = filter(5, 1);
        assert!(f.is_junk_pair(b"A", SEQ, 2));
    }

    #[test]
    fn smoothing_clips_isolated_spike() {
        let counts = [2u32, 2, 50, 2, 2];
        let mean = smoothed_mean(counts.iter().map(|&c| Some(c)));
        // Smoothed contributions are [2,2,2,2] plus the final raw 2.
        assert_eq!(mean, 2.0);
        // A sustained high region is not suppressed.
        let counts = [2u32, 50, 50, 50, 2];
        let mean = smoothed_mean(counts.iter().map(|&c| Some(c)));
        assert_eq!(mean, (2 + 50 + 50 + 2 + 2) as f64 / 5.0);
    }

    #[test]
    fn smoothing_resets_across_breaks() {
        let slots = [Some(3u32), Some(3), None, Some(7), Some(7)];
        // First run contributes min(3,max(0,3))=3 then raw 3; second run
        // contributes min(7,max(0,7))=7 then raw 7.
        let mean = smoothed_mean(slots.iter().copied());
        assert_eq!(mean, (3 + 3 + 7 + 7) as f64 / 4.0);
    }

    #[test]
    fn average_count_through_store() {
        let f = filter(5, 1);
        let keys = window_keys(&f, SEQ);
        for (i, &key) in keys.iter().enumerate() {
            bump(&f, key, if i == 3 { 50 } else { 2 });
        }
        let expected = ((keys.len() as u64 - 1) * 2 + 2) as f64 / keys.len() as f64;
        assert_eq!(f.average_count(SEQ), expected);
        assert_eq!(f.average_count(b"AC"), 0.0);
    }

    #[test]
    fn high_count_fraction_smoothing() {
        let f = filter(4, 1);
        let seq = &SEQ[..8]; // 5 windows
        let keys = window_keys(&f, seq);
        let counts = [5u32, 3, 7, 1, 9];
        for (&key, &c) in keys.iter().zip(&counts) {
            bump(&f, key, c);
        }
        assert_eq!(f.high_count_fraction(seq, 4, false), 3.0 / 5.0);
        assert_eq!(f.high_count_fraction(seq, 4, true), 0.0);
        assert_eq!(f.high_count_fraction(seq, 3, true), 2.0 / 5.0);
        assert_eq!(f.high_count_fraction(b"AC", 1, false), 0.0);
    }

    #[test]
    fn fill_counts_positional_alignment() {
        let f = filter(4, 1);
        let seq = b"ACGNACGT";
        let mut out = Vec::new();
        let valid = f.fill_counts(seq, &mut out);
        assert_eq!(out.len(), seq.len());
        assert_eq!(valid, 1);
        assert!(out[..7].iter().all(|&c| c == 0));
        bump(&f, encode_kmer(b"ACGT").unwrap(), 3);
        f.fill_counts(seq, &mut out);
        assert_eq!(out[7], 3);
    }

    #[test]
    fn big_k_aggregation() {
        let config = FilterConfig {
            k: 4,
            kbig: 6,
            bits: 8,
            hashes: 2,
            min_streak: 1,
            rcomp: false,
        };
        let store = AtomicCountStore::new(StoreConfig {
            cells: 1 << 16,
            bits: 8,
            hashes: 2,
        })
        .unwrap();
        let f = KmerFilter::from_parts(config, store).unwrap();
        let seq = &SEQ[..8]; // 5 small windows, 3 big windows
        let keys = window_keys(&f, seq);
        let counts = [5u32, 3, 7, 1, 9];
        for (&key, &c) in keys.iter().zip(&counts) {
            bump(&f, key, c);
        }
        let mut out = Vec::new();
        let valid_big = f.fill_counts_big(seq, &mut out);
        assert_eq!(valid_big, 3);
        // Per-base small counts [0,0,0,5,3,7,1,9] reduced by a width-3 min.
        assert_eq!(out, vec![0, 0, 0, 3, 1, 1]);

        // Single-key lookups agree with the aggregated fill.
        for (j, &expected) in out.iter().enumerate().skip(3) {
            let big = encode_kmer(&seq[j + 2 - 5..j + 3]).unwrap();
            assert_eq!(f.count_big(big), expected);
        }
    }

    #[test]
    fn count_big_short_circuits_to_zero() {
        let f = filter(4, 1);
        assert_eq!(f.count_big(encode_kmer(b"ACGT").unwrap()), 0);
    }
}
