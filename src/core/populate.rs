//! Population drivers: scan reference or read files and apply one
//! `increment` per observed canonical k-mer window.
//!
//! Many driver threads may write into the same store concurrently; the join
//! performed here before returning is the synchronization boundary the query
//! phase relies on.

use crate::core::codec::KmerWindows;
use crate::core::fastq::{self, FastaRecords, SeqFormat};
use crate::core::io;
use crate::core::store::CountStore;
use anyhow::{Context, Result, bail};
use crossbeam_channel as channel;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

/// Records shipped to one worker message.
const BATCH_RECORDS: usize = 256;
/// Long reference records are split into segments of this many bases, with
/// k-1 overlap so every window is observed exactly once.
const SEGMENT_BASES: usize = 1 << 20;

#[derive(Clone, Copy, Debug, Default)]
pub struct PopulateStats {
    pub records: u64,
    pub bases: u64,
    pub kmers: u64,
}

impl PopulateStats {
    fn merge(&mut self, other: &PopulateStats) {
        self.records += other.records;
        self.bases += other.bases;
        self.kmers += other.kmers;
    }
}

/// Single-threaded driver over in-memory sequences; also the path used when
/// deriving a filter from an already-loaded reference index.
pub fn populate_sequences<'a, S: CountStore>(
    store: &S,
    k: usize,
    rcomp: bool,
    seqs: impl IntoIterator<Item = &'a [u8]>,
) -> PopulateStats {
    let mut stats = PopulateStats::default();
    for seq in seqs {
        stats.records += 1;
        stats.bases += seq.len() as u64;
        for key in KmerWindows::new(seq, k, rcomp).flatten() {
            store.increment(key);
            stats.kmers += 1;
        }
    }
    stats
}

/// Multithreaded driver over FASTA/FASTQ files (plain or gzip). The calling
/// thread produces record batches; `threads` workers increment the shared
/// store. All workers are joined before this returns.
pub fn populate_paths<S>(
    store: &Arc<S>,
    k: usize,
    rcomp: bool,
    paths: &[PathBuf],
    threads: usize,
) -> Result<PopulateStats>
where
    S: CountStore + Send + Sync + 'static,
{
    let threads = threads.max(1);
    let (batch_tx, batch_rx) = channel::bounded::<Vec<Vec<u8>>>(threads * 2);
    let (stats_tx, stats_rx) = channel::unbounded::<PopulateStats>();

    let mut workers = Vec::with_capacity(threads);
    for _ in 0..threads {
        let rx = batch_rx.clone();
        let tx = stats_tx.clone();
        let store = Arc::clone(store);
        workers.push(thread::spawn(move || {
            let mut stats = PopulateStats::default();
            for batch in rx.iter() {
                for seq in &batch {
                    for key in KmerWindows::new(seq, k, rcomp).flatten() {
                        store.increment(key);
                        stats.kmers += 1;
                    }
                }
            }
            let _ = tx.send(stats);
        }));
    }
    drop(batch_rx);
    drop(stats_tx);

    let produced = produce_batches(&batch_tx, k, paths, threads);
    drop(batch_tx);

    // The join is mandatory: queries may only start once every producer has
    // terminated.
    for worker in workers {
        let _ = worker.join();
    }
    let mut stats = produced?;
    for ws in stats_rx.iter() {
        stats.merge(&ws);
    }
    Ok(stats)
}

fn produce_batches(
    tx: &channel::Sender<Vec<Vec<u8>>>,
    k: usize,
    paths: &[PathBuf],
    threads: usize,
) -> Result<PopulateStats> {
    let mut stats = PopulateStats::default();
    let mut batch: Vec<Vec<u8>> = Vec::with_capacity(BATCH_RECORDS);
    for path in paths {
        let data = io::read_all(path, threads)
            .with_context(|| format!("failed to read population source {}", path.display()))?;
        let format = match fastq::sniff_format(&data) {
            Some(f) => f,
            None => bail!(
                "{} is neither FASTA nor FASTQ (unrecognized leading byte)",
                path.display()
            ),
        };
        match format {
            SeqFormat::Fasta => {
                for (_, seq) in FastaRecords::new(&data) {
                    stats.records += 1;
                    stats.bases += seq.len() as u64;
                    push_segments(tx, &seq, k, &mut batch)?;
                }
            }
            SeqFormat::Fastq => {
                let mut reads = Vec::new();
                fastq::parse_fastq_chunk(&data, &mut reads).map_err(|e| {
                    anyhow::anyhow!(
                        "FASTQ parse error in {} at offset {}: {}",
                        path.display(),
                        e.byte_offset,
                        e.reason
                    )
                })?;
                for read in &reads {
                    stats.records += 1;
                    stats.bases += read.seq.len() as u64;
                    push_record(tx, read.seq.to_vec(), &mut batch)?;
                }
            }
        }
    }
    if !batch.is_empty() && tx.send(std::mem::take(&mut batch)).is_err() {
        bail!("population workers exited early");
    }
    Ok(stats)
}

fn push_segments(
    tx: &channel::Sender<Vec<Vec<u8>>>,
    seq: &[u8],
    k: usize,
    batch: &mut Vec<Vec<u8>>,
) -> Result<()> {
    if seq.len() <= SEGMENT_BASES {
        return push_record(tx, seq.to_vec(), batch);
    }
    let mut start = 0usize;
    while start < seq.len() {
        let end = (start + SEGMENT_BASES).min(seq.len());
        push_record(tx, seq[start..end].to_vec(), batch)?;
        if end == seq.len() {
            break;
        }
        start = end - (k - 1);
    }
    Ok(())
}

fn push_record(
    tx: &channel::Sender<Vec<Vec<u8>>>,
    seq: Vec<u8>,
    batch: &mut Vec<Vec<u8>>,
) -> Result<()> {
    batch.push(seq);
    if batch.len() >= BATCH_RECORDS {
        if tx.send(std::mem::take(batch)).is_err() {
            bail!("population workers exited early");
        }
        batch.reserve(BATCH_RECORDS);
    }
    Ok(())
}
