use crate::core::fastq::{self, ReadView};
use crate::core::filter::{KmerFilter, QualityGate};
use crate::core::io::{Chunk, ChunkData, InputSource};
use anyhow::{Context, Result, anyhow};
use crossbeam_channel as channel;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub struct ScreenConfig {
    pub reads: PathBuf,
    pub out_dir: PathBuf,
    pub sample_name: String,
    pub threads: usize,
    pub threshold: u32,
    pub interleaved: bool,
    /// Edge-window range for the junk heuristic; None disables junk drops.
    pub junk_range: Option<usize>,
    pub quality: Option<QualityGate>,
    pub write_rejected: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ScreenSummary {
    pub reads: u64,
    pub bases: u64,
    pub kept: u64,
    pub rejected: u64,
    pub junk: u64,
}

impl ScreenSummary {
    fn merge(&mut self, other: &ScreenSummary) {
        self.reads += other.reads;
        self.bases += other.bases;
        self.kept += other.kept;
        self.rejected += other.rejected;
        self.junk += other.junk;
    }
}

pub struct AnnotateConfig {
    pub reads: PathBuf,
    pub out: PathBuf,
    pub threads: usize,
    pub threshold: u32,
    /// Report counts at kbig resolution instead of k.
    pub big: bool,
}

/// Run the chunked producer/worker pipeline over a FASTQ input and collect
/// one result per chunk, in chunk order.
fn process_chunks<T, F>(
    reads: &PathBuf,
    threads: usize,
    lines_per_group: u32,
    work: F,
) -> Result<Vec<T>>
where
    T: Send + 'static,
    F: Fn(&Chunk, &[u8]) -> Result<T> + Send + Sync + 'static,
{
    let stats = stats_enabled();
    let t_open = Instant::now();
    let (mut input, mmap_source_opt, _kind) = InputSource::open(reads, threads, lines_per_group)?;
    log_stage(stats, "engine.input_open", t_open);

    let (chunk_tx, chunk_rx) = channel::bounded::<Chunk>(threads * 2);
    let (result_tx, result_rx) = channel::unbounded::<(usize, T)>();
    let (total_tx, total_rx) = channel::bounded::<usize>(1);
    let (err_tx, err_rx) = channel::bounded::<anyhow::Error>(1);

    let producer_err = err_tx.clone();
    let producer = thread::spawn(move || {
        let mut count = 0usize;
        loop {
            match input.next_chunk() {
                Ok(Some(chunk)) => {
                    if chunk_tx.send(chunk).is_err() {
                        return;
                    }
                    count += 1;
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = producer_err.send(e);
                    return;
                }
            }
        }
        let _ = total_tx.send(count);
    });

    let work = Arc::new(work);
    let mut workers = Vec::with_capacity(threads);
    for _ in 0..threads {
        let rx = chunk_rx.clone();
        let tx = result_tx.clone();
        let err = err_tx.clone();
        let work = Arc::clone(&work);
        let worker_source = mmap_source_opt.as_ref().map(Arc::clone);
        workers.push(thread::spawn(move || {
            for chunk in rx.iter() {
                let slice = match &chunk.data {
                    ChunkData::MmapRange { start, end } => {
                        let source = match &worker_source {
                            Some(s) => s,
                            None => {
                                let _ = err
                                    .send(anyhow!("mmap source missing for chunk {}", chunk.index));
                                break;
                            }
                        };
                        &source.bytes()[*start..*end]
                    }
                    ChunkData::Owned(data) => data.as_slice(),
                };
                match work(&chunk, slice) {
                    Ok(result) => {
                        if tx.send((chunk.index, result)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = err.send(e);
                        break;
                    }
                }
            }
        }));
    }
    drop(chunk_rx);
    drop(result_tx);
    drop(err_tx);

    let t_collect = Instant::now();
    let total_chunks = match total_rx.recv() {
        Ok(n) => n,
        Err(_) => {
            // Producer died before reporting; surface its error.
            let e = err_rx
                .recv()
                .unwrap_or_else(|_| anyhow!("input producer exited without a chunk count"));
            let _ = producer.join();
            for worker in workers {
                let _ = worker.join();
            }
            return Err(e);
        }
    };
    if total_chunks == 0 {
        let _ = producer.join();
        for worker in workers {
            let _ = worker.join();
        }
        return Err(anyhow!("input file is empty"));
    }

    let mut parts: Vec<Option<T>> = Vec::with_capacity(total_chunks);
    parts.resize_with(total_chunks, || None);
    let mut err_open = true;
    let mut first_err: Option<anyhow::Error> = None;
    for _ in 0..total_chunks {
        if err_open {
            channel::select! {
                recv(err_rx) -> err => {
                    match err {
                        Ok(err) => {
                            first_err = Some(err);
                            break;
                        }
                        Err(_) => {
                            err_open = false;
                            continue;
                        }
                    }
                }
                recv(result_rx) -> msg => {
                    let (index, result) = match msg {
                        Ok(r) => r,
                        Err(_) => break,
                    };
                    parts[index] = Some(result);
                }
            }
        } else {
            let (index, result) = result_rx.recv().context("failed to receive chunk result")?;
            parts[index] = Some(result);
        }
    }
    log_stage(stats, "engine.collect", t_collect);

    let _ = producer.join();
    for worker in workers {
        let _ = worker.join();
    }
    if let Some(e) = first_err {
        return Err(e);
    }

    let mut out = Vec::with_capacity(total_chunks);
    for (i, part) in parts.into_iter().enumerate() {
        out.push(part.ok_or_else(|| anyhow!("missing result for chunk {}", i))?);
    }
    Ok(out)
}

struct ChunkVerdict {
    kept: Vec<u8>,
    rejected: Vec<u8>,
    summary: ScreenSummary,
}

fn write_record(out: &mut Vec<u8>, read: &ReadView<'_>) {
    out.push(b'@');
    out.extend_from_slice(read.id);
    out.push(b'\n');
    out.extend_from_slice(read.seq);
    out.extend_from_slice(b"\n+\n");
    out.extend_from_slice(read.qual);
    out.push(b'\n');
}

pub fn screen(filter: &Arc<KmerFilter>, cfg: ScreenConfig) -> Result<ScreenSummary> {
    let stats = stats_enabled();
    let t_total = Instant::now();
    let lines_per_group = if cfg.interleaved { 8 } else { 4 };
    let threshold = cfg.threshold;
    let interleaved = cfg.interleaved;
    let junk_range = cfg.junk_range;
    let quality = cfg.quality;
    let write_rejected = cfg.write_rejected;
    let worker_filter = Arc::clone(filter);

    let parts = process_chunks(
        &cfg.reads,
        cfg.threads.max(1),
        lines_per_group,
        move |chunk, slice| {
            let mut reads = Vec::new();
            fastq::parse_fastq_chunk(slice, &mut reads).map_err(|e| {
                anyhow!(
                    "FASTQ parse error in chunk {} at offset {}: {}",
                    chunk.index,
                    e.byte_offset,
                    e.reason
                )
            })?;
            if interleaved && reads.len() % 2 != 0 {
                return Err(anyhow!(
                    "interleaved input has an odd record count in chunk {}",
                    chunk.index
                ));
            }
            let mut verdict = ChunkVerdict {
                kept: Vec::with_capacity(slice.len()),
                rejected: Vec::new(),
                summary: ScreenSummary::default(),
            };
            let passes = |read: &ReadView<'_>| match &quality {
                Some(gate) => worker_filter.passes_qual(read.seq, read.qual, gate, threshold),
                None => worker_filter.passes(read.seq, threshold),
            };
            let group = if interleaved { 2 } else { 1 };
            for pair in reads.chunks(group) {
                verdict.summary.reads += pair.len() as u64;
                for read in pair {
                    verdict.summary.bases += read.seq.len() as u64;
                }
                let clean = pair.iter().all(&passes);
                let junk = if !clean {
                    false
                } else {
                    match junk_range {
                        Some(range) if pair.len() == 2 => {
                            worker_filter.is_junk_pair(pair[0].seq, pair[1].seq, range)
                        }
                        Some(range) => worker_filter.is_junk(pair[0].seq, range),
                        None => false,
                    }
                };
                let dest = if clean && !junk {
                    verdict.summary.kept += pair.len() as u64;
                    &mut verdict.kept
                } else {
                    if junk {
                        verdict.summary.junk += pair.len() as u64;
                    } else {
                        verdict.summary.rejected += pair.len() as u64;
                    }
                    if !write_rejected {
                        continue;
                    }
                    &mut verdict.rejected
                };
                for read in pair {
                    write_record(dest, read);
                }
            }
            Ok(verdict)
        },
    )?;

    let t_write = Instant::now();
    let keep_path = cfg.out_dir.join(format!("{}.keep.fastq", cfg.sample_name));
    let mut keep = BufWriter::new(
        File::create(&keep_path)
            .with_context(|| format!("failed to create {}", keep_path.display()))?,
    );
    let mut reject = if cfg.write_rejected {
        let path = cfg.out_dir.join(format!("{}.reject.fastq", cfg.sample_name));
        Some(BufWriter::new(File::create(&path).with_context(|| {
            format!("failed to create {}", path.display())
        })?))
    } else {
        None
    };

    let mut summary = ScreenSummary::default();
    for part in &parts {
        summary.merge(&part.summary);
        keep.write_all(&part.kept)
            .with_context(|| "failed to write kept reads")?;
        if let Some(w) = reject.as_mut() {
            w.write_all(&part.rejected)
                .with_context(|| "failed to write rejected reads")?;
        }
    }
    keep.flush().with_context(|| "failed to flush kept reads")?;
    if let Some(mut w) = reject {
        w.flush().with_context(|| "failed to flush rejected reads")?;
    }
    log_stage(stats, "engine.write", t_write);
    log_stage(stats, "engine.total", t_total);
    if stats {
        eprintln!(
            "SIEVE_STATS reads={} bases={} kept={} rejected={} junk={}",
            summary.reads, summary.bases, summary.kept, summary.rejected, summary.junk
        );
    }
    Ok(summary)
}

/// Per-read count annotation: one TSV row per read with the smoothed mean,
/// the high-count fraction, and the per-position counts at k or kbig
/// resolution.
pub fn annotate(filter: &Arc<KmerFilter>, cfg: AnnotateConfig) -> Result<u64> {
    let stats = stats_enabled();
    let t_total = Instant::now();
    let threshold = cfg.threshold;
    let big = cfg.big;
    let worker_filter = Arc::clone(filter);

    let parts = process_chunks(&cfg.reads, cfg.threads.max(1), 4, move |chunk, slice| {
        let mut reads = Vec::new();
        fastq::parse_fastq_chunk(slice, &mut reads).map_err(|e| {
            anyhow!(
                "FASTQ parse error in chunk {} at offset {}: {}",
                chunk.index,
                e.byte_offset,
                e.reason
            )
        })?;
        let mut rows = String::with_capacity(slice.len() / 2);
        let mut counts: Vec<u32> = Vec::new();
        let mut lines = 0u64;
        for read in &reads {
            let valid = if big {
                worker_filter.fill_counts_big(read.seq, &mut counts)
            } else {
                worker_filter.fill_counts(read.seq, &mut counts)
            };
            let mean = worker_filter.average_count(read.seq);
            let frac = worker_filter.high_count_fraction(read.seq, threshold, true);
            rows.push_str(std::str::from_utf8(read.id).unwrap_or("?"));
            rows.push_str(&format!(
                "\t{}\t{}\t{:.3}\t{:.4}\t",
                read.seq.len(),
                valid,
                mean,
                frac
            ));
            for (i, c) in counts.iter().enumerate() {
                if i > 0 {
                    rows.push(',');
                }
                rows.push_str(&c.to_string());
            }
            rows.push('\n');
            lines += 1;
        }
        Ok((rows, lines))
    })?;

    let t_write = Instant::now();
    let mut out = BufWriter::new(
        File::create(&cfg.out)
            .with_context(|| format!("failed to create {}", cfg.out.display()))?,
    );
    out.write_all(b"read\tlength\tvalid_windows\tmean_count\thigh_fraction\tcounts\n")
        .with_context(|| "failed to write annotation header")?;
    let mut total = 0u64;
    for (rows, lines) in &parts {
        out.write_all(rows.as_bytes())
            .with_context(|| "failed to write annotation rows")?;
        total += lines;
    }
    out.flush().with_context(|| "failed to flush annotations")?;
    log_stage(stats, "engine.write", t_write);
    log_stage(stats, "engine.total", t_total);
    Ok(total)
}

fn stats_enabled() -> bool {
    matches!(std::env::var("SIEVE_STATS").as_deref(), Ok("1"))
}

fn log_stage(stats: bool, name: &str, t: Instant) {
    if stats {
        eprintln!("SIEVE_STATS stage={} time={}", name, fmt_dur(t.elapsed()));
    }
}

fn fmt_dur(d: Duration) -> String {
    if d.as_secs_f64() < 1.0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.3}s", d.as_secs_f64())
    }
}
