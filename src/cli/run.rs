use crate::cli::args::{AnnotateArgs, BuildArgs, Cli, Commands, ScreenArgs};
use crate::core::engine::{self, AnnotateConfig, ScreenConfig};
use crate::core::filter::{FilterConfig, KmerFilter, QualityGate};
use crate::core::populate;
use crate::core::store::AtomicCountStore;
use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use std::env;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub fn entry() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Build(args) => build(args),
        Commands::Screen(args) => screen(args),
        Commands::Annotate(args) => annotate(args),
    }
}

fn build(args: BuildArgs) -> Result<()> {
    let stats = stats_enabled();
    let t0 = Instant::now();

    stage(stats, "preflight", || {
        for path in &args.reference {
            if !path.is_file() {
                bail!("reference file not found: {}", path.display());
            }
        }
        if args.threads == 0 {
            bail!("--threads must be >= 1");
        }
        Ok(())
    })?;

    let config = FilterConfig {
        k: args.k,
        kbig: args.kbig.unwrap_or(args.k),
        bits: args.bits,
        hashes: args.hashes,
        min_streak: args.min_streak,
        rcomp: !args.no_rc,
    };
    config.validate()?;

    let t_alloc = Instant::now();
    let store = Arc::new(AtomicCountStore::with_budget(
        args.mem_mb * 1024 * 1024,
        config.bits,
        config.hashes,
    )?);
    stage_done(stats, "alloc", t_alloc);
    if stats {
        eprintln!(
            "SIEVE_STATS cells={} bits={} hashes={} table_mb={}",
            store.config().cells,
            store.config().bits,
            store.config().hashes,
            store.config().bytes() / (1024 * 1024)
        );
    }

    let t_populate = Instant::now();
    let pop =
        populate::populate_paths(&store, config.k, config.rcomp, &args.reference, args.threads)?;
    stage_done(stats, "populate", t_populate);

    let store = Arc::try_unwrap(store)
        .map_err(|_| anyhow!("population threads still hold the count store"))?;
    let filter = KmerFilter::from_parts(config, store)?;

    let t_save = Instant::now();
    filter
        .save(&args.out)
        .with_context(|| format!("failed to save filter to {}", args.out.display()))?;
    stage_done(stats, "save", t_save);

    println!(
        "built filter from {} record(s), {} bases, {} k-mers; occupancy {:.1}%; saved to {}",
        pop.records,
        pop.bases,
        pop.kmers,
        filter.store().occupancy() * 100.0,
        args.out.display()
    );
    stage_done(stats, "total", t0);
    Ok(())
}

fn screen(args: ScreenArgs) -> Result<()> {
    let stats = stats_enabled();
    let t0 = Instant::now();

    stage(stats, "preflight", || {
        if !args.reads.is_file() {
            bail!("input file not found: {}", args.reads.display());
        }
        if args.threads == 0 {
            bail!("--threads must be >= 1");
        }
        if let Some(p) = args.min_prob {
            if !(0.0..=1.0).contains(&p) {
                bail!("--min-prob must be within 0..=1");
            }
        }
        Ok(())
    })?;

    let sample_name = match args.sample_name {
        Some(s) => s,
        None => sample_name_from(&args.reads)?,
    };

    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create output dir {}", args.out.display()))?;

    let t_load = Instant::now();
    let filter = Arc::new(KmerFilter::load(&args.filter)?);
    stage_done(stats, "load-filter", t_load);

    let quality = match (args.min_qual, args.min_prob) {
        (None, None) => None,
        (min_qual, min_prob) => Some(QualityGate {
            phred_offset: args.phred_offset,
            min_qual: min_qual.unwrap_or(0),
            min_prob: min_prob.unwrap_or(0.0),
        }),
    };

    let t_engine = Instant::now();
    let summary = engine::screen(
        &filter,
        ScreenConfig {
            reads: args.reads,
            out_dir: args.out.clone(),
            sample_name: sample_name.clone(),
            threads: args.threads,
            threshold: args.threshold,
            interleaved: args.interleaved,
            junk_range: args.junk_range,
            quality,
            write_rejected: args.keep_rejects,
        },
    )?;
    stage_done(stats, "engine", t_engine);

    println!(
        "{}: {} reads ({} bases): kept {}, rejected {}, junk {}",
        sample_name, summary.reads, summary.bases, summary.kept, summary.rejected, summary.junk
    );
    stage_done(stats, "total", t0);
    Ok(())
}

fn annotate(args: AnnotateArgs) -> Result<()> {
    let stats = stats_enabled();
    let t0 = Instant::now();

    stage(stats, "preflight", || {
        if !args.reads.is_file() {
            bail!("input file not found: {}", args.reads.display());
        }
        if args.threads == 0 {
            bail!("--threads must be >= 1");
        }
        Ok(())
    })?;

    let t_load = Instant::now();
    let filter = Arc::new(KmerFilter::load(&args.filter)?);
    stage_done(stats, "load-filter", t_load);
    if args.big && filter.config().kbig == filter.config().k {
        bail!(
            "--big requested but the filter was built with kbig == k ({})",
            filter.config().k
        );
    }

    let t_engine = Instant::now();
    let rows = engine::annotate(
        &filter,
        AnnotateConfig {
            reads: args.reads,
            out: args.out.clone(),
            threads: args.threads,
            threshold: args.threshold,
            big: args.big,
        },
    )?;
    stage_done(stats, "engine", t_engine);

    println!("annotated {} read(s) into {}", rows, args.out.display());
    stage_done(stats, "total", t0);
    Ok(())
}

fn sample_name_from(path: &std::path::Path) -> Result<String> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .context("failed to determine sample name from input file")?;
    // fastq.gz leaves the inner extension on the stem.
    Ok(stem
        .trim_end_matches(".fastq")
        .trim_end_matches(".fq")
        .to_string())
}

fn stats_enabled() -> bool {
    matches!(env::var("SIEVE_STATS").as_deref(), Ok("1"))
}

fn stage<F>(stats: bool, name: &str, f: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    let t = Instant::now();
    let res = f();
    if stats {
        eprintln!("SIEVE_STATS stage={} time={}", name, fmt_dur(t.elapsed()));
    }
    res
}

fn stage_done(stats: bool, name: &str, t: Instant) {
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
