use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "readsieve", version, about = "K-mer based read screening against a reference")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a counting filter from reference sequences and save it
    Build(BuildArgs),
    /// Screen reads against a filter, separating kept and rejected reads
    Screen(ScreenArgs),
    /// Emit per-read k-mer count annotations as TSV
    Annotate(AnnotateArgs),
}

#[derive(Parser)]
pub struct BuildArgs {
    /// Reference FASTA/FASTQ file(s), plain or gzip
    #[arg(long = "ref", required = true, num_args = 1..)]
    pub reference: Vec<PathBuf>,

    #[arg(long)]
    pub out: PathBuf,

    #[arg(short, default_value_t = 31)]
    pub k: usize,

    /// Large k-mer length for aggregated queries; defaults to k
    #[arg(long)]
    pub kbig: Option<usize>,

    /// Counter width in bits (1/2/4/8/16/32)
    #[arg(long, default_value_t = 8)]
    pub bits: u32,

    /// Hash probes per key
    #[arg(long, default_value_t = 2)]
    pub hashes: u32,

    /// Consecutive high-count windows required to reject a read
    #[arg(long, default_value_t = 3)]
    pub min_streak: u32,

    /// Memory budget for the count table, in MiB
    #[arg(long, default_value_t = 512)]
    pub mem_mb: u64,

    /// Disable reverse-complement canonicalization
    #[arg(long, default_value_t = false)]
    pub no_rc: bool,

    #[arg(long, default_value_t = num_cpus::get())]
    pub threads: usize,
}

#[derive(Parser)]
pub struct ScreenArgs {
    pub reads: PathBuf,

    /// Filter artifact written by `build`
    #[arg(long)]
    pub filter: PathBuf,

    /// Output directory
    #[arg(long)]
    pub out: PathBuf,

    #[arg(long)]
    pub sample_name: Option<String>,

    /// Count a window as a reference hit at or above this value
    #[arg(long, default_value_t = 1)]
    pub threshold: u32,

    /// Input is interleaved paired-end; mates are kept or dropped together
    #[arg(long, default_value_t = false)]
    pub interleaved: bool,

    /// Drop junk reads, testing this many windows at each read edge
    #[arg(long)]
    pub junk_range: Option<usize>,

    /// Bases below this quality break the scan window
    #[arg(long)]
    pub min_qual: Option<u8>,

    /// Minimum window correctness probability (0..1)
    #[arg(long)]
    pub min_prob: Option<f64>,

    #[arg(long, default_value_t = 33)]
    pub phred_offset: u8,

    /// Also write rejected reads next to the kept output
    #[arg(long, default_value_t = false)]
    pub keep_rejects: bool,

    #[arg(long, default_value_t = num_cpus::get())]
    pub threads: usize,
}

#[derive(Parser)]
pub struct AnnotateArgs {
    pub reads: PathBuf,

    /// Filter artifact written by `build`
    #[arg(long)]
    pub filter: PathBuf,

    /// Output TSV path
    #[arg(long)]
    pub out: PathBuf,

    #[arg(long, default_value_t = 1)]
    pub threshold: u32,

    /// Report counts at kbig resolution instead of k
    #[arg(long, default_value_t = false)]
    pub big: bool,

    #[arg(long, default_value_t = num_cpus::get())]
    pub threads: usize,
}
