use readsieve::core::codec::KmerWindows;
use readsieve::core::engine::{self, AnnotateConfig, ScreenConfig};
use readsieve::core::filter::{FilterConfig, KmerFilter};
use readsieve::core::populate;
use readsieve::core::store::{AtomicCountStore, CountStore, StoreConfig};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

// 40 bases; the contamination source for every scenario below.
const REF40: &[u8] = b"ACGTAGGCTACCTGATCAAGGTTCACGGTACCAGTTGCAA";
const UNRELATED: &[u8] = b"TTGACTTGAGCGATCGGACTTCAAGTCAGGATCCAATGGA";

fn write_fasta(path: &Path, seqs: &[&[u8]]) {
    let mut file = fs::File::create(path).unwrap();
    for (i, seq) in seqs.iter().enumerate() {
        writeln!(file, ">ref{}", i).unwrap();
        writeln!(file, "{}", std::str::from_utf8(seq).unwrap()).unwrap();
    }
}

fn write_fastq(path: &Path, reads: &[(&str, &[u8])]) {
    let mut file = fs::File::create(path).unwrap();
    for (id, seq) in reads {
        let qual = vec![b'I'; seq.len()];
        writeln!(file, "@{}", id).unwrap();
        writeln!(file, "{}", std::str::from_utf8(seq).unwrap()).unwrap();
        writeln!(file, "+").unwrap();
        writeln!(file, "{}", std::str::from_utf8(&qual).unwrap()).unwrap();
    }
}

fn build_filter(config: FilterConfig, budget_bytes: u64, reference: &[&[u8]]) -> KmerFilter {
    let filter = KmerFilter::with_budget(config, budget_bytes).unwrap();
    populate::populate_sequences(
        filter.store(),
        config.k,
        config.rcomp,
        reference.iter().copied(),
    );
    filter
}

#[test]
fn saturating_end_to_end_scenario() {
    // 1024 cells of 8 bits, 2 probes, populated with 1000 copies of one
    // 40-base sequence at k=20.
    let config = FilterConfig {
        k: 20,
        kbig: 20,
        bits: 8,
        hashes: 2,
        min_streak: 1,
        rcomp: true,
    };
    let store = AtomicCountStore::new(StoreConfig {
        cells: 1024,
        bits: 8,
        hashes: 2,
    })
    .unwrap();
    let filter = KmerFilter::from_parts(config, store).unwrap();
    populate::populate_sequences(
        filter.store(),
        20,
        true,
        std::iter::repeat(REF40).take(1000),
    );

    // Every 20-mer of the sequence reads at least 1 and saturates at 255.
    for (i, key) in KmerWindows::new(REF40, 20, true).enumerate() {
        let count = filter.count(key.unwrap());
        assert!(count >= 1, "window {i} read 0");
        assert!(count <= 255);
    }
    // The sequence is fully contaminated by itself.
    assert!(!filter.passes(REF40, 1));
}

#[test]
fn save_load_reproduces_queries() {
    let dir = tempfile::tempdir().unwrap();
    let config = FilterConfig {
        k: 15,
        kbig: 17,
        bits: 8,
        hashes: 3,
        min_streak: 2,
        rcomp: true,
    };
    let filter = build_filter(config, 1 << 20, &[REF40]);
    let path = dir.path().join("ref.sieve");
    filter.save(&path).unwrap();

    let loaded = KmerFilter::load(&path).unwrap();
    assert_eq!(loaded.config().k, 15);
    assert_eq!(loaded.config().kbig, 17);
    for key in KmerWindows::new(REF40, 15, true).flatten() {
        assert_eq!(filter.count(key), loaded.count(key));
    }
    let mut a = Vec::new();
    let mut b = Vec::new();
    assert_eq!(
        filter.fill_counts_big(REF40, &mut a),
        loaded.fill_counts_big(REF40, &mut b)
    );
    assert_eq!(a, b);
    assert_eq!(filter.passes(REF40, 1), loaded.passes(REF40, 1));
    assert_eq!(filter.average_count(REF40), loaded.average_count(REF40));

    // A truncated artifact must not load.
    let bytes = fs::read(&path).unwrap();
    let truncated = dir.path().join("broken.sieve");
    fs::write(&truncated, &bytes[..bytes.len() / 2]).unwrap();
    assert!(KmerFilter::load(&truncated).is_err());
}

#[test]
fn screen_splits_contaminated_reads() {
    let dir = tempfile::tempdir().unwrap();
    let reads_path = dir.path().join("reads.fastq");
    write_fastq(
        &reads_path,
        &[
            ("contaminated", REF40),
            ("clean", UNRELATED),
            ("short", b"ACGT"),
        ],
    );

    let config = FilterConfig {
        k: 20,
        kbig: 20,
        bits: 8,
        hashes: 2,
        min_streak: 2,
        rcomp: true,
    };
    let filter = Arc::new(build_filter(config, 1 << 20, &[REF40]));

    let summary = engine::screen(
        &filter,
        ScreenConfig {
            reads: reads_path,
            out_dir: dir.path().to_path_buf(),
            sample_name: "sample".into(),
            threads: 2,
            threshold: 1,
            interleaved: false,
            junk_range: None,
            quality: None,
            write_rejected: true,
        },
    )
    .unwrap();

    assert_eq!(summary.reads, 3);
    assert_eq!(summary.kept, 2);
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.junk, 0);

    let kept = fs::read_to_string(dir.path().join("sample.keep.fastq")).unwrap();
    let rejected = fs::read_to_string(dir.path().join("sample.reject.fastq")).unwrap();
    assert!(kept.contains("@clean"));
    assert!(kept.contains("@short"));
    assert!(!kept.contains("@contaminated"));
    assert!(rejected.contains("@contaminated"));
}

#[test]
fn screen_drops_junk_pairs() {
    let dir = tempfile::tempdir().unwrap();
    let reads_path = dir.path().join("pairs.fastq");
    // Interleaved pairs: the anchored pair maps to the reference, the other
    // touches nothing.
    write_fastq(
        &reads_path,
        &[
            ("anchored/1", REF40),
            ("anchored/2", REF40),
            ("drifting/1", UNRELATED),
            ("drifting/2", UNRELATED),
        ],
    );

    let config = FilterConfig {
        k: 20,
        kbig: 20,
        bits: 8,
        hashes: 2,
        min_streak: 1,
        rcomp: true,
    };
    let filter = Arc::new(build_filter(config, 1 << 20, &[REF40, REF40]));

    // Threshold above the 8-bit ceiling disables the contamination screen;
    // only the junk heuristic decides.
    let summary = engine::screen(
        &filter,
        ScreenConfig {
            reads: reads_path,
            out_dir: dir.path().to_path_buf(),
            sample_name: "pairs".into(),
            threads: 1,
            threshold: 300,
            interleaved: true,
            junk_range: Some(2),
            quality: None,
            write_rejected: false,
        },
    )
    .unwrap();

    assert_eq!(summary.reads, 4);
    assert_eq!(summary.kept, 2);
    assert_eq!(summary.junk, 2);
    let kept = fs::read_to_string(dir.path().join("pairs.keep.fastq")).unwrap();
    assert!(kept.contains("@anchored/1"));
    assert!(kept.contains("@anchored/2"));
    assert!(!kept.contains("@drifting/1"));
    assert!(!fs::exists(dir.path().join("pairs.reject.fastq")).unwrap());
}

#[test]
fn annotate_emits_one_row_per_read() {
    let dir = tempfile::tempdir().unwrap();
    let reads_path = dir.path().join("reads.fastq");
    write_fastq(&reads_path, &[("a", REF40), ("b", UNRELATED)]);

    let config = FilterConfig {
        k: 15,
        kbig: 17,
        bits: 8,
        hashes: 2,
        min_streak: 1,
        rcomp: true,
    };
    let filter = Arc::new(build_filter(config, 1 << 20, &[REF40]));

    let out = dir.path().join("annot.tsv");
    let rows = engine::annotate(
        &filter,
        AnnotateConfig {
            reads: reads_path,
            out: out.clone(),
            threads: 2,
            threshold: 1,
            big: true,
        },
    )
    .unwrap();
    assert_eq!(rows, 2);

    let text = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("read\tlength"));
    let a: Vec<&str> = lines[1].split('\t').collect();
    assert_eq!(a[0], "a");
    assert_eq!(a[1], "40");
    // Every big window of the reference read is populated.
    assert_eq!(a[2], (REF40.len() - 17 + 1).to_string());
    let b: Vec<&str> = lines[2].split('\t').collect();
    assert_eq!(b[0], "b");
    assert_eq!(b[3], "0.000"); // unrelated read has mean count 0
}

#[test]
fn threaded_build_reproduces_inline_population() {
    let dir = tempfile::tempdir().unwrap();
    let ref_path = dir.path().join("genome.fa");
    write_fasta(&ref_path, &[REF40, UNRELATED]);

    let config = FilterConfig {
        k: 12,
        kbig: 12,
        bits: 16,
        hashes: 2,
        min_streak: 1,
        rcomp: true,
    };
    let store = Arc::new(AtomicCountStore::with_budget(1 << 20, 16, 2).unwrap());
    let stats =
        populate::populate_paths(&store, config.k, config.rcomp, &[ref_path], 4).unwrap();
    assert_eq!(stats.records, 2);
    assert_eq!(stats.bases, 80);

    let threaded = Arc::try_unwrap(store).ok().unwrap();
    let inline = build_filter(config, 1 << 20, &[REF40, UNRELATED]);
    for key in KmerWindows::new(REF40, 12, true)
        .chain(KmerWindows::new(UNRELATED, 12, true))
        .flatten()
    {
        assert_eq!(threaded.read(key), inline.store().read(key));
    }
}
