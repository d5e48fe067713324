//! `ccf`: builds the counting filter from reads and emits the deduplicated
//! k-mer stream.

use crate::error::Result;
use crate::io::read_sequences;
use crate::io::records::write_kmer_record;
use crate::kmer::cuckoo::CuckooFilter;
use crate::kmer::kmer::{encode_base, Kmer};
use crate::pipeline::{DbgConfig, StageReport};
use crossbeam::channel::bounded;
use rayon::prelude::*;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

const READ_BATCH: usize = 10_000;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CountStats {
    pub reads: u64,
    pub bases: u64,
    pub kmers: u64,
    pub unique_kmers: u64,
    pub filter_items: u64,
    pub load_factor: f64,
}

impl fmt::Display for CountStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== K-mer Counting ===")?;
        writeln!(f, "Reads: {} ({} bases)", self.reads, self.bases)?;
        writeln!(f, "K-mers: {} total, {} unique", self.kmers, self.unique_kmers)?;
        write!(f, "Filter load factor: {:.3}", self.load_factor)
    }
}

/// Maximal runs of ACGT in a read, as 2-bit bases.
pub fn acgt_runs(read: &[u8]) -> Vec<Vec<u8>> {
    let mut runs = Vec::new();
    let mut current = Vec::new();
    for &c in read {
        match encode_base(c) {
            Some(b) => current.push(b),
            None if !current.is_empty() => runs.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Inserts every canonical k-mer of a read. Returns the number of k-mers seen
/// and the ones observed for the first time.
pub fn insert_read(filter: &CuckooFilter, read: &[u8]) -> Result<(u64, Vec<Kmer>)> {
    let k = filter.kmer_len();
    let mut seen = 0u64;
    let mut fresh = Vec::new();
    for run in acgt_runs(read).into_iter().filter(|r| r.len() >= k) {
        let mut kmer = Kmer::from_bases(&run[..k]);
        for i in k..=run.len() {
            let canonical = kmer.canonical().0;
            if filter.insert(&canonical)? == 0 {
                fresh.push(canonical);
            }
            seen += 1;
            if i < run.len() {
                kmer = kmer.extend_forward(run[i]);
            }
        }
    }
    Ok((seen, fresh))
}

/// Counts every k-mer of the inputs into a fresh filter, writes the unique
/// k-mer stream and persists the filter.
pub fn count_kmers(config: &DbgConfig, inputs: &[PathBuf]) -> Result<CountStats> {
    config.validate()?;
    let paths = config.paths();
    let start = Instant::now();
    let filter = CuckooFilter::new(config.filter_capacity, config.kmer_len);
    info!(
        "Phase 1/2: Counting {}-mers from {} input file(s) into {} buckets ({:.2} MB)",
        config.kmer_len,
        inputs.len(),
        filter.num_buckets(),
        filter.memory_bytes() as f64 / 1e6
    );

    let mut stats = CountStats::default();
    let out = BufWriter::new(File::create(&paths.unique_kmers)?);

    std::thread::scope(|scope| -> Result<()> {
        let (tx, rx) = bounded::<Vec<Kmer>>(config.workers * 4);
        let writer = scope.spawn(move || -> Result<u64> {
            let mut out = out;
            let mut written = 0u64;
            for batch in rx.iter() {
                for kmer in &batch {
                    write_kmer_record(&mut out, kmer)?;
                }
                written += batch.len() as u64;
            }
            out.flush()?;
            Ok(written)
        });

        let mut produce = || -> Result<()> {
            for input in inputs {
                debug!("Reading {}", input.display());
                let mut batch: Vec<String> = Vec::with_capacity(READ_BATCH);
                let mut reads = read_sequences(input)?;
                loop {
                    let next = reads.next().transpose()?;
                    let done = next.is_none();
                    if let Some(read) = next {
                        stats.reads += 1;
                        stats.bases += read.len() as u64;
                        batch.push(read);
                        if batch.len() < READ_BATCH {
                            continue;
                        }
                    }
                    if !batch.is_empty() {
                        let results: Vec<(u64, Vec<Kmer>)> = batch
                            .par_iter()
                            .map(|read| insert_read(&filter, read.as_bytes()))
                            .collect::<Result<_>>()?;
                        for (seen, fresh) in results {
                            stats.kmers += seen;
                            if !fresh.is_empty() && tx.send(fresh).is_err() {
                                return Ok(());
                            }
                        }
                        batch.clear();
                    }
                    if done {
                        break;
                    }
                }
            }
            Ok(())
        };
        let produced = produce();
        drop(tx);

        let written = match writer.join() {
            Ok(result) => result?,
            Err(panic) => std::panic::resume_unwind(panic),
        };
        produced?;
        stats.unique_kmers = written;
        Ok(())
    })?;

    info!("Phase 2/2: Saving filter to {}", paths.filter_hash.display());
    filter.save(&paths.filter_info, &paths.filter_hash)?;
    let filter_stats = filter.stats();
    info!("\n{}", filter_stats);
    stats.filter_items = filter.items();
    stats.load_factor = filter_stats.load_factor;

    crate::io::snapshot::write_json(
        &paths.stats_json,
        &StageReport {
            stage: "ccf",
            config,
            stats: &stats,
            graph: None,
        },
    )?;
    info!("\n{}", stats);
    info!("ccf finished in {:.2}s", start.elapsed().as_secs_f32());
    Ok(stats)
}
