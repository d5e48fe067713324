// src/graph/complex.rs
//! Branching ("complex") node discovery.
//!
//! Every k-mer of the deduplicated stream yields two (k-1)-mer candidates.
//! A candidate with more than one present extension on either side is a
//! branching node and is written to the complex node file. The scan runs as
//! one reader thread, `ctx.workers` evaluators and the calling thread as the
//! only writer.

use crate::error::Result;
use crate::graph::context::GraphBuildContext;
use crate::graph::node::{mirror_slots, DbgNode};
use crate::io::records::{ComplexNodeReader, ComplexNodeRecord, KmerRecordReader};
use crate::kmer::kmer::Kmer;
use crossbeam::channel::bounded;
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::{debug, info};

const BATCH_SIZE: usize = 4096;

enum ScanMsg {
    Records(Vec<ComplexNodeRecord>),
    WorkerDone,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ComplexScanStats {
    pub kmers: u64,
    pub candidates: u64,
    pub records: u64,
}

/// Evaluates one (k-1)-mer candidate and returns its canonical record if it
/// branches.
pub fn complex_record(ctx: &GraphBuildContext, candidate: &Kmer) -> Option<ComplexNodeRecord> {
    let adjacency = ctx.adjacency(candidate);
    if !adjacency.is_complex() {
        return None;
    }
    let (incoming, outgoing) = adjacency.provisional_slots();
    let (seq, flipped) = candidate.canonical();
    let (incoming, outgoing) = if flipped {
        mirror_slots(&incoming, &outgoing)
    } else {
        (incoming, outgoing)
    };
    Some(ComplexNodeRecord {
        seq,
        incoming,
        outgoing,
    })
}

/// Scans a unique k-mer stream and writes every branching node candidate.
///
/// Records are not deduplicated here; [`load_complex_nodes`] collapses
/// repeats.
///
/// # Arguments
/// * `input` - Packed k-mer records of length `ctx.kmer_len`
/// * `output` - Destination for complex node records
pub fn find_complex_nodes<R, W>(ctx: &GraphBuildContext, input: R, output: &mut W) -> Result<ComplexScanStats>
where
    R: Read + Send,
    W: Write,
{
    let workers = ctx.workers;
    let mut stats = ComplexScanStats::default();

    // Channels live inside the scope so an early return drops the receiving
    // ends and unblocks every sender before the scope joins.
    std::thread::scope(|scope| -> Result<()> {
        let (batch_tx, batch_rx) = bounded::<Vec<Kmer>>(workers * 2);
        let (msg_tx, msg_rx) = bounded::<ScanMsg>(workers * 4);

        let reader = scope.spawn(move || -> Result<u64> {
            let mut kmers = 0u64;
            let mut batch = Vec::with_capacity(BATCH_SIZE);
            for kmer in KmerRecordReader::new(input, ctx.kmer_len, "unique k-mer stream") {
                batch.push(kmer?);
                kmers += 1;
                if batch.len() == BATCH_SIZE {
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE));
                    if batch_tx.send(full).is_err() {
                        break;
                    }
                }
            }
            if !batch.is_empty() {
                let _ = batch_tx.send(batch);
            }
            Ok(kmers)
        });

        for _ in 0..workers {
            let batch_rx = batch_rx.clone();
            let msg_tx = msg_tx.clone();
            scope.spawn(move || {
                for batch in batch_rx.iter() {
                    let records: Vec<ComplexNodeRecord> = batch
                        .iter()
                        .flat_map(|kmer| [kmer.drop_last(), kmer.drop_first()])
                        .filter_map(|candidate| complex_record(ctx, &candidate))
                        .collect();
                    if msg_tx.send(ScanMsg::Records(records)).is_err() {
                        return;
                    }
                }
                let _ = msg_tx.send(ScanMsg::WorkerDone);
            });
        }
        drop(batch_rx);
        drop(msg_tx);

        let mut finished = 0;
        while finished < workers {
            match msg_rx.recv() {
                Ok(ScanMsg::Records(records)) => {
                    for record in &records {
                        record.write(output)?;
                    }
                    stats.records += records.len() as u64;
                }
                Ok(ScanMsg::WorkerDone) => finished += 1,
                Err(_) => break,
            }
        }

        stats.kmers = match reader.join() {
            Ok(result) => result?,
            Err(panic) => std::panic::resume_unwind(panic),
        };
        Ok(())
    })?;

    output.flush()?;
    stats.candidates = stats.kmers * 2;
    info!(
        "Complex node scan: {} k-mers, {} candidates, {} branching records",
        stats.kmers, stats.candidates, stats.records
    );
    Ok(stats)
}

/// Loads complex node records into the index, collapsing duplicates.
///
/// Returns the number of distinct nodes registered.
pub fn load_complex_nodes<R: Read>(ctx: &GraphBuildContext, input: R, source: impl Into<PathBuf>) -> Result<usize> {
    let mut table = ctx.index.write();
    let mut loaded = 0usize;
    let mut duplicates = 0u64;
    for record in ComplexNodeReader::new(input, ctx.kmer_len - 1, source) {
        let record = record?;
        if table.id_of(&record.seq).is_some() {
            duplicates += 1;
            continue;
        }
        table.insert(DbgNode::new(record.seq, record.incoming, record.outgoing))?;
        loaded += 1;
    }
    debug!("Collapsed {} duplicate complex node records", duplicates);
    info!("Loaded {} complex nodes", loaded);
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::records::write_kmer_record;
    use crate::kmer::cuckoo::CuckooFilter;
    use crate::pipeline::count::insert_read;
    use std::io::Cursor;
    use std::sync::Arc;

    const READS: [&str; 2] = ["CTCGGGGTTTCTGTTGAATAAAGT", "CTCGGGGTTTCTGTGGCATTGT"];

    fn fork_context(workers: usize) -> (GraphBuildContext, Vec<u8>) {
        let filter = CuckooFilter::new(1024, 5);
        let mut stream = Vec::new();
        for _ in 0..2 {
            for read in READS {
                let (_, fresh) = insert_read(&filter, read.as_bytes()).unwrap();
                for kmer in &fresh {
                    write_kmer_record(&mut stream, kmer).unwrap();
                }
            }
        }
        (GraphBuildContext::new(Arc::new(filter), 2, workers), stream)
    }

    #[test]
    fn test_branching_candidate_is_stored_canonically() {
        let (ctx, _) = fork_context(1);
        // CTGT is preceded by T and followed by T or G. Stored as ACAG, the
        // two followers become incoming A and C and the T becomes outgoing A.
        let record = complex_record(&ctx, &Kmer::from_ascii(b"CTGT").unwrap()).unwrap();
        assert_eq!(record.seq.to_string(), "ACAG");
        assert_eq!(record.incoming, [1, 1, 0, 0]);
        assert_eq!(record.outgoing, [1, 0, 0, 0]);

        assert!(complex_record(&ctx, &Kmer::from_ascii(b"GGTT").unwrap()).is_none());
    }

    #[test]
    fn test_scan_then_load_collapses_repeats() {
        let (ctx, stream) = fork_context(3);
        // The same stream twice doubles the records but not the nodes.
        let doubled = [stream.clone(), stream].concat();
        let mut out = Vec::new();
        let stats = find_complex_nodes(&ctx, Cursor::new(doubled), &mut out).unwrap();
        assert_eq!(stats.kmers, 56);
        assert_eq!(stats.candidates, 112);
        assert!(stats.records >= 2);

        assert_eq!(load_complex_nodes(&ctx, Cursor::new(out), "mem").unwrap(), 1);
        let node = ctx.index.snapshot(2).unwrap();
        assert_eq!(node.seq.to_string(), "ACAG");
        assert_eq!(node.degree(), 0);
        assert_eq!(node.outgoing, [1, 0, 0, 0]);
    }

    #[test]
    fn test_empty_stream() {
        let (ctx, _) = fork_context(2);
        let mut out = Vec::new();
        let stats = find_complex_nodes(&ctx, Cursor::new(Vec::new()), &mut out).unwrap();
        assert_eq!(stats.records, 0);
        assert!(out.is_empty());
    }
}
