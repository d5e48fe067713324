// src/io/snapshot.rs
//! Node array snapshots, stat files and the JSON run summary.

use crate::error::{Error, Result};
use crate::graph::node::{DbgNode, FIRST_ID};
use crate::io::records::words_from_le;
use crate::kmer::kmer::{words_for, Kmer};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

const NODE_MAGIC: &[u8; 8] = b"CFDBGND1";

/// Writes every live node of an arena.
///
/// Layout: magic, `k` as u32, node count as u64, then per node `id` u32,
/// `flag` u8, `words_for(k-1)` u64 words, 4 incoming and 4 outgoing u32.
pub fn write_nodes(path: &Path, nodes: &[DbgNode], kmer_len: usize) -> Result<usize> {
    let mut writer = BufWriter::new(File::create(path)?);
    let live: Vec<&DbgNode> = nodes
        .iter()
        .enumerate()
        .filter(|(i, n)| *i >= FIRST_ID as usize && !n.is_deleted())
        .map(|(_, n)| n)
        .collect();

    writer.write_all(NODE_MAGIC)?;
    writer.write_all(&(kmer_len as u32).to_le_bytes())?;
    writer.write_all(&(live.len() as u64).to_le_bytes())?;
    for node in &live {
        writer.write_all(&node.id.to_le_bytes())?;
        writer.write_all(&[node.flag])?;
        for word in node.seq.words() {
            writer.write_all(&word.to_le_bytes())?;
        }
        for slot in node.incoming.iter().chain(node.outgoing.iter()) {
            writer.write_all(&slot.to_le_bytes())?;
        }
    }
    writer.flush()?;
    Ok(live.len())
}

fn read_exact_or_malformed(reader: &mut impl Read, buf: &mut [u8], path: &Path, what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            Error::malformed(path, format!("truncated while reading {}", what))
        } else {
            Error::Io(e)
        }
    })
}

fn u32_at(bytes: &[u8], i: usize) -> u32 {
    u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]])
}

/// Reads a node snapshot into an arena indexed by node ID.
pub fn read_nodes(path: &Path, kmer_len: usize) -> Result<Vec<DbgNode>> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut header = [0u8; 20];
    read_exact_or_malformed(&mut reader, &mut header, path, "header")?;
    if &header[..8] != NODE_MAGIC {
        return Err(Error::malformed(path, "not a node array file"));
    }
    let stored_k = u32_at(&header, 8) as usize;
    if stored_k != kmer_len {
        return Err(Error::malformed(
            path,
            format!("written with k={}, expected k={}", stored_k, kmer_len),
        ));
    }
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&header[12..20]);
    let count = u64::from_le_bytes(count_bytes);

    let node_len = kmer_len - 1;
    let seq_bytes = words_for(node_len) * 8;
    let mut record = vec![0u8; 5 + seq_bytes + 32];
    let mut nodes = vec![DbgNode::placeholder(), DbgNode::placeholder()];

    for i in 0..count {
        read_exact_or_malformed(&mut reader, &mut record, path, &format!("node record {}", i))?;
        let id = u32_at(&record, 0);
        if id < FIRST_ID {
            return Err(Error::malformed(path, format!("node ID {} is reserved", id)));
        }
        let seq = Kmer::from_words(words_from_le(&record[5..5 + seq_bytes]), node_len);
        let slots = &record[5 + seq_bytes..];
        let mut incoming = [0u32; 4];
        let mut outgoing = [0u32; 4];
        for b in 0..4 {
            incoming[b] = u32_at(slots, b * 4);
            outgoing[b] = u32_at(slots, 16 + b * 4);
        }

        let idx = id as usize;
        if idx >= nodes.len() {
            nodes.resize_with(idx + 1, DbgNode::placeholder);
        } else if !nodes[idx].is_deleted() {
            return Err(Error::malformed(path, format!("node ID {} appears twice", id)));
        }
        let mut node = DbgNode::new(seq, incoming, outgoing);
        node.id = id;
        node.flag = record[4];
        nodes[idx] = node;
    }

    let mut trailing = [0u8; 1];
    if reader.read(&mut trailing)? != 0 {
        return Err(Error::malformed(
            path,
            format!("data after the {} declared node records", count),
        ));
    }
    Ok(nodes)
}

/// Arena sizes recorded after construction (`DBG.stat`) or simplification
/// (`DBGInfo`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GraphSizes {
    pub nodes: usize,
    pub edges: usize,
}

const DBG_STAT_NODES: &str = "nodes size:";
const DBG_STAT_EDGES: &str = "edges size:";
const DBG_INFO_EDGES: &str = "edgesArr size:";
const DBG_INFO_NODES: &str = "nodesArr size:";

pub fn write_dbg_stat(path: &Path, sizes: GraphSizes) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{}\t{}", DBG_STAT_NODES, sizes.nodes)?;
    writeln!(writer, "{}\t{}", DBG_STAT_EDGES, sizes.edges)?;
    writer.flush()?;
    Ok(())
}

pub fn write_dbg_info(path: &Path, sizes: GraphSizes) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{}\t{}", DBG_INFO_EDGES, sizes.edges)?;
    writeln!(writer, "{}\t{}", DBG_INFO_NODES, sizes.nodes)?;
    writer.flush()?;
    Ok(())
}

fn read_sizes(path: &Path, nodes_key: &str, edges_key: &str) -> Result<GraphSizes> {
    let reader = BufReader::new(File::open(path)?);
    let mut nodes = None;
    let mut edges = None;
    for line in reader.lines() {
        let line = line?;
        let Some((key, value)) = line.split_once('\t') else {
            continue;
        };
        let parsed = || {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| Error::malformed(path, format!("invalid value {:?} for {}", value, key)))
        };
        if key == nodes_key {
            nodes = Some(parsed()?);
        } else if key == edges_key {
            edges = Some(parsed()?);
        }
    }
    match (nodes, edges) {
        (Some(nodes), Some(edges)) => Ok(GraphSizes { nodes, edges }),
        _ => Err(Error::malformed(
            path,
            format!("expected both {:?} and {:?}", nodes_key, edges_key),
        )),
    }
}

pub fn read_dbg_stat(path: &Path) -> Result<GraphSizes> {
    read_sizes(path, DBG_STAT_NODES, DBG_STAT_EDGES)
}

pub fn read_dbg_info(path: &Path) -> Result<GraphSizes> {
    read_sizes(path, DBG_INFO_NODES, DBG_INFO_EDGES)
}

/// Writes any serializable summary as pretty JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, value)?;
    Ok(())
}
