#![allow(dead_code)]

use cfdbg::graph::complex::{find_complex_nodes, load_complex_nodes};
use cfdbg::graph::context::GraphBuildContext;
use cfdbg::graph::edge::{reverse_complement_unitig, DbgEdge};
use cfdbg::graph::extend::{grow_edges, BuildStats};
use cfdbg::graph::DbgGraph;
use cfdbg::io::edges::EdgeReader;
use cfdbg::io::records::write_kmer_record;
use cfdbg::kmer::cuckoo::CuckooFilter;
use cfdbg::kmer::kmer::{decode_bases, Kmer};
use cfdbg::pipeline::count::insert_read;
use std::io::Cursor;
use std::sync::Arc;

pub const K: usize = 5;

// A shared 14-base trunk that forks into two branches after CTGT. CTGT is
// stored as its reverse complement ACAG.
pub const FORK_A: &str = "CTCGGGGTTTCTGTTGAATAAAGT";
pub const FORK_B: &str = "CTCGGGGTTTCTGTGGCATTGT";

// Two reads sharing the middle AATAATCCGT: AATA joins two incoming edges
// and CCGT (stored as ACGG) splits into two outgoing ones.
pub const BUBBLE_A: &str = "CGAGGCGACAATAATCCGTAGCACTAAG";
pub const BUBBLE_B: &str = "GGTTCGTGAATAATCCGTCAAATGCG";

/// Builds a filter holding every read twice and returns it with the
/// deduplicated k-mer stream.
pub fn load_reads(reads: &[&str]) -> (CuckooFilter, Vec<u8>) {
    let filter = CuckooFilter::new(1024, K);
    let mut stream = Vec::new();
    for _ in 0..2 {
        for read in reads {
            let (_, fresh) = insert_read(&filter, read.as_bytes()).unwrap();
            for kmer in &fresh {
                write_kmer_record(&mut stream, kmer).unwrap();
            }
        }
    }
    (filter, stream)
}

pub fn canonical_kmer(seq: &str) -> Kmer {
    Kmer::from_ascii(seq.as_bytes()).unwrap().canonical().0
}

pub fn canonical_of(seq: &str) -> String {
    canonical_kmer(seq).to_string()
}

/// The lexicographically smaller of an edge's two strands.
pub fn canonical_string(edge: &DbgEdge) -> String {
    let (rc, _) = reverse_complement_unitig(&edge.seq, &edge.qual);
    edge.decoded().min(decode_bases(&rc))
}

pub fn read_back(buf: &[u8]) -> Vec<DbgEdge> {
    EdgeReader::new(Cursor::new(buf), "edges")
        .collect::<Result<_, _>>()
        .unwrap()
}

/// Places edges at their IDs behind the two reserved entries.
pub fn arena(edges: Vec<DbgEdge>) -> Vec<DbgEdge> {
    let mut arena = vec![DbgEdge::placeholder(), DbgEdge::placeholder()];
    for mut edge in edges {
        let id = edge.id as usize;
        if id >= arena.len() {
            arena.resize_with(id + 1, DbgEdge::placeholder);
        }
        edge.compute_cov_depth(K);
        arena[id] = edge;
    }
    arena
}

/// Scans the stream for complex nodes and registers them.
pub fn seeded_context(filter: CuckooFilter, stream: Vec<u8>, workers: usize) -> GraphBuildContext {
    let ctx = GraphBuildContext::new(Arc::new(filter), 2, workers);
    let mut complex = Vec::new();
    find_complex_nodes(&ctx, Cursor::new(stream), &mut complex).unwrap();
    load_complex_nodes(&ctx, Cursor::new(complex), "complex").unwrap();
    ctx
}

/// Grows every edge and assembles the in-memory graph.
pub fn grow_graph(ctx: GraphBuildContext) -> (DbgGraph, BuildStats) {
    let mut out = Vec::new();
    let stats = grow_edges(&ctx, &mut out).unwrap();
    let edges = read_back(&out);
    (DbgGraph::new(ctx.into_nodes(), arena(edges), K), stats)
}

/// Full construction from reads: count, find complex nodes, grow edges.
pub fn build_graph(reads: &[&str]) -> (DbgGraph, BuildStats) {
    let (filter, stream) = load_reads(reads);
    grow_graph(seeded_context(filter, stream, 2))
}
