//! `cdbg`: turns a loaded filter and the unique k-mer stream into node and
//! edge arrays.

use crate::error::Result;
use crate::graph::complex::{find_complex_nodes, load_complex_nodes, ComplexScanStats};
use crate::graph::context::GraphBuildContext;
use crate::graph::extend::{grow_edges, BuildStats};
use crate::io::snapshot::{write_dbg_stat, write_json, write_nodes, GraphSizes};
use crate::kmer::cuckoo::CuckooFilter;
use crate::pipeline::{DbgConfig, StageReport};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConstructStats {
    pub complex_scan: ComplexScanStats,
    pub complex_nodes: usize,
    pub build: BuildStats,
    pub sizes: GraphSizes,
}

/// Runs complex node discovery and edge growth against a loaded filter.
///
/// Writes the complex node file, the edge file, the node snapshot and the
/// stat file under the configured prefix.
pub fn construct_dbg(config: &DbgConfig) -> Result<ConstructStats> {
    config.validate()?;
    let paths = config.paths();
    let start = Instant::now();
    let mut stats = ConstructStats::default();

    info!("Phase 1/5: Loading cuckoo filter from {}", paths.filter_hash.display());
    let filter = CuckooFilter::load(&paths.filter_info, &paths.filter_hash, Some(config.kmer_len))?;
    info!("\n{}", filter.stats());
    let ctx = GraphBuildContext::new(Arc::new(filter), config.min_count, config.workers);

    info!("Phase 2/5: Scanning unique k-mers for branching nodes");
    {
        let input = BufReader::new(File::open(&paths.unique_kmers)?);
        let mut output = BufWriter::new(File::create(&paths.complex_nodes)?);
        stats.complex_scan = find_complex_nodes(&ctx, input, &mut output)?;
    }

    info!("Phase 3/5: Loading complex nodes");
    let input = BufReader::new(File::open(&paths.complex_nodes)?);
    stats.complex_nodes = load_complex_nodes(&ctx, input, &paths.complex_nodes)?;

    info!("Phase 4/5: Growing edges");
    let edges_out = BufWriter::new(File::create(&paths.edges)?);
    stats.build = grow_edges(&ctx, edges_out)?;
    info!("\n{}", stats.build);

    info!("Phase 5/5: Writing node array and graph stats");
    let nodes = ctx.into_nodes();
    stats.sizes = GraphSizes {
        nodes: nodes.len(),
        edges: stats.build.edges_written + crate::graph::node::FIRST_ID as usize,
    };
    write_nodes(&paths.nodes, &nodes, config.kmer_len)?;
    write_dbg_stat(&paths.dbg_stat, stats.sizes)?;
    write_json(
        &paths.stats_json,
        &StageReport {
            stage: "cdbg",
            config,
            stats: &stats,
            graph: None,
        },
    )?;

    info!(
        "cdbg finished in {:.2}s: {} nodes, {} edges",
        start.elapsed().as_secs_f32(),
        stats.build.total_nodes(),
        stats.build.edges_written
    );
    Ok(stats)
}
