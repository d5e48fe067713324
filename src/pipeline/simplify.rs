//! `smfy`: loads a constructed graph, simplifies it in place and writes the
//! simplified arrays.

use crate::error::{Error, Result};
use crate::graph::simplify::{simplify, SimplifyConfig, SimplifyStats};
use crate::graph::edge::DbgEdge;
use crate::graph::node::DbgNode;
use crate::graph::DbgGraph;
use crate::io::edges::{read_edges, write_edges};
use crate::io::snapshot::{read_dbg_stat, read_nodes, write_dbg_info, write_json, write_nodes, GraphSizes};
use crate::pipeline::{DbgConfig, OutputPaths, StageReport};
use crate::stats::summarize;
use std::time::Instant;
use tracing::{info, warn};

/// Rejects slot IDs past the edge arena and endpoints past the node arena,
/// naming the file that holds the bad reference.
fn check_cross_bounds(nodes: &[DbgNode], edges: &[DbgEdge], paths: &OutputPaths) -> Result<()> {
    for node in nodes.iter().filter(|n| !n.is_deleted()) {
        if let Some(eid) = node
            .incoming
            .iter()
            .chain(node.outgoing.iter())
            .find(|&&eid| eid as usize >= edges.len())
        {
            return Err(Error::malformed(
                &paths.nodes,
                format!(
                    "node {} references edge {} but {} holds IDs below {}",
                    node.id,
                    eid,
                    paths.edges.display(),
                    edges.len()
                ),
            ));
        }
    }
    for edge in edges.iter().filter(|e| !e.is_deleted()) {
        if let Some(nid) = [edge.start_nid, edge.end_nid]
            .into_iter()
            .find(|&nid| nid as usize >= nodes.len())
        {
            return Err(Error::malformed(
                &paths.edges,
                format!("edge {} references node {} past the node array", edge.id, nid),
            ));
        }
    }
    Ok(())
}

pub fn simplify_dbg(config: &DbgConfig) -> Result<SimplifyStats> {
    config.validate()?;
    let paths = config.paths();
    let start = Instant::now();

    info!("Phase 1/3: Loading graph from {}", paths.edges.display());
    let sizes = read_dbg_stat(&paths.dbg_stat)?;
    let nodes = read_nodes(&paths.nodes, config.kmer_len)?;
    let edges = read_edges(&paths.edges, config.kmer_len, Some(sizes.edges))?;
    if nodes.len() > sizes.nodes {
        return Err(Error::malformed(
            &paths.nodes,
            format!("node IDs reach {} but the stat file declares {}", nodes.len(), sizes.nodes),
        ));
    }
    if edges.len() > sizes.edges {
        warn!(
            "Edge IDs reach {} but {} declares {}",
            edges.len(),
            paths.dbg_stat.display(),
            sizes.edges
        );
    }
    check_cross_bounds(&nodes, &edges, &paths)?;
    let mut graph = DbgGraph::new(nodes, edges, config.kmer_len);
    info!(
        "Loaded {} nodes and {} edges",
        graph.live_nodes(),
        graph.live_edges()
    );

    info!("Phase 2/3: Simplifying");
    let smfy = SimplifyConfig {
        max_tip_len: config.effective_tip_len(),
        ..Default::default()
    };
    let stats = simplify(&mut graph, &smfy)?;
    info!("\n{}", stats);

    info!("Phase 3/3: Writing simplified graph");
    write_edges(&paths.smfy_edges, &graph.edges)?;
    write_nodes(&paths.smfy_nodes, &graph.nodes, config.kmer_len)?;
    write_dbg_info(
        &paths.smfy_info,
        GraphSizes {
            nodes: graph.nodes.len(),
            edges: graph.edges.len(),
        },
    )?;
    write_json(
        &paths.stats_json,
        &StageReport {
            stage: "smfy",
            config,
            stats: &stats,
            graph: Some(summarize(&graph)),
        },
    )?;

    info!("smfy finished in {:.2}s", start.elapsed().as_secs_f32());
    Ok(stats)
}
