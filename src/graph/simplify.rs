// src/graph/simplify.rs
//! Graph simplification: tip clipping, path merging and self-cycle
//! normalization, followed by classification and a consistency check.
//!
//! Runs single-threaded over the node and edge arenas. Passes run in a fixed
//! order: clipping and merging alternate until a round changes nothing, then
//! self cycles are normalized, edges classified and cross references checked.

use crate::error::{Error, Result};
use crate::graph::classify::{check_consistency, classify_edges};
use crate::graph::edge::{concat_unitigs, edge_flag, reverse_complement_unitig, End};
use crate::graph::node::{Direction, EdgeId, NodeId, FIRST_ID, PROVISIONAL, UNSET};
use crate::graph::DbgGraph;
use std::fmt;
use tracing::{debug, info};

#[derive(Clone, Debug)]
pub struct SimplifyConfig {
    /// Edges with an open end shorter than this are clipped.
    pub max_tip_len: usize,
    /// Safety bound on clip/merge rounds.
    pub max_rounds: usize,
}

impl Default for SimplifyConfig {
    fn default() -> Self {
        Self {
            max_tip_len: 550,
            max_rounds: 64,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SimplifyStats {
    pub rounds: usize,
    pub provisional_cleared: usize,
    pub tips_removed: usize,
    pub long_tips: usize,
    pub nodes_deleted: usize,
    pub merges: usize,
    pub self_cycles: usize,
    pub unique: usize,
    pub semi_unique: usize,
    pub two_edge_cycles: usize,
    pub live_nodes: usize,
    pub live_edges: usize,
}

impl fmt::Display for SimplifyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== DBG Simplification ===")?;
        writeln!(f, "Rounds: {}", self.rounds)?;
        writeln!(
            f,
            "Tips removed: {}, long tips kept: {}, nodes deleted: {}",
            self.tips_removed, self.long_tips, self.nodes_deleted
        )?;
        writeln!(f, "Path merges: {}", self.merges)?;
        writeln!(f, "Self cycles: {}", self.self_cycles)?;
        writeln!(
            f,
            "Unique: {}, semi-unique: {}, two-edge cycles: {}",
            self.unique, self.semi_unique, self.two_edge_cycles
        )?;
        write!(f, "Remaining: {} nodes, {} edges", self.live_nodes, self.live_edges)
    }
}

/// Clears slots that were reserved for edges never written.
pub fn clear_provisional_slots(graph: &mut DbgGraph) -> usize {
    graph
        .nodes
        .iter_mut()
        .skip(FIRST_ID as usize)
        .filter(|n| !n.is_deleted())
        .map(|n| n.clear_provisional())
        .sum()
}

/// One tip-clipping pass. Returns the number of changes made.
///
/// Nodes of degree 0 are deleted. A node of degree 1 releases its edge (the
/// edge end becomes open) and is deleted; the edge goes too if it is shorter
/// than `max_tip_len`. Finally every short edge left with an open end is
/// deleted and detached from its remaining node.
pub fn clip_tips(graph: &mut DbgGraph, max_tip_len: usize, stats: &mut SimplifyStats) -> Result<usize> {
    let mut changes = 0;

    for v in graph.live_node_ids() {
        if graph.has_self_cycle(v)? {
            continue;
        }
        let node = graph.node(v)?;
        match node.degree() {
            0 => {
                graph.node_mut(v)?.set_deleted();
                stats.nodes_deleted += 1;
                changes += 1;
            }
            1 => {
                let Some(eid) = node
                    .edge_ids(Direction::Incoming)
                    .chain(node.edge_ids(Direction::Outgoing))
                    .next()
                else {
                    continue;
                };
                let edge = graph.edge_mut(eid)?;
                if edge.start_nid == v {
                    edge.start_nid = UNSET;
                }
                if edge.end_nid == v {
                    edge.end_nid = UNSET;
                }
                let short = edge.len() < max_tip_len;

                let node = graph.node_mut(v)?;
                node.clear_edge(eid);
                node.set_deleted();
                stats.nodes_deleted += 1;
                changes += 1;

                if short {
                    graph.delete_edge(eid);
                    stats.tips_removed += 1;
                } else {
                    stats.long_tips += 1;
                }
            }
            _ => {}
        }
    }

    for eid in graph.live_edge_ids() {
        let edge = graph.edge(eid)?;
        let open = edge.start_nid <= PROVISIONAL || edge.end_nid <= PROVISIONAL;
        if open && edge.len() < max_tip_len {
            graph.delete_edge(eid);
            stats.tips_removed += 1;
            changes += 1;
        }
    }

    Ok(changes)
}

/// Dissolves node `v` by joining its incoming edge `e1` with its outgoing
/// edge `e2`. `e1` survives and takes over `e2`'s far endpoint.
fn merge_at(graph: &mut DbgGraph, v: NodeId, e1: EdgeId, e2: EdgeId) -> Result<()> {
    let k = graph.kmer_len;
    let second = graph.edge(e2)?.clone();
    let first = graph.edge(e1)?;

    let (seq, qual, far, far_end) = if first.end_nid == v {
        // e1 -> v -> e2, with e2 flipped if it does not leave from v.
        let (seq2, qual2, far) = if second.start_nid == v {
            (second.seq, second.qual, second.end_nid)
        } else {
            let (s, q) = reverse_complement_unitig(&second.seq, &second.qual);
            (s, q, second.start_nid)
        };
        let (seq, qual) = concat_unitigs((&first.seq, &first.qual), (&seq2, &qual2), k)?;
        (seq, qual, far, End::End)
    } else if first.start_nid == v {
        // e2 -> v -> e1, with e2 flipped if it does not arrive at v.
        let (seq2, qual2, far) = if second.end_nid == v {
            (second.seq, second.qual, second.start_nid)
        } else {
            let (s, q) = reverse_complement_unitig(&second.seq, &second.qual);
            (s, q, second.end_nid)
        };
        let (seq, qual) = concat_unitigs((&seq2, &qual2), (&first.seq, &first.qual), k)?;
        (seq, qual, far, End::Start)
    } else {
        return Err(Error::Inconsistent(format!(
            "edge {} is listed on node {} but does not end there",
            e1, v
        )));
    };

    if far >= FIRST_ID && !graph.node_mut(far)?.substitute_edge(e2, e1) {
        return Err(Error::Inconsistent(format!(
            "node {} does not reference edge {} being merged into {}",
            far, e2, e1
        )));
    }

    let merged = graph.edge_mut(e1)?;
    merged.seq = seq;
    merged.qual = qual;
    match far_end {
        End::Start => merged.start_nid = far,
        End::End => merged.end_nid = far,
    }
    merged.compute_cov_depth(k);

    graph.edges[e2 as usize].set_deleted();
    let node = &mut graph.nodes[v as usize];
    node.clear_edge(e1);
    node.clear_edge(e2);
    node.set_deleted();
    Ok(())
}

/// One merge pass over every node with exactly one incoming and one
/// outgoing edge. Returns the number of merges.
pub fn merge_paths(graph: &mut DbgGraph, stats: &mut SimplifyStats) -> Result<usize> {
    let mut merges = 0;
    for v in graph.live_node_ids() {
        // Earlier merges in this pass may have deleted the node.
        let node = &graph.nodes[v as usize];
        if node.is_deleted() || graph.has_self_cycle(v)? {
            continue;
        }
        let incoming: Vec<EdgeId> = node.edge_ids(Direction::Incoming).collect();
        let outgoing: Vec<EdgeId> = node.edge_ids(Direction::Outgoing).collect();
        if let ([e1], [e2]) = (incoming.as_slice(), outgoing.as_slice()) {
            if e1 != e2 {
                merge_at(graph, v, *e1, *e2)?;
                stats.nodes_deleted += 1;
                merges += 1;
            }
        }
    }
    stats.merges += merges;
    Ok(merges)
}

/// Orients self-cycle edges so that they leave through the node's stored
/// sequence, then checks both slots still point at the edge.
pub fn normalize_self_cycles(graph: &mut DbgGraph, stats: &mut SimplifyStats) -> Result<usize> {
    let k = graph.kmer_len;
    let mut normalized = 0;
    for eid in graph.live_edge_ids() {
        if !graph.edge(eid)?.is_self_cycle() {
            continue;
        }
        let nid = graph.edge(eid)?.start_nid;
        let node_seq = graph.node(nid)?.seq.clone();

        let edge = graph.edge_mut(eid)?;
        if edge.len() < k {
            return Err(Error::Inconsistent(format!(
                "self-cycle edge {} is shorter than k",
                eid
            )));
        }
        if edge.head_kmer(k) != node_seq {
            edge.reverse_complement_in_place();
        }
        edge.set_flag(edge_flag::SELF_CYCLE);

        let edge = graph.edge(eid)?;
        let node = graph.node(nid)?;
        for end in [End::Start, End::End] {
            let slot = edge.endpoint_slot(end, &node_seq, k).ok_or_else(|| {
                Error::Inconsistent(format!(
                    "self-cycle edge {} does not touch node {} at its {:?}",
                    eid, nid, end
                ))
            })?;
            if node.slot(slot) != eid {
                return Err(Error::Inconsistent(format!(
                    "self-cycle edge {} missing from {:?} slot {} of node {}",
                    eid, slot.direction, slot.base, nid
                )));
            }
        }
        normalized += 1;
    }
    stats.self_cycles = normalized;
    Ok(normalized)
}

/// Runs the full simplification sequence.
pub fn simplify(graph: &mut DbgGraph, config: &SimplifyConfig) -> Result<SimplifyStats> {
    graph.check_bounds()?;
    let mut stats = SimplifyStats {
        provisional_cleared: clear_provisional_slots(graph),
        ..Default::default()
    };
    debug!("Cleared {} unwritten edge slots", stats.provisional_cleared);

    while stats.rounds < config.max_rounds {
        stats.rounds += 1;
        let clipped = clip_tips(graph, config.max_tip_len, &mut stats)?;
        let merged = merge_paths(graph, &mut stats)?;
        debug!("Round {}: {} clip changes, {} merges", stats.rounds, clipped, merged);
        if clipped == 0 && merged == 0 {
            break;
        }
    }

    normalize_self_cycles(graph, &mut stats)?;
    let counts = classify_edges(graph)?;
    stats.unique = counts.unique;
    stats.semi_unique = counts.semi_unique;
    stats.two_edge_cycles = counts.two_edge_cycles;
    check_consistency(graph)?;

    stats.live_nodes = graph.live_nodes();
    stats.live_edges = graph.live_edges();
    info!(
        "Simplified graph to {} nodes and {} edges in {} rounds",
        stats.live_nodes, stats.live_edges, stats.rounds
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge::DbgEdge;
    use crate::graph::node::DbgNode;
    use crate::kmer::kmer::{encode_bases, Kmer};

    const K: usize = 5;

    fn node(id: NodeId, seq: &str, incoming: [u32; 4], outgoing: [u32; 4]) -> DbgNode {
        let mut n = DbgNode::new(Kmer::from_ascii(seq.as_bytes()).unwrap(), incoming, outgoing);
        n.id = id;
        n
    }

    fn edge(id: EdgeId, start: NodeId, end: NodeId, seq: &str) -> DbgEdge {
        let mut qual = vec![0u8; K - 1];
        qual.resize(seq.len(), 5);
        DbgEdge::new(id, start, end, encode_bases(seq.as_bytes()).unwrap(), qual)
    }

    fn arena<T>(placeholder: fn() -> T, items: Vec<T>) -> Vec<T> {
        let mut v = vec![placeholder(), placeholder()];
        v.extend(items);
        v
    }

    #[test]
    fn test_merge_through_degree_two_node() {
        // AACC -[AACCA]-> ACCA -[ACCATC]-> CATC
        let nodes = arena(
            DbgNode::placeholder,
            vec![
                node(2, "AACC", [0; 4], [2, 0, 0, 0]),
                node(3, "ACCA", [2, 0, 0, 0], [0, 0, 0, 3]),
                node(4, "CATC", [0, 3, 0, 0], [0; 4]),
            ],
        );
        let edges = arena(
            DbgEdge::placeholder,
            vec![edge(2, 2, 3, "AACCA"), edge(3, 3, 4, "ACCATC")],
        );
        let mut graph = DbgGraph::new(nodes, edges, K);
        let mut stats = SimplifyStats::default();

        assert_eq!(merge_paths(&mut graph, &mut stats).unwrap(), 1);
        let merged = graph.edge(2).unwrap();
        assert_eq!(merged.decoded(), "AACCATC");
        assert_eq!(merged.len(), 5 + 6 - (K - 1));
        assert_eq!((merged.start_nid, merged.end_nid), (2, 4));
        assert!(graph.edges[3].is_deleted());
        assert!(graph.nodes[3].is_deleted());
        assert_eq!(graph.nodes[4].incoming, [0, 2, 0, 0]);
        check_consistency(&graph).unwrap();
    }

    #[test]
    fn test_short_tip_on_branching_node_is_clipped() {
        // Two long branches leave AACC; a one-k-mer tip with an open start
        // enters through incoming G.
        let nodes = arena(
            DbgNode::placeholder,
            vec![node(2, "AACC", [0, 0, 4, 0], [0, 2, 0, 3])],
        );
        let edges = arena(
            DbgEdge::placeholder,
            vec![
                edge(2, 2, 0, "AACCCGATTACAGATTAC"),
                edge(3, 2, 0, "AACCTGATTACAGATTAC"),
                edge(4, 0, 2, "GAACC"),
            ],
        );
        let mut graph = DbgGraph::new(nodes, edges, K);
        let mut stats = SimplifyStats::default();

        clip_tips(&mut graph, 10, &mut stats).unwrap();
        assert!(graph.edges[4].is_deleted());
        assert_eq!(graph.nodes[2].incoming, [0; 4]);
        assert_eq!(graph.nodes[2].degree(), 2);
        assert_eq!(stats.tips_removed, 1);
        check_consistency(&graph).unwrap();
    }

    #[test]
    fn test_degree_one_node_releases_long_edge() {
        let nodes = arena(
            DbgNode::placeholder,
            vec![node(2, "AACC", [0; 4], [2, 0, 0, 0])],
        );
        let edges = arena(DbgEdge::placeholder, vec![edge(2, 2, 0, "AACCAGATTACAGATTAC")]);
        let mut graph = DbgGraph::new(nodes, edges, K);
        let mut stats = SimplifyStats::default();

        clip_tips(&mut graph, 10, &mut stats).unwrap();
        assert!(graph.nodes[2].is_deleted());
        let kept = graph.edge(2).unwrap();
        assert_eq!((kept.start_nid, kept.end_nid), (0, 0));
        assert_eq!(stats.long_tips, 1);
        check_consistency(&graph).unwrap();
    }

    #[test]
    fn test_self_cycle_is_flipped_to_node_orientation() {
        // Loop on AACC stored on the GGTT strand.
        let forward = "AACCGAACC";
        let reversed: String = forward
            .bytes()
            .rev()
            .map(|b| match b {
                b'A' => 'T',
                b'C' => 'G',
                b'G' => 'C',
                _ => 'A',
            })
            .collect();
        // Leaves through outgoing G (2), returns through incoming G (2).
        let nodes = arena(
            DbgNode::placeholder,
            vec![node(2, "AACC", [0, 0, 2, 0], [0, 0, 2, 0])],
        );
        let edges = arena(DbgEdge::placeholder, vec![edge(2, 2, 2, &reversed)]);
        let mut graph = DbgGraph::new(nodes, edges, K);
        let mut stats = SimplifyStats::default();

        assert_eq!(normalize_self_cycles(&mut graph, &mut stats).unwrap(), 1);
        let e = graph.edge(2).unwrap();
        assert_eq!(e.decoded(), forward);
        assert!(e.has_flag(edge_flag::SELF_CYCLE));
    }

    #[test]
    fn test_slot_past_edge_arena_is_an_error() {
        let nodes = arena(
            DbgNode::placeholder,
            vec![node(2, "AACC", [0; 4], [99, 0, 0, 0])],
        );
        let edges = arena(DbgEdge::placeholder, Vec::new());
        let mut graph = DbgGraph::new(nodes, edges, K);

        assert!(matches!(
            simplify(&mut graph, &SimplifyConfig::default()),
            Err(Error::Inconsistent(_))
        ));
        assert!(!graph.nodes[2].is_deleted());
    }

    #[test]
    fn test_edge_shorter_than_k_is_an_error() {
        let nodes = arena(
            DbgNode::placeholder,
            vec![node(2, "AACC", [0, 0, 2, 0], [0, 0, 2, 0])],
        );
        let edges = arena(DbgEdge::placeholder, vec![edge(2, 2, 2, "AAC")]);
        let mut graph = DbgGraph::new(nodes, edges, K);

        assert!(matches!(
            simplify(&mut graph, &SimplifyConfig::default()),
            Err(Error::Inconsistent(_))
        ));
    }

    #[test]
    fn test_hairpin_in_one_slot_is_left_alone() {
        // AACCGGTT returns on the GGTT strand, so both ends claim outgoing G.
        let nodes = arena(
            DbgNode::placeholder,
            vec![node(2, "AACC", [0, 0, 0, 3], [0, 0, 2, 0])],
        );
        let edges = arena(
            DbgEdge::placeholder,
            vec![edge(2, 2, 2, "AACCGGTT"), edge(3, 0, 2, "TAACC")],
        );
        let mut graph = DbgGraph::new(nodes, edges, K);
        let mut stats = SimplifyStats::default();
        assert!(!graph.nodes[2].contains_self_cycle());
        assert!(graph.has_self_cycle(2).unwrap());
        check_consistency(&graph).unwrap();

        assert_eq!(merge_paths(&mut graph, &mut stats).unwrap(), 0);
        assert!(!graph.nodes[2].is_deleted());
        assert_eq!(graph.edge(2).unwrap().decoded(), "AACCGGTT");

        graph.delete_edge(3);
        assert_eq!(clip_tips(&mut graph, 3, &mut stats).unwrap(), 0);
        let hairpin = graph.edge(2).unwrap();
        assert_eq!((hairpin.start_nid, hairpin.end_nid), (2, 2));
        check_consistency(&graph).unwrap();
    }
}
