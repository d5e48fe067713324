// src/graph/classify.rs
//! Edge classification and node/edge cross-reference checks.

use crate::error::{Error, Result};
use crate::graph::edge::{edge_flag, End};
use crate::graph::node::{Direction, EdgeId, PROVISIONAL};
use crate::graph::DbgGraph;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ClassCounts {
    pub unique: usize,
    pub semi_unique: usize,
    pub two_edge_cycles: usize,
    pub self_cycles: usize,
}

/// Edges that continue the path through the node at one end of `edge_id`.
///
/// These sit on the opposite side of the node from the slot the edge
/// occupies. An open end has no alternatives.
pub fn alternatives(graph: &DbgGraph, edge_id: EdgeId, end: End) -> Result<Vec<EdgeId>> {
    let edge = graph.edge(edge_id)?;
    let nid = edge.node_at(end);
    if nid <= PROVISIONAL {
        return Ok(Vec::new());
    }
    let node = graph.node(nid)?;
    let slot = node.find_slot(edge_id).ok_or_else(|| {
        Error::Inconsistent(format!("edge {} is not listed on its node {}", edge_id, nid))
    })?;
    Ok(node.edge_ids(slot.direction.flip()).collect())
}

/// Labels every live edge as unique, semi-unique or part of a two-edge
/// cycle. Previous labels are cleared first, so repeated calls agree.
pub fn classify_edges(graph: &mut DbgGraph) -> Result<ClassCounts> {
    let mut counts = ClassCounts::default();
    for eid in graph.live_edge_ids() {
        graph.edges[eid as usize].clear_flag(edge_flag::CLASSIFICATION);
        if graph.edges[eid as usize].is_self_cycle() {
            counts.self_cycles += 1;
            continue;
        }

        let at_start = alternatives(graph, eid, End::Start)?;
        let at_end = alternatives(graph, eid, End::End)?;

        let shared = at_start.iter().any(|id| at_end.contains(id));
        let label = if (at_start.len() == 1 && at_end.len() == 1 && at_start[0] == at_end[0])
            || (at_start.len() > 1 && at_end.len() > 1 && shared)
        {
            counts.two_edge_cycles += 1;
            edge_flag::TWO_EDGE_CYCLE
        } else if at_start.len() <= 1 && at_end.len() <= 1 {
            counts.unique += 1;
            edge_flag::UNIQUE
        } else if at_start.len() <= 1 || at_end.len() <= 1 {
            counts.semi_unique += 1;
            edge_flag::SEMI_UNIQUE
        } else {
            0
        };
        graph.edges[eid as usize].set_flag(label);
    }
    debug!(
        "Classified edges: {} unique, {} semi-unique, {} two-edge cycles, {} self cycles",
        counts.unique, counts.semi_unique, counts.two_edge_cycles, counts.self_cycles
    );
    Ok(counts)
}

/// Verifies that every live edge sits in the slots its sequence implies on
/// both endpoints, and that every slot of a live node names a live edge
/// ending there.
pub fn check_consistency(graph: &DbgGraph) -> Result<()> {
    graph.check_bounds()?;
    let k = graph.kmer_len;
    for eid in graph.live_edge_ids() {
        let edge = &graph.edges[eid as usize];
        for end in [End::Start, End::End] {
            let nid = edge.node_at(end);
            if nid <= PROVISIONAL {
                continue;
            }
            let node = graph.node(nid).map_err(|_| {
                Error::Inconsistent(format!("edge {} points at dead node {}", eid, nid))
            })?;
            let slot = edge.endpoint_slot(end, &node.seq, k).ok_or_else(|| {
                Error::Inconsistent(format!(
                    "edge {} {:?} sequence does not match node {} ({})",
                    eid, end, nid, node.seq
                ))
            })?;
            if node.slot(slot) != eid {
                return Err(Error::Inconsistent(format!(
                    "node {} {:?} slot {} holds {} instead of edge {}",
                    nid,
                    slot.direction,
                    slot.base,
                    node.slot(slot),
                    eid
                )));
            }
        }
    }

    for nid in graph.live_node_ids() {
        let node = &graph.nodes[nid as usize];
        for direction in [Direction::Incoming, Direction::Outgoing] {
            for eid in node.edge_ids(direction) {
                let edge = graph.edge(eid).map_err(|_| {
                    Error::Inconsistent(format!("node {} references dead edge {}", nid, eid))
                })?;
                if edge.start_nid != nid && edge.end_nid != nid {
                    return Err(Error::Inconsistent(format!(
                        "node {} references edge {} which joins {} and {}",
                        nid, eid, edge.start_nid, edge.end_nid
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge::DbgEdge;
    use crate::graph::node::{DbgNode, NodeId};
    use crate::kmer::kmer::{encode_bases, Kmer};

    const K: usize = 5;

    fn node(id: NodeId, seq: &str, incoming: [u32; 4], outgoing: [u32; 4]) -> DbgNode {
        let mut n = DbgNode::new(Kmer::from_ascii(seq.as_bytes()).unwrap(), incoming, outgoing);
        n.id = id;
        n
    }

    fn edge(id: EdgeId, start: NodeId, end: NodeId, seq: &str) -> DbgEdge {
        let mut e = DbgEdge::new(id, start, end, encode_bases(seq.as_bytes()).unwrap(), vec![1; seq.len()]);
        e.compute_cov_depth(K);
        e
    }

    /// AACC has two outgoing branches, through C and T. Only the C branch
    /// reaches a second node (CCAG).
    fn fork() -> DbgGraph {
        let nodes = vec![
            DbgNode::placeholder(),
            DbgNode::placeholder(),
            node(2, "AACC", [0; 4], [0, 2, 0, 3]),
            node(3, "CCAG", [0, 2, 0, 0], [0; 4]),
        ];
        let edges = vec![
            DbgEdge::placeholder(),
            DbgEdge::placeholder(),
            edge(2, 2, 3, "AACCCAG"),
            edge(3, 2, 0, "AACCTTTGA"),
        ];
        DbgGraph::new(nodes, edges, K)
    }

    #[test]
    fn test_fork_is_consistent() {
        check_consistency(&fork()).unwrap();
    }

    #[test]
    fn test_alternatives_on_far_side() {
        let graph = fork();
        // Edge 2 leaves AACC through outgoing; nothing enters AACC.
        assert!(alternatives(&graph, 2, End::Start).unwrap().is_empty());
        assert!(alternatives(&graph, 3, End::End).unwrap().is_empty());
        // Edge 2 enters CCAG, which has no outgoing edges either.
        assert!(alternatives(&graph, 2, End::End).unwrap().is_empty());
    }

    #[test]
    fn test_classification_is_idempotent() {
        let mut graph = fork();
        let first = classify_edges(&mut graph).unwrap();
        let flags: Vec<u8> = graph.edges.iter().map(|e| e.flag).collect();
        let second = classify_edges(&mut graph).unwrap();
        assert_eq!(first, second);
        assert_eq!(flags, graph.edges.iter().map(|e| e.flag).collect::<Vec<_>>());
        assert_eq!(first.unique, 2);
        assert!(graph.edges[2].has_flag(edge_flag::UNIQUE));
    }

    #[test]
    fn test_semi_unique_behind_a_fork() {
        // Add an edge entering AACC: it now sees two continuations.
        let mut graph = fork();
        graph.nodes[2].incoming[1] = 4;
        graph.edges.push(edge(4, 0, 2, "CAACC"));
        check_consistency(&graph).unwrap();

        let counts = classify_edges(&mut graph).unwrap();
        assert!(graph.edges[4].has_flag(edge_flag::SEMI_UNIQUE));
        assert!(graph.edges[2].has_flag(edge_flag::UNIQUE));
        assert_eq!(counts.semi_unique, 1);
    }

    #[test]
    fn test_missing_slot_is_inconsistent() {
        let mut graph = fork();
        graph.nodes[3].incoming[1] = 0;
        assert!(matches!(check_consistency(&graph), Err(Error::Inconsistent(_))));
    }

    #[test]
    fn test_dangling_node_reference_is_inconsistent() {
        let mut graph = fork();
        graph.edges[3].set_deleted();
        assert!(matches!(check_consistency(&graph), Err(Error::Inconsistent(_))));
    }

    /// AACC and CCAG joined both ways: AACCCAG forward, CCAGAACC back.
    fn two_node_loop() -> DbgGraph {
        let nodes = vec![
            DbgNode::placeholder(),
            DbgNode::placeholder(),
            node(2, "AACC", [0, 0, 3, 0], [0, 2, 0, 0]),
            node(3, "CCAG", [0, 2, 0, 0], [3, 0, 0, 0]),
        ];
        let edges = vec![
            DbgEdge::placeholder(),
            DbgEdge::placeholder(),
            edge(2, 2, 3, "AACCCAG"),
            edge(3, 3, 2, "CCAGAACC"),
        ];
        DbgGraph::new(nodes, edges, K)
    }

    #[test]
    fn test_reciprocal_edges_form_two_edge_cycle() {
        let mut graph = two_node_loop();
        check_consistency(&graph).unwrap();
        assert_eq!(alternatives(&graph, 2, End::Start).unwrap(), vec![3]);
        assert_eq!(alternatives(&graph, 2, End::End).unwrap(), vec![3]);

        let counts = classify_edges(&mut graph).unwrap();
        assert_eq!(counts.two_edge_cycles, 2);
        assert_eq!(counts.unique, 0);
        for eid in [2, 3] {
            assert!(graph.edges[eid].has_flag(edge_flag::TWO_EDGE_CYCLE));
            assert!(!graph.edges[eid].has_flag(edge_flag::UNIQUE));
        }
    }

    #[test]
    fn test_shared_alternative_on_busy_nodes_is_two_edge_cycle() {
        // A tip enters AACC through T and another leaves CCAG through T, so
        // the forward edge sees two alternatives at each end, one shared.
        let mut graph = two_node_loop();
        graph.nodes[2].incoming[3] = 4;
        graph.nodes[3].outgoing[3] = 5;
        graph.edges.push(edge(4, 0, 2, "TAACC"));
        graph.edges.push(edge(5, 3, 0, "CCAGTTACG"));
        check_consistency(&graph).unwrap();

        let counts = classify_edges(&mut graph).unwrap();
        assert!(graph.edges[2].has_flag(edge_flag::TWO_EDGE_CYCLE));
        assert!(graph.edges[3].has_flag(edge_flag::TWO_EDGE_CYCLE));
        assert!(graph.edges[4].has_flag(edge_flag::UNIQUE));
        assert!(graph.edges[5].has_flag(edge_flag::UNIQUE));
        assert_eq!(counts.two_edge_cycles, 2);
        assert_eq!(counts.unique, 2);
    }

    #[test]
    fn test_semi_unique_after_a_join() {
        // CCAG gains a second incoming tip and an outgoing tip: the outgoing
        // tip sees two alternatives at its start and none at its open end.
        let mut graph = fork();
        graph.nodes[3].incoming[3] = 4;
        graph.nodes[3].outgoing[3] = 5;
        graph.edges.push(edge(4, 0, 3, "TCCAG"));
        graph.edges.push(edge(5, 3, 0, "CCAGTTACG"));
        check_consistency(&graph).unwrap();

        let counts = classify_edges(&mut graph).unwrap();
        assert_eq!(alternatives(&graph, 5, End::Start).unwrap().len(), 2);
        assert!(graph.edges[5].has_flag(edge_flag::SEMI_UNIQUE));
        assert!(graph.edges[4].has_flag(edge_flag::UNIQUE));
        assert!(graph.edges[2].has_flag(edge_flag::UNIQUE));
        assert_eq!(counts.semi_unique, 1);
        assert_eq!(counts.unique, 3);
    }
}
