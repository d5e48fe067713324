//! De Bruijn graph construction and simplification

pub mod node;
pub mod edge;
pub mod context;
pub mod complex;
pub mod extend;
pub mod simplify;
pub mod classify;

use crate::error::{Error, Result};
use edge::DbgEdge;
use node::{DbgNode, Direction, EdgeId, NodeId, FIRST_ID};

/// Node and edge arenas of a finished graph, indexed by ID.
///
/// Indices 0 and 1 of both arenas are deleted placeholders. Deletion is
/// logical; arenas are never compacted.
#[derive(Debug, Clone)]
pub struct DbgGraph {
    pub nodes: Vec<DbgNode>,
    pub edges: Vec<DbgEdge>,
    pub kmer_len: usize,
}

impl DbgGraph {
    pub fn new(nodes: Vec<DbgNode>, edges: Vec<DbgEdge>, kmer_len: usize) -> Self {
        Self {
            nodes,
            edges,
            kmer_len,
        }
    }

    pub fn node(&self, id: NodeId) -> Result<&DbgNode> {
        self.nodes
            .get(id as usize)
            .filter(|n| id >= FIRST_ID && !n.is_deleted())
            .ok_or_else(|| Error::Inconsistent(format!("node {} is missing or deleted", id)))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut DbgNode> {
        self.nodes
            .get_mut(id as usize)
            .filter(|n| id >= FIRST_ID && !n.is_deleted())
            .ok_or_else(|| Error::Inconsistent(format!("node {} is missing or deleted", id)))
    }

    pub fn edge(&self, id: EdgeId) -> Result<&DbgEdge> {
        self.edges
            .get(id as usize)
            .filter(|e| id >= FIRST_ID && !e.is_deleted())
            .ok_or_else(|| Error::Inconsistent(format!("edge {} is missing or deleted", id)))
    }

    pub fn edge_mut(&mut self, id: EdgeId) -> Result<&mut DbgEdge> {
        self.edges
            .get_mut(id as usize)
            .filter(|e| id >= FIRST_ID && !e.is_deleted())
            .ok_or_else(|| Error::Inconsistent(format!("edge {} is missing or deleted", id)))
    }

    pub fn live_node_ids(&self) -> Vec<NodeId> {
        (FIRST_ID..self.nodes.len() as NodeId)
            .filter(|&id| !self.nodes[id as usize].is_deleted())
            .collect()
    }

    pub fn live_edge_ids(&self) -> Vec<EdgeId> {
        (FIRST_ID..self.edges.len() as EdgeId)
            .filter(|&id| !self.edges[id as usize].is_deleted())
            .collect()
    }

    pub fn live_nodes(&self) -> usize {
        self.nodes.iter().skip(FIRST_ID as usize).filter(|n| !n.is_deleted()).count()
    }

    pub fn live_edges(&self) -> usize {
        self.edges.iter().skip(FIRST_ID as usize).filter(|e| !e.is_deleted()).count()
    }

    /// True if an edge leaves and re-enters node `v`. A hairpin that returns
    /// on the opposite strand occupies a single slot, so the slot scan alone
    /// misses it.
    pub fn has_self_cycle(&self, v: NodeId) -> Result<bool> {
        let node = self.node(v)?;
        if node.contains_self_cycle() {
            return Ok(true);
        }
        for eid in node.edge_ids(Direction::Incoming).chain(node.edge_ids(Direction::Outgoing)) {
            let edge = self.edge(eid)?;
            if edge.start_nid == v && edge.end_nid == v {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Checks that every slot and endpoint ID fits its arena and that every
    /// live edge spans at least one k-mer.
    pub fn check_bounds(&self) -> Result<()> {
        for nid in self.live_node_ids() {
            let node = &self.nodes[nid as usize];
            for eid in node.incoming.iter().chain(node.outgoing.iter()) {
                if *eid as usize >= self.edges.len() {
                    return Err(Error::Inconsistent(format!(
                        "node {} references edge {} beyond the {} edge entries",
                        nid,
                        eid,
                        self.edges.len()
                    )));
                }
            }
        }
        for eid in self.live_edge_ids() {
            let edge = &self.edges[eid as usize];
            if edge.len() < self.kmer_len || edge.qual.len() != edge.len() {
                return Err(Error::Inconsistent(format!(
                    "edge {} has {} bases and {} quality values for k={}",
                    eid,
                    edge.len(),
                    edge.qual.len(),
                    self.kmer_len
                )));
            }
            for nid in [edge.start_nid, edge.end_nid] {
                if nid as usize >= self.nodes.len() {
                    return Err(Error::Inconsistent(format!(
                        "edge {} references node {} beyond the {} node entries",
                        eid,
                        nid,
                        self.nodes.len()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Logically deletes an edge and detaches it from every endpoint slot
    /// still pointing at it.
    pub fn delete_edge(&mut self, id: EdgeId) {
        let Some(edge) = self.edges.get_mut(id as usize) else {
            return;
        };
        edge.set_deleted();
        let ends = [edge.start_nid, edge.end_nid];
        for nid in ends {
            if let Some(node) = self.nodes.get_mut(nid as usize).filter(|_| nid >= FIRST_ID) {
                node.clear_edge(id);
            }
        }
    }
}
