// src/graph/context.rs
//! Shared state for graph construction.
//!
//! `GraphBuildContext` bundles the read-only filter, the run parameters and
//! the `NodeIndex`, and is handed by reference to every construction worker.
//! The index is the only locked structure: workers take the read lock to look
//! at node slots while the single writer takes the write lock to register
//! nodes and claim slots.

use crate::error::{Error, Result};
use crate::graph::node::{DbgNode, NodeId, FIRST_ID, PROVISIONAL, UNSET};
use crate::kmer::cuckoo::CuckooFilter;
use crate::kmer::kmer::Kmer;
use ahash::AHashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Extension counts around a (k-1)-mer, in the orientation it was queried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Adjacency {
    pub in_counts: [u8; 4],
    pub out_counts: [u8; 4],
    pub incoming: [bool; 4],
    pub outgoing: [bool; 4],
}

impl Adjacency {
    pub fn new(in_counts: [u8; 4], out_counts: [u8; 4], min_count: u8) -> Self {
        Self {
            in_counts,
            out_counts,
            incoming: in_counts.map(|c| c >= min_count),
            outgoing: out_counts.map(|c| c >= min_count),
        }
    }

    pub fn in_degree(&self) -> usize {
        self.incoming.iter().filter(|&&p| p).count()
    }

    pub fn out_degree(&self) -> usize {
        self.outgoing.iter().filter(|&&p| p).count()
    }

    /// More than one way in or more than one way out.
    pub fn is_complex(&self) -> bool {
        self.in_degree() > 1 || self.out_degree() > 1
    }

    /// The only present outgoing base, if there is exactly one.
    pub fn sole_outgoing(&self) -> Option<u8> {
        if self.out_degree() == 1 {
            self.outgoing.iter().position(|&p| p).map(|b| b as u8)
        } else {
            None
        }
    }

    /// Presence vectors as node slot values.
    pub fn provisional_slots(&self) -> ([u32; 4], [u32; 4]) {
        let to_slot = |p: bool| if p { PROVISIONAL } else { UNSET };
        (self.incoming.map(to_slot), self.outgoing.map(to_slot))
    }
}

/// Arena of nodes plus the canonical-sequence lookup into it.
pub struct NodeTable {
    nodes: Vec<DbgNode>,
    ids: AHashMap<Kmer, NodeId>,
}

impl NodeTable {
    fn new() -> Self {
        Self {
            nodes: vec![DbgNode::placeholder(), DbgNode::placeholder()],
            ids: AHashMap::new(),
        }
    }

    /// Adds a node under the next ID; its sequence must be canonical and new.
    pub fn insert(&mut self, mut node: DbgNode) -> Result<NodeId> {
        if self.ids.contains_key(&node.seq) {
            return Err(Error::Inconsistent(format!(
                "node {} registered twice",
                node.seq
            )));
        }
        let id = self.nodes.len() as NodeId;
        node.id = id;
        self.ids.insert(node.seq.clone(), id);
        self.nodes.push(node);
        Ok(id)
    }

    pub fn id_of(&self, key: &Kmer) -> Option<NodeId> {
        self.ids.get(key).copied()
    }

    pub fn get(&self, id: NodeId) -> Option<&DbgNode> {
        self.nodes.get(id as usize).filter(|_| id >= FIRST_ID)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut DbgNode> {
        self.nodes.get_mut(id as usize).filter(|_| id >= FIRST_ID)
    }

    /// Number of real nodes.
    pub fn len(&self) -> usize {
        self.nodes.len() - FIRST_ID as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upper bound (exclusive) on node IDs.
    pub fn id_limit(&self) -> NodeId {
        self.nodes.len() as NodeId
    }
}

/// Canonical (k-1)-mer → node map guarded by one reader/writer lock.
pub struct NodeIndex {
    table: RwLock<NodeTable>,
}

impl Default for NodeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeIndex {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(NodeTable::new()),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, NodeTable> {
        self.table.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, NodeTable> {
        self.table.write()
    }

    pub fn register(&self, node: DbgNode) -> Result<NodeId> {
        self.table.write().insert(node)
    }

    pub fn id_of(&self, key: &Kmer) -> Option<NodeId> {
        self.table.read().id_of(key)
    }

    /// Copy of a node taken under the read lock.
    pub fn snapshot(&self, id: NodeId) -> Option<DbgNode> {
        self.table.read().get(id).cloned()
    }

    /// Runs `f` on a node under the write lock. Returns `None` for unknown IDs.
    pub fn with_node_mut<T>(&self, id: NodeId, f: impl FnOnce(&mut DbgNode) -> T) -> Option<T> {
        self.table.write().get_mut(id).map(f)
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The node arena, indexed by ID (indices 0 and 1 are placeholders).
    pub fn into_nodes(self) -> Vec<DbgNode> {
        self.table.into_inner().nodes
    }
}

/// Everything a construction worker needs.
pub struct GraphBuildContext {
    pub filter: Arc<CuckooFilter>,
    pub kmer_len: usize,
    pub min_count: u8,
    pub workers: usize,
    pub index: NodeIndex,
}

impl GraphBuildContext {
    pub fn new(filter: Arc<CuckooFilter>, min_count: u8, workers: usize) -> Self {
        let kmer_len = filter.kmer_len();
        Self {
            filter,
            kmer_len,
            min_count,
            workers: workers.max(1),
            index: NodeIndex::new(),
        }
    }

    /// Filter count of a k-mer in either orientation.
    #[inline]
    pub fn kmer_count(&self, kmer: &Kmer) -> u8 {
        self.filter.get_count_allow_zero(&kmer.canonical().0)
    }

    /// Counts of the four preceding and four following k-mers of a (k-1)-mer.
    pub fn adjacency(&self, node_seq: &Kmer) -> Adjacency {
        let mut in_counts = [0u8; 4];
        let mut out_counts = [0u8; 4];
        for base in 0..4u8 {
            in_counts[base as usize] = self.kmer_count(&node_seq.push_front(base));
            out_counts[base as usize] = self.kmer_count(&node_seq.push_back(base));
        }
        Adjacency::new(in_counts, out_counts, self.min_count)
    }

    /// A fresh node for a canonical (k-1)-mer, with a provisional slot for
    /// every present extension.
    pub fn discover_node(&self, canonical_seq: Kmer) -> DbgNode {
        let (incoming, outgoing) = self.adjacency(&canonical_seq).provisional_slots();
        DbgNode::new(canonical_seq, incoming, outgoing)
    }

    /// Consumes the context and returns the node arena.
    pub fn into_nodes(self) -> Vec<DbgNode> {
        self.index.into_nodes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjacency_degrees() {
        let adj = Adjacency::new([0, 5, 0, 3], [4, 0, 0, 0], 3);
        assert_eq!(adj.in_degree(), 2);
        assert!(adj.is_complex());
        assert_eq!(adj.sole_outgoing(), Some(0));
        assert_eq!(adj.provisional_slots(), ([0, 1, 0, 1], [1, 0, 0, 0]));

        let below = Adjacency::new([2, 0, 0, 0], [0, 0, 2, 0], 3);
        assert_eq!(below.in_degree(), 0);
        assert_eq!(below.sole_outgoing(), None);
    }

    #[test]
    fn test_index_assigns_ids_from_two() {
        let index = NodeIndex::new();
        let a = Kmer::from_ascii(b"AACG").unwrap();
        let b = Kmer::from_ascii(b"ACCA").unwrap();
        assert_eq!(index.register(DbgNode::new(a.clone(), [0; 4], [0; 4])).unwrap(), 2);
        assert_eq!(index.register(DbgNode::new(b, [0; 4], [0; 4])).unwrap(), 3);
        assert_eq!(index.id_of(&a), Some(2));
        assert_eq!(index.snapshot(2).unwrap().seq, a);
        assert!(index.snapshot(1).is_none());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_duplicate_registration_is_fatal() {
        let index = NodeIndex::new();
        let a = Kmer::from_ascii(b"AACG").unwrap();
        index.register(DbgNode::new(a.clone(), [0; 4], [0; 4])).unwrap();
        assert!(matches!(
            index.register(DbgNode::new(a, [0; 4], [0; 4])),
            Err(Error::Inconsistent(_))
        ));
    }

    #[test]
    fn test_discover_node_reads_filter() {
        let filter = CuckooFilter::new(64, 5);
        // AACGT and CAACG surround the node AACG.
        for seq in [b"AACGT", b"CAACG"] {
            let kmer = Kmer::from_ascii(seq).unwrap().canonical().0;
            for _ in 0..3 {
                filter.insert(&kmer).unwrap();
            }
        }
        let ctx = GraphBuildContext::new(Arc::new(filter), 3, 1);
        let node = ctx.discover_node(Kmer::from_ascii(b"AACG").unwrap());
        assert_eq!(node.incoming, [0, 1, 0, 0]);
        assert_eq!(node.outgoing, [0, 0, 0, 1]);
    }
}
