// src/graph/node.rs
//! De Bruijn graph nodes: canonical (k-1)-mers with per-base edge slots.

use crate::kmer::kmer::{complement, Kmer};

pub type NodeId = u32;
pub type EdgeId = u32;

/// Slot value for "no edge".
pub const UNSET: u32 = 0;
/// Slot value for "an edge leaves here but has not been written yet".
pub const PROVISIONAL: u32 = 1;
/// First real node/edge ID.
pub const FIRST_ID: u32 = 2;

pub mod node_flag {
    pub const PROCESSED: u8 = 0x1;
    pub const DELETED: u8 = 0x2;
}

/// Side of a node an edge slot belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    pub fn flip(self) -> Self {
        match self {
            Direction::Incoming => Direction::Outgoing,
            Direction::Outgoing => Direction::Incoming,
        }
    }
}

/// A slot position on a node: side plus base index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Slot {
    pub direction: Direction,
    pub base: u8,
}

impl Slot {
    pub fn new(direction: Direction, base: u8) -> Self {
        Self { direction, base }
    }

    /// The same slot seen from the reverse-complement strand.
    pub fn mirrored(self) -> Self {
        Self {
            direction: self.direction.flip(),
            base: complement(self.base),
        }
    }
}

/// Re-expresses per-base slot arrays for the reverse-complement strand.
pub fn mirror_slots<T: Copy>(incoming: &[T; 4], outgoing: &[T; 4]) -> ([T; 4], [T; 4]) {
    let mut mirrored_in = *incoming;
    let mut mirrored_out = *outgoing;
    for i in 0..4 {
        mirrored_in[i] = outgoing[3 - i];
        mirrored_out[i] = incoming[3 - i];
    }
    (mirrored_in, mirrored_out)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DbgNode {
    pub id: NodeId,
    /// Canonical (k-1)-mer.
    pub seq: Kmer,
    pub incoming: [EdgeId; 4],
    pub outgoing: [EdgeId; 4],
    pub flag: u8,
}

impl DbgNode {
    pub fn new(seq: Kmer, incoming: [EdgeId; 4], outgoing: [EdgeId; 4]) -> Self {
        Self {
            id: UNSET,
            seq,
            incoming,
            outgoing,
            flag: 0,
        }
    }

    /// Filler for the reserved arena indices 0 and 1.
    pub fn placeholder() -> Self {
        Self {
            id: UNSET,
            seq: Kmer::default(),
            incoming: [UNSET; 4],
            outgoing: [UNSET; 4],
            flag: node_flag::DELETED,
        }
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.flag & node_flag::DELETED != 0
    }

    #[inline]
    pub fn set_deleted(&mut self) {
        self.flag |= node_flag::DELETED;
    }

    #[inline]
    pub fn is_processed(&self) -> bool {
        self.flag & node_flag::PROCESSED != 0
    }

    #[inline]
    pub fn set_processed(&mut self) {
        self.flag |= node_flag::PROCESSED;
    }

    pub fn slots(&self, direction: Direction) -> &[EdgeId; 4] {
        match direction {
            Direction::Incoming => &self.incoming,
            Direction::Outgoing => &self.outgoing,
        }
    }

    pub fn slots_mut(&mut self, direction: Direction) -> &mut [EdgeId; 4] {
        match direction {
            Direction::Incoming => &mut self.incoming,
            Direction::Outgoing => &mut self.outgoing,
        }
    }

    #[inline]
    pub fn slot(&self, slot: Slot) -> EdgeId {
        self.slots(slot.direction)[slot.base as usize]
    }

    #[inline]
    pub fn set_slot(&mut self, slot: Slot, value: EdgeId) {
        self.slots_mut(slot.direction)[slot.base as usize] = value;
    }

    /// Real edge IDs on one side, in base order.
    pub fn edge_ids(&self, direction: Direction) -> impl Iterator<Item = EdgeId> + '_ {
        self.slots(direction).iter().copied().filter(|&id| id >= FIRST_ID)
    }

    pub fn in_degree(&self) -> usize {
        self.edge_ids(Direction::Incoming).count()
    }

    pub fn out_degree(&self) -> usize {
        self.edge_ids(Direction::Outgoing).count()
    }

    /// Number of slots holding a real edge ID.
    pub fn degree(&self) -> usize {
        self.in_degree() + self.out_degree()
    }

    pub fn has_edge(&self, edge_id: EdgeId) -> bool {
        self.find_slot(edge_id).is_some()
    }

    /// First slot holding `edge_id`, incoming side first.
    pub fn find_slot(&self, edge_id: EdgeId) -> Option<Slot> {
        [Direction::Incoming, Direction::Outgoing]
            .into_iter()
            .find_map(|direction| {
                self.slots(direction)
                    .iter()
                    .position(|&id| id == edge_id)
                    .map(|base| Slot::new(direction, base as u8))
            })
    }

    /// True when some edge occupies two slots of this node, i.e. it leaves and
    /// returns here.
    pub fn contains_self_cycle(&self) -> bool {
        let ids: Vec<EdgeId> = self
            .edge_ids(Direction::Incoming)
            .chain(self.edge_ids(Direction::Outgoing))
            .collect();
        ids.iter()
            .enumerate()
            .any(|(i, id)| ids[i + 1..].contains(id))
    }

    /// Rewrites every slot holding `old` to `new`; false if none did.
    pub fn substitute_edge(&mut self, old: EdgeId, new: EdgeId) -> bool {
        let mut found = false;
        for id in self.incoming.iter_mut().chain(self.outgoing.iter_mut()) {
            if *id == old {
                *id = new;
                found = true;
            }
        }
        found
    }

    /// Clears every slot holding `edge_id` and returns how many were cleared.
    pub fn clear_edge(&mut self, edge_id: EdgeId) -> usize {
        let mut cleared = 0;
        for id in self.incoming.iter_mut().chain(self.outgoing.iter_mut()) {
            if *id == edge_id {
                *id = UNSET;
                cleared += 1;
            }
        }
        cleared
    }

    /// Drops slots that never received an edge.
    pub fn clear_provisional(&mut self) -> usize {
        self.clear_edge(PROVISIONAL)
    }
}
