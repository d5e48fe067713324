// src/graph/edge.rs
//! Unitig edges and the sequence operations the simplifier needs on them.

use crate::error::{Error, Result};
use crate::graph::node::{Direction, EdgeId, NodeId, Slot, UNSET};
use crate::kmer::kmer::{complement, decode_bases, Kmer};

pub mod edge_flag {
    pub const PROCESSED: u8 = 0x1;
    pub const DELETED: u8 = 0x2;
    pub const UNIQUE: u8 = 0x4;
    pub const SEMI_UNIQUE: u8 = 0x8;
    pub const TWO_EDGE_CYCLE: u8 = 0x10;
    pub const SELF_CYCLE: u8 = 0x20;

    /// Flags recomputed by every classification run.
    pub const CLASSIFICATION: u8 = UNIQUE | SEMI_UNIQUE | TWO_EDGE_CYCLE;
}

/// Which end of an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum End {
    Start,
    End,
}

/// A maximal non-branching path, stored as 2-bit bases plus a parallel
/// per-base confidence track.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DbgEdge {
    pub id: EdgeId,
    pub start_nid: NodeId,
    pub end_nid: NodeId,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
    pub cov_depth: u16,
    pub flag: u8,
}

impl DbgEdge {
    pub fn new(id: EdgeId, start_nid: NodeId, end_nid: NodeId, seq: Vec<u8>, qual: Vec<u8>) -> Self {
        debug_assert_eq!(seq.len(), qual.len());
        Self {
            id,
            start_nid,
            end_nid,
            seq,
            qual,
            cov_depth: 0,
            flag: 0,
        }
    }

    pub fn placeholder() -> Self {
        Self {
            id: UNSET,
            start_nid: UNSET,
            end_nid: UNSET,
            seq: Vec::new(),
            qual: Vec::new(),
            cov_depth: 0,
            flag: edge_flag::DELETED,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    #[inline]
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flag & flag != 0
    }

    #[inline]
    pub fn set_flag(&mut self, flag: u8) {
        self.flag |= flag;
    }

    #[inline]
    pub fn clear_flag(&mut self, flag: u8) {
        self.flag &= !flag;
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.has_flag(edge_flag::DELETED)
    }

    #[inline]
    pub fn set_deleted(&mut self) {
        self.set_flag(edge_flag::DELETED);
    }

    /// Both ends attached to the same real node.
    pub fn is_self_cycle(&self) -> bool {
        self.start_nid > crate::graph::node::PROVISIONAL && self.start_nid == self.end_nid
    }

    pub fn node_at(&self, end: End) -> NodeId {
        match end {
            End::Start => self.start_nid,
            End::End => self.end_nid,
        }
    }

    /// Average k-mer support: total confidence over the number of k-mers.
    pub fn compute_cov_depth(&mut self, kmer_len: usize) {
        let kmers = (self.seq.len() + 1).saturating_sub(kmer_len).max(1);
        let total: u64 = self.qual.iter().map(|&q| q as u64).sum();
        self.cov_depth = (total / kmers as u64).min(u16::MAX as u64) as u16;
    }

    /// Leading (k-1)-mer.
    pub fn head_kmer(&self, kmer_len: usize) -> Kmer {
        Kmer::from_bases(&self.seq[..kmer_len - 1])
    }

    /// Trailing (k-1)-mer.
    pub fn tail_kmer(&self, kmer_len: usize) -> Kmer {
        Kmer::from_bases(&self.seq[self.seq.len() + 1 - kmer_len..])
    }

    /// The slot this edge must occupy on `node_seq` at the given end.
    ///
    /// The start leaves through `outgoing[seq[k-1]]` and the end arrives through
    /// `incoming[seq[len-k]]`; both mirror to the opposite side and complement
    /// base when the terminal (k-1)-mer is the reverse complement of the stored
    /// node. A palindromic node matches both strands and takes the unmirrored
    /// slot. A hairpin returning on the opposite strand maps both ends onto one
    /// slot. Returns `None` if the terminal matches neither strand.
    pub fn endpoint_slot(&self, end: End, node_seq: &Kmer, kmer_len: usize) -> Option<Slot> {
        let len = self.seq.len();
        if len < kmer_len {
            return None;
        }
        let (terminal, slot) = match end {
            End::Start => (
                self.head_kmer(kmer_len),
                Slot::new(Direction::Outgoing, self.seq[kmer_len - 1]),
            ),
            End::End => (
                self.tail_kmer(kmer_len),
                Slot::new(Direction::Incoming, self.seq[len - kmer_len]),
            ),
        };
        if terminal == *node_seq {
            Some(slot)
        } else if terminal.reverse_complement() == *node_seq {
            Some(slot.mirrored())
        } else {
            None
        }
    }

    /// Flips the edge onto the other strand; endpoints swap with it.
    pub fn reverse_complement_in_place(&mut self) {
        let (seq, qual) = reverse_complement_unitig(&self.seq, &self.qual);
        self.seq = seq;
        self.qual = qual;
        std::mem::swap(&mut self.start_nid, &mut self.end_nid);
    }

    pub fn decoded(&self) -> String {
        decode_bases(&self.seq)
    }
}

/// Reverse-complemented bases with the confidence track reversed alongside.
pub fn reverse_complement_unitig(seq: &[u8], qual: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let rc = seq.iter().rev().map(|&b| complement(b)).collect();
    let rq = qual.iter().rev().copied().collect();
    (rc, rq)
}

/// Joins two unitigs that share a (k-1)-base overlap.
///
/// The merged length is `L1 + L2 - (k-1)`. Confidence values inside the
/// overlap are summed.
pub fn concat_unitigs(
    first: (&[u8], &[u8]),
    second: (&[u8], &[u8]),
    kmer_len: usize,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let overlap = kmer_len - 1;
    let (seq1, qual1) = first;
    let (seq2, qual2) = second;
    if seq1.len() < overlap || seq2.len() < overlap {
        return Err(Error::Inconsistent(format!(
            "cannot join unitigs of length {} and {} with overlap {}",
            seq1.len(),
            seq2.len(),
            overlap
        )));
    }
    let split = seq1.len() - overlap;
    if seq1[split..] != seq2[..overlap] {
        return Err(Error::Inconsistent(format!(
            "unitig overlap mismatch: {} vs {}",
            decode_bases(&seq1[split..]),
            decode_bases(&seq2[..overlap])
        )));
    }

    let mut seq = Vec::with_capacity(seq1.len() + seq2.len() - overlap);
    seq.extend_from_slice(seq1);
    seq.extend_from_slice(&seq2[overlap..]);

    let mut qual = Vec::with_capacity(seq.len());
    qual.extend_from_slice(&qual1[..split]);
    qual.extend(
        qual1[split..]
            .iter()
            .zip(&qual2[..overlap])
            .map(|(&a, &b)| a.saturating_add(b)),
    );
    qual.extend_from_slice(&qual2[overlap..]);
    Ok((seq, qual))
}
