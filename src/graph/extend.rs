// src/graph/extend.rs
//! Edge (unitig) growth between branching nodes.
//!
//! Workers walk the filter outward from every provisional slot of a node
//! until they hit a branching (k-1)-mer or run out of unambiguous extensions.
//! The calling thread acts as dispatcher and as the only writer: it feeds
//! node IDs to the workers, resolves both ends of each grown edge against
//! the `NodeIndex`, registers newly reached branching nodes and streams
//! accepted edges to the edge file.
//!
//! An edge reaching a node that is not registered yet is not written. The
//! node is registered and scheduled instead, and the edge is grown again
//! from that node, at which point both ends resolve.

use crate::error::{Error, Result};
use crate::graph::context::GraphBuildContext;
use crate::graph::edge::DbgEdge;
use crate::graph::node::{DbgNode, Direction, EdgeId, NodeId, Slot, FIRST_ID, PROVISIONAL, UNSET};
use crate::io::edges::write_edge;
use crate::kmer::kmer::{complement, Kmer};
use crossbeam::channel::{bounded, select, Receiver, Sender};
use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use tracing::{debug, info};

/// Where a walk ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalkEnd {
    /// Reached a branching (k-1)-mer, given in walk orientation.
    Node(Kmer),
    /// No unambiguous extension left.
    Tip,
}

/// One step of a walk.
enum Step {
    Growing { base: u8, count: u8 },
    HitBranch,
    HitTip,
}

/// A path grown from a (k-1)-mer, with its confidence track.
#[derive(Clone, Debug)]
pub struct Walk {
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
    pub end: WalkEnd,
}

/// A finished edge as sent from a worker to the writer.
#[derive(Clone, Debug)]
pub struct GrownEdge {
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
    pub open_start: bool,
    pub open_end: bool,
}

impl GrownEdge {
    pub fn is_tip(&self) -> bool {
        self.open_start || self.open_end
    }
}

enum WorkerMsg {
    Found(GrownEdge),
    TipDropped,
    NodeDone(NodeId),
    Failed(Error),
    WorkerDone,
}

fn step(ctx: &GraphBuildContext, position: &Kmer) -> Step {
    let adjacency = ctx.adjacency(position);
    if adjacency.is_complex() {
        return Step::HitBranch;
    }
    match (adjacency.in_degree(), adjacency.sole_outgoing()) {
        (1, Some(base)) => Step::Growing {
            base,
            count: adjacency.out_counts[base as usize],
        },
        _ => Step::HitTip,
    }
}

/// Walks forward from `start` through its outgoing extension `base`.
///
/// The first k-mer must be present in the filter at `min_count` or more,
/// since the slot being grown was derived from it.
pub fn grow_forward(ctx: &GraphBuildContext, start: &Kmer, base: u8) -> Result<Walk> {
    let k = ctx.kmer_len;
    let first = start.push_back(base);
    let count = ctx.kmer_count(&first);
    if count < ctx.min_count {
        return Err(Error::Inconsistent(format!(
            "slot {} of node {} is set but k-mer {} has count {}",
            base, start, first, count
        )));
    }

    let mut seq = start.to_bases();
    seq.push(base);
    let mut qual = vec![0u8; k - 1];
    qual.push(count);

    let mut position = first.drop_first();
    loop {
        if position == *start {
            return Ok(Walk {
                seq,
                qual,
                end: WalkEnd::Node(position),
            });
        }
        match step(ctx, &position) {
            Step::Growing { base, count } => {
                seq.push(base);
                qual.push(count);
                position = position.extend_forward(base);
            }
            Step::HitBranch => {
                return Ok(Walk {
                    seq,
                    qual,
                    end: WalkEnd::Node(position),
                })
            }
            Step::HitTip => {
                return Ok(Walk {
                    seq,
                    qual,
                    end: WalkEnd::Tip,
                })
            }
        }
    }
}

/// Grows the edge occupying `slot` of `node`, oriented start to end.
///
/// An incoming slot `b` is grown as outgoing slot `3-b` of the reverse
/// complement, then flipped back.
pub fn grow_from_slot(ctx: &GraphBuildContext, node: &Kmer, slot: Slot) -> Result<GrownEdge> {
    match slot.direction {
        Direction::Outgoing => {
            let walk = grow_forward(ctx, node, slot.base)?;
            Ok(GrownEdge {
                open_end: walk.end == WalkEnd::Tip,
                seq: walk.seq,
                qual: walk.qual,
                open_start: false,
            })
        }
        Direction::Incoming => {
            let walk = grow_forward(ctx, &node.reverse_complement(), complement(slot.base))?;
            let seq = walk.seq.iter().rev().map(|&b| complement(b)).collect();
            let qual = walk.qual.iter().rev().copied().collect();
            Ok(GrownEdge {
                open_start: walk.end == WalkEnd::Tip,
                seq,
                qual,
                open_end: false,
            })
        }
    }
}

/// Counters reported by the edge growth stage.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BuildStats {
    pub initial_nodes: usize,
    pub discovered_nodes: usize,
    pub edges_written: usize,
    pub tips_kept: usize,
    pub tips_dropped: usize,
    pub deferred: usize,
    /// Edges grown again from their far endpoint after already being written.
    pub duplicates: usize,
    pub conflicts: usize,
}

impl BuildStats {
    pub fn total_nodes(&self) -> usize {
        self.initial_nodes + self.discovered_nodes
    }
}

impl fmt::Display for BuildStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== DBG Construction ===")?;
        writeln!(
            f,
            "Nodes: {} ({} complex, {} discovered during growth)",
            self.total_nodes(),
            self.initial_nodes,
            self.discovered_nodes
        )?;
        writeln!(f, "Edges written: {}", self.edges_written)?;
        writeln!(f, "Tips: {} kept, {} dropped as too short", self.tips_kept, self.tips_dropped)?;
        write!(
            f,
            "Deferred until node registration: {}, regrown duplicates: {}, slot conflicts skipped: {}",
            self.deferred, self.duplicates, self.conflicts
        )
    }
}

fn worker_loop(ctx: &GraphBuildContext, tasks: Receiver<NodeId>, results: Sender<WorkerMsg>) {
    let min_tip_len = 2 * ctx.kmer_len;
    for id in tasks.iter() {
        let Some(node) = ctx.index.snapshot(id) else {
            let _ = results.send(WorkerMsg::Failed(Error::Inconsistent(format!(
                "scheduled node {} is not in the index",
                id
            ))));
            let _ = results.send(WorkerMsg::NodeDone(id));
            continue;
        };
        for direction in [Direction::Outgoing, Direction::Incoming] {
            for base in 0..4u8 {
                if node.slots(direction)[base as usize] != PROVISIONAL {
                    continue;
                }
                let msg = match grow_from_slot(ctx, &node.seq, Slot::new(direction, base)) {
                    Ok(edge) if edge.is_tip() && edge.seq.len() <= min_tip_len => WorkerMsg::TipDropped,
                    Ok(edge) => WorkerMsg::Found(edge),
                    Err(e) => WorkerMsg::Failed(e),
                };
                if results.send(msg).is_err() {
                    return;
                }
            }
        }
        if results.send(WorkerMsg::NodeDone(id)).is_err() {
            return;
        }
    }
    let _ = results.send(WorkerMsg::WorkerDone);
}

/// What the writer decided for one grown edge.
enum Resolution {
    Written(EdgeId),
    /// Endpoint nodes were registered; the edge will be regrown from them.
    Deferred(Vec<NodeId>),
    Conflict,
}

/// Single consumer that owns all index mutation and edge output.
struct EdgeWriter<'a, W: Write> {
    ctx: &'a GraphBuildContext,
    out: W,
    next_id: EdgeId,
}

impl<'a, W: Write> EdgeWriter<'a, W> {
    fn resolve(&mut self, edge: GrownEdge, stats: &mut BuildStats) -> Result<Resolution> {
        let k = self.ctx.kmer_len;
        let len = edge.seq.len();
        if len < k {
            return Err(Error::Inconsistent(format!("grown edge of length {} is shorter than k", len)));
        }
        // Terminal (k-1)-mers and the slot each end claims, in edge orientation.
        let start = (!edge.open_start).then(|| {
            (
                Kmer::from_bases(&edge.seq[..k - 1]),
                Slot::new(Direction::Outgoing, edge.seq[k - 1]),
            )
        });
        let end = (!edge.open_end).then(|| {
            (
                Kmer::from_bases(&edge.seq[len + 1 - k..]),
                Slot::new(Direction::Incoming, edge.seq[len - k]),
            )
        });

        let mut table = self.ctx.index.write();

        let mut registered = Vec::new();
        for (terminal, _) in start.iter().chain(end.iter()) {
            let (key, _) = terminal.canonical();
            if table.id_of(&key).is_none() {
                let node = self.ctx.discover_node(key);
                registered.push(table.insert(node)?);
            }
        }
        if !registered.is_empty() {
            stats.discovered_nodes += registered.len();
            stats.deferred += 1;
            return Ok(Resolution::Deferred(registered));
        }

        // Map each claim onto the stored canonical node.
        let claim = |terminal: &Kmer, slot: Slot| -> (NodeId, Slot) {
            let (key, flipped) = terminal.canonical();
            let id = table.id_of(&key).unwrap_or(UNSET);
            (id, if flipped { slot.mirrored() } else { slot })
        };
        let start_claim = start.as_ref().map(|(t, s)| claim(t, *s));
        let end_claim = end.as_ref().map(|(t, s)| claim(t, *s));

        let slot_free = |claim: &(NodeId, Slot)| {
            table
                .get(claim.0)
                .is_some_and(|node| node.slot(claim.1) == PROVISIONAL)
        };
        let start_ok = start_claim.as_ref().map_or(true, slot_free);
        // A hairpin edge may leave and re-enter through the very same slot.
        let end_ok = end_claim
            .as_ref()
            .map_or(true, |c| slot_free(c) || Some(*c) == start_claim);
        if !start_ok || !end_ok {
            // Every claimed slot already pointing at one written edge means this
            // walk retraced it from the other end.
            let held: Vec<EdgeId> = start_claim
                .iter()
                .chain(end_claim.iter())
                .map(|c| table.get(c.0).map_or(UNSET, |node| node.slot(c.1)))
                .collect();
            let retraced = held.len() == 2
                && held[0] >= FIRST_ID
                && held.iter().all(|&id| id == held[0]);
            if retraced {
                stats.duplicates += 1;
            } else {
                stats.conflicts += 1;
            }
            return Ok(Resolution::Conflict);
        }

        let id = self.next_id;
        self.next_id += 1;
        for (node_id, slot) in start_claim.iter().chain(end_claim.iter()) {
            if let Some(node) = table.get_mut(*node_id) {
                node.set_slot(*slot, id);
            }
        }
        drop(table);

        let mut record = DbgEdge::new(
            id,
            start_claim.map_or(UNSET, |c| c.0),
            end_claim.map_or(UNSET, |c| c.0),
            edge.seq,
            edge.qual,
        );
        record.compute_cov_depth(k);
        write_edge(&mut self.out, &record)?;
        stats.edges_written += 1;
        if edge.open_start || edge.open_end {
            stats.tips_kept += 1;
        }
        Ok(Resolution::Written(id))
    }
}

/// Grows every edge of every node in the index and writes them to `out`.
///
/// The index is extended with the branching nodes reached along the way.
/// Edge IDs are assigned sequentially from 2.
pub fn grow_edges<W: Write>(ctx: &GraphBuildContext, out: W) -> Result<BuildStats> {
    let workers = ctx.workers;
    let mut stats = BuildStats::default();
    let mut backlog: VecDeque<NodeId> = {
        let table = ctx.index.read();
        (FIRST_ID..table.id_limit()).collect()
    };
    stats.initial_nodes = backlog.len();
    info!("Growing edges from {} nodes with {} workers", backlog.len(), workers);

    let mut writer = EdgeWriter {
        ctx,
        out,
        next_id: FIRST_ID,
    };
    let mut first_error: Option<Error> = None;

    std::thread::scope(|scope| -> Result<()> {
        let (task_tx, task_rx) = bounded::<NodeId>(workers * 4);
        let (result_tx, result_rx) = bounded::<WorkerMsg>(workers * 64);
        for _ in 0..workers {
            let tasks = task_rx.clone();
            let results = result_tx.clone();
            scope.spawn(move || worker_loop(ctx, tasks, results));
        }
        drop(task_rx);
        drop(result_tx);

        let mut task_tx = Some(task_tx);
        let mut in_flight = 0usize;
        let mut finished = 0usize;

        loop {
            if backlog.is_empty() && in_flight == 0 {
                // Closing the task channel tells idle workers to finish.
                task_tx = None;
            }
            if task_tx.is_none() && finished == workers {
                break;
            }

            let msg = match (task_tx.as_ref(), backlog.front().copied()) {
                (Some(tx), Some(next)) => select! {
                    send(tx, next) -> sent => {
                        if sent.is_err() {
                            return Err(Error::Inconsistent("edge workers exited early".into()));
                        }
                        backlog.pop_front();
                        in_flight += 1;
                        continue;
                    }
                    recv(result_rx) -> msg => msg,
                },
                _ => result_rx.recv(),
            };
            let Ok(msg) = msg else {
                break;
            };

            match msg {
                WorkerMsg::Found(edge) => {
                    if first_error.is_some() {
                        continue;
                    }
                    match writer.resolve(edge, &mut stats) {
                        Ok(Resolution::Deferred(nodes)) => backlog.extend(nodes),
                        Ok(Resolution::Written(_)) | Ok(Resolution::Conflict) => {}
                        Err(e) => {
                            first_error = Some(e);
                            backlog.clear();
                        }
                    }
                }
                WorkerMsg::TipDropped => stats.tips_dropped += 1,
                WorkerMsg::NodeDone(id) => {
                    in_flight -= 1;
                    ctx.index.with_node_mut(id, DbgNode::set_processed);
                }
                WorkerMsg::Failed(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                    backlog.clear();
                }
                WorkerMsg::WorkerDone => finished += 1,
            }
        }
        Ok(())
    })?;

    if let Some(e) = first_error {
        return Err(e);
    }
    writer.out.flush()?;
    debug!("Edge writer finished at next edge ID {}", writer.next_id);
    info!(
        "Wrote {} edges, discovered {} additional nodes",
        stats.edges_written, stats.discovered_nodes
    );
    Ok(stats)
}
