use crate::graph::node::FIRST_ID;
use crate::graph::DbgGraph;
use serde::Serialize;

/// Length and coverage summary over the live edges of a graph.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct GraphSummary {
    pub nodes: usize,
    pub edges: usize,
    pub total_length: usize,
    pub average_length: f64,
    pub n50: usize,
    pub largest: usize,
    pub mean_cov_depth: f64,
}

pub fn n50(lengths: &[usize]) -> usize {
    let mut sorted = lengths.to_vec();
    sorted.sort_unstable();
    let total: usize = sorted.iter().sum();
    let mut acc = 0;
    sorted
        .iter()
        .rev()
        .find(|&&len| {
            acc += len;
            acc * 2 >= total
        })
        .copied()
        .unwrap_or(0)
}

pub fn summarize(graph: &DbgGraph) -> GraphSummary {
    let live: Vec<_> = graph
        .edges
        .iter()
        .skip(FIRST_ID as usize)
        .filter(|e| !e.is_deleted())
        .collect();
    let lengths: Vec<usize> = live.iter().map(|e| e.len()).collect();
    let total: usize = lengths.iter().sum();
    let edges = lengths.len();
    let cov_sum: u64 = live.iter().map(|e| e.cov_depth as u64).sum();

    GraphSummary {
        nodes: graph.live_nodes(),
        edges,
        total_length: total,
        average_length: if edges > 0 { total as f64 / edges as f64 } else { 0.0 },
        n50: n50(&lengths),
        largest: lengths.iter().copied().max().unwrap_or(0),
        mean_cov_depth: if edges > 0 { cov_sum as f64 / edges as f64 } else { 0.0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::edge::DbgEdge;
    use crate::graph::node::DbgNode;

    #[test]
    fn test_n50() {
        assert_eq!(n50(&[]), 0);
        assert_eq!(n50(&[10]), 10);
        // total 100: 40 alone is below half, 40 + 30 reaches it.
        assert_eq!(n50(&[10, 20, 30, 40]), 30);
    }

    #[test]
    fn test_summary_skips_placeholders_and_deleted_edges() {
        let mut edges = vec![DbgEdge::placeholder(), DbgEdge::placeholder()];
        edges.push(DbgEdge::new(2, 0, 0, vec![0; 12], vec![3; 12]));
        edges.push(DbgEdge::new(3, 0, 0, vec![1; 7], vec![3; 7]));
        edges[3].set_deleted();
        let graph = DbgGraph::new(vec![DbgNode::placeholder(), DbgNode::placeholder()], edges, 5);

        let summary = summarize(&graph);
        assert_eq!(summary.nodes, 0);
        assert_eq!(summary.edges, 1);
        assert_eq!(summary.total_length, 12);
        assert_eq!(summary.n50, 12);
        assert_eq!(summary.largest, 12);
    }
}
