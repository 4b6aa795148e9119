//! PageRank over the in-memory graph
//!
//! Power iteration over directed edges. Mass from nodes without outgoing
//! edges is not redistributed; scores are normalised to a maximum of 1.

use super::memory::MemoryGraph;
use std::cmp::Ordering;

/// PageRank configuration
#[derive(Debug, Clone)]
pub struct PageRankConfig {
    /// Damping factor (typically 0.85)
    pub damping: f32,

    /// Maximum iterations
    pub max_iterations: usize,

    /// Convergence threshold
    pub epsilon: f32,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 100,
            epsilon: 1e-6,
        }
    }
}

/// PageRank scorer for graph nodes
pub struct PageRankScorer {
    config: PageRankConfig,
}

impl PageRankScorer {
    /// Create a new scorer
    pub fn new(config: PageRankConfig) -> Self {
        Self { config }
    }

    /// Compute scores indexed like `graph.nodes()`
    pub fn compute(&self, graph: &MemoryGraph) -> Vec<f32> {
        let n = graph.node_count();
        if n == 0 {
            return Vec::new();
        }

        let damping = self.config.damping;
        let teleport = (1.0 - damping) / n as f32;
        let mut scores = vec![1.0 / n as f32; n];

        for _ in 0..self.config.max_iterations {
            let mut max_diff: f32 = 0.0;

            let next: Vec<f32> = (0..n)
                .map(|node| {
                    let inbound: f32 = graph
                        .in_sources(node)
                        .map(|source| scores[source] / graph.out_degree(source).max(1) as f32)
                        .sum();
                    let score = teleport + damping * inbound;
                    max_diff = max_diff.max((score - scores[node]).abs());
                    score
                })
                .collect();

            scores = next;

            if max_diff < self.config.epsilon {
                break;
            }
        }

        let max_score = scores.iter().copied().fold(0.0f32, f32::max);
        if max_score > 0.0 {
            scores.iter_mut().for_each(|s| *s /= max_score);
        }

        scores
    }

    /// Top `limit` node names by score; ties ordered by name
    pub fn rank(&self, graph: &MemoryGraph, limit: usize) -> Vec<(String, f32)> {
        let scores = self.compute(graph);

        let mut ranked: Vec<(String, f32)> = graph
            .nodes()
            .iter()
            .zip(scores)
            .map(|(node, score)| (node.name.clone(), score))
            .collect();

        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        ranked.truncate(limit);
        ranked
    }
}

impl Default for PageRankScorer {
    fn default() -> Self {
        Self::new(PageRankConfig::default())
    }
}
