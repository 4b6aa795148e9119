//! Shared data model
//!
//! Graph-side types (entities, relations, subgraphs), the evaluator verdict,
//! and the candidate bookkeeping used by the fusion stage.

mod graph;
mod value;

pub use graph::*;
pub use value::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subgraph construction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    OneHop,
    MultiHop,
    Importance,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::OneHop => "one_hop",
            Strategy::MultiHop => "multi_hop",
            Strategy::Importance => "importance",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A subgraph together with the seed and strategy that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub seed: String,
    pub strategy: Strategy,
    pub subgraph: Subgraph,
}

impl Candidate {
    pub fn new(seed: impl Into<String>, strategy: Strategy, subgraph: Subgraph) -> Self {
        Self {
            seed: seed.into(),
            strategy,
            subgraph,
        }
    }
}
