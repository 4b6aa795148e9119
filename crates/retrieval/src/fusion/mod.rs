//! Subgraph fusion
//!
//! Every non-empty candidate is scored by a [`SubgraphEvaluator`]; the single
//! best-scoring one becomes the retrieval context. Evaluations run
//! concurrently but are reduced in candidate order, so on equal scores the
//! candidate seen first always wins.

mod evaluator;

pub use evaluator::{render_for_evaluation, CachedEvaluator, LlmEvaluator, SubgraphEvaluator};

use futures::stream::{self, StreamExt};
use kgfusion_common::errors::Result;
use kgfusion_common::metrics;
use kgfusion_common::models::{Candidate, EvaluationResult, Strategy, Subgraph};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Evaluator verdict for one candidate
#[derive(Debug, Clone, Serialize)]
pub struct CandidateScore {
    /// Position in the candidate list handed to the fuser
    pub index: usize,
    pub seed: String,
    pub strategy: Strategy,
    pub entities: usize,
    pub relations: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The selected candidate
#[derive(Debug, Clone, Serialize)]
pub struct Winner {
    pub index: usize,
    pub seed: String,
    pub strategy: Strategy,
    pub score: f64,
    pub reason: String,
}

/// Result of one fusion pass
#[derive(Debug, Clone, Default)]
pub struct FusionOutcome {
    /// Winning subgraph; empty when nothing could be selected
    pub subgraph: Subgraph,
    pub winner: Option<Winner>,
    /// One entry per evaluated candidate, in candidate order
    pub scores: Vec<CandidateScore>,
    /// Set when the pass stopped early; `subgraph` is then the best so far
    pub cancelled: bool,
}

/// One step of the best-candidate fold: replace only on a strictly greater score
fn keep_best(best: Option<(usize, f64)>, next: (usize, f64)) -> Option<(usize, f64)> {
    match best {
        Some((_, best_score)) if next.1 <= best_score => best,
        _ => Some(next),
    }
}

/// Selects the best candidate subgraph for a query
pub struct SubgraphFuser {
    evaluator: Arc<dyn SubgraphEvaluator>,
    concurrency: usize,
}

impl SubgraphFuser {
    pub fn new(evaluator: Arc<dyn SubgraphEvaluator>, concurrency: usize) -> Self {
        Self {
            evaluator,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn fuse(
        &self,
        query: &str,
        mut candidates: Vec<Candidate>,
        cancel: &CancellationToken,
    ) -> FusionOutcome {
        let mut scores = Vec::new();
        let mut best: Option<(usize, f64)> = None;
        let mut cancelled = false;

        {
            let evaluator = &self.evaluator;
            let candidates = &candidates;
            let pending: Vec<usize> = candidates
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.subgraph.is_empty())
                .map(|(index, _)| index)
                .collect();

            let mut evaluations = std::pin::pin!(stream::iter(pending)
                .map(move |index| async move {
                    let result = evaluator.evaluate(query, &candidates[index].subgraph).await;
                    (index, result)
                })
                .buffered(self.concurrency));

            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    next = evaluations.next() => next,
                };
                let Some((index, result)) = next else {
                    break;
                };

                scores.push(self.record(index, &candidates[index], &result));
                if let Ok(verdict) = result {
                    best = keep_best(best, (index, verdict.score));
                }
            }
        }

        if cancelled {
            warn!(
                evaluated = scores.len(),
                "Fusion cancelled, keeping the best candidate so far"
            );
        }

        let Some((index, score)) = best else {
            warn!(
                candidates = candidates.len(),
                "No candidate subgraph could be selected, using an empty subgraph"
            );
            return FusionOutcome {
                subgraph: Subgraph::new(),
                winner: None,
                scores,
                cancelled,
            };
        };

        let reason = scores
            .iter()
            .find(|s| s.index == index)
            .and_then(|s| s.reason.clone())
            .unwrap_or_default();

        let Candidate {
            seed,
            strategy,
            subgraph,
        } = candidates.swap_remove(index);

        info!(
            score = score,
            seed = %seed,
            strategy = %strategy,
            entities = subgraph.entity_count(),
            "Selected best subgraph"
        );
        metrics::record_fusion_winner(score, strategy.as_str());

        FusionOutcome {
            subgraph,
            winner: Some(Winner {
                index,
                seed,
                strategy,
                score,
                reason,
            }),
            scores,
            cancelled,
        }
    }

    fn record(
        &self,
        index: usize,
        candidate: &Candidate,
        result: &Result<EvaluationResult>,
    ) -> CandidateScore {
        let mut entry = CandidateScore {
            index,
            seed: candidate.seed.clone(),
            strategy: candidate.strategy,
            entities: candidate.subgraph.entity_count(),
            relations: candidate.subgraph.relation_count(),
            score: None,
            reason: None,
            error: None,
        };

        match result {
            Ok(verdict) => {
                info!(
                    seed = %candidate.seed,
                    strategy = %candidate.strategy,
                    score = verdict.score,
                    reason = %verdict.reason,
                    "Evaluated candidate subgraph"
                );
                metrics::record_evaluation("scored");
                entry.score = Some(verdict.score);
                entry.reason = Some(verdict.reason.clone());
            }
            Err(e) => {
                warn!(
                    seed = %candidate.seed,
                    strategy = %candidate.strategy,
                    error = %e,
                    "Candidate evaluation failed, excluding it"
                );
                metrics::record_evaluation("failed");
                entry.error = Some(e.to_string());
            }
        }

        entry
    }
}
