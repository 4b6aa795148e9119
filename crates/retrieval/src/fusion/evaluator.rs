//! Subgraph evaluators
//!
//! An evaluator scores how useful a subgraph is for answering a query.

use async_trait::async_trait;
use kgfusion_common::cache::{keys, Cache};
use kgfusion_common::errors::{AppError, Result};
use kgfusion_common::llm::{parse_llm_json, LanguageModel};
use kgfusion_common::metrics;
use kgfusion_common::models::{EvaluationResult, Subgraph};
use kgfusion_common::prompts;
use std::fmt::Write;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Scores a subgraph against a query
#[async_trait]
pub trait SubgraphEvaluator: Send + Sync {
    async fn evaluate(&self, query: &str, subgraph: &Subgraph) -> Result<EvaluationResult>;
}

/// Entity and relation listing shown to the evaluator
pub fn render_for_evaluation(subgraph: &Subgraph) -> String {
    let mut out = String::from("Entities:\n");
    for entity in &subgraph.entities {
        let _ = writeln!(out, "- {} ({})", entity.name, entity.label);
    }
    out.push_str("\nRelations:\n");
    for relation in &subgraph.relations {
        let _ = writeln!(out, "- {}", relation);
    }
    out
}

/// Reject scores that are not finite, clamp the rest into [0, 1]
fn normalize(mut result: EvaluationResult, raw: &str) -> Result<EvaluationResult> {
    if !result.score.is_finite() {
        return Err(AppError::llm_parse(
            format!("score is not a finite number: {}", result.score),
            raw,
        ));
    }
    result.score = result.score.clamp(0.0, 1.0);
    Ok(result)
}

/// Evaluator backed by a language model
pub struct LlmEvaluator {
    llm: Arc<dyn LanguageModel>,
}

impl LlmEvaluator {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    async fn evaluate_rendered(&self, query: &str, rendered: &str) -> Result<EvaluationResult> {
        let started = Instant::now();
        let prompt = prompts::evaluation_prompt(query, rendered);

        let result = match self.llm.complete(&prompt).await {
            Ok(raw) => parse_llm_json::<EvaluationResult>(&raw).and_then(|r| normalize(r, &raw)),
            Err(e) => Err(e),
        };

        metrics::record_llm(started.elapsed().as_secs_f64(), "evaluate", result.is_ok());
        result
    }
}

#[async_trait]
impl SubgraphEvaluator for LlmEvaluator {
    async fn evaluate(&self, query: &str, subgraph: &Subgraph) -> Result<EvaluationResult> {
        self.evaluate_rendered(query, &render_for_evaluation(subgraph)).await
    }
}

/// [`LlmEvaluator`] with verdicts memoised in Redis
///
/// Cache errors never fail an evaluation; they fall through to the model.
pub struct CachedEvaluator {
    inner: LlmEvaluator,
    cache: Arc<Cache>,
}

impl CachedEvaluator {
    pub fn new(inner: LlmEvaluator, cache: Arc<Cache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl SubgraphEvaluator for CachedEvaluator {
    async fn evaluate(&self, query: &str, subgraph: &Subgraph) -> Result<EvaluationResult> {
        let rendered = render_for_evaluation(subgraph);
        let key = keys::evaluation(self.inner.llm.model_name(), query, &rendered);

        match self.cache.get::<EvaluationResult>(&key).await {
            Ok(Some(cached)) => {
                metrics::record_cache(true, "evaluation");
                debug!(score = cached.score, "Evaluation cache hit");
                return Ok(cached);
            }
            Ok(None) => metrics::record_cache(false, "evaluation"),
            Err(e) => warn!(error = %e, "Evaluation cache read failed"),
        }

        let result = self.inner.evaluate_rendered(query, &rendered).await?;

        if let Err(e) = self.cache.set(&key, &result).await {
            warn!(error = %e, "Evaluation cache write failed");
        }
        Ok(result)
    }
}
