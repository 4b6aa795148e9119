//! Retrieval and question answering handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use kgfusion_common::errors::{AppError, Result};
use kgfusion_common::models::{Strategy, Subgraph};
use kgfusion_retrieval::fusion::CandidateScore;
use kgfusion_retrieval::{RetrievalReport, RetrieveOptions};

/// Retrieval / ask request
#[derive(Debug, Deserialize, Validate)]
pub struct AskRequest {
    #[validate(length(min = 1, max = 2000))]
    pub query: String,

    #[serde(default)]
    #[validate(nested)]
    pub options: AskOptions,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct AskOptions {
    /// Multi-hop bound; configured default when absent
    #[validate(range(max = 20))]
    pub max_hops: Option<u32>,

    /// Number of PageRank hubs
    #[validate(range(min = 1, max = 50))]
    pub importance_top_k: Option<usize>,

    /// Include every candidate's evaluator verdict
    #[serde(default)]
    pub include_scores: bool,
}

impl From<&AskOptions> for RetrieveOptions {
    fn from(options: &AskOptions) -> Self {
        RetrieveOptions {
            max_hops: options.max_hops,
            importance_top_k: options.importance_top_k,
        }
    }
}

#[derive(Serialize)]
pub struct SelectedSubgraph {
    pub seed: String,
    pub strategy: Strategy,
    pub score: f64,
    pub reason: String,
}

/// Retrieval response
#[derive(Serialize)]
pub struct RetrieveResponse {
    pub query: String,
    pub seeds: Vec<String>,
    pub candidate_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<SelectedSubgraph>,
    pub subgraph: Subgraph,
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<Vec<CandidateScore>>,
    pub cancelled: bool,
    pub processing_time_ms: u64,
}

/// Ask response
#[derive(Serialize)]
pub struct AskResponse {
    pub answer: String,
    #[serde(flatten)]
    pub retrieval: RetrieveResponse,
}

fn validate(request: &AskRequest) -> Result<()> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;
    if request.query.trim().is_empty() {
        return Err(AppError::Validation {
            message: "query must not be blank".to_string(),
            field: Some("query".to_string()),
        });
    }
    Ok(())
}

fn to_response(query: String, report: RetrievalReport, include_scores: bool) -> RetrieveResponse {
    let RetrievalReport {
        seeds,
        candidate_count,
        fusion,
        context,
        cancelled,
        elapsed_ms,
    } = report;

    RetrieveResponse {
        query,
        seeds: seeds.merged,
        candidate_count,
        selected: fusion.winner.map(|w| SelectedSubgraph {
            seed: w.seed,
            strategy: w.strategy,
            score: w.score,
            reason: w.reason,
        }),
        subgraph: fusion.subgraph,
        context,
        scores: include_scores.then_some(fusion.scores),
        cancelled,
        processing_time_ms: elapsed_ms,
    }
}

/// Retrieve the best subgraph and its context block
pub async fn retrieve(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<RetrieveResponse>> {
    validate(&request)?;

    // Cancelled on server shutdown, or when this future is dropped because
    // the client went away
    let cancel = state.shutdown.child_token();
    let _disconnect = cancel.clone().drop_guard();

    let report = state
        .pipeline
        .retrieve(&request.query, (&request.options).into(), &cancel)
        .await;

    Ok(Json(to_response(request.query, report, request.options.include_scores)))
}

/// Retrieve, then answer the question from the retrieved context
pub async fn ask(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>> {
    validate(&request)?;

    let cancel = state.shutdown.child_token();
    let _disconnect = cancel.clone().drop_guard();

    let report = state
        .pipeline
        .answer(&request.query, (&request.options).into(), &cancel)
        .await?;

    let answer = report.answer.ok_or(AppError::Cancelled)?;
    Ok(Json(AskResponse {
        answer,
        retrieval: to_response(request.query, report.retrieval, request.options.include_scores),
    }))
}
