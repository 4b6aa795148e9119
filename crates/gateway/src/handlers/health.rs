//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;
use std::future::Future;
use std::time::Instant;

use crate::AppState;
use kgfusion_common::errors::Result;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub graph_store: CheckResult,
    pub vector_store: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    fn is_up(&self) -> bool {
        self.status == "up"
    }
}

async fn check(ping: impl Future<Output = Result<()>>) -> CheckResult {
    let start = Instant::now();
    match ping.await {
        Ok(()) => CheckResult {
            status: "up".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => CheckResult {
            status: "down".to_string(),
            latency_ms: None,
            error: Some(e.to_string()),
        },
    }
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: kgfusion_common::VERSION.to_string(),
    })
}

/// Readiness probe - pings the graph and vector stores
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let (graph_store, vector_store) = tokio::join!(
        check(state.pipeline.graph_store().ping()),
        check(state.pipeline.vector_store().ping()),
    );

    let all_healthy = graph_store.is_up() && vector_store.is_up();

    Json(ReadyResponse {
        status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
        checks: HealthChecks {
            graph_store,
            vector_store,
        },
    })
}
