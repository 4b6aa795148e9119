//! kgfusion API Gateway
//!
//! HTTP front for the retrieval pipeline.
//! Handles:
//! - Request validation and routing
//! - Rate limiting
//! - Cancellation on client disconnect and shutdown
//! - Observability (logging, metrics)

mod handlers;
mod middleware;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use kgfusion_common::{
    config::{AppConfig, ObservabilityConfig},
    metrics::{self, RETRIEVAL_BUCKETS, UPSTREAM_BUCKETS},
};
use kgfusion_retrieval::GraphRagPipeline;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use middleware::rate_limit::{rate_limit_middleware, RateLimitState};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pipeline: Arc<GraphRagPipeline>,
    /// Cancelled once the server starts shutting down
    pub shutdown: CancellationToken,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    let config = Arc::new(config);

    init_tracing(&config.observability);

    info!("Starting kgfusion API Gateway v{}", kgfusion_common::VERSION);

    // Initialize metrics
    install_metrics_exporter(&config.observability)?;
    metrics::register_metrics();

    // Build the pipeline; unreachable stores are fatal
    let pipeline = GraphRagPipeline::from_config(&config).await?;
    pipeline.verify_connectivity().await.map_err(|e| {
        error!(error = %e, "Connectivity check failed");
        e
    })?;

    let shutdown = CancellationToken::new();

    // Create app state
    let state = AppState {
        config: config.clone(),
        pipeline: Arc::new(pipeline),
        shutdown: shutdown.clone(),
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn install_metrics_exporter(observability: &ObservabilityConfig) -> Result<(), Box<dyn std::error::Error>> {
    if observability.metrics_port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], observability.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_retrieval_duration_seconds", metrics::METRICS_PREFIX)),
            RETRIEVAL_BUCKETS,
        )?
        .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), UPSTREAM_BUCKETS)?
        .install()?;

    info!("Prometheus metrics on {}", addr);
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Pipeline routes, rate limited
    let mut pipeline_routes = Router::new()
        .route("/retrieve", post(handlers::ask::retrieve))
        .route("/ask", post(handlers::ask::ask));

    if state.config.rate_limit.enabled {
        let limiter = RateLimitState::new(&state.config.rate_limit);
        pipeline_routes = pipeline_routes.layer(axum::middleware::from_fn_with_state(
            limiter,
            rate_limit_middleware,
        ));
    }

    // API routes
    let api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .merge(pipeline_routes)
        .route_layer(axum::middleware::from_fn(middleware::metrics::track_metrics));

    let request_timeout = state.config.request_timeout();

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(request_id)
                .layer(propagate_id)
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                )),
        )
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use kgfusion_common::config::RetrievalConfig;
    use kgfusion_common::embeddings::HashingEmbedder;
    use kgfusion_common::errors::Result;
    use kgfusion_common::LanguageModel;
    use kgfusion_retrieval::fusion::LlmEvaluator;
    use kgfusion_retrieval::graph::{MemoryGraph, MemoryGraphStore};
    use kgfusion_retrieval::vector::MemoryVectorStore;
    use kgfusion_retrieval::{PipelineComponents, EMPTY_CONTEXT};
    use serde_json::Value;
    use tower::ServiceExt;

    struct SilentModel;

    #[async_trait]
    impl LanguageModel for SilentModel {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok("[]".to_string())
        }

        fn model_name(&self) -> &str {
            "silent"
        }
    }

    /// Never answers
    struct StalledModel;

    #[async_trait]
    impl LanguageModel for StalledModel {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            std::future::pending().await
        }

        fn model_name(&self) -> &str {
            "stalled"
        }
    }

    fn app() -> Router {
        let mut config = AppConfig::default();
        config.rate_limit.enabled = false;
        app_with(config, Arc::new(SilentModel))
    }

    fn app_with(config: AppConfig, llm: Arc<dyn LanguageModel>) -> Router {
        let pipeline = GraphRagPipeline::new(
            PipelineComponents {
                graph: Arc::new(MemoryGraphStore::new(MemoryGraph::new())),
                vectors: Arc::new(MemoryVectorStore::new()),
                embedder: Arc::new(HashingEmbedder::new(32)),
                llm: Arc::clone(&llm),
                evaluator: Arc::new(LlmEvaluator::new(llm)),
            },
            &config.vector,
            RetrievalConfig::default(),
        );

        create_router(AppState {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            shutdown: CancellationToken::new(),
        })
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = app()
            .oneshot(Request::builder().uri("/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_ready_route_reports_both_stores() {
        let response = app()
            .oneshot(Request::builder().uri("/v1/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["checks"]["graph_store"]["status"], "up");
        assert_eq!(body["checks"]["vector_store"]["status"], "up");
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected() {
        let response = app()
            .oneshot(post_json("/v1/retrieve", r#"{"query": ""}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_retrieve_without_matches_returns_empty_context() {
        let response = app()
            .oneshot(post_json("/v1/retrieve", r#"{"query": "Who won the league?"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["context"], EMPTY_CONTEXT);
        assert_eq!(body["candidate_count"], 0);
        assert!(body.get("selected").is_none());
    }

    #[tokio::test]
    async fn test_slow_request_times_out_with_408() {
        let mut config = AppConfig::default();
        config.rate_limit.enabled = false;
        config.server.request_timeout_secs = 1;

        let response = app_with(config, Arc::new(StalledModel))
            .oneshot(post_json("/v1/ask", r#"{"query": "Who won the league?"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
