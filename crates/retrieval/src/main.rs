//! One-shot question answering over the knowledge graph
//!
//! Usage: `ask <question...>`

use kgfusion_common::config::{AppConfig, ObservabilityConfig};
use kgfusion_common::VERSION;
use kgfusion_retrieval::{GraphRagPipeline, RetrieveOptions};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        eprintln!("usage: ask <question...>");
        std::process::exit(2);
    }

    let config = AppConfig::load()?;
    init_tracing(&config.observability);

    info!("Starting kgfusion ask v{}", VERSION);

    let pipeline = GraphRagPipeline::from_config(&config).await?;

    if let Err(e) = pipeline.verify_connectivity().await {
        error!(error = %e, "Connectivity check failed");
        std::process::exit(1);
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, cancelling retrieval");
            trigger.cancel();
        }
    });

    let report = pipeline
        .answer(&question, RetrieveOptions::default(), &cancel)
        .await?;

    println!("{}", report.retrieval.context);
    match report.answer {
        Some(answer) => println!("\n--- Answer ---\n{}", answer),
        None => println!("\n(cancelled before an answer was generated)"),
    }

    Ok(())
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}
