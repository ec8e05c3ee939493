//! `jobd`: runs the job queue service until interrupted.

mod config;

use std::sync::Arc;

use actors::{JobService, ProcessorConfig, build_processor};
use db::repositories::JobRepository;
use queue_core::JobPayload;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = ServiceConfig::from_env()?;
    init_tracing(config.log_format);

    tracing::info!("Initializing job queue service...");

    let store = Arc::new(JobRepository::connect(&config.database).await?);
    let service = JobService::new(config.queue.clone(), store).await?;

    let processor = build_processor(&config.processor);
    match &config.processor {
        ProcessorConfig::Local(_) => tracing::info!("Using local inference"),
        ProcessorConfig::Remote(remote) => {
            tracing::info!(host = %remote.host, port = remote.port, "Using remote inference")
        }
    }
    service.start(processor).await?;

    for index in 0..config.demo_jobs {
        match service.submit(JobPayload::new(json!({ "index": index }))).await {
            Ok(record) => tracing::info!(job_id = %record.id, index, "Demo job submitted"),
            Err(e) if e.is_busy() => {
                tracing::warn!(index, error = %e, "Queue busy, skipping remaining demo jobs");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!("Job queue service ready, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    let stats = service.stats();
    tracing::info!(
        depth = stats.depth,
        in_flight = stats.in_flight,
        completed = stats.completed,
        failed = stats.failed,
        "Shutting down"
    );
    service.shutdown().await?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "jobd=info,actors=info,db=info,warn".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}
