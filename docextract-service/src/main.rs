use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

mod api;
mod config;
mod error;
mod extraction;

use crate::config::{AuditConfig, AuditSinkKind, Settings, VisionConfig};
use crate::extraction::{
    AuditSink, AuditWriter, ExtractionService, JobStore, JsonlAuditSink, ProcessorRegistry,
    TracingAuditSink, VisionProcessor,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!(
        "Starting document extraction service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let settings: Settings = crate::config::load_settings()?;
    info!(
        host = %settings.server.host,
        port = settings.server.port,
        ttl_secs = settings.jobs.ttl_secs,
        audit_sink = ?settings.audit.sink,
        "Configuration loaded"
    );

    let vision = build_vision(&settings.vision)?;
    let registry = ProcessorRegistry::standard(vision.clone());

    let store = Arc::new(JobStore::new(settings.jobs.ttl()));
    let audit = Arc::new(AuditWriter::start(
        build_audit_sink(&settings.audit),
        settings.audit.queue_capacity,
    ));
    let service = Arc::new(ExtractionService::new(store, registry, audit));

    let app = api::router(
        service.clone(),
        vision,
        settings.limits.max_upload_bytes,
    );

    // Start the server
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let running extractions finish erasing their images
    service.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

fn build_vision(
    config: &VisionConfig,
) -> Result<Option<Arc<VisionProcessor>>, Box<dyn std::error::Error>> {
    if !config.is_enabled() {
        info!("No vision service configured, using MRZ text extraction only");
        return Ok(None);
    }

    let vision = VisionProcessor::new(config)?;
    info!(
        url = %vision.base_url(),
        timeout_secs = config.timeout_secs,
        "Vision processor enabled"
    );
    Ok(Some(Arc::new(vision)))
}

fn build_audit_sink(config: &AuditConfig) -> Arc<dyn AuditSink> {
    match config.sink {
        AuditSinkKind::Log => Arc::new(TracingAuditSink),
        AuditSinkKind::File => {
            info!(path = %config.path.display(), "Writing audit entries to file");
            Arc::new(JsonlAuditSink::new(&config.path))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("docextract_service=info,audit=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
