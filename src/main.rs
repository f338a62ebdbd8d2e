//! Media Relay - resolves user-supplied media links through an external lookup API

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_relay::api::{create_router, AppState};
use media_relay::cache::CacheStore;
use media_relay::lookup::{HttpTransport, LookupClient};
use media_relay::queue::AdmissionQueue;
use media_relay::tasks::{spawn_usage_task, UsageReporter, UsageTally};
use media_relay::{Config, Orchestrator};

/// Main entry point for the relay server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Build the lookup client, cache, queue and orchestrator
/// 4. Start the usage reporting task
/// 5. Serve the HTTP API until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Media Relay");

    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    info!(
        "Configuration loaded: cache_max_entries={}, cache_ttl={}s, max_global={}, max_per_caller={}, port={}",
        config.cache_max_entries,
        config.cache_ttl_secs,
        config.queue_max_global,
        config.queue_max_per_caller,
        config.server_port
    );

    let transport = HttpTransport::new(
        &config.lookup_api_url,
        &config.lookup_api_key,
        &config.lookup_api_host,
        config.request_timeout(),
    )
    .context("failed to build lookup HTTP client")?;
    let lookup = LookupClient::new(
        Arc::new(transport),
        config.retry_policy(),
        config.max_media_bytes,
    );

    let orchestrator = Orchestrator::new(
        Arc::new(lookup),
        CacheStore::new(config.cache_max_entries),
        AdmissionQueue::new(config.queue_limits()),
        config.orchestrator_settings(),
    );

    let (usage, usage_rx) = UsageReporter::channel(config.usage_channel_capacity);
    let tally = UsageTally::new();
    let usage_handle = spawn_usage_task(usage_rx, tally.clone());

    let app = create_router(AppState::new(orchestrator, usage, tally));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(usage_handle))
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM), then aborts the usage task.
async fn shutdown_signal(usage_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    usage_handle.abort();
    warn!("Usage reporting task aborted");
}
