//! Media rename worker binary.

use anyhow::Context;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use renamer_media::{check_ffmpeg, check_ffprobe, FfmpegTool};
use renamer_messaging::{BotApiClient, BotApiConfig};
use renamer_store::{InMemoryMetadataStore, MetadataService, RedisMetadataStore};
use renamer_worker::{init_tracing, metrics, RenameService, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();
    info!("Starting renamer-worker");

    let config = WorkerConfig::from_env()?;
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        metrics::install_prometheus(port)?;
        info!(port, "Prometheus exporter listening");
    }

    check_ffmpeg().context("ffmpeg is required")?;
    check_ffprobe().context("ffprobe is required")?;
    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .with_context(|| format!("creating work dir {}", config.work_dir.display()))?;

    let store: Arc<dyn MetadataService> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisMetadataStore::connect(url)
                .await
                .context("connecting to Redis")?,
        ),
        None => {
            warn!("REDIS_URL not set, preferences are kept in memory");
            Arc::new(InMemoryMetadataStore::new())
        }
    };

    let client = BotApiClient::new(
        BotApiConfig::new(config.bot_token.clone()).with_api_url(config.bot_api_url.clone()),
    )?;
    let media = Arc::new(FfmpegTool::with_timeout(config.ffmpeg_timeout_secs));

    let service = RenameService::new(config, Arc::new(client.clone()), store, media);
    service.run(client, shutdown_signal()).await?;

    info!("Worker shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
