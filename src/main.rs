use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use vesper::device::{
    DeviceCoordinator, LogCallStateSink, LogLedDriver, LogMixerBackend, VolumeMixer,
};
use vesper::events::{EventBus, EventKind};
use vesper::memory::{MemoryStore, RemoteEmbeddingClient};
use vesper::state::AppState;
use vesper::supervisor::Supervisor;
use vesper::{AppConfig, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Crypto provider for TLS; must precede any TLS connection.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("failed to install default crypto provider"))?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yaml"));
    let config = AppConfig::load(&config_path).context("failed to load configuration")?;

    // Console plus daily-rolling file logs; the file side feeds the
    // GetLogs tail endpoint.
    std::fs::create_dir_all(&config.logs_dir)
        .with_context(|| format!("failed to create {}", config.logs_dir.display()))?;
    let file_appender = tracing_appender::rolling::daily(&config.logs_dir, "vesper.log");
    let (file_writer, _log_guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    info!(config = %config_path.display(), "starting vesper");

    let bus = EventBus::new();

    let embedder = config.embedding.as_ref().map(|embedding| {
        Arc::new(RemoteEmbeddingClient::new(
            embedding.endpoint.clone(),
            config.api_key.clone(),
            embedding.model.clone(),
        )) as Arc<dyn vesper::memory::EmbeddingProvider>
    });
    let memory = Arc::new(
        MemoryStore::load(config.memory_path.clone(), config.memory_cap, embedder)
            .await
            .context("failed to load memory store")?,
    );

    let state = AppState::new(config.clone(), config_path, memory, bus.clone());

    // Device feedback: LED, speakerphone, volume.
    let mixer = Arc::new(VolumeMixer::new(Arc::new(LogMixerBackend)));
    let coordinator = Arc::new(DeviceCoordinator::new(
        Arc::new(LogLedDriver),
        Arc::new(LogCallStateSink),
        Arc::clone(&mixer),
    ));
    coordinator.start(&bus);

    // HTTP surface.
    let listener = TcpListener::bind((config.http_host.as_str(), config.http_port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.http_host, config.http_port))?;
    info!(addr = %listener.local_addr()?, "http surface listening");
    let http = tokio::spawn(axum::serve(listener, routes::router(state.clone())).into_future());

    // The conversation loop.
    let shutdown = CancellationToken::new();
    let supervisor = Arc::new(Supervisor::new(state, mixer, shutdown.clone()));
    supervisor.start();
    let supervisor_task = tokio::spawn(Arc::clone(&supervisor).run());

    // Graceful shutdown on ctrl-c.
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");
    bus.publish_from("main", EventKind::Shutdown);
    shutdown.cancel();

    let _ = supervisor_task.await;
    http.abort();
    info!("goodbye");
    Ok(())
}
