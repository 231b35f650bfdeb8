//! lampstand proxy entry point.
//!
//! Serves a static deployment through the offline engine. The engine installs
//! in the background; until it is active every request passes through to the
//! origin. Logging goes to stderr as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use lampstand_client::{FetchConfig, HttpNetwork, Network, OfflineWorker, WorkerConfig};
use lampstand_core::{AppConfig, CacheDb};
use tracing_subscriber::EnvFilter;

mod error;
mod host;
mod proxy;

use host::ProxyHost;
use proxy::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(origin = %config.origin, cache = %config.cache_name(), "starting lampstand");

    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache database {}", config.db_path.display()))?;
    let network: Arc<dyn Network> = Arc::new(HttpNetwork::new(FetchConfig::from_app(&config)?)?);
    let host = Arc::new(ProxyHost::new());
    let worker = OfflineWorker::new(WorkerConfig::from_app(&config)?, db, network.clone(), host.clone());

    let app = proxy::router(AppState { worker: worker.clone(), network, host });
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!("listening on http://{}", config.listen_addr);

    tokio::spawn(async move {
        match worker.start().await {
            Ok(state) => tracing::info!(%state, "offline engine started"),
            Err(e) => tracing::error!("offline engine unavailable, passing requests through: {e}"),
        }
    });

    axum::serve(listener, app).await?;
    Ok(())
}
