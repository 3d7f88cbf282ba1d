use std::sync::Arc;

use anyhow::{Context, Result};
use obia_api::{router, AppConfig, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = AppConfig::from_env()?;

    let state = AppState::new(&cfg.data_dir, cfg.raster_cache_mb)
        .with_context(|| format!("Failed to prepare data directory {}", cfg.data_dir.display()))?;
    info!(
        uploads = %state.layout.uploads.display(),
        results = %state.layout.results.display(),
        "data directories ready"
    );

    let app = router(Arc::new(state), cfg.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.bind_addr))?;
    info!("obia-api listening on http://{}", cfg.bind_addr);
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
