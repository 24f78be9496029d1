use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use wf_domain::config::Config;
use wf_gateway::api;
use wf_gateway::bootstrap::build_app_state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing ──────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,wf_gateway=debug")),
        )
        .json()
        .init();

    tracing::info!("Wayfarer starting");

    // ── Config ───────────────────────────────────────────────────────
    let config_path = std::env::var("WF_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config: Config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .with_context(|| format!("reading {config_path}"))?;
        toml::from_str(&raw).with_context(|| format!("parsing {config_path}"))?
    } else {
        tracing::warn!(path = %config_path, "config file not found, using defaults");
        Config::default()
    };
    let config = Arc::new(config);
    let bind_addr = config.server.bind_addr();

    // ── App state + workers ──────────────────────────────────────────
    let state = build_app_state(config).await?;
    let tasks = state.tasks.clone();

    // ── HTTP server ──────────────────────────────────────────────────
    let app = api::build_router(state).layer(CorsLayer::permissive());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    tasks.stop();
    tracing::info!("Wayfarer stopped");
    Ok(())
}
