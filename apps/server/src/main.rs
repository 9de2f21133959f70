mod error;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use doc_translator_core::{
    AppConfig, BatchRegistry, CleanupSweeper, HttpTranslator, Scheduler, TaskStore,
};

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(AppConfig::from_env());
    config.validate().context("configuration is invalid")?;

    let store = Arc::new(TaskStore::new(config.tasks_dir())?);
    store.reload().context("could not restore task records")?;

    let translator = Arc::new(HttpTranslator::new(config.openai.clone())?);
    let scheduler = Scheduler::new(store.clone(), config.clone(), translator);
    scheduler.resume();

    let sweeper = Arc::new(CleanupSweeper::new(store.clone(), &config));
    Arc::clone(&sweeper).spawn_schedule();

    let app_state = AppState {
        config: config.clone(),
        store,
        scheduler,
        batches: Arc::new(BatchRegistry::new()),
    };

    // Batch uploads carry up to 10 files; leave headroom for multipart
    // framing and the option fields.
    let body_limit = config.files.max_file_size as usize * 10 + 1024 * 1024;

    let app = routes::router(app_state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("could not bind {}", addr))?;
    info!("document translation service listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install ctrl-c handler: {}", e);
        return;
    }
    info!("shutdown requested");
}
