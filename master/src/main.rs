mod handlers;
mod state;
mod validate;

use crate::state::AppState;
use anyhow::Context;
use common::{RuntimeLimits, ScriptRuntime, WindowCatalog};
use std::env;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// - En Docker: MASTER_LISTEN_ADDR=0.0.0.0:8080 (default)
/// - Local: se puede mover a otro puerto para no chocar con otro master
fn listen_addr() -> String {
    env::var("MASTER_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("master=debug,common=info,tower_http=info")),
        )
        .init();

    let catalog = WindowCatalog::from_env();
    let limits = RuntimeLimits::from_env();
    info!(
        "catálogo con ventanas de {} s, límite de {} operaciones por script",
        catalog.window(),
        limits.max_operations
    );

    let state = AppState::new(catalog, ScriptRuntime::new(limits));

    // router HTTP
    let app = handlers::build_router(state);

    let addr = listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("no se pudo abrir {}", addr))?;
    info!("master escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
