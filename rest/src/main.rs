mod config;
mod form;
mod handlers;
mod state;

use crate::{config::RestConfig, state::AppState};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("nbgwas_rest=debug,nbgwas_common=debug,tower_http=info")
            }),
        )
        .init();

    let config = RestConfig::from_env()?;
    let bind = config.bind.clone();
    let state = AppState::new(config);

    // router HTTP
    let app = handlers::build_router(state.clone());

    let listener = TcpListener::bind(&bind).await?;
    info!(
        "nbgwas-rest escuchando en {} (tareas en {})",
        listener.local_addr()?,
        state.store.base().display()
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
