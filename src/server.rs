use axum::{Router, routing::get};
use tokio::net::TcpListener;

use crate::{Res, api, api::AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::index))
        .route("/health", get(api::health))
        .route("/login", get(api::login))
        .route("/callback", get(api::callback))
        .route("/authorized", get(api::authorized))
        .route("/dashboard", get(api::dashboard))
        .route("/run-algorithm", get(api::run_algorithm))
        .route("/me", get(api::me))
        .with_state(state)
}

/// Binds the configured address and serves until the task is dropped.
pub async fn start_api_server(state: AppState) -> Res<()> {
    let listener = TcpListener::bind(&state.config.server_address).await?;
    serve(listener, state).await
}

pub async fn serve(listener: TcpListener, state: AppState) -> Res<()> {
    tracing::info!(addr = %listener.local_addr()?, "api server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
