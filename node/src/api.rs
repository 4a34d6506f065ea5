use crate::rooms::RelayState;
use axum::{
    extract::{Path, State},
    http::Method,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/rooms/:room", get(room_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP inspector
pub async fn start_api_server(addr: SocketAddr, state: RelayState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 Room inspector listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "simnet-node",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Current members of a room. Unknown rooms are simply empty.
async fn room_handler(
    State(state): State<RelayState>,
    Path(room): Path<String>,
) -> impl IntoResponse {
    Json(state.room(&room).await)
}
