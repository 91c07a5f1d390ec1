use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::handler;
use crate::ingest::IngestHandler;

/// Build the axum router with all Conduit endpoints.
///
/// The ingest and republish routes need `ConnectInfo<SocketAddr>`: serve it with
/// `into_make_service_with_connect_info`, or layer `MockConnectInfo` in tests.
pub fn build_router(ingest: IngestHandler, config: &ServerConfig) -> Router {
    Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/ingest", post(handler::ingest_handler))
        .route("/v1/republish", post(handler::republish_handler))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(ingest)
}
