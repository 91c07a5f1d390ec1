use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, FromRequest, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tracing::warn;

use conduit_types::PointerMessage;

use crate::error::ServerError;
use crate::ingest::{IngestHandler, IngestOutcome};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        }
    }
}

/// Health check handler.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// `POST /v1/ingest`.
///
/// The credential is checked on the headers before the body is read, so an
/// unauthenticated request is answered `401` whatever its size.
pub async fn ingest_handler(
    State(ingest): State<IngestHandler>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    if let Err(failure) = ingest.authorize(&parts.headers, remote.ip()) {
        return IngestOutcome::Unauthorized(failure).into_response();
    }
    match Bytes::from_request(Request::from_parts(parts, body), &()).await {
        Ok(body) => ingest.ingest(remote.ip(), body).await.into_response(),
        Err(rejection) => {
            warn!(remote_ip = %remote.ip(), error = %rejection, "request body rejected");
            rejection.into_response()
        }
    }
}

/// `POST /v1/republish` with body `{"BlobUri": "<locator>"}`.
///
/// Re-sends the pointer for a stored object through this server's queue.
pub async fn republish_handler(
    State(ingest): State<IngestHandler>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    if ingest.authorize(&parts.headers, remote.ip()).is_err() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let Json(pointer) =
        match Json::<PointerMessage>::from_request(Request::from_parts(parts, body), &()).await {
            Ok(json) => json,
            Err(rejection) => return rejection.into_response(),
        };
    let locator = match pointer.locator() {
        Ok(locator) => locator,
        Err(e) => return ServerError::from(e).into_response(),
    };
    match ingest.republish(&locator).await {
        Ok(pointer) => Json(pointer).into_response(),
        Err(e) => {
            warn!(locator = %locator, error = %e, "republish failed");
            e.into_response()
        }
    }
}
