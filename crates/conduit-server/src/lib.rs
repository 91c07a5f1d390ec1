//! HTTP ingestion for Conduit.
//!
//! `POST /v1/ingest` authenticates the caller against one pre-shared `Basic`
//! credential, stores the body as an immutable JSON object named
//! `{timestamp}-{identifier}.json`, then publishes a `{"BlobUri": ...}`
//! pointer to the queue. The write always completes before the publish.
//!
//! `POST /v1/republish` takes a `{"BlobUri": ...}` body under the same
//! credential and re-sends the pointer for an object that is already stored,
//! through the queue this server already holds open.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod ingest;
pub mod router;
pub mod server;

pub use auth::{authenticate, AuthFailure, BasicAuthGate, Identity};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use ingest::{Clock, IngestHandler, IngestOutcome, SystemClock};
pub use server::ConduitServer;

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use tower::util::ServiceExt;

    use conduit_queue::{InMemoryQueue, QueuePublisher, QueueTransport};
    use conduit_store::{InMemoryObjectStore, ObjectStoreClient};
    use conduit_types::{PointerMessage, REMOTE_IP_ADDRESS};

    const CREDENTIAL: &str = "aW5nZXN0OnBhc3N3b3Jk";

    struct App {
        store: Arc<InMemoryObjectStore>,
        queue: Arc<InMemoryQueue>,
        router: Router,
    }

    fn app(config: ServerConfig) -> App {
        let store = Arc::new(InMemoryObjectStore::with_container("payloads"));
        let queue = Arc::new(InMemoryQueue::new("pointers"));
        let ingest = IngestHandler::new(
            BasicAuthGate::new(CREDENTIAL),
            ObjectStoreClient::new(store.clone(), "payloads"),
            QueuePublisher::new(queue.clone()),
        );
        let router = router::build_router(ingest, &config)
            .layer(MockConnectInfo(SocketAddr::from(([198, 51, 100, 4], 50000))));
        App {
            store,
            queue,
            router,
        }
    }

    fn ingest_request(authorization: Option<&str>, body: impl Into<Body>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/v1/ingest");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(body.into()).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = app(ServerConfig::default());
        let response = app
            .router
            .oneshot(
                Request::builder()
                    .uri("/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: handler::HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health, handler::HealthResponse::default());
    }

    #[tokio::test]
    async fn ingest_x1_end_to_end() {
        let app = app(ServerConfig::default());
        let response = app
            .router
            .oneshot(ingest_request(
                Some(format!("Basic {CREDENTIAL}").as_str()),
                r#"{"id":"X1"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let pointer: PointerMessage = serde_json::from_slice(&body).unwrap();
        assert!(pointer.locator.starts_with("memory://payloads/"));
        assert!(pointer.locator.ends_with("-X1.json"));

        assert_eq!(app.store.len(), 1);
        let locator = pointer.locator().unwrap();
        let stored = ObjectStoreClient::new(app.store.clone(), "payloads")
            .read(&locator)
            .await
            .unwrap();
        assert_eq!(stored.text(), r#"{"id":"X1"}"#);
        assert_eq!(stored.object.metadata[REMOTE_IP_ADDRESS], "198.51.100.4");

        assert_eq!(app.queue.len(), 1);
        let delivery = app.queue.receive().await.unwrap();
        assert_eq!(PointerMessage::from_json(&delivery.message.body).unwrap(), pointer);
    }

    #[tokio::test]
    async fn wrong_credential_is_401_with_empty_body() {
        let app = app(ServerConfig::default());
        let response = app
            .router
            .oneshot(ingest_request(Some("Basic d3Jvbmc6d3Jvbmc="), r#"{"id":"X1"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
        assert!(app.store.is_empty());
        assert!(app.queue.is_empty());
    }

    #[tokio::test]
    async fn missing_credential_is_401() {
        let app = app(ServerConfig::default());
        let response = app
            .router
            .oneshot(ingest_request(None, "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(app.store.is_empty());
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let config = ServerConfig {
            max_body_bytes: 16,
            ..ServerConfig::default()
        };
        let app = app(config);
        let response = app
            .router
            .oneshot(ingest_request(
                Some(format!("Basic {CREDENTIAL}").as_str()),
                r#"{"id":"X1","padding":"xxxxxxxxxxxxxxxx"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(app.store.is_empty());
        assert!(app.queue.is_empty());
    }

    #[tokio::test]
    async fn missing_credential_beats_oversized_body() {
        let config = ServerConfig {
            max_body_bytes: 16,
            ..ServerConfig::default()
        };
        let app = app(config);
        let response = app
            .router
            .oneshot(ingest_request(None, "x".repeat(64)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(app.store.is_empty());
    }

    fn republish_request(authorization: Option<&str>, locator: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/v1/republish")
            .header(CONTENT_TYPE, "application/json");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        let body = serde_json::json!({ "BlobUri": locator }).to_string();
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn republish_endpoint_resends_pointer() {
        let app = app(ServerConfig::default());
        let basic = format!("Basic {CREDENTIAL}");
        let response = app
            .router
            .clone()
            .oneshot(ingest_request(Some(basic.as_str()), r#"{"id":"R1"}"#))
            .await
            .unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let pointer: PointerMessage = serde_json::from_slice(&body).unwrap();
        let first = app.queue.receive().await.unwrap();
        app.queue.complete(&first).await.unwrap();

        let response = app
            .router
            .clone()
            .oneshot(republish_request(Some(basic.as_str()), &pointer.locator))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let delivery = app.queue.receive().await.unwrap();
        assert_eq!(PointerMessage::from_json(&delivery.message.body).unwrap(), pointer);
        assert_eq!(delivery.message.label.as_deref(), Some(conduit_types::POINTER_LABEL));

        let response = app
            .router
            .clone()
            .oneshot(republish_request(Some(basic.as_str()), "memory://payloads/missing.json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .router
            .oneshot(republish_request(None, &pointer.locator))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        // Only the republished delivery, still in flight; 404 and 401 sent nothing.
        assert_eq!(app.queue.len(), 1);
    }

    #[tokio::test]
    async fn get_on_ingest_is_405() {
        let app = app(ServerConfig::default());
        let response = app
            .router
            .oneshot(Request::builder().uri("/v1/ingest").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
