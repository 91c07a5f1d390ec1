//! Authenticated ingestion: gate, persist, then publish a pointer.

use std::borrow::Cow;
use std::net::IpAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use conduit_queue::{QueueError, QueuePublisher};
use conduit_store::{ObjectStoreClient, StoreError};
use conduit_types::{
    extract_identifier, Locator, Metadata, ObjectName, PointerMessage, CONTENT_TYPE_JSON,
    FALLBACK_IDENTIFIER, POINTER_LABEL, REMOTE_IP_ADDRESS,
};

use crate::auth::{AuthFailure, BasicAuthGate, Identity};
use crate::error::{ErrorBody, ServerError, ServerResult};

/// Source of submission timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Result of one ingestion, mapped onto the HTTP response.
#[derive(Debug)]
pub enum IngestOutcome {
    /// Stored and published. `200` with the pointer.
    Accepted(PointerMessage),
    /// `401` with an empty body. Nothing was stored or published.
    Unauthorized(AuthFailure),
    /// `500`. Nothing was published.
    StorageFailed(StoreError),
    /// `502`. The object is stored; the pointer was not published and can
    /// be re-sent through `POST /v1/republish`.
    PublishFailed {
        pointer: PointerMessage,
        error: QueueError,
    },
    /// `500`. The pipeline task panicked; the object may or may not exist.
    Interrupted(String),
}

impl IngestOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Accepted(_) => StatusCode::OK,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::StorageFailed(_) | Self::Interrupted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PublishFailed { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

#[derive(Serialize)]
struct PublishFailedBody<'a> {
    #[serde(rename = "BlobUri")]
    locator: &'a str,
    error: String,
}

impl IntoResponse for IngestOutcome {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            Self::Accepted(pointer) => (status, Json(pointer)).into_response(),
            Self::Unauthorized(_) => status.into_response(),
            Self::StorageFailed(e) => (status, Json(ErrorBody { error: e.to_string() })).into_response(),
            Self::Interrupted(e) => (status, Json(ErrorBody { error: e })).into_response(),
            Self::PublishFailed { pointer, error } => (
                status,
                Json(PublishFailedBody {
                    locator: &pointer.locator,
                    error: error.to_string(),
                }),
            )
                .into_response(),
        }
    }
}

/// Orchestrates one ingestion request.
///
/// The object write completes before the pointer is published; a publish
/// failure never rolls the object back. Persist and publish run on their own
/// task, so a client disconnecting mid-request cannot stop between the two.
#[derive(Clone)]
pub struct IngestHandler {
    gate: BasicAuthGate,
    store: ObjectStoreClient,
    publisher: QueuePublisher,
    clock: Arc<dyn Clock>,
}

impl IngestHandler {
    pub fn new(gate: BasicAuthGate, store: ObjectStoreClient, publisher: QueuePublisher) -> Self {
        Self {
            gate,
            store,
            publisher: publisher.with_label(POINTER_LABEL),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &ObjectStoreClient {
        &self.store
    }

    /// Check the request credential. Runs before any of the body is read.
    pub fn authorize(&self, headers: &HeaderMap, remote_ip: IpAddr) -> Result<Identity, AuthFailure> {
        match self.gate.check(headers) {
            Ok(identity) => {
                debug!(user = %identity.name, "authenticated");
                Ok(identity)
            }
            Err(failure) => {
                error!(remote_ip = %remote_ip, reason = %failure, "authentication failed");
                Err(failure)
            }
        }
    }

    /// Authenticate, then persist and publish.
    pub async fn handle(&self, headers: &HeaderMap, remote_ip: IpAddr, body: &[u8]) -> IngestOutcome {
        if let Err(failure) = self.authorize(headers, remote_ip) {
            return IngestOutcome::Unauthorized(failure);
        }
        self.ingest(remote_ip, Bytes::copy_from_slice(body)).await
    }

    /// Persist and publish an already authenticated body.
    ///
    /// The work continues on a spawned task even if the returned future is
    /// dropped.
    pub async fn ingest(&self, remote_ip: IpAddr, body: Bytes) -> IngestOutcome {
        info!(remote_ip = %remote_ip, size = body.len(), "ingest request received");
        let this = self.clone();
        let task = tokio::spawn(async move { this.persist_and_publish(remote_ip, &body).await });
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(remote_ip = %remote_ip, error = %e, "ingest task failed");
                IngestOutcome::Interrupted(e.to_string())
            }
        }
    }

    async fn persist_and_publish(&self, remote_ip: IpAddr, body: &[u8]) -> IngestOutcome {
        let text = match String::from_utf8_lossy(body) {
            Cow::Borrowed(text) => Cow::Borrowed(text),
            Cow::Owned(text) => {
                warn!(remote_ip = %remote_ip, "request body is not valid UTF-8; invalid sequences replaced");
                Cow::Owned(text)
            }
        };

        let identifier = match extract_identifier(&text) {
            Ok(id) => id,
            Err(e) if e.is_parse_failure() => {
                warn!(error = %e, "could not parse identifier; using {FALLBACK_IDENTIFIER}");
                FALLBACK_IDENTIFIER.to_string()
            }
            Err(e) => {
                debug!(reason = %e, "no identifier; using {FALLBACK_IDENTIFIER}");
                FALLBACK_IDENTIFIER.to_string()
            }
        };
        let name = ObjectName::generate(self.clock.now(), &identifier);

        let mut metadata = Metadata::new();
        metadata.insert(REMOTE_IP_ADDRESS.to_string(), remote_ip.to_canonical().to_string());

        let object = match self
            .store
            .create_text(name.as_str(), &text, CONTENT_TYPE_JSON, Some(metadata))
            .await
        {
            Ok(object) => object,
            Err(e) => {
                error!(name = %name, error = %e, "failed to store payload");
                return IngestOutcome::StorageFailed(e);
            }
        };

        let pointer = PointerMessage::new(&object.locator);
        info!(locator = %object.locator, "pushing pointer to the queue");
        if let Err(e) = self.publisher.push(&pointer).await {
            error!(
                locator = %object.locator,
                error = %e,
                "payload stored but pointer not published; republish to notify consumers"
            );
            return IngestOutcome::PublishFailed { pointer, error: e };
        }

        IngestOutcome::Accepted(pointer)
    }

    /// Publish a pointer for an object that is already stored.
    ///
    /// Like ingestion, the publish finishes even if the caller goes away.
    pub async fn republish(&self, locator: &Locator) -> ServerResult<PointerMessage> {
        let store = self.store.clone();
        let publisher = self.publisher.clone();
        let locator = locator.clone();
        tokio::spawn(async move { republish(&store, &publisher, &locator).await })
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?
    }
}

/// Publish a pointer for an object that is already stored, labelled as the
/// ingestion path labels it.
///
/// Fails with `StoreError::NotFound` when the locator does not resolve; the
/// queue is not contacted then.
pub async fn republish(
    store: &ObjectStoreClient,
    publisher: &QueuePublisher,
    locator: &Locator,
) -> ServerResult<PointerMessage> {
    let object = store.read(locator).await?;
    let pointer = PointerMessage::new(&object.object.locator);
    let id = publisher
        .clone()
        .with_label(POINTER_LABEL)
        .push(&pointer)
        .await?;
    info!(locator = %locator, %id, "pointer republished");
    Ok(pointer)
}

impl std::fmt::Debug for IngestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestHandler")
            .field("store", &self.store)
            .field("publisher", &self.publisher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::http::header::AUTHORIZATION;
    use axum::http::HeaderValue;
    use chrono::TimeZone;
    use conduit_queue::{Delivery, InMemoryQueue, QueueMessage, QueueResult, QueueTransport};
    use conduit_store::{
        InMemoryObjectStore, ObjectContent, ObjectProperties, ObjectStore, StoreResult,
        StoredObject, WriteEvents,
    };
    use conduit_types::LocatorScheme;

    use crate::error::ServerError;

    const CREDENTIAL: &str = "aW5nZXN0OnBhc3N3b3Jk"; // ingest:password

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    /// Object store double counting writes; can be told to fail them.
    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryObjectStore,
        puts: AtomicUsize,
        fail: bool,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryObjectStore::with_container("payloads"),
                ..Self::default()
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl ObjectStore for CountingStore {
        fn scheme(&self) -> LocatorScheme {
            self.inner.scheme()
        }
        async fn create_container(&self, container: &str) -> StoreResult<bool> {
            self.inner.create_container(container).await
        }
        async fn container_exists(&self, container: &str) -> StoreResult<bool> {
            self.inner.container_exists(container).await
        }
        async fn put(
            &self,
            container: &str,
            name: &str,
            data: &[u8],
            properties: &ObjectProperties,
        ) -> StoreResult<StoredObject> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StoreError::Io(std::io::Error::other("disk on fire")));
            }
            self.inner.put(container, name, data, properties).await
        }
        async fn get(&self, locator: &Locator) -> StoreResult<Option<ObjectContent>> {
            self.inner.get(locator).await
        }
        fn subscribe(&self) -> WriteEvents {
            self.inner.subscribe()
        }
    }

    /// Holds `send` until released, signalling when a send has started.
    #[derive(Default)]
    struct SendGate {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    /// Queue double counting sends; can be told to fail or hold them.
    struct CountingQueue {
        inner: InMemoryQueue,
        sends: AtomicUsize,
        fail: bool,
        gate: Option<SendGate>,
    }

    impl CountingQueue {
        fn new(fail: bool) -> Self {
            Self {
                inner: InMemoryQueue::new("pointers"),
                sends: AtomicUsize::new(0),
                fail,
                gate: None,
            }
        }

        fn gated() -> Self {
            Self {
                gate: Some(SendGate::default()),
                ..Self::new(false)
            }
        }
    }

    #[async_trait]
    impl QueueTransport for CountingQueue {
        fn name(&self) -> &str {
            self.inner.name()
        }
        async fn send(&self, message: QueueMessage) -> QueueResult<()> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
            if self.fail {
                return Err(QueueError::Closed);
            }
            self.inner.send(message).await
        }
        async fn receive(&self) -> QueueResult<Delivery> {
            self.inner.receive().await
        }
        async fn try_receive(&self) -> QueueResult<Option<Delivery>> {
            self.inner.try_receive().await
        }
        async fn complete(&self, delivery: &Delivery) -> QueueResult<()> {
            self.inner.complete(delivery).await
        }
        async fn abandon(&self, delivery: &Delivery) -> QueueResult<()> {
            self.inner.abandon(delivery).await
        }
        fn len(&self) -> usize {
            self.inner.len()
        }
        fn close(&self) {
            self.inner.close()
        }
    }

    struct Fixture {
        store: Arc<CountingStore>,
        queue: Arc<CountingQueue>,
        handler: IngestHandler,
    }

    fn fixture_with(store: CountingStore, queue: CountingQueue) -> Fixture {
        let store = Arc::new(store);
        let queue = Arc::new(queue);
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let handler = IngestHandler::new(
            BasicAuthGate::new(CREDENTIAL),
            ObjectStoreClient::new(store.clone(), "payloads"),
            QueuePublisher::new(queue.clone()),
        )
        .with_clock(Arc::new(FixedClock(at)));
        Fixture {
            store,
            queue,
            handler,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(CountingStore::new(), CountingQueue::new(false))
    }

    fn auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9))
    }

    #[tokio::test]
    async fn accepted_request_stores_then_publishes() {
        let f = fixture();
        let outcome = f
            .handler
            .handle(&auth(&format!("Basic {CREDENTIAL}")), ip(), br#"{"id":"X1","v":1}"#)
            .await;

        let IngestOutcome::Accepted(pointer) = outcome else {
            panic!("expected acceptance");
        };
        assert_eq!(pointer.locator, "memory://payloads/2024-05-01-10-00-00-000-X1.json");

        let stored = f.handler.store().read(&pointer.locator().unwrap()).await.unwrap();
        assert_eq!(stored.text(), r#"{"id":"X1","v":1}"#);
        assert_eq!(stored.object.content_type, "application/json");
        assert_eq!(stored.object.metadata[REMOTE_IP_ADDRESS], "203.0.113.9");

        let delivery = f.queue.receive().await.unwrap();
        assert_eq!(delivery.message.label.as_deref(), Some(POINTER_LABEL));
        assert_eq!(PointerMessage::from_json(&delivery.message.body).unwrap(), pointer);
        assert_eq!(f.store.puts.load(Ordering::SeqCst), 1);
        assert_eq!(f.queue.sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_requests_touch_nothing() {
        let f = fixture();
        let cases = [
            HeaderMap::new(),
            auth("Basic d3Jvbmc6d3Jvbmc="),
            auth("Bearer aW5nZXN0OnBhc3N3b3Jk"),
            auth("Basic"),
            auth("B@sic x"),
        ];
        for headers in cases {
            let outcome = f.handler.handle(&headers, ip(), br#"{"id":"X1"}"#).await;
            assert!(matches!(outcome, IngestOutcome::Unauthorized(_)));
            assert_eq!(outcome.status(), StatusCode::UNAUTHORIZED);
        }
        assert_eq!(f.store.puts.load(Ordering::SeqCst), 0);
        assert_eq!(f.queue.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unparseable_body_uses_fallback_identifier() {
        let f = fixture();
        let headers = auth(&format!("Basic {CREDENTIAL}"));
        for body in [&b"not json"[..], b"{}", br#"{"id":7}"#, br#"{"id":"  "}"#] {
            let outcome = f.handler.handle(&headers, ip(), body).await;
            let IngestOutcome::Accepted(pointer) = outcome else {
                panic!("expected acceptance");
            };
            assert!(pointer.locator.ends_with("-UnknownId.json"), "{}", pointer.locator);
        }
    }

    #[tokio::test]
    async fn invalid_utf8_is_stored_with_replacements() {
        let f = fixture();
        let outcome = f
            .handler
            .handle(&auth(&format!("Basic {CREDENTIAL}")), ip(), b"{\"id\":\"a\xFFb\"}")
            .await;
        let IngestOutcome::Accepted(pointer) = outcome else {
            panic!("expected acceptance");
        };
        let text = f
            .handler
            .store()
            .read_as_text(&pointer.locator().unwrap())
            .await
            .unwrap();
        assert_eq!(text, "{\"id\":\"a\u{FFFD}b\"}");
        assert!(pointer.locator.ends_with("-a_b.json"));
    }

    #[tokio::test]
    async fn same_millisecond_same_id_collides() {
        let f = fixture();
        let headers = auth(&format!("Basic {CREDENTIAL}"));
        let first = f.handler.handle(&headers, ip(), br#"{"id":"dup","n":1}"#).await;
        let second = f.handler.handle(&headers, ip(), br#"{"id":"dup","n":2}"#).await;
        let (IngestOutcome::Accepted(a), IngestOutcome::Accepted(b)) = (first, second) else {
            panic!("expected acceptance");
        };
        assert_eq!(a, b);
        let text = f.handler.store().read_as_text(&b.locator().unwrap()).await.unwrap();
        assert_eq!(text, r#"{"id":"dup","n":2}"#);
        assert_eq!(f.queue.len(), 2);
    }

    #[tokio::test]
    async fn storage_failure_skips_publish() {
        let f = fixture_with(CountingStore::failing(), CountingQueue::new(false));
        let outcome = f
            .handler
            .handle(&auth(&format!("Basic {CREDENTIAL}")), ip(), br#"{"id":"X1"}"#)
            .await;
        assert!(matches!(outcome, IngestOutcome::StorageFailed(_)));
        assert_eq!(outcome.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(f.store.puts.load(Ordering::SeqCst), 1);
        assert_eq!(f.queue.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn publish_failure_keeps_object_and_reports_locator() {
        let f = fixture_with(CountingStore::new(), CountingQueue::new(true));
        let outcome = f
            .handler
            .handle(&auth(&format!("Basic {CREDENTIAL}")), ip(), br#"{"id":"X1"}"#)
            .await;
        assert_eq!(outcome.status(), StatusCode::BAD_GATEWAY);
        let IngestOutcome::PublishFailed { pointer, .. } = outcome else {
            panic!("expected publish failure");
        };
        assert!(f.handler.store().read(&pointer.locator().unwrap()).await.is_ok());
        assert_eq!(f.queue.len(), 0);
    }

    #[tokio::test]
    async fn dropped_request_still_publishes_stored_object() {
        let f = fixture_with(CountingStore::new(), CountingQueue::gated());
        let gate = f.queue.gate.as_ref().unwrap();
        let headers = auth(&format!("Basic {CREDENTIAL}"));

        // The client goes away once the object is stored and the push began.
        tokio::select! {
            _ = f.handler.handle(&headers, ip(), br#"{"id":"X1"}"#) => {
                panic!("send should be held");
            }
            _ = gate.entered.notified() => {}
        }
        assert_eq!(f.store.inner.len(), 1);

        gate.release.notify_one();
        let delivery = tokio::time::timeout(std::time::Duration::from_secs(2), f.queue.receive())
            .await
            .expect("pointer was never published")
            .unwrap();
        let pointer = PointerMessage::from_json(&delivery.message.body).unwrap();
        assert!(pointer.locator.ends_with("-X1.json"));
    }

    #[tokio::test]
    async fn republish_sends_pointer_for_stored_object() {
        let f = fixture();
        let headers = auth(&format!("Basic {CREDENTIAL}"));
        let IngestOutcome::Accepted(pointer) = f.handler.handle(&headers, ip(), b"{}").await else {
            panic!("expected acceptance");
        };
        let _ = f.queue.receive().await.unwrap();

        let again = f.handler.republish(&pointer.locator().unwrap()).await.unwrap();
        assert_eq!(again, pointer);
        let delivery = f.queue.receive().await.unwrap();
        assert_eq!(PointerMessage::from_json(&delivery.message.body).unwrap(), pointer);
    }

    #[tokio::test]
    async fn republish_unknown_locator_fails() {
        let f = fixture();
        let missing = Locator::memory("payloads", "missing.json").unwrap();
        let err = f.handler.republish(&missing).await.unwrap_err();
        assert!(matches!(err, ServerError::Store(StoreError::NotFound(_))));
        assert_eq!(f.queue.sends.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn authorize_checks_headers_only() {
        let f = fixture();
        assert!(f.handler.authorize(&HeaderMap::new(), ip()).is_err());
        let identity = f
            .handler
            .authorize(&auth(&format!("Basic {CREDENTIAL}")), ip())
            .unwrap();
        assert_eq!(identity.name, "ingest");
        assert_eq!(f.store.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn response_bodies() {
        use axum::body::to_bytes;

        let loc = Locator::memory("payloads", "a.json").unwrap();
        let response = IngestOutcome::PublishFailed {
            pointer: PointerMessage::new(&loc),
            error: QueueError::Closed,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["BlobUri"], "memory://payloads/a.json");
        assert_eq!(json["error"], "queue is closed");

        let response = IngestOutcome::Unauthorized(AuthFailure::MissingHeader).into_response();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }
}
