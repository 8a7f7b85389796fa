//! HTTP routes and handlers.

use crate::domain::error::RelayError;
use crate::domain::pending::CorrelationRegistry;
use crate::middleware::{RelayMetrics, TracingLayer};
use crate::relay::{CallbackIntake, Dispatcher, Processor};
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{debug, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub intake: Arc<CallbackIntake>,
    pub processor: Arc<Processor>,
    pub registry: Arc<CorrelationRegistry>,
    pub metrics: Arc<RelayMetrics>,
    /// `host:port` of this instance
    pub authority: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

/// Build the relay router.
///
/// Layer order: Request → Tracing → BodyLimit → Handler
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    let limits = ServiceBuilder::new()
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes));
    let tracing = TracingLayer::new(Arc::clone(&state.metrics));

    Router::new()
        .route("/", post(handle_process))
        .route("/api", post(handle_api))
        .route("/callback", post(handle_callback))
        .route("/health", get(health_check))
        .route("/pending", get(pending_status))
        .route("/metrics", get(metrics_snapshot))
        .layer(limits)
        .layer(tracing)
        .with_state(state)
}

/// Forwarding entry point: acknowledge now, call back later
async fn handle_process(State(state): State<AppState>, body: Bytes) -> Response {
    match state.processor.accept(&body) {
        Ok((id, _callback)) => {
            debug!(correlation_id = %id, "Accepted forwarded work");
            StatusCode::ACCEPTED.into_response()
        }
        Err(e) => {
            warn!(error = %e, "Rejected forwarded work");
            e.into_response()
        }
    }
}

/// Client entry point: relay the body to a peer and wait for the result
async fn handle_api(State(state): State<AppState>, body: Bytes) -> Response {
    let work = format!(
        "{}, api request {}",
        String::from_utf8_lossy(&body),
        state.authority
    );

    match state.dispatcher.submit_default(work).await {
        Ok(payload) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            payload,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Peer entry point: route a result to its waiting request
async fn handle_callback(State(state): State<AppState>, body: Bytes) -> Response {
    match state.intake.deliver(body) {
        Ok(id) => Json(serde_json::json!({ "delivered": id })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "async-relay",
        "version": crate::VERSION,
    }))
}

async fn pending_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "count": state.registry.pending_count(),
        "stats": state.registry.stats().to_json(),
    }))
}

async fn metrics_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::correlation::{CorrelationId, UuidV7Generator};
    use crate::relay::forwarder::channel::ChannelForwarder;
    use crate::relay::StaticPeers;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_state() -> (
        AppState,
        tokio::sync::mpsc::UnboundedReceiver<crate::relay::forwarder::channel::Forwarded>,
    ) {
        let (forwarder, rx) = ChannelForwarder::new();
        let forwarder = Arc::new(forwarder);
        let registry = Arc::new(CorrelationRegistry::new());
        let metrics = Arc::new(RelayMetrics::new());

        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            forwarder.clone(),
            Arc::new(StaticPeers::new(vec!["http://peer:3002/".into()])),
            Arc::new(UuidV7Generator),
            "http://localhost:3001/callback",
            Duration::from_secs(2),
            Arc::clone(&metrics),
        );

        let state = AppState {
            dispatcher: Arc::new(dispatcher),
            intake: Arc::new(CallbackIntake::new(Arc::clone(&registry), Arc::clone(&metrics))),
            processor: Arc::new(Processor::new(forwarder, "localhost:3001", Arc::clone(&metrics))),
            registry,
            metrics,
            authority: "localhost:3001".into(),
        };
        (state, rx)
    }

    fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(body.into())
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (state, _rx) = test_state();
        let app = build_router(state, 1024);

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "async-relay");
    }

    #[tokio::test]
    async fn test_unknown_callback_is_not_found() {
        let (state, _rx) = test_state();
        let app = build_router(state, 1024);

        let response = app
            .oneshot(post("/callback", r#"{"callback":"","id":"nobody","body":"x"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "unknown_id");
    }

    #[tokio::test]
    async fn test_malformed_callback_is_bad_request() {
        let (state, _rx) = test_state();
        let app = build_router(state, 1024);

        let response = app.oneshot(post("/callback", "not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"]["code"], "malformed_payload");
    }

    #[tokio::test]
    async fn test_callback_delivers_to_pending_slot() {
        let (state, _rx) = test_state();
        let registry = Arc::clone(&state.registry);
        let app = build_router(state, 1024);

        let id = CorrelationId::parse("waiting").unwrap();
        let rx = registry.create(id.clone()).unwrap();

        let raw = r#"{"callback":"","id":"waiting","body":"done"}"#;
        let response = app.oneshot(post("/callback", raw)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["delivered"], "waiting");
        assert_eq!(rx.await.unwrap(), Bytes::from(raw));
    }

    #[tokio::test]
    async fn test_process_accepts_and_calls_back() {
        let (state, mut rx) = test_state();
        let app = build_router(state, 1024);

        let raw = r#"{"callback":"http://localhost:3000/callback","id":"w-1","body":"hi"}"#;
        let response = app.oneshot(post("/", raw)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let forwarded = rx.recv().await.unwrap();
        assert_eq!(forwarded.target, "http://localhost:3000/callback");
        assert_eq!(forwarded.message.body, "hi, async request at localhost:3001");
    }

    #[tokio::test]
    async fn test_process_without_callback_is_bad_request() {
        let (state, _rx) = test_state();
        let app = build_router(state, 1024);

        let response = app
            .oneshot(post("/", r#"{"id":"w-2","body":"hi"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_api_round_trip_through_callback() {
        let (state, mut rx) = test_state();
        let app = build_router(state, 1024);

        let api = tokio::spawn(app.clone().oneshot(post("/api", "hello")));

        // Play the peer: take the forwarded message and call back
        let forwarded = rx.recv().await.unwrap();
        assert_eq!(forwarded.target, "http://peer:3002/");
        assert_eq!(forwarded.message.callback, "http://localhost:3001/callback");
        assert_eq!(forwarded.message.body, "hello, api request localhost:3001");

        let mut reply = forwarded.message.clone();
        reply.annotate("async request at peer:3002");
        let callback = app
            .oneshot(post("/callback", serde_json::to_vec(&reply).unwrap()))
            .await
            .unwrap();
        assert_eq!(callback.status(), StatusCode::OK);

        let response = api.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        let json = json_body(response).await;
        assert_eq!(
            json["body"],
            "hello, api request localhost:3001, async request at peer:3002"
        );
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let (state, _rx) = test_state();
        let app = build_router(state, 16);

        let response = app
            .oneshot(post("/callback", vec![b'x'; 64]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_pending_and_metrics_endpoints() {
        let (state, _rx) = test_state();
        let registry = Arc::clone(&state.registry);
        let app = build_router(state, 1024);

        let _rx = registry.create(CorrelationId::parse("p").unwrap()).unwrap();

        let request = Request::builder().uri("/pending").body(Body::empty()).unwrap();
        let json = json_body(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["stats"]["created"], 1);

        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let json = json_body(app.oneshot(request).await.unwrap()).await;
        assert!(json["requests"]["total"].as_u64().unwrap() >= 1);
    }
}
