// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// HTTP surface
//
// Responsibilities:
// - Chat-completions endpoint, blocking JSON or streaming SSE
// - Model listing from the credential registry
// - Heartbeat endpoint
// - Request validation (empty body, malformed JSON, bad shape)
// - Uniform error envelope for every failure, including unknown paths

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use crate::message::ChatCompletionRequest;
use crate::provider::{ChatCompletionResponse, ErrorEnvelope};
use crate::registry::RegistryError;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:9800";

// ---------------------------------------------------------------------------
// Domain types
// ---------------------------------------------------------------------------

pub type SseStream = Pin<Box<dyn Stream<Item = Bytes> + Send>>;

/// What the gateway produced for one chat-completions request.
pub enum GatewayResponse {
    Blocking(ChatCompletionResponse),
    /// Ready-encoded `data:` records.
    Streaming(SseStream),
}

impl std::fmt::Debug for GatewayResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GatewayResponse::Blocking(resp) => f.debug_tuple("Blocking").field(resp).finish(),
            GatewayResponse::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

/// Errors surfaced to the client.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{message}")]
    UpstreamProtocol { status: u16, message: String },

    #[error("upstream request failed: {0}")]
    UpstreamFailure(String),

    #[error("upstream request timed out: {0}")]
    UpstreamTimeout(String),

    #[error("The model `{model}` does not exist")]
    ModelNotFound { model: String, known: Vec<String> },

    #[error("{0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::UpstreamProtocol { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            GatewayError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        match self {
            GatewayError::UpstreamProtocol { message, .. } => {
                ErrorEnvelope::new(message.clone(), "upstream_error", None)
            }
            GatewayError::UpstreamFailure(_) => {
                ErrorEnvelope::new("upstream request failed", "transport_error", None)
            }
            GatewayError::UpstreamTimeout(_) => {
                ErrorEnvelope::new("upstream request timed out", "transport_error", None)
            }
            GatewayError::ModelNotFound { known, .. } => ErrorEnvelope::new(
                format!("{self}; available models: {}", known.join(", ")),
                "invalid_request_error",
                Some("model_not_found"),
            ),
            GatewayError::InvalidRequest(message) => {
                ErrorEnvelope::new(message.clone(), "invalid_request_error", None)
            }
            GatewayError::Internal(_) => {
                ErrorEnvelope::new("internal error", "server_error", Some("internal_error"))
            }
        }
    }
}

impl From<RegistryError> for GatewayError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound { model, known } => GatewayError::ModelNotFound { model, known },
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "request rejected");
        }
        envelope_response(status, &self.envelope())
    }
}

fn envelope_response(status: StatusCode, envelope: &ErrorEnvelope) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        envelope.to_bytes(),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Trait: UpstreamClient (dependency injection point)
// ---------------------------------------------------------------------------

/// Serves chat completions against the agent API.
///
/// Implementations must be Send + Sync so they can be shared across request
/// handlers via `Arc`.
#[async_trait::async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn complete(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<GatewayResponse, GatewayError>;

    /// Public model names, sorted.
    fn models(&self) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn UpstreamClient>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /v1/heartbeat -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

#[derive(serde::Serialize)]
struct ModelEntry {
    id: String,
    object: &'static str,
    owned_by: &'static str,
}

#[derive(serde::Serialize)]
struct ModelList {
    object: &'static str,
    data: Vec<ModelEntry>,
}

/// GET /v1/models
pub async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    let data = state
        .upstream
        .models()
        .into_iter()
        .map(|id| ModelEntry {
            id,
            object: "model",
            owned_by: "agentbridge",
        })
        .collect();
    Json(ModelList {
        object: "list",
        data,
    })
}

/// POST /v1/chat/completions
pub async fn chat_completions(
    State(state): State<AppState>,
    request: Request<Body>,
) -> Response {
    let request = match parse_chat_request(request).await {
        Ok(r) => r,
        Err(e) => return e.into_response(),
    };

    match state.upstream.complete(request).await {
        Ok(GatewayResponse::Blocking(resp)) => Json(resp).into_response(),
        Ok(GatewayResponse::Streaming(stream)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            Body::from_stream(stream.map(Ok::<Bytes, Infallible>)),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

async fn parse_chat_request(request: Request<Body>) -> Result<ChatCompletionRequest, GatewayError> {
    let body = axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES)
        .await
        .map_err(|e| GatewayError::InvalidRequest(format!("failed to read request body: {e}")))?;

    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(GatewayError::InvalidRequest("request body is empty".to_string()));
    }
    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|_| GatewayError::InvalidRequest("request body is not valid JSON".to_string()))?;
    serde_json::from_value(value)
        .map_err(|e| GatewayError::InvalidRequest(format!("invalid request: {e}")))
}

/// Unknown paths.
pub async fn not_found(uri: Uri) -> Response {
    envelope_response(
        StatusCode::NOT_FOUND,
        &ErrorEnvelope::new(
            format!("unknown path: {}", uri.path()),
            "invalid_request_error",
            Some("not_found"),
        ),
    )
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router with the chat, model and heartbeat endpoints.
///
/// The upstream client is injected; the router itself holds no HTTP client.
pub fn build_router(upstream: Arc<dyn UpstreamClient>) -> Router {
    let state = AppState { upstream };

    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/models", get(list_models))
        .route("/v1/heartbeat", get(heartbeat))
        .fallback(not_found)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::provider::{ResponseChoice, ResponseMessage};
    use axum::http::Request;
    use tower::ServiceExt; // for oneshot

    // -----------------------------------------------------------------------
    // Mock upstream clients
    // -----------------------------------------------------------------------

    /// Answers every request with a fixed reply and records what it saw.
    struct MockUpstreamClient {
        reply: String,
        seen: tokio::sync::Mutex<Vec<ChatCompletionRequest>>,
    }

    impl MockUpstreamClient {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                seen: tokio::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl UpstreamClient for MockUpstreamClient {
        async fn complete(
            &self,
            request: ChatCompletionRequest,
        ) -> Result<GatewayResponse, GatewayError> {
            let model = request.model.clone();
            let stream = request.stream;
            self.seen.lock().await.push(request);
            if stream {
                let records = vec![
                    Bytes::from(format!(
                        "data: {{\"choices\":[{{\"delta\":{{\"content\":\"{}\"}}}}]}}\n\n",
                        self.reply
                    )),
                    Bytes::from_static(b"data: [DONE]\n\n"),
                ];
                return Ok(GatewayResponse::Streaming(Box::pin(
                    futures_util::stream::iter(records),
                )));
            }
            Ok(GatewayResponse::Blocking(ChatCompletionResponse {
                id: "chatcmpl-test".to_string(),
                object: "chat.completion",
                created: 0,
                model,
                choices: vec![ResponseChoice {
                    index: 0,
                    message: ResponseMessage {
                        role: Role::Assistant,
                        content: self.reply.clone(),
                    },
                    finish_reason: "stop",
                }],
                usage: None,
            }))
        }

        fn models(&self) -> Vec<String> {
            vec!["agent-a".to_string(), "agent-b".to_string()]
        }
    }

    /// Fails every request with the given error.
    struct FailingClient(fn() -> GatewayError);

    #[async_trait::async_trait]
    impl UpstreamClient for FailingClient {
        async fn complete(
            &self,
            _request: ChatCompletionRequest,
        ) -> Result<GatewayResponse, GatewayError> {
            Err((self.0)())
        }

        fn models(&self) -> Vec<String> {
            Vec::new()
        }
    }

    fn json_request(method: &str, path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    const HELLO: &str = r#"{"model":"agent-a","messages":[{"role":"user","content":"hi"}]}"#;

    // -----------------------------------------------------------------------
    // Chat completions
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn blocking_request_returns_json_completion() {
        let client = Arc::new(MockUpstreamClient::new("hello"));
        let app = build_router(client.clone());

        let resp = app
            .oneshot(json_request("POST", "/v1/chat/completions", HELLO))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let value = body_json(resp).await;
        assert_eq!(value["object"], "chat.completion");
        assert_eq!(value["choices"][0]["message"]["content"], "hello");

        let seen = client.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].model, "agent-a");
        assert!(!seen[0].stream);
    }

    #[tokio::test]
    async fn streaming_request_returns_event_stream() {
        let client = Arc::new(MockUpstreamClient::new("x"));
        let app = build_router(client);

        let body = r#"{"model":"agent-a","stream":true,"messages":[{"role":"user","content":"hi"}]}"#;
        let resp = app
            .oneshot(json_request("POST", "/v1/chat/completions", body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.ends_with("data: [DONE]\n\n"));
    }

    #[tokio::test]
    async fn malformed_json_returns_400() {
        let app = build_router(Arc::new(MockUpstreamClient::new("x")));
        let resp = app
            .oneshot(json_request("POST", "/v1/chat/completions", "this is not json {{{"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let value = body_json(resp).await;
        assert_eq!(value["error"]["type"], "invalid_request_error");
        assert!(value["error"]["message"]
            .as_str()
            .unwrap()
            .contains("not valid JSON"));
    }

    #[tokio::test]
    async fn empty_body_returns_400() {
        let app = build_router(Arc::new(MockUpstreamClient::new("x")));
        let req = Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let value = body_json(resp).await;
        assert!(value["error"]["message"].as_str().unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn unknown_role_returns_400() {
        let app = build_router(Arc::new(MockUpstreamClient::new("x")));
        let body = r#"{"model":"agent-a","messages":[{"role":"wizard","content":"hi"}]}"#;
        let resp = app
            .oneshot(json_request("POST", "/v1/chat/completions", body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let value = body_json(resp).await;
        assert!(value["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("invalid request"));
    }

    #[tokio::test]
    async fn missing_messages_returns_400() {
        let app = build_router(Arc::new(MockUpstreamClient::new("x")));
        let resp = app
            .oneshot(json_request("POST", "/v1/chat/completions", r#"{"model":"agent-a"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn concurrent_requests_handled() {
        let client = Arc::new(MockUpstreamClient::new("ok"));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let app = build_router(client.clone());
            handles.push(tokio::spawn(async move {
                app.oneshot(json_request("POST", "/v1/chat/completions", HELLO))
                    .await
                    .unwrap()
                    .status()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), StatusCode::OK);
        }
        assert_eq!(client.seen.lock().await.len(), 10);
    }

    // -----------------------------------------------------------------------
    // Errors
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn unknown_model_is_404_with_code() {
        let app = build_router(Arc::new(FailingClient(|| GatewayError::ModelNotFound {
            model: "nope".to_string(),
            known: vec!["agent-a".to_string()],
        })));
        let resp = app
            .oneshot(json_request("POST", "/v1/chat/completions", HELLO))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let value = body_json(resp).await;
        assert_eq!(value["error"]["code"], "model_not_found");
        assert_eq!(value["error"]["type"], "invalid_request_error");
        assert!(value["error"]["message"].as_str().unwrap().contains("agent-a"));
    }

    #[tokio::test]
    async fn upstream_protocol_error_keeps_upstream_status() {
        let app = build_router(Arc::new(FailingClient(|| GatewayError::UpstreamProtocol {
            status: 429,
            message: "rate limited".to_string(),
        })));
        let resp = app
            .oneshot(json_request("POST", "/v1/chat/completions", HELLO))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let value = body_json(resp).await;
        assert_eq!(
            value,
            serde_json::json!({"error": {"message": "rate limited", "type": "upstream_error"}})
        );
    }

    #[tokio::test]
    async fn upstream_timeout_returns_504() {
        let app = build_router(Arc::new(FailingClient(|| {
            GatewayError::UpstreamTimeout("request timed out after 5000ms".to_string())
        })));
        let resp = app
            .oneshot(json_request("POST", "/v1/chat/completions", HELLO))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body_json(resp).await["error"]["type"], "transport_error");
    }

    #[test]
    fn error_status_mapping() {
        assert_eq!(
            GatewayError::UpstreamFailure("refused".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::InvalidRequest("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::Internal("oops".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            GatewayError::UpstreamProtocol {
                status: 1000,
                message: "weird".into()
            }
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let env = GatewayError::Internal("secret stack trace".into()).envelope();
        assert_eq!(env.error.message, "internal error");
        assert_eq!(env.error.code.as_deref(), Some("internal_error"));
        let env = GatewayError::UpstreamFailure("10.0.0.5 refused".into()).envelope();
        assert!(!env.error.message.contains("10.0.0.5"));
    }

    #[test]
    fn registry_error_converts_to_model_not_found() {
        let err: GatewayError = RegistryError::NotFound {
            model: "m".to_string(),
            known: vec![],
        }
        .into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    // -----------------------------------------------------------------------
    // Other endpoints
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn models_endpoint_lists_registry() {
        let app = build_router(Arc::new(MockUpstreamClient::new("x")));
        let req = Request::builder()
            .uri("/v1/models")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let value = body_json(resp).await;
        assert_eq!(value["object"], "list");
        assert_eq!(value["data"][0]["id"], "agent-a");
        assert_eq!(value["data"][1]["id"], "agent-b");
        assert_eq!(value["data"][0]["owned_by"], "agentbridge");
        assert_eq!(value["data"][0]["object"], "model");
    }

    #[tokio::test]
    async fn heartbeat_returns_200() {
        let app = build_router(Arc::new(MockUpstreamClient::new("x")));
        let req = Request::builder()
            .method("GET")
            .uri("/v1/heartbeat")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_returns_404_envelope() {
        let app = build_router(Arc::new(MockUpstreamClient::new("x")));
        let resp = app
            .oneshot(json_request("POST", "/v1/messages", "{}"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let value = body_json(resp).await;
        assert_eq!(value["error"]["code"], "not_found");
        assert!(value["error"]["message"]
            .as_str()
            .unwrap()
            .contains("/v1/messages"));
    }
}
