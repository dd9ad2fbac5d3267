// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Gateway pipeline
//
// Wires the per-request flow for blocking and streaming turns:
// - Resolve the model name to an upstream credential
// - Extract the latest query and image references
// - Recover conversation state (continuation token or rendered history)
// - Upload images through the file collaborator
// - Build and send the upstream request
// - Blocking: adapt the upstream result into a chat completion
// - Streaming: hand the upstream body to the StreamProcessor

use crate::codec::{has_history, render_history, ConversationMode, ConversationState};
use crate::config::Config;
use crate::extract::extract;
use crate::message::ChatCompletionRequest;
use crate::provider::{
    build_chat_response, build_upstream_request, parse_upstream_result, upstream_error_message,
    FileReference,
};
use crate::proxy::{GatewayError, GatewayResponse, UpstreamClient};
use crate::registry::{Credential, CredentialResolver};
use crate::stream::{StreamError, StreamMeta, StreamProcessor};
use crate::upload::{FileUploader, HttpFileUploader};
use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use futures_util::TryStreamExt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;


// ---------------------------------------------------------------------------
// Request context for structured logging
// ---------------------------------------------------------------------------

struct RequestContext {
    request_id: String,
    model: String,
    mode: &'static str,
    stream: bool,
}

// ---------------------------------------------------------------------------
// Interfaces
// ---------------------------------------------------------------------------

/// Sends HTTP requests to the agent API.
#[async_trait]
pub trait HttpSender: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

// ---------------------------------------------------------------------------
// Transport types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub timeout_ms: Option<u64>,
    pub stream: bool,
}

pub enum HttpBody {
    Full(Bytes),
    Stream(Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send>>),
}

pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: HttpBody,
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("upstream request timed out: {0}")]
    Timeout(String),
}

impl From<HttpError> for GatewayError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Timeout(msg) => GatewayError::UpstreamTimeout(msg),
            HttpError::Transport(msg) => GatewayError::UpstreamFailure(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway dependencies
// ---------------------------------------------------------------------------

pub struct GatewayDeps {
    pub config: Arc<Config>,
    pub http: Arc<dyn HttpSender>,
    pub credentials: Arc<dyn CredentialResolver>,
    pub uploader: Arc<dyn FileUploader>,
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Upstream client that translates chat completions into agent API calls.
pub struct Gateway {
    deps: GatewayDeps,
    processor: StreamProcessor,
}

impl Gateway {
    pub fn new_with(deps: GatewayDeps) -> Self {
        let pacing = &deps.config.pacing;
        let processor = StreamProcessor::new(pacing.schedule.clone())
            .with_backlog_warning(pacing.backlog_warn_chars);
        Self { deps, processor }
    }
}

#[async_trait]
impl UpstreamClient for Gateway {
    async fn complete(
        &self,
        request: ChatCompletionRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        let config = &self.deps.config;
        let mode = config.conversation.mode;
        let ctx = RequestContext {
            request_id: Uuid::new_v4().to_string(),
            model: request.model.clone(),
            mode: mode.as_str(),
            stream: request.stream,
        };

        tracing::debug!(
            request_id = %ctx.request_id,
            model = %ctx.model,
            mode = ctx.mode,
            stream = ctx.stream,
            messages = request.messages.len(),
            "processing request"
        );

        // 1) Credential for the requested model
        let credential = self.deps.credentials.resolve(&request.model)?;

        // 2) Latest query and images
        let extracted = extract(&request.messages);

        // 3) Conversation state
        let state = ConversationState::from_history(mode, &request.messages);
        let query = if mode == ConversationMode::Historical && has_history(&request.messages) {
            render_history(&request.messages, &extracted.query)
        } else {
            extracted.query
        };
        if let Some(conversation_id) = state.conversation_id() {
            tracing::debug!(
                request_id = %ctx.request_id,
                conversation_id,
                "resuming upstream conversation"
            );
        }

        // 4) Images
        let user = request
            .user
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(config.default_user.as_str())
            .to_string();
        let files = self
            .upload_images(&extracted.image_refs, &credential, &user, &ctx)
            .await;

        // 5) Forward to upstream
        let upstream_request = build_upstream_request(&request, &query, &state, files, &user);
        let body = serde_json::to_vec(&upstream_request)
            .map_err(|e| GatewayError::Internal(format!("failed to encode upstream request: {e}")))?;

        let http_req = HttpRequest {
            method: Method::POST,
            url: config.upstream.chat_messages_url(),
            headers: upstream_headers(&credential, request.stream)?,
            body: Bytes::from(body),
            timeout_ms: (!request.stream).then_some(config.upstream.timeout_ms),
            stream: request.stream,
        };

        let started = Instant::now();
        let upstream = self.deps.http.send(http_req).await?;

        if !upstream.status.is_success() {
            let status = upstream.status.as_u16();
            let body = collect_body(upstream.body).await?;
            let message = upstream_error_message(&body);
            tracing::warn!(
                request_id = %ctx.request_id,
                model = %ctx.model,
                status,
                message = %message,
                "upstream returned error status"
            );
            return Err(GatewayError::UpstreamProtocol { status, message });
        }

        if request.stream {
            return Ok(self.handle_streaming_response(upstream, state, &ctx));
        }

        let body = collect_body(upstream.body).await?;
        let result = parse_upstream_result(&body).map_err(|e| GatewayError::UpstreamProtocol {
            status: StatusCode::BAD_GATEWAY.as_u16(),
            message: e.to_string(),
        })?;
        let response = build_chat_response(&result, &request.model, &state);

        tracing::info!(
            request_id = %ctx.request_id,
            model = %ctx.model,
            mode = ctx.mode,
            stream = false,
            conversation_id = %result.conversation_id,
            answer_chars = result.answer.chars().count(),
            latency_ms = started.elapsed().as_secs_f64() * 1000.0,
            "turn completed"
        );

        Ok(GatewayResponse::Blocking(response))
    }

    fn models(&self) -> Vec<String> {
        self.deps.credentials.model_names()
    }
}

impl Gateway {
    fn handle_streaming_response(
        &self,
        upstream: HttpResponse,
        state: ConversationState,
        ctx: &RequestContext,
    ) -> GatewayResponse {
        let input = into_byte_stream(upstream.body)
            .map_err(|e| StreamError::Transport(e.to_string()));
        let meta = StreamMeta::new(&ctx.model);

        tracing::debug!(
            request_id = %ctx.request_id,
            stream_id = %meta.stream_id,
            "streaming upstream response"
        );

        GatewayResponse::Streaming(Box::pin(self.processor.process(input, meta, state)))
    }

    /// Upload every image; failures are logged and the image dropped.
    async fn upload_images(
        &self,
        image_refs: &[String],
        credential: &Credential,
        user: &str,
        ctx: &RequestContext,
    ) -> Vec<FileReference> {
        if image_refs.is_empty() {
            return Vec::new();
        }
        if !self.deps.config.files.upload {
            tracing::warn!(
                request_id = %ctx.request_id,
                images = image_refs.len(),
                "file upload disabled, dropping images"
            );
            return Vec::new();
        }

        let uploads = image_refs
            .iter()
            .map(|image_ref| self.deps.uploader.upload(image_ref, credential.expose(), user));
        let results = futures_util::future::join_all(uploads).await;

        results
            .into_iter()
            .enumerate()
            .filter_map(|(index, result)| match result {
                Ok(handle) => Some(FileReference::uploaded_image(handle.id)),
                Err(e) => {
                    tracing::warn!(
                        request_id = %ctx.request_id,
                        image_index = index,
                        error = %e,
                        "image upload failed, dropping image"
                    );
                    None
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Reqwest-backed HTTP sender
// ---------------------------------------------------------------------------

pub struct ReqwestHttpSender {
    client: reqwest::Client,
}

impl ReqwestHttpSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpSender for ReqwestHttpSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut req = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .body(request.body);

        if let Some(timeout_ms) = request.timeout_ms {
            req = req.timeout(Duration::from_millis(timeout_ms));
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout(e.to_string())
            } else {
                HttpError::Transport(e.to_string())
            }
        })?;

        let status = resp.status();
        let headers = resp.headers().clone();

        if request.stream {
            let stream = resp
                .bytes_stream()
                .map_err(|e| HttpError::Transport(e.to_string()));
            Ok(HttpResponse {
                status,
                headers,
                body: HttpBody::Stream(Box::pin(stream)),
            })
        } else {
            let body = resp.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    HttpError::Timeout(e.to_string())
                } else {
                    HttpError::Transport(e.to_string())
                }
            })?;
            Ok(HttpResponse {
                status,
                headers,
                body: HttpBody::Full(body),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Public factory for the default gateway
// ---------------------------------------------------------------------------

/// Gateway backed by reqwest for both chat and file uploads.
///
/// The configured timeout bounds the connect phase of every request and the
/// whole exchange of blocking requests.
pub fn build_gateway(
    config: Arc<Config>,
    credentials: Arc<dyn CredentialResolver>,
) -> Result<Gateway, reqwest::Error> {
    let timeout = config.upstream.timeout();
    let client = reqwest::Client::builder()
        .connect_timeout(timeout)
        .build()?;

    let uploader = HttpFileUploader::new(client.clone(), config.upstream.base_url.clone())
        .with_timeout(timeout)
        .with_max_bytes(config.files.max_bytes);

    let deps = GatewayDeps {
        config,
        http: Arc::new(ReqwestHttpSender::new(client)),
        credentials,
        uploader: Arc::new(uploader),
    };
    Ok(Gateway::new_with(deps))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn upstream_headers(credential: &Credential, stream: bool) -> Result<HeaderMap, GatewayError> {
    let mut headers = HeaderMap::new();
    let auth = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
        .map_err(|_| GatewayError::Internal("credential is not a valid header value".to_string()))?;
    headers.insert(header::AUTHORIZATION, auth);
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let accept = if stream {
        "text/event-stream"
    } else {
        "application/json"
    };
    headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
    Ok(headers)
}

fn into_byte_stream(
    body: HttpBody,
) -> Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send>> {
    match body {
        HttpBody::Full(bytes) => Box::pin(futures_util::stream::iter([Ok(bytes)])),
        HttpBody::Stream(s) => s,
    }
}

async fn collect_body(body: HttpBody) -> Result<Bytes, GatewayError> {
    match body {
        HttpBody::Full(b) => Ok(b),
        HttpBody::Stream(mut s) => {
            let mut collected = Vec::new();
            while let Some(chunk) = s.next().await {
                let bytes = chunk?;
                collected.extend_from_slice(&bytes);
            }
            Ok(Bytes::from(collected))
        }
    }
}
