// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Image upload
//
// Responsibilities:
// - Resolve an image reference (`data:` URL or http(s) URL) to raw bytes
// - Upload the bytes to the agent API as a multipart file
// - Return the upstream file id used as `upload_file_id`

use async_trait::async_trait;
use base64::Engine as _;
use bytes::Bytes;
use futures_util::StreamExt;
use std::time::Duration;

use crate::config::DEFAULT_MAX_IMAGE_BYTES;

/// Handle the upstream assigned to an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadHandle {
    pub id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid data URL: {0}")]
    InvalidDataUrl(String),

    #[error("unsupported image reference: {0}")]
    UnsupportedReference(String),

    #[error("failed to fetch image: {0}")]
    Fetch(String),

    #[error("upstream rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed upload response: {0}")]
    MalformedResponse(String),
}

/// Resolves image references to upstream upload handles.
#[async_trait]
pub trait FileUploader: Send + Sync {
    async fn upload(
        &self,
        image_ref: &str,
        credential: &str,
        user: &str,
    ) -> Result<UploadHandle, UploadError>;
}

// ---------------------------------------------------------------------------
// Image sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Inline { mime: String, bytes: Bytes },
    Remote(String),
}

/// Classify an image reference without touching the network.
pub fn parse_image_ref(image_ref: &str) -> Result<ImageSource, UploadError> {
    let trimmed = image_ref.trim();
    if let Some(rest) = trimmed.strip_prefix("data:") {
        return parse_data_url(rest);
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Ok(ImageSource::Remote(trimmed.to_string()));
    }
    Err(UploadError::UnsupportedReference(truncate(trimmed, 64)))
}

fn parse_data_url(rest: &str) -> Result<ImageSource, UploadError> {
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| UploadError::InvalidDataUrl("missing ',' separator".to_string()))?;
    let mime = meta
        .strip_suffix(";base64")
        .ok_or_else(|| UploadError::InvalidDataUrl("only base64 payloads are supported".to_string()))?;
    let mime = if mime.is_empty() {
        "application/octet-stream"
    } else {
        mime
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| UploadError::InvalidDataUrl(e.to_string()))?;
    Ok(ImageSource::Inline {
        mime: mime.to_ascii_lowercase(),
        bytes: Bytes::from(bytes),
    })
}

/// File extension for an image mime type.
pub fn extension_for(mime: &str) -> &str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        other => other
            .strip_prefix("image/")
            .filter(|sub| !sub.is_empty() && sub.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or("bin"),
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

// ---------------------------------------------------------------------------
// HTTP uploader
// ---------------------------------------------------------------------------

#[derive(serde::Deserialize)]
struct UploadResponse {
    id: String,
}

/// Uploads to `{base_url}/files/upload` with reqwest multipart.
pub struct HttpFileUploader {
    client: reqwest::Client,
    base_url: String,
    timeout: Option<Duration>,
    max_bytes: usize,
}

impl HttpFileUploader {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: None,
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    /// Largest image accepted, inline or fetched.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    async fn fetch(&self, url: &str) -> Result<(String, Bytes), UploadError> {
        let mut req = self.client.get(url);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| UploadError::Fetch(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(UploadError::Fetch(format!("{url} returned {}", resp.status())));
        }
        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "image/png".to_string());
        if !mime.starts_with("image/") {
            return Err(UploadError::Fetch(format!("{url} is not an image ({mime})")));
        }
        if let Some(length) = resp.content_length() {
            if length > self.max_bytes as u64 {
                return Err(self.too_large(url));
            }
        }

        let mut body = bytes::BytesMut::new();
        let mut chunks = resp.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| UploadError::Fetch(e.to_string()))?;
            if body.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large(url));
            }
            body.extend_from_slice(&chunk);
        }
        Ok((mime, body.freeze()))
    }

    fn too_large(&self, source: &str) -> UploadError {
        UploadError::Fetch(format!("{source} exceeds {} bytes", self.max_bytes))
    }
}

#[async_trait]
impl FileUploader for HttpFileUploader {
    async fn upload(
        &self,
        image_ref: &str,
        credential: &str,
        user: &str,
    ) -> Result<UploadHandle, UploadError> {
        let (mime, bytes) = match parse_image_ref(image_ref)? {
            ImageSource::Inline { mime, bytes } => (mime, bytes),
            ImageSource::Remote(url) => self.fetch(&url).await?,
        };

        if bytes.len() > self.max_bytes {
            return Err(self.too_large("inline image"));
        }

        let size = bytes.len();
        let part = reqwest::multipart::Part::stream(bytes)
            .file_name(format!("image.{}", extension_for(&mime)))
            .mime_str(&mime)
            .map_err(|e| UploadError::InvalidDataUrl(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("user", user.to_string());

        let mut req = self
            .client
            .post(format!("{}/files/upload", self.base_url))
            .bearer_auth(credential)
            .multipart(form);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| UploadError::Fetch(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| UploadError::Fetch(e.to_string()))?;

        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message: crate::provider::upstream_error_message(&body),
            });
        }

        let parsed: UploadResponse = serde_json::from_slice(&body)
            .map_err(|e| UploadError::MalformedResponse(e.to_string()))?;
        tracing::debug!(file_id = %parsed.id, mime = %mime, size, "image uploaded");
        Ok(UploadHandle { id: parsed.id })
    }
}
