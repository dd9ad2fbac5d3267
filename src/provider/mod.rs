// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Wire adapters between the chat-completions surface and the upstream agent API
//
// Responsibilities:
// - Upstream request/response wire types
// - Downstream response and chunk wire types
// - Request adapter: synthesize the upstream query and attach files
// - Response adapter: map a blocking upstream result to a chat completion
// - Uniform `{error:{message,type,code}}` envelope

mod request;
mod response;

pub use request::{build_upstream_request, compose_query, forced_call_directive};
pub use response::{build_chat_response, parse_upstream_result, select_answer, upstream_error_message};

use crate::message::Role;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while reading upstream payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("upstream response is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("upstream response is missing required field: {0}")]
    MissingField(&'static str),
}

// ---------------------------------------------------------------------------
// Upstream wire types
// ---------------------------------------------------------------------------

/// Upstream `response_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Streaming,
    Blocking,
}

/// File attached to an upstream query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReference {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub transfer_method: &'static str,
    pub upload_file_id: String,
}

impl FileReference {
    /// Image previously uploaded through the upstream file endpoint.
    pub fn uploaded_image(upload_file_id: impl Into<String>) -> Self {
        Self {
            kind: "image",
            transfer_method: "local_file",
            upload_file_id: upload_file_id.into(),
        }
    }
}

/// Body of `POST /chat-messages`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamRequest {
    pub inputs: serde_json::Map<String, serde_json::Value>,
    pub query: String,
    pub response_mode: ResponseMode,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileReference>,
    pub auto_generate_name: bool,
}

/// One reasoning/tool step reported by an agent-mode upstream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentThought {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub thought: Option<String>,
    #[serde(default)]
    pub observation: Option<String>,
}

/// Token counters reported by the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpstreamMetadata {
    #[serde(default)]
    pub usage: Option<Usage>,
}

/// Blocking-mode upstream reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UpstreamResult {
    #[serde(default)]
    pub answer: String,
    pub conversation_id: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<UpstreamMetadata>,
    #[serde(default)]
    pub agent_thoughts: Vec<AgentThought>,
}

// ---------------------------------------------------------------------------
// Downstream wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseChoice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: &'static str,
}

/// Blocking `chat.completion` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ResponseChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

/// One `chat.completion.chunk` record of a streamed reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

// ---------------------------------------------------------------------------
// Error envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// `{"error": {...}}`, the shape every boundary-crossing error takes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>, kind: impl Into<String>, code: Option<&str>) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                kind: kind.into(),
                code: code.map(str::to_string),
            },
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|_| {
            br#"{"error":{"message":"internal error","type":"server_error"}}"#.to_vec()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_omits_absent_code() {
        let env = ErrorEnvelope::new("boom", "server_error", None);
        let value: serde_json::Value = serde_json::from_slice(&env.to_bytes()).unwrap();
        assert_eq!(value, json!({"error": {"message": "boom", "type": "server_error"}}));
    }

    #[test]
    fn envelope_carries_code() {
        let env = ErrorEnvelope::new("no such model", "invalid_request_error", Some("model_not_found"));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["error"]["code"], "model_not_found");
    }

    #[test]
    fn upstream_request_omits_empty_optionals() {
        let req = UpstreamRequest {
            inputs: serde_json::Map::new(),
            query: "hi".to_string(),
            response_mode: ResponseMode::Blocking,
            user: "apiuser".to_string(),
            conversation_id: None,
            files: Vec::new(),
            auto_generate_name: false,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({
                "inputs": {},
                "query": "hi",
                "response_mode": "blocking",
                "user": "apiuser",
                "auto_generate_name": false
            })
        );
    }

    #[test]
    fn file_reference_wire_shape() {
        let value = serde_json::to_value(FileReference::uploaded_image("f-1")).unwrap();
        assert_eq!(
            value,
            json!({"type": "image", "transfer_method": "local_file", "upload_file_id": "f-1"})
        );
    }

    #[test]
    fn chunk_serializes_null_finish_reason() {
        let chunk = ChatCompletionChunk {
            id: "chatcmpl-1".to_string(),
            object: "chat.completion.chunk",
            created: 1,
            model: "agent".to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: None,
                    content: Some("H".to_string()),
                },
                finish_reason: None,
            }],
        };
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["choices"][0]["finish_reason"], serde_json::Value::Null);
        assert_eq!(value["choices"][0]["delta"], json!({"content": "H"}));
    }
}
