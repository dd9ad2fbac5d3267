// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Upstream events as parsed from the agent API, downstream chunks as emitted
// by the re-chunker, and the errors that end a stream.

use crate::message::Role;
use crate::provider::{
    AgentThought, ChatCompletionChunk, ChunkChoice, ChunkDelta, ErrorEnvelope, Usage,
};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Upstream events
// ---------------------------------------------------------------------------

/// One `data:` record of the upstream event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// Answer text (`message` and `agent_message` events).
    MessageDelta(String),
    /// End of the turn; carries the upstream conversation id.
    MessageEnd {
        conversation_id: String,
        message_id: Option<String>,
        usage: Option<Usage>,
    },
    AgentThought(AgentThought),
    MessageFile {
        id: String,
        file_type: String,
    },
    /// In-band upstream failure.
    Error {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },
    /// Any other event kind (pings, workflow progress, ...).
    Unknown(String),
}

// ---------------------------------------------------------------------------
// Downstream chunks
// ---------------------------------------------------------------------------

/// Identity shared by every chunk of one downstream stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamMeta {
    pub stream_id: Arc<str>,
    pub model: Arc<str>,
    pub created: i64,
}

impl StreamMeta {
    pub fn new(model: &str) -> Self {
        Self {
            stream_id: Arc::from(format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())),
            model: Arc::from(model),
            created: chrono::Utc::now().timestamp(),
        }
    }
}

/// A single downstream delta.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundChunk {
    pub stream_id: Arc<str>,
    pub index: u32,
    pub delta: Option<String>,
    pub finish_reason: Option<String>,
    pub created_at: i64,
    pub model: Arc<str>,
}

impl OutboundChunk {
    pub fn content(meta: &StreamMeta, text: String) -> Self {
        Self {
            stream_id: meta.stream_id.clone(),
            index: 0,
            delta: Some(text),
            finish_reason: None,
            created_at: meta.created,
            model: meta.model.clone(),
        }
    }

    pub fn terminal(meta: &StreamMeta, finish_reason: &str) -> Self {
        Self {
            stream_id: meta.stream_id.clone(),
            index: 0,
            delta: None,
            finish_reason: Some(finish_reason.to_string()),
            created_at: meta.created,
            model: meta.model.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.finish_reason.is_some()
    }

    /// Wire form; `with_role` marks the first content-bearing chunk.
    pub fn to_wire(&self, with_role: bool) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.stream_id.to_string(),
            object: "chat.completion.chunk",
            created: self.created_at,
            model: self.model.to_string(),
            choices: vec![ChunkChoice {
                index: self.index,
                delta: ChunkDelta {
                    role: with_role.then_some(Role::Assistant),
                    content: self.delta.clone(),
                },
                finish_reason: self.finish_reason.clone(),
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Faults that terminate a stream.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    #[error("upstream connection failed: {0}")]
    Transport(String),

    #[error("malformed terminal event: {0}")]
    MalformedTerminal(String),

    #[error("upstream error: {message}")]
    Upstream {
        status: Option<u16>,
        code: Option<String>,
        message: String,
    },
}

impl StreamError {
    pub fn envelope(&self) -> ErrorEnvelope {
        match self {
            StreamError::Transport(_) => {
                ErrorEnvelope::new(self.to_string(), "transport_error", None)
            }
            StreamError::MalformedTerminal(_) => {
                ErrorEnvelope::new(self.to_string(), "upstream_error", Some("malformed_event"))
            }
            StreamError::Upstream { code, message, .. } => {
                ErrorEnvelope::new(message.clone(), "upstream_error", code.as_deref())
            }
        }
    }
}
