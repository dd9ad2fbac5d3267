// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Inbound chat-completions request model
//
// The polymorphic `content` field (string | part list | null) is resolved
// into `MessageContent` at deserialization time. Everything downstream
// works on these types, never on raw JSON.

use serde::{Deserialize, Serialize};

/// The role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "developer")]
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// Image reference inside an `image_url` part.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(default)]
    pub detail: Option<String>,
}

/// One element of a multi-part message body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    /// Part types the gateway does not translate (audio, files, ...).
    #[serde(other)]
    Unsupported,
}

/// Message body: either a plain string or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    PlainText(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::PlainText(String::new())
    }
}

impl MessageContent {
    /// Flatten to text: text parts are newline-joined, other parts dropped.
    pub fn text(&self) -> String {
        match self {
            MessageContent::PlainText(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Image URLs in part order. Always empty for plain text.
    pub fn image_urls(&self) -> Vec<String> {
        match self {
            MessageContent::PlainText(_) => Vec::new(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::ImageUrl { image_url } => Some(image_url.url.clone()),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// A single message in the inbound transcript.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
    pub role: Role,
    /// `null` and absent both deserialize to empty text.
    #[serde(default, deserialize_with = "nullable_content")]
    pub content: MessageContent,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

impl InboundMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::PlainText(content.into()),
            name: None,
            tool_call_id: None,
        }
    }

    pub fn with_parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            content: MessageContent::Parts(parts),
            name: None,
            tool_call_id: None,
        }
    }
}

fn nullable_content<'de, D>(deserializer: D) -> Result<MessageContent, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<MessageContent>::deserialize(deserializer)?.unwrap_or_default())
}

/// A callable function advertised by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Entry of the `tools` array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolDescriptor {
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    #[serde(default)]
    pub function: Option<FunctionDescriptor>,
}

fn function_type() -> String {
    "function".to_string()
}

/// Inbound request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub functions: Option<Vec<FunctionDescriptor>>,
    #[serde(default)]
    pub tools: Option<Vec<ToolDescriptor>>,
    #[serde(default)]
    pub function_call: Option<serde_json::Value>,
    #[serde(default)]
    pub tool_choice: Option<serde_json::Value>,
}

impl ChatCompletionRequest {
    /// All function descriptors from `functions` and function-typed `tools`,
    /// legacy `functions` first.
    pub fn function_descriptors(&self) -> Vec<FunctionDescriptor> {
        let mut out: Vec<FunctionDescriptor> = self.functions.clone().unwrap_or_default();
        if let Some(tools) = &self.tools {
            out.extend(
                tools
                    .iter()
                    .filter(|t| t.kind == "function")
                    .filter_map(|t| t.function.clone()),
            );
        }
        out
    }

    /// Text of the first system message, if any.
    pub fn system_text(&self) -> Option<String> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.text())
    }
}
