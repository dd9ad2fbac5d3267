// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::time::Duration;

use crate::codec::ConversationMode;
use crate::registry::Credential;
use crate::stream::PacingSchedule;

/// Parsed and validated gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Config format version. Always "v1".
    pub version: String,
    pub upstream: UpstreamConfig,
    pub conversation: ConversationConfig,
    /// Upstream `user` when the request carries none.
    pub default_user: String,
    /// Public model name to agent API key.
    pub models: BTreeMap<String, Credential>,
    pub files: FilesConfig,
    pub pacing: PacingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Agent API root, without a trailing slash.
    pub base_url: String,
    pub timeout_ms: u64,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn chat_messages_url(&self) -> String {
        format!("{}/chat-messages", self.base_url)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversationConfig {
    pub mode: ConversationMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilesConfig {
    /// When false, image references are dropped instead of uploaded.
    pub upload: bool,
    /// Largest image accepted for upload, inline or fetched.
    pub max_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingConfig {
    pub schedule: PacingSchedule,
    pub backlog_warn_chars: usize,
}
