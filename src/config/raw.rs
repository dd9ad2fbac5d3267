// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
//
// Kept apart from the public `Config` so interpolation and validation happen
// in one place between the two.

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub agentbridge: String,
    pub upstream: Option<RawUpstream>,
    pub conversation: Option<RawConversation>,
    pub default_user: Option<String>,
    #[serde(default)]
    pub models: BTreeMap<String, RawModel>,
    pub files: Option<RawFiles>,
    pub pacing: Option<RawPacing>,
}

#[derive(Debug, Deserialize)]
pub struct RawUpstream {
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RawConversation {
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawModel {
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawFiles {
    pub upload: Option<bool>,
    pub max_bytes: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RawPacing {
    pub min_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backlog_warn_chars: Option<usize>,
    pub steps: Option<Vec<RawPacingStep>>,
}

#[derive(Debug, Deserialize)]
pub struct RawPacingStep {
    pub backlog_above: usize,
    pub delay_ms: u64,
}
