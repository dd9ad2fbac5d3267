// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::time::Duration;

use crate::codec::ConversationMode;
use crate::registry::Credential;
use crate::stream::{
    PacingSchedule, PacingStep, DEFAULT_BACKLOG_WARN_CHARS, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY,
    DEFAULT_STEPS,
};

use super::defaults::{
    DEFAULT_MAX_IMAGE_BYTES, DEFAULT_TIMEOUT_MS, DEFAULT_UPLOAD_ENABLED, DEFAULT_USER,
    SUPPORTED_VERSION,
};
use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate a gateway config from the given source.
///
/// Steps:
/// 1. Read raw YAML from source
/// 2. Parse YAML into raw deserialization types
/// 3. Validate version, upstream, models and pacing
/// 4. Resolve `${VAR}` interpolation in string fields
/// 5. Build typed Config struct
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.agentbridge != SUPPORTED_VERSION {
        return Err(ConfigError::Validation(format!(
            "unsupported config version \"{}\", expected \"{SUPPORTED_VERSION}\"",
            raw.agentbridge
        )));
    }

    let upstream = build_upstream_config(raw.upstream)?;
    let conversation = build_conversation_config(raw.conversation)?;
    let models = build_models(raw.models)?;

    let default_user = match raw.default_user {
        Some(user) => resolve_variables(&user)?,
        None => DEFAULT_USER.to_string(),
    };
    if default_user.trim().is_empty() {
        return Err(ConfigError::Validation(
            "default_user must not be empty".to_string(),
        ));
    }

    let files = build_files_config(raw.files)?;

    let pacing = build_pacing_config(raw.pacing)?;

    Ok(Config {
        version: raw.agentbridge,
        upstream,
        conversation,
        default_user,
        models,
        files,
        pacing,
    })
}

fn build_upstream_config(raw: Option<raw::RawUpstream>) -> Result<UpstreamConfig, ConfigError> {
    let raw = raw.ok_or_else(|| {
        ConfigError::Validation("missing required \"upstream\" section".to_string())
    })?;
    let base_url = match raw.base_url {
        Some(url) => resolve_variables(&url)?,
        None => String::new(),
    };
    let base_url = base_url.trim().trim_end_matches('/').to_string();
    if base_url.is_empty() {
        return Err(ConfigError::Validation(
            "upstream.base_url must not be empty".to_string(),
        ));
    }
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::Validation(format!(
            "upstream.base_url \"{base_url}\" must start with http:// or https://"
        )));
    }

    let timeout_ms = raw.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "upstream.timeout_ms must be greater than 0".to_string(),
        ));
    }

    Ok(UpstreamConfig {
        base_url,
        timeout_ms,
    })
}

fn build_conversation_config(
    raw: Option<raw::RawConversation>,
) -> Result<ConversationConfig, ConfigError> {
    let mode = match raw.and_then(|c| c.mode) {
        None => ConversationMode::default(),
        Some(mode) => match mode.as_str() {
            "historical" => ConversationMode::Historical,
            "embedded" => ConversationMode::Embedded,
            other => {
                return Err(ConfigError::Validation(format!(
                    "unknown conversation.mode \"{other}\", expected \"historical\" or \"embedded\""
                )));
            }
        },
    };
    Ok(ConversationConfig { mode })
}

fn build_models(
    raw: BTreeMap<String, raw::RawModel>,
) -> Result<BTreeMap<String, Credential>, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::Validation(
            "at least one entry under \"models\" is required".to_string(),
        ));
    }
    let mut models = BTreeMap::new();
    for (name, model) in raw {
        let key = match model.api_key {
            Some(key) => resolve_variables(&key)?,
            None => String::new(),
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::Validation(format!(
                "models.{name}.api_key must not be empty"
            )));
        }
        models.insert(name, Credential::new(key));
    }
    Ok(models)
}

fn build_files_config(raw: Option<raw::RawFiles>) -> Result<FilesConfig, ConfigError> {
    let (upload, max_bytes) = match raw {
        Some(files) => (files.upload, files.max_bytes),
        None => (None, None),
    };
    let max_bytes = max_bytes.unwrap_or(DEFAULT_MAX_IMAGE_BYTES);
    if max_bytes == 0 {
        return Err(ConfigError::Validation(
            "files.max_bytes must be greater than 0".to_string(),
        ));
    }
    Ok(FilesConfig {
        upload: upload.unwrap_or(DEFAULT_UPLOAD_ENABLED),
        max_bytes,
    })
}

fn build_pacing_config(raw: Option<raw::RawPacing>) -> Result<PacingConfig, ConfigError> {
    let Some(raw) = raw else {
        return Ok(PacingConfig {
            schedule: PacingSchedule::default(),
            backlog_warn_chars: DEFAULT_BACKLOG_WARN_CHARS,
        });
    };

    let min_delay = raw
        .min_delay_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_MIN_DELAY);
    let max_delay = raw
        .max_delay_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_MAX_DELAY);
    if min_delay > max_delay {
        return Err(ConfigError::Validation(format!(
            "pacing.min_delay_ms ({}) must not exceed pacing.max_delay_ms ({})",
            min_delay.as_millis(),
            max_delay.as_millis()
        )));
    }

    let steps = match raw.steps {
        Some(steps) => steps
            .into_iter()
            .map(|s| PacingStep::new(s.backlog_above, s.delay_ms))
            .collect(),
        None => DEFAULT_STEPS.to_vec(),
    };

    let schedule = PacingSchedule::new(steps, min_delay, max_delay);
    if !schedule.is_monotonic() {
        return Err(ConfigError::Validation(
            "pacing.steps: delay must not grow as backlog_above grows".to_string(),
        ));
    }

    let backlog_warn_chars = raw.backlog_warn_chars.unwrap_or(DEFAULT_BACKLOG_WARN_CHARS);
    if backlog_warn_chars == 0 {
        return Err(ConfigError::Validation(
            "pacing.backlog_warn_chars must be greater than 0".to_string(),
        ));
    }

    Ok(PacingConfig {
        schedule,
        backlog_warn_chars,
    })
}
