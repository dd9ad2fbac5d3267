// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Loads agentbridge.yaml, validates structure, resolves `${VAR}`
// interpolation, and builds the typed gateway configuration.

mod defaults;
mod error;
mod interpolation;
mod loader;
mod raw;
mod source;
mod types;

pub use defaults::{DEFAULT_MAX_IMAGE_BYTES, DEFAULT_TIMEOUT_MS, DEFAULT_USER};
pub use error::ConfigError;
pub use interpolation::resolve_variables;
pub use loader::load_config;
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::{Config, ConversationConfig, FilesConfig, PacingConfig, UpstreamConfig};
