// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

pub const SUPPORTED_VERSION: &str = "v1";

pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Upstream `user` when the inbound request names none.
pub const DEFAULT_USER: &str = "apiuser";

pub const DEFAULT_UPLOAD_ENABLED: bool = true;

pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
