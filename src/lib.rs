// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

pub mod codec;
pub mod config;
pub mod engine;
pub mod extract;
pub mod message;
pub mod provider;
pub mod proxy;
pub mod registry;
pub mod stream;
pub mod upload;
