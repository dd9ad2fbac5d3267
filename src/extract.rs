// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Content extraction
//
// Picks the message that drives the upstream query (the last non-system
// message) and flattens it into query text plus image references.

use crate::message::{InboundMessage, Role};

/// Query text and image references taken from one inbound message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedContent {
    pub query: String,
    /// Image URLs in part order, not yet uploaded.
    pub image_refs: Vec<String>,
}

/// Flatten the last non-system message of the transcript.
///
/// A transcript with no such message yields empty content, not an error.
pub fn extract(messages: &[InboundMessage]) -> ExtractedContent {
    match messages.iter().rev().find(|m| m.role != Role::System) {
        Some(message) => ExtractedContent {
            query: message.content.text(),
            image_refs: message.content.image_urls(),
        },
        None => ExtractedContent::default(),
    }
}
