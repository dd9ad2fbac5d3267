// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Inline history rendering for deployments without continuation tokens.

use crate::message::{InboundMessage, Role};

/// Whether the transcript carries any turns before the current one.
pub fn has_history(messages: &[InboundMessage]) -> bool {
    messages.len() > 1
}

/// Prepend all prior turns to `query` as a delimited `role: content` block.
///
/// Returns `query` unchanged when there are no prior turns.
pub fn render_history(messages: &[InboundMessage], query: &str) -> String {
    let Some((_, prior)) = messages.split_last() else {
        return query.to_string();
    };
    if prior.is_empty() {
        return query.to_string();
    }

    let mut lines: Vec<String> = prior
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content.text()))
        .collect();

    let tagged_system = prior.iter().any(|m| m.role == Role::System);
    if !tagged_system {
        if let Some(system) = messages.iter().find(|m| m.role == Role::System) {
            lines.insert(0, format!("system: {}", system.content.text()));
        }
    }

    format!(
        "here is our talk history:\n'''\n{}\n'''\n\nhere is my question:\n{}",
        lines.join("\n"),
        query
    )
}
