// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Request adapter
//
// The upstream API has no function-calling or system-prompt fields, so both
// are folded into the query text as one instruction block.

use super::{FileReference, ResponseMode, UpstreamRequest};
use crate::codec::{has_history, ConversationMode, ConversationState};
use crate::message::{ChatCompletionRequest, FunctionDescriptor};

/// Build the upstream request for one turn.
///
/// `query` is the (possibly history-augmented) user query; `files` are
/// already-uploaded attachments.
pub fn build_upstream_request(
    inbound: &ChatCompletionRequest,
    query: &str,
    state: &ConversationState,
    files: Vec<FileReference>,
    user: &str,
) -> UpstreamRequest {
    // The history block or the upstream conversation already holds it.
    let include_system = match state.mode() {
        ConversationMode::Historical => !has_history(&inbound.messages),
        ConversationMode::Embedded => state.conversation_id().is_none(),
    };
    let system = if include_system {
        inbound.system_text().filter(|s| !s.trim().is_empty())
    } else {
        None
    };

    let functions = inbound.function_descriptors();
    let directive = if functions.is_empty() {
        None
    } else {
        forced_call_directive(inbound)
    };

    UpstreamRequest {
        inputs: serde_json::Map::new(),
        query: compose_query(system.as_deref(), &functions, directive.as_deref(), query),
        response_mode: if inbound.stream {
            ResponseMode::Streaming
        } else {
            ResponseMode::Blocking
        },
        user: inbound
            .user
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| user.to_string()),
        conversation_id: state.conversation_id().map(str::to_string),
        files,
        auto_generate_name: false,
    }
}

/// Assemble the instruction block: system, functions, directive, query.
///
/// With nothing to add, the query is returned as-is.
pub fn compose_query(
    system: Option<&str>,
    functions: &[FunctionDescriptor],
    directive: Option<&str>,
    query: &str,
) -> String {
    if system.is_none() && functions.is_empty() && directive.is_none() {
        return query.to_string();
    }

    let mut sections: Vec<String> = Vec::with_capacity(4);
    if let Some(system) = system {
        sections.push(format!("System instructions:\n{system}"));
    }
    if !functions.is_empty() {
        let rendered = serde_json::to_string_pretty(functions).unwrap_or_else(|_| "[]".to_string());
        sections.push(format!("Available functions:\n```json\n{rendered}\n```"));
    }
    if let Some(directive) = directive {
        sections.push(directive.to_string());
    }
    sections.push(format!("User query:\n{query}"));
    sections.join("\n\n")
}

/// Translate `tool_choice` (preferred) or `function_call` into a directive.
pub fn forced_call_directive(inbound: &ChatCompletionRequest) -> Option<String> {
    let choice = inbound
        .tool_choice
        .as_ref()
        .or(inbound.function_call.as_ref())?;

    match choice {
        serde_json::Value::String(s) => match s.as_str() {
            "none" => Some("Do not call any function; answer the query directly.".to_string()),
            "required" | "any" => {
                Some("You must call one of the functions listed above.".to_string())
            }
            _ => None,
        },
        serde_json::Value::Object(obj) => {
            let name = obj
                .get("function")
                .and_then(|f| f.get("name"))
                .or_else(|| obj.get("name"))
                .and_then(|n| n.as_str())?;
            Some(format!("You must call the function `{name}`."))
        }
        _ => None,
    }
}
