// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Conversation codec
//
// The upstream agent keeps conversations server-side and identifies them by
// id. The downstream protocol is stateless, so the gateway either replays the
// transcript inline (Historical) or hides the upstream id in the reply text
// and recovers it from the next request's history (Embedded).

pub mod embedded;
pub mod history;

pub use embedded::{append_if_absent, decode, encode, is_symbol};
pub use history::{has_history, render_history};

use crate::message::{InboundMessage, Role};
use serde::Deserialize;

/// How conversation continuity is carried across requests.
///
/// Fixed per deployment by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMode {
    Historical,
    #[default]
    Embedded,
}

impl ConversationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationMode::Historical => "historical",
            ConversationMode::Embedded => "embedded",
        }
    }
}

/// Per-request conversation state recovered from the inbound history.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationState {
    mode: ConversationMode,
    continuation: Option<String>,
}

impl ConversationState {
    /// Recover state from a transcript.
    ///
    /// In Embedded mode the most recent assistant message carrying a token
    /// wins; Historical mode never carries one.
    pub fn from_history(mode: ConversationMode, messages: &[InboundMessage]) -> Self {
        let continuation = match mode {
            ConversationMode::Historical => None,
            ConversationMode::Embedded => messages
                .iter()
                .rev()
                .filter(|m| m.role == Role::Assistant)
                .find_map(|m| decode(&m.content.text())),
        };
        Self { mode, continuation }
    }

    pub fn mode(&self) -> ConversationMode {
        self.mode
    }

    /// Upstream conversation to resume, if any.
    pub fn conversation_id(&self) -> Option<&str> {
        self.continuation.as_deref()
    }

    /// Whether the reply to this turn must carry a token.
    pub fn should_inject(&self) -> bool {
        self.mode == ConversationMode::Embedded && self.continuation.is_none()
    }

    /// Token characters to append to the reply once the upstream id is known.
    pub fn token_for_reply(&self, conversation_id: &str) -> Option<String> {
        if self.should_inject() && !conversation_id.is_empty() {
            Some(encode(conversation_id))
        } else {
            None
        }
    }

    /// Apply the injection policy to a complete reply.
    pub fn finish_reply(&self, reply: &str, conversation_id: &str) -> String {
        if self.should_inject() && !conversation_id.is_empty() {
            append_if_absent(reply, conversation_id)
        } else {
            reply.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript_with_token(id: &str) -> Vec<InboundMessage> {
        vec![
            InboundMessage::new(Role::User, "first"),
            InboundMessage::new(Role::Assistant, format!("answer{}", encode(id))),
            InboundMessage::new(Role::User, "second"),
        ]
    }

    #[test]
    fn first_turn_starts_fresh() {
        let messages = vec![InboundMessage::new(Role::User, "hi")];
        let state = ConversationState::from_history(ConversationMode::Embedded, &messages);
        assert_eq!(state.conversation_id(), None);
        assert!(state.should_inject());
    }

    #[test]
    fn token_in_assistant_history_is_recovered() {
        let state = ConversationState::from_history(
            ConversationMode::Embedded,
            &transcript_with_token("conv-7"),
        );
        assert_eq!(state.conversation_id(), Some("conv-7"));
        assert!(!state.should_inject());
        assert_eq!(state.token_for_reply("conv-7"), None);
    }

    #[test]
    fn newest_token_wins() {
        let messages = vec![
            InboundMessage::new(Role::Assistant, format!("a{}", encode("old"))),
            InboundMessage::new(Role::User, "q"),
            InboundMessage::new(Role::Assistant, format!("b{}", encode("new"))),
            InboundMessage::new(Role::User, "q2"),
        ];
        let state = ConversationState::from_history(ConversationMode::Embedded, &messages);
        assert_eq!(state.conversation_id(), Some("new"));
    }

    #[test]
    fn tokens_in_user_messages_are_ignored() {
        let messages = vec![InboundMessage::new(
            Role::User,
            format!("pasted{}", encode("spoof")),
        )];
        let state = ConversationState::from_history(ConversationMode::Embedded, &messages);
        assert_eq!(state.conversation_id(), None);
    }

    #[test]
    fn historical_mode_never_decodes_or_injects() {
        let state = ConversationState::from_history(
            ConversationMode::Historical,
            &transcript_with_token("conv-7"),
        );
        assert_eq!(state.conversation_id(), None);
        assert!(!state.should_inject());
        assert_eq!(state.finish_reply("text", "conv-9"), "text");
    }

    #[test]
    fn finish_reply_appends_decodable_token() {
        let state = ConversationState::from_history(
            ConversationMode::Embedded,
            &[InboundMessage::new(Role::User, "hi")],
        );
        let reply = state.finish_reply("Hello", "c1");
        assert!(reply.starts_with("Hello"));
        assert_eq!(decode(&reply).as_deref(), Some("c1"));
    }

    #[test]
    fn mode_deserializes_lowercase() {
        let mode: ConversationMode = serde_yaml::from_str("historical").unwrap();
        assert_eq!(mode, ConversationMode::Historical);
    }
}
