// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Response adapter for blocking requests.

use super::{
    AgentThought, ChatCompletionResponse, ProviderError, ResponseChoice, ResponseMessage,
    UpstreamResult,
};
use crate::codec::ConversationState;
use crate::message::Role;

/// Parse a blocking upstream body.
pub fn parse_upstream_result(body: &[u8]) -> Result<UpstreamResult, ProviderError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| ProviderError::InvalidJson(e.to_string()))?;
    if !value
        .get("conversation_id")
        .map(|v| v.is_string())
        .unwrap_or(false)
    {
        return Err(ProviderError::MissingField("conversation_id"));
    }
    serde_json::from_value(value).map_err(|e| ProviderError::InvalidJson(e.to_string()))
}

/// Best-effort human-readable message from an upstream error body.
pub fn upstream_error_message(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message")?.as_str().map(String::from))
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
}

/// The answer text, falling back to the last agent thought when empty.
///
/// Agent-mode upstreams sometimes put the final answer only in the reasoning
/// trace.
pub fn select_answer<'a>(answer: &'a str, thoughts: &'a [AgentThought]) -> &'a str {
    if !answer.trim().is_empty() {
        return answer;
    }
    match thoughts
        .iter()
        .rev()
        .filter_map(|t| t.thought.as_deref())
        .find(|t| !t.trim().is_empty())
    {
        Some(thought) => {
            tracing::debug!("empty answer, using last agent thought");
            thought
        }
        None => answer,
    }
}

/// Build the downstream `chat.completion` for a blocking upstream result.
pub fn build_chat_response(
    result: &UpstreamResult,
    model: &str,
    state: &ConversationState,
) -> ChatCompletionResponse {
    let answer = select_answer(&result.answer, &result.agent_thoughts);
    let content = state.finish_reply(answer, &result.conversation_id);

    ChatCompletionResponse {
        id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
        object: "chat.completion",
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![ResponseChoice {
            index: 0,
            message: ResponseMessage {
                role: Role::Assistant,
                content,
            },
            finish_reason: "stop",
        }],
        usage: result.metadata.as_ref().and_then(|m| m.usage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode, ConversationMode};
    use crate::message::InboundMessage;
    use crate::provider::Usage;
    use serde_json::json;

    fn embedded_first_turn() -> ConversationState {
        ConversationState::from_history(
            ConversationMode::Embedded,
            &[InboundMessage::new(Role::User, "hi")],
        )
    }

    #[test]
    fn parses_blocking_body_with_usage() {
        let body = json!({
            "event": "message",
            "message_id": "m-1",
            "conversation_id": "c-1",
            "mode": "chat",
            "answer": "Hello there",
            "metadata": {"usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8, "currency": "USD"}},
            "created_at": 1705407629
        });
        let result = parse_upstream_result(body.to_string().as_bytes()).unwrap();
        assert_eq!(result.answer, "Hello there");
        assert_eq!(result.conversation_id, "c-1");
        assert_eq!(
            result.metadata.unwrap().usage,
            Some(Usage {
                prompt_tokens: 5,
                completion_tokens: 3,
                total_tokens: 8
            })
        );
    }

    #[test]
    fn missing_conversation_id_is_rejected() {
        let err = parse_upstream_result(br#"{"answer":"x"}"#).unwrap_err();
        assert!(matches!(err, ProviderError::MissingField("conversation_id")));
    }

    #[test]
    fn non_json_body_is_rejected() {
        let err = parse_upstream_result(b"<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidJson(_)));
    }

    #[test]
    fn error_message_prefers_json_field() {
        let body = br#"{"code":"invalid_param","message":"query is required","status":400}"#;
        assert_eq!(upstream_error_message(body), "query is required");
        assert_eq!(upstream_error_message(b" plain failure \n"), "plain failure");
    }

    #[test]
    fn empty_answer_falls_back_to_last_thought() {
        let thoughts = vec![
            AgentThought {
                id: "t1".to_string(),
                thought: Some("first".to_string()),
                ..Default::default()
            },
            AgentThought {
                id: "t2".to_string(),
                thought: Some("final answer".to_string()),
                ..Default::default()
            },
            AgentThought {
                id: "t3".to_string(),
                tool: Some("search".to_string()),
                thought: Some("  ".to_string()),
                ..Default::default()
            },
        ];
        assert_eq!(select_answer("", &thoughts), "final answer");
        assert_eq!(select_answer("direct", &thoughts), "direct");
        assert_eq!(select_answer("", &[]), "");
    }

    #[test]
    fn response_shape_and_token_injection() {
        let result = parse_upstream_result(
            json!({"answer": "Hi", "conversation_id": "c1"}).to_string().as_bytes(),
        )
        .unwrap();
        let resp = build_chat_response(&result, "agent", &embedded_first_turn());

        assert_eq!(resp.object, "chat.completion");
        assert!(resp.id.starts_with("chatcmpl-"));
        assert_eq!(resp.model, "agent");
        assert_eq!(resp.choices.len(), 1);
        assert_eq!(resp.choices[0].finish_reason, "stop");
        assert!(resp.choices[0].message.content.starts_with("Hi"));
        assert_eq!(decode(&resp.choices[0].message.content).as_deref(), Some("c1"));
        assert!(resp.usage.is_none());

        let value = serde_json::to_value(&resp).unwrap();
        assert!(value.get("usage").is_none());
        assert_eq!(value["choices"][0]["message"]["role"], "assistant");
    }

    #[test]
    fn resumed_conversation_gets_no_second_token() {
        let history = vec![
            InboundMessage::new(Role::User, "a"),
            InboundMessage::new(Role::Assistant, format!("b{}", encode("c1"))),
            InboundMessage::new(Role::User, "c"),
        ];
        let state = ConversationState::from_history(ConversationMode::Embedded, &history);
        let result = parse_upstream_result(
            json!({"answer": "plain", "conversation_id": "c1"}).to_string().as_bytes(),
        )
        .unwrap();
        let resp = build_chat_response(&result, "agent", &state);
        assert_eq!(resp.choices[0].message.content, "plain");
    }

    #[test]
    fn usage_is_copied_verbatim() {
        let result = parse_upstream_result(
            json!({
                "answer": "x",
                "conversation_id": "c",
                "metadata": {"usage": {"prompt_tokens": 11, "completion_tokens": 22, "total_tokens": 33}}
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();
        let state = ConversationState::from_history(ConversationMode::Historical, &[]);
        let resp = build_chat_response(&result, "agent", &state);
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            value["usage"],
            json!({"prompt_tokens": 11, "completion_tokens": 22, "total_tokens": 33})
        );
    }
}
