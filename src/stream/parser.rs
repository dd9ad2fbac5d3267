// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Upstream event parser
//
// Turns the raw line-oriented byte stream into typed events. The returned
// stream is lazy: bytes are only read when the consumer asks for the next
// event, and dropping it drops the upstream body.

use super::types::{StreamError, UpstreamEvent};
use crate::provider::{AgentThought, Usage};
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use std::pin::Pin;

/// Literal payload closing the upstream stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Longest line accepted before the stream is treated as broken.
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StreamError>> + Send>>;

struct ParserState {
    input: ByteStream,
    /// Bytes after the last newline seen so far.
    buffer: Vec<u8>,
    max_line_bytes: usize,
    eof: bool,
    finished: bool,
}

impl ParserState {
    fn take_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned())
    }
}

/// What a single line contributes to the event stream.
#[derive(Debug, PartialEq)]
pub(crate) enum LineOutcome {
    Skip,
    Done,
    Event(UpstreamEvent),
    Fatal(StreamError),
}

/// Parse an upstream byte stream into events.
///
/// Blank lines, non-`data:` lines and malformed JSON are skipped. The
/// `[DONE]` sentinel ends the stream without an event. A transport error or
/// a malformed terminal event is yielded once and ends the stream.
pub fn parse_events<S>(input: S) -> impl Stream<Item = Result<UpstreamEvent, StreamError>> + Send
where
    S: Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
{
    parse_events_with_limit(input, MAX_LINE_BYTES)
}

/// [`parse_events`] with an explicit line length limit.
///
/// A line longer than `max_line_bytes` ends the stream with a transport
/// error.
pub fn parse_events_with_limit<S>(
    input: S,
    max_line_bytes: usize,
) -> impl Stream<Item = Result<UpstreamEvent, StreamError>> + Send
where
    S: Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
{
    let state = ParserState {
        input: Box::pin(input),
        buffer: Vec::new(),
        max_line_bytes,
        eof: false,
        finished: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }
            if let Some(line) = state.take_line() {
                match parse_line(&line) {
                    LineOutcome::Skip => continue,
                    LineOutcome::Done => return None,
                    LineOutcome::Event(event) => return Some((Ok(event), state)),
                    LineOutcome::Fatal(err) => {
                        state.finished = true;
                        return Some((Err(err), state));
                    }
                }
            }
            if state.eof {
                return None;
            }
            if state.buffer.len() > state.max_line_bytes {
                tracing::warn!(
                    buffered = state.buffer.len(),
                    limit = state.max_line_bytes,
                    "upstream line exceeds length limit"
                );
                let err = StreamError::Transport(format!(
                    "upstream line exceeds {} bytes",
                    state.max_line_bytes
                ));
                state.finished = true;
                state.buffer = Vec::new();
                return Some((Err(err), state));
            }
            match state.input.next().await {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(&bytes),
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.eof = true;
                    if !state.buffer.is_empty() {
                        state.buffer.push(b'\n');
                    }
                }
            }
        }
    })
}

pub(crate) fn parse_line(line: &str) -> LineOutcome {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineOutcome::Skip;
    }
    let Some(payload) = trimmed.strip_prefix("data:") else {
        tracing::trace!(line = trimmed, "ignoring non-data line");
        return LineOutcome::Skip;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return LineOutcome::Done;
    }
    parse_payload(payload)
}

fn parse_payload(payload: &str) -> LineOutcome {
    let json: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed upstream line");
            return LineOutcome::Skip;
        }
    };

    let str_field = |name: &str| json.get(name).and_then(|v| v.as_str()).map(String::from);

    let kind = str_field("event").unwrap_or_default();
    let event = match kind.as_str() {
        "message" | "agent_message" => {
            UpstreamEvent::MessageDelta(str_field("answer").unwrap_or_default())
        }
        "agent_thought" => UpstreamEvent::AgentThought(AgentThought {
            id: str_field("id").unwrap_or_default(),
            tool: str_field("tool").filter(|t| !t.is_empty()),
            thought: str_field("thought"),
            observation: str_field("observation"),
        }),
        "message_file" => UpstreamEvent::MessageFile {
            id: str_field("id").unwrap_or_default(),
            file_type: str_field("type").unwrap_or_default(),
        },
        "message_end" => {
            let Some(conversation_id) = str_field("conversation_id") else {
                return LineOutcome::Fatal(StreamError::MalformedTerminal(
                    "message_end without conversation_id".to_string(),
                ));
            };
            let usage = json
                .get("metadata")
                .and_then(|m| m.get("usage"))
                .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok());
            UpstreamEvent::MessageEnd {
                conversation_id,
                message_id: str_field("message_id"),
                usage,
            }
        }
        "error" => UpstreamEvent::Error {
            status: json
                .get("status")
                .and_then(|s| s.as_u64())
                .and_then(|s| u16::try_from(s).ok()),
            code: str_field("code"),
            message: str_field("message").unwrap_or_else(|| "upstream error".to_string()),
        },
        _ => UpstreamEvent::Unknown(kind),
    };
    LineOutcome::Event(event)
}
