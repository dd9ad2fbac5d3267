// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Stream processor
//
// Wires the three stream stages together: upstream bytes are parsed into
// events, the re-chunker paces them into single-character chunks, and the
// chunks are encoded as `data:` records for the downstream client.

use super::pacing::PacingSchedule;
use super::parser::{parse_events, DONE_SENTINEL};
use super::rechunker::{Rechunker, DEFAULT_BACKLOG_WARN_CHARS};
use super::types::{OutboundChunk, StreamError, StreamMeta};
use crate::codec::ConversationState;
use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};

/// Converts an upstream agent event stream into a chat-completions stream.
#[derive(Debug, Clone)]
pub struct StreamProcessor {
    schedule: PacingSchedule,
    backlog_warn_chars: usize,
}

impl Default for StreamProcessor {
    fn default() -> Self {
        Self::new(PacingSchedule::default())
    }
}

impl StreamProcessor {
    pub fn new(schedule: PacingSchedule) -> Self {
        Self {
            schedule,
            backlog_warn_chars: DEFAULT_BACKLOG_WARN_CHARS,
        }
    }

    pub fn with_backlog_warning(mut self, chars: usize) -> Self {
        self.backlog_warn_chars = chars;
        self
    }

    /// Process an upstream byte stream into downstream SSE bytes.
    ///
    /// The output ends with `data: [DONE]` after the terminal chunk, or with
    /// a single error record (and no `[DONE]`) when the stream fails.
    /// Dropping the output cancels the pacing task and the upstream read.
    pub fn process<S>(
        &self,
        input: S,
        meta: StreamMeta,
        state: ConversationState,
    ) -> impl Stream<Item = Bytes> + Send + 'static
    where
        S: Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
    {
        let chunks = Rechunker::new(self.schedule.clone(), meta, state)
            .with_backlog_warning(self.backlog_warn_chars)
            .run(parse_events(input));

        let encoder = SseEncoder {
            chunks,
            role_sent: false,
            finished: false,
        };

        futures_util::stream::unfold(encoder, |mut enc| async move {
            if enc.finished {
                return None;
            }
            match enc.chunks.next().await {
                Some(Ok(chunk)) => {
                    let bytes = enc.encode(&chunk);
                    Some((bytes, enc))
                }
                Some(Err(err)) => {
                    enc.finished = true;
                    Some((error_record(&err), enc))
                }
                None => None,
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

struct SseEncoder<C> {
    chunks: C,
    role_sent: bool,
    finished: bool,
}

impl<C> SseEncoder<C> {
    fn encode(&mut self, chunk: &OutboundChunk) -> Bytes {
        let with_role = !self.role_sent && chunk.delta.is_some();
        if with_role {
            self.role_sent = true;
        }
        let mut out = data_record(&chunk.to_wire(with_role));
        if chunk.is_terminal() {
            self.finished = true;
            out.push_str(&format!("data: {DONE_SENTINEL}\n\n"));
        }
        Bytes::from(out)
    }
}

fn data_record<T: serde::Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) => format!("data: {json}\n\n"),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize stream record");
            String::new()
        }
    }
}

/// A stream failure as a single `data:` record.
pub fn error_record(err: &StreamError) -> Bytes {
    Bytes::from(data_record(&err.envelope()))
}
