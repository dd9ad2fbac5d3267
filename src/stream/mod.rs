// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Streaming path
//
// Responsibilities:
// - Parse the upstream line-oriented event stream into typed events
// - Re-chunk answer text into single-character deltas, paced by backlog
// - Append the continuation token before the terminal chunk (Embedded mode)
// - Encode chunks as chat-completions `data:` records ending in `[DONE]`
// - Stop reading upstream as soon as the downstream client goes away

mod pacing;
mod parser;
mod processor;
mod rechunker;
mod types;

pub use pacing::{PacingSchedule, PacingStep, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY, DEFAULT_STEPS};
pub use parser::{parse_events, DONE_SENTINEL};
pub use processor::{error_record, StreamProcessor};
pub use rechunker::{Rechunker, DEFAULT_BACKLOG_WARN_CHARS};
pub use types::{OutboundChunk, StreamError, StreamMeta, UpstreamEvent};
