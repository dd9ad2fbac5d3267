// Copyright 2026 The Agentbridge Project
// SPDX-License-Identifier: Apache-2.0

// Response re-chunker (pacing engine)
//
// Upstream text arrives in coarse bursts. The re-chunker queues it and emits
// one character per chunk, waiting a backlog-dependent delay before each, so
// bursts drain fast and sparse output still looks incremental.
//
// One task per stream owns both the event source and the character queue.
// Every suspension point (next event, pacing delay, downstream send) is
// raced against the downstream receiver going away.

use super::pacing::PacingSchedule;
use super::types::{OutboundChunk, StreamError, StreamMeta, UpstreamEvent};
use crate::codec::ConversationState;
use futures_util::stream::{Stream, StreamExt};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tokio_stream::wrappers::ReceiverStream;

const CHANNEL_CAPACITY: usize = 64;

pub const DEFAULT_BACKLOG_WARN_CHARS: usize = 4096;

type ChunkSender = mpsc::Sender<Result<OutboundChunk, StreamError>>;

/// Consumes upstream events and produces paced downstream chunks.
pub struct Rechunker {
    schedule: PacingSchedule,
    meta: StreamMeta,
    state: ConversationState,
    backlog_warn_chars: usize,
}

impl Rechunker {
    pub fn new(schedule: PacingSchedule, meta: StreamMeta, state: ConversationState) -> Self {
        Self {
            schedule,
            meta,
            state,
            backlog_warn_chars: DEFAULT_BACKLOG_WARN_CHARS,
        }
    }

    pub fn with_backlog_warning(mut self, chars: usize) -> Self {
        self.backlog_warn_chars = chars;
        self
    }

    /// Spawn the drain loop over `events`.
    ///
    /// Dropping the returned stream stops the loop and drops `events`.
    pub fn run<S>(self, events: S) -> ReceiverStream<Result<OutboundChunk, StreamError>>
    where
        S: Stream<Item = Result<UpstreamEvent, StreamError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(self.drive(events, tx));
        ReceiverStream::new(rx)
    }

    async fn drive<S>(self, events: S, tx: ChunkSender)
    where
        S: Stream<Item = Result<UpstreamEvent, StreamError>> + Send + 'static,
    {
        let mut events = Box::pin(events);
        let mut queue: VecDeque<char> = VecDeque::new();
        let mut backlog_warned = false;

        let pace = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(pace);
        let mut armed = false;

        loop {
            if !armed && !queue.is_empty() {
                let delay = self.schedule.delay_for(queue.len());
                pace.as_mut().reset(Instant::now() + delay);
                armed = true;
            }

            tokio::select! {
                biased;

                _ = tx.closed() => {
                    tracing::debug!(stream_id = %self.meta.stream_id, "downstream closed, dropping upstream");
                    return;
                }

                _ = &mut pace, if armed => {
                    armed = false;
                    if let Some(c) = queue.pop_front() {
                        if self.send_content(&tx, c.to_string()).await.is_err() {
                            return;
                        }
                    }
                }

                next = events.next() => match next {
                    Some(Ok(UpstreamEvent::MessageDelta(text))) => {
                        queue.extend(text.chars());
                        if !backlog_warned && queue.len() > self.backlog_warn_chars {
                            backlog_warned = true;
                            tracing::warn!(
                                stream_id = %self.meta.stream_id,
                                backlog = queue.len(),
                                "pacing backlog exceeds warning threshold"
                            );
                        }
                    }
                    Some(Ok(UpstreamEvent::AgentThought(thought))) => {
                        tracing::debug!(
                            stream_id = %self.meta.stream_id,
                            thought_id = %thought.id,
                            tool = ?thought.tool,
                            "agent thought"
                        );
                    }
                    Some(Ok(UpstreamEvent::MessageFile { id, file_type })) => {
                        tracing::debug!(
                            stream_id = %self.meta.stream_id,
                            file_id = %id,
                            file_type = %file_type,
                            "message file"
                        );
                    }
                    Some(Ok(UpstreamEvent::Unknown(kind))) => {
                        tracing::trace!(stream_id = %self.meta.stream_id, kind = %kind, "ignoring upstream event");
                    }
                    Some(Ok(UpstreamEvent::MessageEnd { conversation_id, .. })) => {
                        let _ = self.finish(&tx, &mut queue, Some(&conversation_id)).await;
                        return;
                    }
                    Some(Ok(UpstreamEvent::Error { status, code, message })) => {
                        tracing::warn!(
                            stream_id = %self.meta.stream_id,
                            status = ?status,
                            code = ?code,
                            message = %message,
                            "upstream reported an in-stream error"
                        );
                        if self.flush(&tx, &mut queue).await.is_ok() {
                            let _ = tx.send(Err(StreamError::Upstream { status, code, message })).await;
                        }
                        return;
                    }
                    Some(Err(err)) => {
                        tracing::warn!(stream_id = %self.meta.stream_id, error = %err, "upstream stream failed");
                        if self.flush(&tx, &mut queue).await.is_ok() {
                            let _ = tx.send(Err(err)).await;
                        }
                        return;
                    }
                    None => {
                        tracing::warn!(stream_id = %self.meta.stream_id, "upstream ended without message_end");
                        let _ = self.finish(&tx, &mut queue, None).await;
                        return;
                    }
                }
            }
        }
    }

    /// Flush the queue undelayed, append the token, emit the terminal chunk.
    async fn finish(
        &self,
        tx: &ChunkSender,
        queue: &mut VecDeque<char>,
        conversation_id: Option<&str>,
    ) -> Result<(), ()> {
        self.flush(tx, queue).await?;
        if let Some(token) = conversation_id.and_then(|id| self.state.token_for_reply(id)) {
            self.send_content(tx, token).await?;
        }
        tx.send(Ok(OutboundChunk::terminal(&self.meta, "stop")))
            .await
            .map_err(|_| ())
    }

    async fn flush(&self, tx: &ChunkSender, queue: &mut VecDeque<char>) -> Result<(), ()> {
        while let Some(c) = queue.pop_front() {
            self.send_content(tx, c.to_string()).await?;
        }
        Ok(())
    }

    async fn send_content(&self, tx: &ChunkSender, text: String) -> Result<(), ()> {
        tx.send(Ok(OutboundChunk::content(&self.meta, text)))
            .await
            .map_err(|_| ())
    }
}
