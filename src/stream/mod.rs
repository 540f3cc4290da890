// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Streaming response controller.
//!
//! [`run_generation`] drives one completion stream for one assistant message. Chunks are pushed
//! into a [`GenerationSink`] as whole-content patches; the terminal outcome is returned to the
//! caller, which owns persistence.

use futures_util::StreamExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::model::{GroundingSearch, MessageId, MessageMetadata, MessagePatch, Reasoning};
use crate::service::{
    Chunk, CompletionEvent, CompletionRequest, CompletionService, FinishMeta, GenerationError,
};

mod registry;
pub mod scripted;

pub use registry::GenerationRegistry;
pub use scripted::{ScriptHandle, ScriptedCompletion};

/// Receives the local-only updates of an in-flight generation.
pub trait GenerationSink: Send + Sync {
    fn apply(&self, message_id: &MessageId, patch: MessagePatch);

    fn reasoning_loading(&self, message_id: &MessageId, loading: bool);
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// Final patch carrying content, reasoning with its duration, search and metadata.
    Finished { patch: MessagePatch },
    /// Patch without content: whatever was already dispatched stays as the final text.
    Cancelled { patch: MessagePatch },
    Failed { error: GenerationError },
}

#[derive(Debug)]
struct ChunkState {
    started_at: Instant,
    output: String,
    reasoning: String,
    thinking_started_at: Option<Instant>,
    reasoning_duration: Option<u64>,
    first_text_at: Option<Instant>,
    search: Option<GroundingSearch>,
}

impl ChunkState {
    fn new() -> Self {
        Self {
            started_at: Instant::now(),
            output: String::new(),
            reasoning: String::new(),
            thinking_started_at: None,
            reasoning_duration: None,
            first_text_at: None,
            search: None,
        }
    }

    fn reasoning_block(&self) -> Option<Reasoning> {
        (!self.reasoning.is_empty()).then(|| Reasoning {
            content: self.reasoning.clone(),
            duration: self.reasoning_duration,
        })
    }

    fn on_chunk(
        &mut self,
        message_id: &MessageId,
        chunk: Chunk,
        sink: &dyn GenerationSink,
    ) {
        match chunk {
            Chunk::Grounding(search) => {
                if search.citations.is_empty() {
                    return;
                }
                self.search = Some(search.clone());
                sink.apply(
                    message_id,
                    MessagePatch {
                        search: Some(search),
                        ..MessagePatch::default()
                    },
                );
            }
            Chunk::Text(text) => {
                let now = Instant::now();
                if self.first_text_at.is_none() {
                    self.first_text_at = Some(now);
                    if let Some(thinking_started_at) = self.thinking_started_at {
                        self.reasoning_duration = Some(millis_between(thinking_started_at, now));
                        sink.reasoning_loading(message_id, false);
                    }
                }
                self.output.push_str(&text);
                sink.apply(
                    message_id,
                    MessagePatch {
                        content: Some(self.output.clone()),
                        reasoning: self.reasoning_block(),
                        ..MessagePatch::default()
                    },
                );
            }
            Chunk::Reasoning(text) => {
                if self.thinking_started_at.is_none() {
                    self.thinking_started_at = Some(Instant::now());
                    sink.reasoning_loading(message_id, true);
                }
                self.reasoning.push_str(&text);
                sink.apply(
                    message_id,
                    MessagePatch {
                        reasoning: Some(Reasoning {
                            content: self.reasoning.clone(),
                            duration: None,
                        }),
                        ..MessagePatch::default()
                    },
                );
            }
        }
    }

    /// Reasoning that never handed over to text ends here.
    fn close_reasoning(&mut self, message_id: &MessageId, sink: &dyn GenerationSink) {
        if let (Some(thinking_started_at), None) =
            (self.thinking_started_at, self.reasoning_duration)
        {
            self.reasoning_duration = Some(millis_between(thinking_started_at, Instant::now()));
            sink.reasoning_loading(message_id, false);
        }
    }

    fn finished(mut self, content: String, meta: FinishMeta) -> MessagePatch {
        let content = if content.is_empty() {
            std::mem::take(&mut self.output)
        } else {
            content
        };
        let ttft = meta.ttft.or_else(|| {
            self.first_text_at
                .map(|first_text_at| millis_between(self.started_at, first_text_at))
        });
        MessagePatch {
            content: Some(content),
            reasoning: self.reasoning_block(),
            search: self.search.take(),
            metadata: Some(MessageMetadata {
                usage: meta.usage,
                tps: meta.tps,
                ttft,
                cancelled: false,
            }),
            ..MessagePatch::default()
        }
    }

    fn cancelled(mut self) -> MessagePatch {
        MessagePatch {
            reasoning: self.reasoning_block(),
            search: self.search.take(),
            metadata: Some(MessageMetadata {
                cancelled: true,
                ..MessageMetadata::default()
            }),
            ..MessagePatch::default()
        }
    }
}

fn millis_between(start: Instant, end: Instant) -> u64 {
    u64::try_from(end.saturating_duration_since(start).as_millis()).unwrap_or(u64::MAX)
}

/// Runs one completion for `message_id` until it finishes, fails, or `request.cancel` fires.
///
/// Cancellation is observed between chunks; nothing already dispatched is rolled back.
pub async fn run_generation(
    service: &dyn CompletionService,
    request: CompletionRequest,
    message_id: &MessageId,
    sink: &dyn GenerationSink,
) -> GenerationOutcome {
    let cancel = request.cancel.clone();
    let mut state = ChunkState::new();
    info!(
        message_id = %message_id,
        model = %request.model,
        provider = %request.provider,
        context = request.messages.len(),
        "generation started"
    );

    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        opened = service.stream_completion(request) => Some(opened),
    };
    let mut stream = match opened {
        None => {
            info!(message_id = %message_id, "generation cancelled before first chunk");
            return GenerationOutcome::Cancelled {
                patch: state.cancelled(),
            };
        }
        Some(Err(error)) => {
            warn!(message_id = %message_id, error = %error, "generation failed to start");
            return GenerationOutcome::Failed { error };
        }
        Some(Ok(stream)) => stream,
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                state.close_reasoning(message_id, sink);
                info!(
                    message_id = %message_id,
                    chars = state.output.len(),
                    "generation cancelled"
                );
                return GenerationOutcome::Cancelled {
                    patch: state.cancelled(),
                };
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(CompletionEvent::Chunk(chunk))) => {
                state.on_chunk(message_id, chunk, sink);
            }
            Some(Ok(CompletionEvent::Finished { content, meta })) => {
                state.close_reasoning(message_id, sink);
                let patch = state.finished(content, meta);
                info!(message_id = %message_id, "generation finished");
                return GenerationOutcome::Finished { patch };
            }
            Some(Err(error)) => {
                state.close_reasoning(message_id, sink);
                warn!(message_id = %message_id, error = %error, "generation failed");
                return GenerationOutcome::Failed { error };
            }
            None if state.output.is_empty() => {
                state.close_reasoning(message_id, sink);
                warn!(message_id = %message_id, "completion stream ended without output");
                return GenerationOutcome::Failed {
                    error: GenerationError::NoResponse,
                };
            }
            None => {
                state.close_reasoning(message_id, sink);
                debug!(message_id = %message_id, "completion stream ended without finish event");
                return GenerationOutcome::Finished {
                    patch: state.finished(String::new(), FinishMeta::default()),
                };
            }
        }
    }
}
