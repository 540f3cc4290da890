// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! A completion service that replays queued scripts.
//!
//! Each `stream_completion` call pops the next script. Scripts are either a fixed list of
//! events or a channel the caller feeds live through a [`ScriptHandle`].

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;

use crate::model::GroundingSearch;
use crate::service::{
    Chunk, CompletionEvent, CompletionRequest, CompletionService, CompletionStream, FinishMeta,
    GenerationError,
};

type ScriptItem = Result<CompletionEvent, GenerationError>;

#[derive(Debug)]
enum Script {
    Events(Vec<ScriptItem>),
    Live(mpsc::UnboundedReceiver<ScriptItem>),
    Refuse(GenerationError),
}

#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_events(&self, events: Vec<ScriptItem>) {
        self.push(Script::Events(events));
    }

    /// Streams `reply` one word at a time, then finishes with the full text.
    pub fn push_reply(&self, reply: &str) {
        let mut events = reply
            .split_inclusive(' ')
            .map(|word| Ok(CompletionEvent::Chunk(Chunk::Text(word.to_owned()))))
            .collect::<Vec<_>>();
        events.push(Ok(CompletionEvent::Finished {
            content: reply.to_owned(),
            meta: FinishMeta::default(),
        }));
        self.push(Script::Events(events));
    }

    /// The next call fails before any chunk is produced.
    pub fn push_refusal(&self, error: GenerationError) {
        self.push(Script::Refuse(error));
    }

    /// Queues a live script and returns the handle that feeds it.
    pub fn push_live(&self) -> ScriptHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(Script::Live(rx));
        ScriptHandle { tx }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .expect("scripted completion lock poisoned")
            .clone()
    }

    pub fn pending_scripts(&self) -> usize {
        self.scripts
            .lock()
            .expect("scripted completion lock poisoned")
            .len()
    }

    fn push(&self, script: Script) {
        self.scripts
            .lock()
            .expect("scripted completion lock poisoned")
            .push_back(script);
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, GenerationError> {
        self.requests
            .lock()
            .expect("scripted completion lock poisoned")
            .push(request);
        let script = self
            .scripts
            .lock()
            .expect("scripted completion lock poisoned")
            .pop_front();

        match script {
            None => Err(GenerationError::NoResponse),
            Some(Script::Refuse(error)) => Err(error),
            Some(Script::Events(events)) => Ok(stream::iter(events).boxed()),
            Some(Script::Live(rx)) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
        }
    }
}

/// Feeds a live script. Dropping the handle ends the stream.
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    tx: mpsc::UnboundedSender<ScriptItem>,
}

impl ScriptHandle {
    /// Returns `false` once the consumer is gone.
    pub fn send(&self, item: ScriptItem) -> bool {
        self.tx.send(item).is_ok()
    }

    pub fn text(&self, text: &str) -> bool {
        self.send(Ok(CompletionEvent::Chunk(Chunk::Text(text.to_owned()))))
    }

    pub fn reasoning(&self, text: &str) -> bool {
        self.send(Ok(CompletionEvent::Chunk(Chunk::Reasoning(text.to_owned()))))
    }

    pub fn grounding(&self, search: GroundingSearch) -> bool {
        self.send(Ok(CompletionEvent::Chunk(Chunk::Grounding(search))))
    }

    pub fn finish(&self, content: &str, meta: FinishMeta) -> bool {
        self.send(Ok(CompletionEvent::Finished {
            content: content.to_owned(),
            meta,
        }))
    }

    pub fn fail(&self, error: GenerationError) -> bool {
        self.send(Err(error))
    }
}
