// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! The conversation engine.
//!
//! [`ConversationEngine`] owns the graph store, the message ledger, the generation registry and
//! the persistence scheduler for one embedding host. Collaborators are injected through
//! [`EngineBuilder`]; nothing here is process-global, so several engines can run side by side.
//!
//! In-memory state sits behind one `std::sync::Mutex` that is never held across an `.await`.
//! Readers may observe optimistic state while persistence calls are in flight.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::graph::GraphStore;
use crate::ledger::{MessageDispatch, MessageLedger};
use crate::model::{
    CanvasPatch, CanvasState, Message, MessageId, MessagePatch, Node, NodeId, StateId, Topic,
};
use crate::service::{CompletionService, LayoutService, PersistError, PersistenceService};
use crate::store::{FailureHook, PersistTarget, PersistenceScheduler};
use crate::stream::{GenerationRegistry, GenerationSink};

mod canvas;
mod chat;

pub use chat::{GenerationReport, GenerationStatus, SUMMARY_PROMPT};

const EVENT_CAPACITY: usize = 256;

/// Change notifications for embedding hosts. Delivery is best effort.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    CanvasChanged { state_id: StateId },
    TopicsChanged,
    MessagesChanged { state_id: StateId, node_id: NodeId },
    LoadingChanged,
    FocusChanged { node_id: Option<NodeId> },
    PersistFailed { target: PersistTarget, error: PersistError },
}

#[derive(Debug, Default)]
struct EngineState {
    graph: GraphStore,
    ledger: MessageLedger,
    message_loading_ids: BTreeSet<MessageId>,
    creating_messages: usize,
    is_generating_summary: bool,
}

struct EngineInner {
    config: EngineConfig,
    persistence: Arc<dyn PersistenceService>,
    completion: Arc<dyn CompletionService>,
    layout: Option<Arc<dyn LayoutService>>,
    scheduler: PersistenceScheduler,
    generations: GenerationRegistry,
    state: Mutex<EngineState>,
    events: broadcast::Sender<EngineEvent>,
}

pub struct EngineBuilder {
    config: EngineConfig,
    persistence: Arc<dyn PersistenceService>,
    completion: Arc<dyn CompletionService>,
    layout: Option<Arc<dyn LayoutService>>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn layout(mut self, layout: Arc<dyn LayoutService>) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn build(self) -> ConversationEngine {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let on_failure: FailureHook = {
            let events = events.clone();
            Arc::new(move |target: &PersistTarget, error: &PersistError| {
                let _ = events.send(EngineEvent::PersistFailed {
                    target: target.clone(),
                    error: error.clone(),
                });
            })
        };
        let scheduler = PersistenceScheduler::with_failure_hook(
            self.persistence.clone(),
            self.config.persist,
            Some(on_failure),
        );

        ConversationEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                persistence: self.persistence,
                completion: self.completion,
                layout: self.layout,
                scheduler,
                generations: GenerationRegistry::new(),
                state: Mutex::new(EngineState::default()),
                events,
            }),
        }
    }
}

#[derive(Clone)]
pub struct ConversationEngine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("active_state_id", &self.active_state_id())
            .field("focus_node_id", &self.focus_node_id())
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

impl ConversationEngine {
    pub fn builder(
        persistence: Arc<dyn PersistenceService>,
        completion: Arc<dyn CompletionService>,
    ) -> EngineBuilder {
        EngineBuilder {
            config: EngineConfig::default(),
            persistence,
            completion,
            layout: None,
        }
    }

    pub fn new(
        persistence: Arc<dyn PersistenceService>,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        Self::builder(persistence, completion).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner.state.lock().expect("engine state lock poisoned")
    }

    fn emit(&self, event: EngineEvent) {
        // no subscribers is fine
        let _ = self.inner.events.send(event);
    }

    // --- reads ---

    pub fn active_state_id(&self) -> Option<StateId> {
        self.lock().graph.active_state_id().cloned()
    }

    pub fn active_state(&self) -> Option<CanvasState> {
        self.lock().graph.active_state().cloned()
    }

    pub fn state(&self, state_id: &StateId) -> Option<CanvasState> {
        self.lock().graph.state(state_id).cloned()
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.lock().graph.topics().to_vec()
    }

    pub fn focus_node_id(&self) -> Option<NodeId> {
        self.lock().graph.focus_node_id().cloned()
    }

    pub fn node(&self, node_id: &NodeId) -> Option<Node> {
        self.lock()
            .graph
            .find_node(node_id)
            .map(|(_, node)| node.clone())
    }

    /// The node's UI-visible message list; empty for unknown or deleted nodes.
    pub fn messages(&self, node_id: &NodeId) -> Vec<Message> {
        let state = self.lock();
        match state.graph.find_node(node_id) {
            Some((state_id, _)) => state.ledger.messages(state_id, node_id).to_vec(),
            None => Vec::new(),
        }
    }

    pub fn message(&self, message_id: &MessageId) -> Option<Message> {
        self.lock()
            .ledger
            .find(message_id)
            .map(|(_, message)| message.clone())
    }

    pub fn chat_loading_ids(&self) -> Vec<MessageId> {
        self.inner.generations.chat_loading_ids()
    }

    pub fn reasoning_loading_ids(&self) -> Vec<MessageId> {
        self.inner.generations.reasoning_loading_ids()
    }

    /// Ids whose authoritative create call is still in flight.
    pub fn message_loading_ids(&self) -> Vec<MessageId> {
        self.lock().message_loading_ids.iter().cloned().collect()
    }

    pub fn is_creating_message(&self) -> bool {
        self.lock().creating_messages > 0
    }

    pub fn is_generating_summary(&self) -> bool {
        self.lock().is_generating_summary
    }

    /// `true` while any generation is streaming; hosts should guard page unload on it.
    pub fn is_unload_blocked(&self) -> bool {
        self.inner.generations.is_unload_blocked()
    }

    pub fn pending_writes(&self) -> usize {
        self.inner.scheduler.pending_count()
    }

    // --- canvas states and topics ---

    pub async fn create_state(&self, title: Option<&str>) -> Result<StateId, EngineError> {
        let state_id = self.inner.persistence.create_canvas_state(title).await?;

        let mut canvas = CanvasState::empty(state_id.clone());
        if let Some(title) = title {
            canvas.title = title.to_owned();
        }
        {
            let mut state = self.lock();
            state.graph.push_topic(Topic {
                id: state_id.clone(),
                title: canvas.title.clone(),
            });
            state.graph.insert_state(canvas);
            state.graph.set_active_state(Some(state_id.clone()));
        }

        info!(state_id = %state_id, "canvas state created");
        self.emit(EngineEvent::TopicsChanged);
        self.emit(EngineEvent::CanvasChanged {
            state_id: state_id.clone(),
        });
        self.emit(EngineEvent::FocusChanged { node_id: None });
        Ok(state_id)
    }

    /// Loads a canvas state with its messages and makes it active.
    ///
    /// Without an id, or when the id is unknown to persistence, falls back to the latest topic
    /// and finally to a freshly created state.
    pub async fn load_state(&self, state_id: Option<&StateId>) -> Result<StateId, EngineError> {
        let mut stored = match state_id {
            Some(state_id) => self.inner.persistence.get_canvas_state(state_id).await?,
            None => None,
        };
        if stored.is_none() {
            if let Some(state_id) = state_id {
                warn!(state_id = %state_id, "canvas state not found; falling back to latest");
            }
            let topics = self.refresh_topics().await?;
            if let Some(latest) = topics.first() {
                stored = self.inner.persistence.get_canvas_state(&latest.id).await?;
            }
        }
        let Some(stored) = stored else {
            return self.create_state(None).await;
        };

        let state_id = stored.state.id.clone();
        let (canvas_changed, changed_nodes, focus_cleared) = {
            let mut state = self.lock();
            let canvas_changed = state.graph.insert_state(stored.state);
            let mut changed_nodes = Vec::new();
            for (node_id, messages) in stored.messages {
                if state.ledger.replace(&state_id, &node_id, messages) {
                    changed_nodes.push(node_id);
                }
            }
            let focus_cleared = state.graph.active_state_id() != Some(&state_id);
            if focus_cleared {
                state.graph.set_active_state(Some(state_id.clone()));
            }
            (canvas_changed, changed_nodes, focus_cleared)
        };

        debug!(
            state_id = %state_id,
            canvas_changed,
            message_lists = changed_nodes.len(),
            "canvas state loaded"
        );
        if canvas_changed || focus_cleared {
            self.emit(EngineEvent::CanvasChanged {
                state_id: state_id.clone(),
            });
        }
        if focus_cleared {
            self.emit(EngineEvent::FocusChanged { node_id: None });
        }
        for node_id in changed_nodes {
            self.emit(EngineEvent::MessagesChanged {
                state_id: state_id.clone(),
                node_id,
            });
        }
        Ok(state_id)
    }

    /// Makes a loaded state active and clears the focus node.
    pub fn switch_state(&self, state_id: &StateId) -> Result<(), EngineError> {
        {
            let mut state = self.lock();
            if state.graph.state(state_id).is_none() {
                return Err(EngineError::StateNotFound {
                    state_id: state_id.clone(),
                });
            }
            state.graph.set_active_state(Some(state_id.clone()));
        }
        self.emit(EngineEvent::CanvasChanged {
            state_id: state_id.clone(),
        });
        self.emit(EngineEvent::FocusChanged { node_id: None });
        Ok(())
    }

    /// Deletes a canvas state everywhere. Pending writes for it are discarded first.
    pub async fn remove_state(&self, state_id: &StateId) -> Result<(), EngineError> {
        let node_ids: Vec<NodeId> = {
            let state = self.lock();
            state
                .graph
                .state(state_id)
                .map(|canvas| canvas.nodes.iter().map(|node| node.id.clone()).collect())
                .unwrap_or_default()
        };
        let dropped = self.inner.scheduler.cancel_state(state_id, &node_ids);

        self.inner.persistence.delete_canvas_state(state_id).await?;

        let purged = {
            let mut state = self.lock();
            state.graph.remove_state(state_id);
            state.ledger.purge_state(state_id)
        };
        info!(
            state_id = %state_id,
            dropped_writes = dropped,
            purged_lists = purged,
            "canvas state removed"
        );
        self.emit(EngineEvent::TopicsChanged);
        self.emit(EngineEvent::CanvasChanged {
            state_id: state_id.clone(),
        });
        Ok(())
    }

    /// Re-reads the topic list from persistence.
    pub async fn refresh_topics(&self) -> Result<Vec<Topic>, EngineError> {
        let topics = self.inner.persistence.list_topics().await?;
        let changed = self.lock().graph.set_topics(topics.clone());
        if changed {
            self.emit(EngineEvent::TopicsChanged);
        }
        Ok(topics)
    }

    pub fn update_state_title(&self, state_id: &StateId, title: &str) -> Result<(), EngineError> {
        let patch = CanvasPatch {
            title: Some(title.to_owned()),
            ..CanvasPatch::default()
        };
        let changed = {
            let mut state = self.lock();
            if state.graph.state(state_id).is_none() {
                return Err(EngineError::StateNotFound {
                    state_id: state_id.clone(),
                });
            }
            state.graph.apply_patch(state_id, &patch)
        };
        if changed {
            self.inner.scheduler.schedule_canvas(state_id, patch);
            self.emit(EngineEvent::TopicsChanged);
            self.emit(EngineEvent::CanvasChanged {
                state_id: state_id.clone(),
            });
        }
        Ok(())
    }

    // --- persistence controls ---

    /// Writes every pending scheduled update now. Call during teardown.
    pub async fn flush_persistence(&self) -> Result<(), EngineError> {
        self.inner.scheduler.flush(None).await?;
        Ok(())
    }

    /// Discards every pending scheduled update.
    pub fn cancel_persistence(&self) -> usize {
        self.inner.scheduler.cancel(None)
    }

    // --- ledger plumbing shared by canvas and chat operations ---

    fn dispatch(&self, state_id: &StateId, node_id: &NodeId, dispatch: &MessageDispatch) -> bool {
        let changed = self.lock().ledger.dispatch(state_id, node_id, dispatch);
        if changed {
            self.emit(EngineEvent::MessagesChanged {
                state_id: state_id.clone(),
                node_id: node_id.clone(),
            });
        }
        changed
    }

    fn set_reasoning_loading(&self, message_id: &MessageId, loading: bool) {
        if self.inner.generations.set_reasoning(message_id, loading) {
            self.emit(EngineEvent::LoadingChanged);
        }
    }
}

/// Routes streamed patches of one assistant message into the ledger.
struct EngineSink<'a> {
    engine: &'a ConversationEngine,
    state_id: &'a StateId,
    node_id: &'a NodeId,
}

impl GenerationSink for EngineSink<'_> {
    fn apply(&self, message_id: &MessageId, patch: MessagePatch) {
        self.engine.dispatch(
            self.state_id,
            self.node_id,
            &MessageDispatch::update(message_id.clone(), patch),
        );
    }

    fn reasoning_loading(&self, message_id: &MessageId, loading: bool) {
        self.engine.set_reasoning_loading(message_id, loading);
    }
}
