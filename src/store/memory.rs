// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{
    now_ms, CanvasPatch, CanvasState, Message, MessageId, MessagePatch, NewMessage, Node,
    NodeId, NodeKind, NodeMeta, NodeMetaPatch, Position, StateId, Topic, DEFAULT_STATE_TITLE,
};
use crate::service::{PersistError, PersistOp, PersistenceService, StoredCanvas};

/// One recorded call: the operation and the id it addressed (empty for `listTopics`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistCall {
    pub op: PersistOp,
    pub id: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    canvases: HashMap<StateId, CanvasState>,
    // creation order, oldest first
    canvas_order: Vec<StateId>,
    node_meta: HashMap<NodeId, (StateId, NodeMeta)>,
    messages: HashMap<MessageId, Message>,
    message_order: Vec<MessageId>,
    failures: HashMap<PersistOp, usize>,
    latency: HashMap<PersistOp, Duration>,
    calls: Vec<PersistCall>,
}

/// Process-local [`PersistenceService`] with call recording, latency and failure injection.
///
/// Node metadata is stored apart from the canvas blob and merged back on read.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    state: Mutex<MemoryState>,
}

fn fresh_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `times` calls of `op` fail with a backend error.
    pub fn fail_next(&self, op: PersistOp, times: usize) {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        state.failures.insert(op, times);
    }

    /// Every call of `op` sleeps for `delay` before answering.
    pub fn set_latency(&self, op: PersistOp, delay: Duration) {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        state.latency.insert(op, delay);
    }

    pub fn calls(&self) -> Vec<PersistCall> {
        let state = self.state.lock().expect("memory store lock poisoned");
        state.calls.clone()
    }

    pub fn call_count(&self, op: PersistOp) -> usize {
        let state = self.state.lock().expect("memory store lock poisoned");
        state.calls.iter().filter(|call| call.op == op).count()
    }

    pub fn clear_calls(&self) {
        let mut state = self.state.lock().expect("memory store lock poisoned");
        state.calls.clear();
    }

    /// The stored canvas blob, without node metadata merged in.
    pub fn canvas(&self, state_id: &StateId) -> Option<CanvasState> {
        let state = self.state.lock().expect("memory store lock poisoned");
        state.canvases.get(state_id).cloned()
    }

    pub fn node_meta(&self, node_id: &NodeId) -> Option<NodeMeta> {
        let state = self.state.lock().expect("memory store lock poisoned");
        state.node_meta.get(node_id).map(|(_, meta)| meta.clone())
    }

    pub fn message(&self, message_id: &MessageId) -> Option<Message> {
        let state = self.state.lock().expect("memory store lock poisoned");
        state.messages.get(message_id).cloned()
    }

    /// Stored messages of a node in creation order.
    pub fn node_messages(&self, node_id: &NodeId) -> Vec<Message> {
        let state = self.state.lock().expect("memory store lock poisoned");
        state.messages_of(node_id)
    }

    /// Records the call, then applies configured latency and failure injection.
    async fn enter(&self, op: PersistOp, id: &str) -> Result<(), PersistError> {
        let delay = {
            let mut state = self.state.lock().expect("memory store lock poisoned");
            state.calls.push(PersistCall {
                op,
                id: id.to_owned(),
            });
            state.latency.get(&op).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().expect("memory store lock poisoned");
        if let Some(remaining) = state.failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PersistError::backend(op, "injected failure"));
            }
        }
        Ok(())
    }
}

impl MemoryState {
    fn messages_of(&self, node_id: &NodeId) -> Vec<Message> {
        self.message_order
            .iter()
            .filter_map(|message_id| self.messages.get(message_id))
            .filter(|message| message.graph_node_id.as_ref() == Some(node_id))
            .cloned()
            .collect()
    }

    fn remove_messages(&mut self, ids: &[MessageId]) {
        for id in ids {
            self.messages.remove(id);
        }
        self.message_order.retain(|id| !ids.contains(id));
    }
}

#[async_trait]
impl PersistenceService for InMemoryPersistence {
    async fn create_canvas_state(&self, title: Option<&str>) -> Result<StateId, PersistError> {
        self.enter(PersistOp::CreateCanvasState, "").await?;
        let id = StateId::new(fresh_id("state"))
            .map_err(|err| PersistError::backend(PersistOp::CreateCanvasState, err.to_string()))?;
        let mut canvas = CanvasState::empty(id.clone());
        canvas.title = title.unwrap_or(DEFAULT_STATE_TITLE).to_owned();

        let mut state = self.state.lock().expect("memory store lock poisoned");
        state.canvases.insert(id.clone(), canvas);
        state.canvas_order.push(id.clone());
        Ok(id)
    }

    async fn get_canvas_state(&self, id: &StateId) -> Result<Option<StoredCanvas>, PersistError> {
        self.enter(PersistOp::GetCanvasState, id.as_str()).await?;
        let state = self.state.lock().expect("memory store lock poisoned");
        let Some(canvas) = state.canvases.get(id) else {
            return Ok(None);
        };

        let mut canvas = canvas.clone();
        let mut messages = BTreeMap::new();
        for node in &mut canvas.nodes {
            if let Some((_, meta)) = state.node_meta.get(&node.id) {
                node.meta = meta.clone();
            }
            let stored = state.messages_of(&node.id);
            if !stored.is_empty() {
                messages.insert(node.id.clone(), stored);
            }
        }
        Ok(Some(StoredCanvas {
            state: canvas,
            messages,
        }))
    }

    async fn update_canvas_state(
        &self,
        id: &StateId,
        patch: &CanvasPatch,
    ) -> Result<(), PersistError> {
        self.enter(PersistOp::UpdateCanvasState, id.as_str()).await?;
        let mut state = self.state.lock().expect("memory store lock poisoned");
        let canvas = state
            .canvases
            .get_mut(id)
            .ok_or_else(|| PersistError::NotFound {
                op: PersistOp::UpdateCanvasState,
                id: id.to_string(),
            })?;
        patch.apply_to(canvas);
        Ok(())
    }

    async fn delete_canvas_state(&self, id: &StateId) -> Result<(), PersistError> {
        self.enter(PersistOp::DeleteCanvasState, id.as_str()).await?;
        let mut state = self.state.lock().expect("memory store lock poisoned");
        if state.canvases.remove(id).is_none() {
            return Err(PersistError::NotFound {
                op: PersistOp::DeleteCanvasState,
                id: id.to_string(),
            });
        }
        state.canvas_order.retain(|existing| existing != id);

        let owned_nodes = state
            .node_meta
            .iter()
            .filter(|(_, (owner, _))| owner == id)
            .map(|(node_id, _)| node_id.clone())
            .collect::<Vec<_>>();
        let owned_messages = state
            .messages
            .values()
            .filter(|message| {
                message
                    .graph_node_id
                    .as_ref()
                    .is_some_and(|node_id| owned_nodes.contains(node_id))
            })
            .map(|message| message.id.clone())
            .collect::<Vec<_>>();
        for node_id in &owned_nodes {
            state.node_meta.remove(node_id);
        }
        state.remove_messages(&owned_messages);
        Ok(())
    }

    async fn create_node(
        &self,
        state_id: &StateId,
        meta: &NodeMetaPatch,
    ) -> Result<Node, PersistError> {
        self.enter(PersistOp::CreateNode, state_id.as_str()).await?;
        let mut state = self.state.lock().expect("memory store lock poisoned");
        if !state.canvases.contains_key(state_id) {
            return Err(PersistError::NotFound {
                op: PersistOp::CreateNode,
                id: state_id.to_string(),
            });
        }

        let id = NodeId::new(fresh_id("node"))
            .map_err(|err| PersistError::backend(PersistOp::CreateNode, err.to_string()))?;
        let mut node_meta = NodeMeta::default();
        meta.apply_to(&mut node_meta);
        state
            .node_meta
            .insert(id.clone(), (state_id.clone(), node_meta.clone()));
        Ok(Node::new(id, Position::default(), NodeKind::Chat, node_meta))
    }

    async fn update_node(&self, id: &NodeId, meta: &NodeMetaPatch) -> Result<(), PersistError> {
        self.enter(PersistOp::UpdateNode, id.as_str()).await?;
        let mut state = self.state.lock().expect("memory store lock poisoned");
        let (_, stored) = state
            .node_meta
            .get_mut(id)
            .ok_or_else(|| PersistError::NotFound {
                op: PersistOp::UpdateNode,
                id: id.to_string(),
            })?;
        meta.apply_to(stored);
        Ok(())
    }

    async fn delete_node(&self, id: &NodeId) -> Result<(), PersistError> {
        self.enter(PersistOp::DeleteNode, id.as_str()).await?;
        let mut state = self.state.lock().expect("memory store lock poisoned");
        state
            .node_meta
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| PersistError::NotFound {
                op: PersistOp::DeleteNode,
                id: id.to_string(),
            })
    }

    async fn create_message(&self, params: &NewMessage) -> Result<MessageId, PersistError> {
        self.enter(PersistOp::CreateMessage, params.graph_node_id.as_str())
            .await?;
        let id = MessageId::new(fresh_id("msg"))
            .map_err(|err| PersistError::backend(PersistOp::CreateMessage, err.to_string()))?;
        let message = params.clone().into_message(id.clone());

        let mut state = self.state.lock().expect("memory store lock poisoned");
        state.messages.insert(id.clone(), message);
        state.message_order.push(id.clone());
        Ok(id)
    }

    async fn update_message(
        &self,
        id: &MessageId,
        patch: &MessagePatch,
    ) -> Result<(), PersistError> {
        self.enter(PersistOp::UpdateMessage, id.as_str()).await?;
        let mut state = self.state.lock().expect("memory store lock poisoned");
        let message = state
            .messages
            .get_mut(id)
            .ok_or_else(|| PersistError::NotFound {
                op: PersistOp::UpdateMessage,
                id: id.to_string(),
            })?;
        patch.apply_to(message);
        message.updated_at = now_ms();
        Ok(())
    }

    async fn delete_messages(&self, ids: &[MessageId]) -> Result<(), PersistError> {
        let joined = ids
            .iter()
            .map(MessageId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        self.enter(PersistOp::DeleteMessages, &joined).await?;
        let mut state = self.state.lock().expect("memory store lock poisoned");
        state.remove_messages(ids);
        Ok(())
    }

    /// Newest state first.
    async fn list_topics(&self) -> Result<Vec<Topic>, PersistError> {
        self.enter(PersistOp::ListTopics, "").await?;
        let state = self.state.lock().expect("memory store lock poisoned");
        Ok(state
            .canvas_order
            .iter()
            .rev()
            .filter_map(|id| state.canvases.get(id))
            .map(|canvas| Topic {
                id: canvas.id.clone(),
                title: canvas.title.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryPersistence;
    use crate::model::{CanvasPatch, MessagePatch, NewMessage, NodeMetaPatch};
    use crate::service::{PersistError, PersistOp, PersistenceService};

    #[tokio::test]
    async fn node_meta_is_merged_back_on_read() {
        let store = InMemoryPersistence::new();
        let state_id = store.create_canvas_state(Some("Plan")).await.expect("state");
        let node = store
            .create_node(
                &state_id,
                &NodeMetaPatch {
                    title: Some("Root".to_owned()),
                    ..NodeMetaPatch::default()
                },
            )
            .await
            .expect("node");
        store
            .update_canvas_state(&state_id, &CanvasPatch::nodes(vec![node.clone()]))
            .await
            .expect("update");
        store
            .update_node(
                &node.id,
                &NodeMetaPatch {
                    summary: Some("short".to_owned()),
                    ..NodeMetaPatch::default()
                },
            )
            .await
            .expect("update node");
        let message_id = store
            .create_message(&NewMessage::user(node.id.clone(), "hi"))
            .await
            .expect("message");

        let stored = store
            .get_canvas_state(&state_id)
            .await
            .expect("get")
            .expect("stored canvas");
        assert_eq!(stored.state.title, "Plan");
        assert_eq!(stored.state.nodes[0].meta.title, "Root");
        assert_eq!(stored.state.nodes[0].meta.summary, "short");
        assert_eq!(
            stored.messages.get(&node.id).map(|messages| messages[0].id.clone()),
            Some(message_id)
        );
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() {
        let store = InMemoryPersistence::new();
        store.fail_next(PersistOp::CreateCanvasState, 1);

        let err = store.create_canvas_state(None).await.unwrap_err();
        assert_eq!(err, PersistError::backend(PersistOp::CreateCanvasState, "injected failure"));
        assert!(store.create_canvas_state(None).await.is_ok());
        assert_eq!(store.call_count(PersistOp::CreateCanvasState), 2);
    }

    #[tokio::test]
    async fn missing_targets_report_not_found() {
        let store = InMemoryPersistence::new();
        let message_id = crate::model::MessageId::new("msg_missing").expect("message id");
        let err = store
            .update_message(&message_id, &MessagePatch::content("x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PersistError::NotFound {
                op: PersistOp::UpdateMessage,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn topics_list_newest_first_and_delete_cascades() {
        let store = InMemoryPersistence::new();
        let first = store.create_canvas_state(Some("first")).await.expect("state");
        let second = store.create_canvas_state(Some("second")).await.expect("state");
        let node = store
            .create_node(&first, &NodeMetaPatch::default())
            .await
            .expect("node");
        store
            .create_message(&NewMessage::user(node.id.clone(), "hi"))
            .await
            .expect("message");

        let topics = store.list_topics().await.expect("topics");
        assert_eq!(
            topics.iter().map(|topic| topic.id.clone()).collect::<Vec<_>>(),
            vec![second, first.clone()]
        );

        store.delete_canvas_state(&first).await.expect("delete");
        assert!(store.node_meta(&node.id).is_none());
        assert!(store.node_messages(&node.id).is_empty());
        assert_eq!(store.list_topics().await.expect("topics").len(), 1);
    }
}
