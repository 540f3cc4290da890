// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use tracing::{debug, info, warn};

use super::{ConversationEngine, EngineEvent};
use crate::context::{self, find_ancestors, ResolvedContext};
use crate::error::EngineError;
use crate::graph::{EdgeChange, NodeChange};
use crate::model::{CanvasPatch, Edge, NodeId, NodeKind, NodeMetaPatch, Position, StateId};
use crate::store::PersistTarget;

impl ConversationEngine {
    /// Creates a node in the active state, creating the state first when there is none.
    ///
    /// The node id comes from persistence; the node is appended locally once it is known.
    pub async fn add_node(
        &self,
        position: Position,
        kind: NodeKind,
        meta: NodeMetaPatch,
    ) -> Result<NodeId, EngineError> {
        let state_id = match self.active_state_id() {
            Some(state_id) => state_id,
            None => {
                debug!("no active state; creating one for the first node");
                self.create_state(None).await.map_err(|err| {
                    warn!(error = %err, "could not create a canvas state for the new node");
                    EngineError::NoActiveState
                })?
            }
        };

        let mut node = self.inner.persistence.create_node(&state_id, &meta).await?;
        node.position = position;
        node.kind = kind;
        let node_id = node.id.clone();

        let nodes = self.lock().graph.push_node(&state_id, node)?;
        self.inner
            .scheduler
            .schedule_canvas(&state_id, CanvasPatch::nodes(nodes));

        info!(state_id = %state_id, node_id = %node_id, "node added");
        self.emit(EngineEvent::CanvasChanged { state_id });
        Ok(node_id)
    }

    /// Removes a node with its incident edges.
    ///
    /// The node's messages stay in the ledger but are no longer visible.
    pub async fn delete_node(&self, node_id: &NodeId) -> Result<(), EngineError> {
        let removed = {
            let mut state = self.lock();
            let removed = state
                .graph
                .remove_node(node_id)
                .ok_or_else(|| EngineError::NodeNotFound {
                    node_id: node_id.clone(),
                })?;
            state.ledger.detach(&removed.state_id, node_id);
            removed
        };

        self.inner
            .scheduler
            .cancel(Some(&PersistTarget::Node(node_id.clone())));
        let mut patch = CanvasPatch::nodes(removed.nodes);
        if removed.removed_edges > 0 {
            patch.edges = Some(removed.edges);
        }
        self.inner
            .scheduler
            .schedule_canvas(&removed.state_id, patch);

        info!(
            state_id = %removed.state_id,
            node_id = %node_id,
            removed_edges = removed.removed_edges,
            "node deleted"
        );
        self.emit(EngineEvent::CanvasChanged {
            state_id: removed.state_id.clone(),
        });
        self.emit(EngineEvent::MessagesChanged {
            state_id: removed.state_id,
            node_id: node_id.clone(),
        });
        if removed.was_focus {
            self.emit(EngineEvent::FocusChanged { node_id: None });
        }

        self.inner.persistence.delete_node(node_id).await?;
        Ok(())
    }

    /// Connects two nodes of the active state. Returns `false` for a duplicate edge.
    pub fn add_edge(&self, edge: Edge) -> Result<bool, EngineError> {
        let state_id = self.require_active_state()?;
        let Some(edges) = self.lock().graph.add_edge(&state_id, edge)? else {
            return Ok(false);
        };
        self.inner
            .scheduler
            .schedule_canvas(&state_id, CanvasPatch::edges(edges));
        self.emit(EngineEvent::CanvasChanged { state_id });
        Ok(true)
    }

    /// Applies node changes from the canvas to the active state.
    ///
    /// Removed nodes lose their edges and their message lists are hidden.
    pub fn apply_node_changes(&self, changes: &[NodeChange]) -> Result<(), EngineError> {
        let state_id = self.require_active_state()?;
        let (applied, focus_cleared) = {
            let mut state = self.lock();
            let had_focus = state.graph.focus_node_id().is_some();
            let applied = state.graph.apply_node_changes(&state_id, changes)?;
            for node_id in &applied.removed {
                state.ledger.detach(&state_id, node_id);
            }
            let focus_cleared = had_focus && state.graph.focus_node_id().is_none();
            (applied, focus_cleared)
        };
        if applied.is_empty() {
            return Ok(());
        }

        for node_id in &applied.removed {
            self.inner
                .scheduler
                .cancel(Some(&PersistTarget::Node(node_id.clone())));
            self.emit(EngineEvent::MessagesChanged {
                state_id: state_id.clone(),
                node_id: node_id.clone(),
            });
        }
        self.inner
            .scheduler
            .schedule_canvas(&state_id, applied.into_patch());
        self.emit(EngineEvent::CanvasChanged { state_id });
        if focus_cleared {
            self.emit(EngineEvent::FocusChanged { node_id: None });
        }
        Ok(())
    }

    pub fn apply_edge_changes(&self, changes: &[EdgeChange]) -> Result<(), EngineError> {
        let state_id = self.require_active_state()?;
        let Some(edges) = self.lock().graph.apply_edge_changes(&state_id, changes)? else {
            return Ok(());
        };
        self.inner
            .scheduler
            .schedule_canvas(&state_id, CanvasPatch::edges(edges));
        self.emit(EngineEvent::CanvasChanged { state_id });
        Ok(())
    }

    /// Merges `patch` into the node's meta and schedules the node write when it changed.
    pub fn update_node_meta(
        &self,
        node_id: &NodeId,
        patch: NodeMetaPatch,
    ) -> Result<bool, EngineError> {
        let (state_id, changed) = self
            .lock()
            .graph
            .update_node_meta(node_id, &patch)
            .ok_or_else(|| EngineError::NodeNotFound {
                node_id: node_id.clone(),
            })?;
        if changed {
            self.inner.scheduler.schedule_node(node_id, patch);
            self.emit(EngineEvent::CanvasChanged { state_id });
        }
        Ok(changed)
    }

    pub fn set_focus(&self, node_id: Option<&NodeId>) -> Result<(), EngineError> {
        {
            let mut state = self.lock();
            if let Some(node_id) = node_id {
                if state.graph.find_node(node_id).is_none() {
                    return Err(EngineError::NodeNotFound {
                        node_id: node_id.clone(),
                    });
                }
            }
            if state.graph.focus_node_id() == node_id {
                return Ok(());
            }
            state.graph.set_focus(node_id.cloned());
        }
        self.emit(EngineEvent::FocusChanged {
            node_id: node_id.cloned(),
        });
        Ok(())
    }

    /// Focuses a node and highlights the edges its ancestor search walks. Not persisted.
    pub fn open_node(&self, node_id: &NodeId) -> Result<(), EngineError> {
        self.set_focus(Some(node_id))?;
        let highlighted = {
            let mut state = self.lock();
            let Some((state_id, _)) = state.graph.find_node(node_id) else {
                return Err(EngineError::NodeNotFound {
                    node_id: node_id.clone(),
                });
            };
            let state_id = state_id.clone();
            let Some(canvas) = state.graph.state(&state_id) else {
                return Ok(());
            };
            let search = find_ancestors(canvas, node_id);
            state
                .graph
                .highlight_edges(&state_id, &search.activated_edges)
                .then_some(state_id)
        };
        if let Some(state_id) = highlighted {
            self.emit(EngineEvent::CanvasChanged { state_id });
        }
        Ok(())
    }

    /// Ancestor context for a node, without the node's own messages.
    pub fn resolve_context(&self, node_id: &NodeId) -> Result<ResolvedContext, EngineError> {
        let state = self.lock();
        let (state_id, _) =
            state
                .graph
                .find_node(node_id)
                .ok_or_else(|| EngineError::NodeNotFound {
                    node_id: node_id.clone(),
                })?;
        let canvas = state
            .graph
            .state(state_id)
            .ok_or_else(|| EngineError::StateNotFound {
                state_id: state_id.clone(),
            })?;
        Ok(context::resolve_context(
            canvas,
            &state.ledger,
            node_id,
            &self.inner.config.context,
        ))
    }

    /// Runs the injected layout service over the active state. Returns `false` without one.
    pub fn auto_layout(&self) -> Result<bool, EngineError> {
        let Some(layout) = self.inner.layout.clone() else {
            return Ok(false);
        };
        let state_id = self.require_active_state()?;
        let (nodes, edges) = {
            let state = self.lock();
            let canvas = state
                .graph
                .state(&state_id)
                .ok_or_else(|| EngineError::StateNotFound {
                    state_id: state_id.clone(),
                })?;
            (canvas.nodes.clone(), canvas.edges.clone())
        };

        let result = layout.layout(&nodes, &edges);
        let repositioned = nodes
            .into_iter()
            .map(|mut node| {
                if let Some(laid_out) = result.nodes.iter().find(|other| other.id == node.id) {
                    node.position = laid_out.position;
                }
                node
            })
            .collect::<Vec<_>>();

        let patch = CanvasPatch::nodes(repositioned);
        if !self.lock().graph.apply_patch(&state_id, &patch) {
            return Ok(false);
        }
        self.inner.scheduler.schedule_canvas(&state_id, patch);
        self.emit(EngineEvent::CanvasChanged { state_id });
        Ok(true)
    }

    fn require_active_state(&self) -> Result<StateId, EngineError> {
        self.active_state_id().ok_or_else(|| {
            warn!("no active canvas state");
            EngineError::NoActiveState
        })
    }
}
