// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! In-memory graph store.
//!
//! Holds every loaded canvas state keyed by id, the topic list, the active state and the focus
//! node. Mutations are synchronous and return the whole array that changed so the caller can
//! hand it to the persistence scheduler.

use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::model::{
    CanvasPatch, CanvasState, Edge, Node, NodeId, NodeMeta, NodeMetaPatch, StateId, Topic,
};

pub mod changes;

pub use changes::{add_edge, apply_edge_changes, apply_node_changes, EdgeChange, NodeChange};

/// Result of removing a node: the arrays to persist plus what was dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedNode {
    pub state_id: StateId,
    pub node: Node,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub removed_edges: usize,
    pub was_focus: bool,
}

/// Arrays touched by a batch of node changes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodesApplied {
    pub nodes: Option<Vec<Node>>,
    /// Set when removed nodes left dangling edges behind.
    pub edges: Option<Vec<Edge>>,
    pub removed: Vec<NodeId>,
}

impl NodesApplied {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_none() && self.edges.is_none()
    }

    pub fn into_patch(self) -> CanvasPatch {
        CanvasPatch {
            title: None,
            nodes: self.nodes,
            edges: self.edges,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphStore {
    states: BTreeMap<StateId, CanvasState>,
    topics: Vec<Topic>,
    active_state_id: Option<StateId>,
    focus_node_id: Option<NodeId>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> &BTreeMap<StateId, CanvasState> {
        &self.states
    }

    pub fn state(&self, state_id: &StateId) -> Option<&CanvasState> {
        self.states.get(state_id)
    }

    pub fn active_state_id(&self) -> Option<&StateId> {
        self.active_state_id.as_ref()
    }

    pub fn active_state(&self) -> Option<&CanvasState> {
        self.active_state_id
            .as_ref()
            .and_then(|state_id| self.states.get(state_id))
    }

    /// Switching state always clears the focus node.
    pub fn set_active_state(&mut self, state_id: Option<StateId>) {
        self.active_state_id = state_id;
        self.focus_node_id = None;
    }

    pub fn focus_node_id(&self) -> Option<&NodeId> {
        self.focus_node_id.as_ref()
    }

    pub fn set_focus(&mut self, node_id: Option<NodeId>) {
        self.focus_node_id = node_id;
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// Returns `false` if the topic list was already equal.
    pub fn set_topics(&mut self, topics: Vec<Topic>) -> bool {
        if self.topics == topics {
            return false;
        }
        self.topics = topics;
        true
    }

    pub fn push_topic(&mut self, topic: Topic) {
        if !self.topics.iter().any(|existing| existing.id == topic.id) {
            self.topics.push(topic);
        }
    }

    /// Inserts or replaces a state. Returns `false` when the stored value is already equal.
    pub fn insert_state(&mut self, state: CanvasState) -> bool {
        if self.states.get(&state.id) == Some(&state) {
            return false;
        }
        self.states.insert(state.id.clone(), state);
        true
    }

    pub fn remove_state(&mut self, state_id: &StateId) -> Option<CanvasState> {
        let removed = self.states.remove(state_id)?;
        self.topics.retain(|topic| &topic.id != state_id);
        if self.active_state_id.as_ref() == Some(state_id) {
            self.active_state_id = None;
            self.focus_node_id = None;
        }
        Some(removed)
    }

    /// Returns `true` if the state changed.
    pub fn apply_patch(&mut self, state_id: &StateId, patch: &CanvasPatch) -> bool {
        let Some(state) = self.states.get_mut(state_id) else {
            return false;
        };
        let changed = patch.apply_to(state);
        if let Some(title) = &patch.title {
            if let Some(topic) = self.topics.iter_mut().find(|topic| &topic.id == state_id) {
                topic.title.clone_from(title);
            }
        }
        changed
    }

    /// Locates a node across all loaded states; node ids are globally unique.
    pub fn find_node(&self, node_id: &NodeId) -> Option<(&StateId, &Node)> {
        self.states.iter().find_map(|(state_id, state)| {
            state.node(node_id).map(|node| (state_id, node))
        })
    }

    /// Node ids are unique across states; an id owned elsewhere cannot be added to `state_id`.
    fn ensure_unowned(&self, state_id: &StateId, node_id: &NodeId) -> Result<(), EngineError> {
        match self.find_node(node_id) {
            Some((owner, _)) if owner != state_id => Err(EngineError::DuplicateNode {
                node_id: node_id.clone(),
                state_id: owner.clone(),
            }),
            _ => Ok(()),
        }
    }

    pub fn node_meta(&self, node_id: &NodeId) -> Option<&NodeMeta> {
        self.find_node(node_id).map(|(_, node)| &node.meta)
    }

    /// Appends a node and returns the full nodes array to persist.
    ///
    /// Fails with `DuplicateNode` when another state already owns the id.
    pub fn push_node(&mut self, state_id: &StateId, node: Node) -> Result<Vec<Node>, EngineError> {
        self.ensure_unowned(state_id, &node.id)?;
        let state = self
            .states
            .get_mut(state_id)
            .ok_or_else(|| EngineError::StateNotFound {
                state_id: state_id.clone(),
            })?;
        if !state.contains_node(&node.id) {
            state.nodes.push(node);
        }
        Ok(state.nodes.clone())
    }

    /// Removes a node with every incident edge and clears the focus if it pointed there.
    pub fn remove_node(&mut self, node_id: &NodeId) -> Option<RemovedNode> {
        let (state_id, state) = self
            .states
            .iter_mut()
            .find(|(_, state)| state.contains_node(node_id))?;
        let position = state.nodes.iter().position(|node| &node.id == node_id)?;
        let node = state.nodes.remove(position);

        let edges_before = state.edges.len();
        state.edges.retain(|edge| !edge.touches(node_id));
        let removed_edges = edges_before - state.edges.len();

        let removed = RemovedNode {
            state_id: state_id.clone(),
            node,
            nodes: state.nodes.clone(),
            edges: state.edges.clone(),
            removed_edges,
            was_focus: self.focus_node_id.as_ref() == Some(node_id),
        };
        if removed.was_focus {
            self.focus_node_id = None;
        }
        Some(removed)
    }

    /// Adds an edge between two nodes of `state_id`.
    ///
    /// Returns `Ok(None)` when an edge with the same endpoints already exists.
    pub fn add_edge(
        &mut self,
        state_id: &StateId,
        edge: Edge,
    ) -> Result<Option<Vec<Edge>>, EngineError> {
        let state = self
            .states
            .get_mut(state_id)
            .ok_or_else(|| EngineError::StateNotFound {
                state_id: state_id.clone(),
            })?;
        if !state.edge_is_internal(&edge) {
            return Err(EngineError::InvalidEdge {
                source: edge.source,
                target: edge.target,
            });
        }
        let Some(next) = changes::add_edge(edge, &state.edges) else {
            return Ok(None);
        };
        state.edges.clone_from(&next);
        Ok(Some(next))
    }

    /// Applies node changes; removed nodes take their incident edges with them.
    pub fn apply_node_changes(
        &mut self,
        state_id: &StateId,
        node_changes: &[NodeChange],
    ) -> Result<NodesApplied, EngineError> {
        for change in node_changes {
            if let NodeChange::Add(node) = change {
                self.ensure_unowned(state_id, &node.id)?;
            }
        }
        let state = self
            .states
            .get_mut(state_id)
            .ok_or_else(|| EngineError::StateNotFound {
                state_id: state_id.clone(),
            })?;

        let next_nodes = changes::apply_node_changes(node_changes, &state.nodes);
        let removed = state
            .nodes
            .iter()
            .filter(|node| !next_nodes.iter().any(|next| next.id == node.id))
            .map(|node| node.id.clone())
            .collect::<Vec<_>>();

        let mut applied = NodesApplied::default();
        if next_nodes != state.nodes {
            state.nodes = next_nodes;
            applied.nodes = Some(state.nodes.clone());
        }

        let edges_before = state.edges.len();
        let nodes = &state.nodes;
        state.edges.retain(|edge| {
            nodes.iter().any(|node| node.id == edge.source)
                && nodes.iter().any(|node| node.id == edge.target)
        });
        if state.edges.len() != edges_before {
            applied.edges = Some(state.edges.clone());
        }

        if self
            .focus_node_id
            .as_ref()
            .is_some_and(|focus| removed.contains(focus))
        {
            self.focus_node_id = None;
        }
        applied.removed = removed;
        Ok(applied)
    }

    /// Applies edge changes, filtering out edges that would leave the state.
    ///
    /// Returns `Ok(None)` when nothing changed.
    pub fn apply_edge_changes(
        &mut self,
        state_id: &StateId,
        edge_changes: &[EdgeChange],
    ) -> Result<Option<Vec<Edge>>, EngineError> {
        let state = self
            .states
            .get_mut(state_id)
            .ok_or_else(|| EngineError::StateNotFound {
                state_id: state_id.clone(),
            })?;

        let mut next = changes::apply_edge_changes(edge_changes, &state.edges);
        next.retain(|edge| state.edge_is_internal(edge));
        if next == state.edges {
            return Ok(None);
        }
        state.edges.clone_from(&next);
        Ok(Some(next))
    }

    /// Merges a meta patch into the node. Returns the owning state and whether anything changed.
    pub fn update_node_meta(
        &mut self,
        node_id: &NodeId,
        patch: &NodeMetaPatch,
    ) -> Option<(StateId, bool)> {
        self.states.iter_mut().find_map(|(state_id, state)| {
            state
                .node_mut(node_id)
                .map(|node| (state_id.clone(), patch.apply_to(&mut node.meta)))
        })
    }

    /// Marks exactly the given `(source, target)` pairs as animated. Local-only.
    pub fn highlight_edges(&mut self, state_id: &StateId, path: &[(NodeId, NodeId)]) -> bool {
        let Some(state) = self.states.get_mut(state_id) else {
            return false;
        };
        let mut changed = false;
        for edge in &mut state.edges {
            let animated = path
                .iter()
                .any(|(source, target)| &edge.source == source && &edge.target == target);
            changed |= edge.animated != animated;
            edge.animated = animated;
        }
        changed
    }
}
