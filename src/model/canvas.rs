// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use serde::{Deserialize, Serialize};

use super::ids::{EdgeId, NodeId, StateId};

pub const DEFAULT_STATE_TITLE: &str = "New Graph";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rendering hint for a node. The engine treats both kinds the same way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[default]
    Chat,
    Text,
}

/// Per-node metadata persisted separately from the canvas blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeMeta {
    pub title: String,
    pub summary: String,
    pub use_summary: bool,
    pub is_latest_summary: bool,
}

impl NodeMeta {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// The summary that replaces this node's transcript in ancestor context, if any.
    pub fn context_summary(&self) -> Option<&str> {
        (self.use_summary && !self.summary.is_empty()).then_some(self.summary.as_str())
    }
}

/// Partial update of [`NodeMeta`]; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeMetaPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_summary: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_latest_summary: Option<bool>,
}

impl NodeMetaPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.summary.is_none()
            && self.use_summary.is_none()
            && self.is_latest_summary.is_none()
    }

    /// Returns `true` if `meta` changed.
    pub fn apply_to(&self, meta: &mut NodeMeta) -> bool {
        let before = meta.clone();
        if let Some(title) = &self.title {
            meta.title.clone_from(title);
        }
        if let Some(summary) = &self.summary {
            meta.summary.clone_from(summary);
        }
        if let Some(use_summary) = self.use_summary {
            meta.use_summary = use_summary;
        }
        if let Some(is_latest_summary) = self.is_latest_summary {
            meta.is_latest_summary = is_latest_summary;
        }
        *meta != before
    }

    /// Folds a newer patch into this one, field by field, last write wins.
    pub fn merge(&mut self, newer: NodeMetaPatch) {
        if newer.title.is_some() {
            self.title = newer.title;
        }
        if newer.summary.is_some() {
            self.summary = newer.summary;
        }
        if newer.use_summary.is_some() {
            self.use_summary = newer.use_summary;
        }
        if newer.is_latest_summary.is_some() {
            self.is_latest_summary = newer.is_latest_summary;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub position: Position,
    #[serde(rename = "type", default)]
    pub kind: NodeKind,
    /// Opaque renderer payload, round-tripped untouched.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
    #[serde(default)]
    pub meta: NodeMeta,
    #[serde(default)]
    pub created_at: i64,
}

impl Node {
    pub fn new(id: NodeId, position: Position, kind: NodeKind, meta: NodeMeta) -> Self {
        Self {
            id,
            position,
            kind,
            data: serde_json::Value::Null,
            meta,
            created_at: super::now_ms(),
        }
    }
}

/// Directed edge; `source -> target` means `target` continues from `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    /// Highlighted because it lies on the focus node's ancestor path. Never persisted.
    #[serde(default, skip_serializing)]
    pub animated: bool,
}

impl Edge {
    pub fn new(id: EdgeId, source: NodeId, target: NodeId) -> Self {
        Self {
            id,
            source,
            target,
            animated: false,
        }
    }

    pub fn between(source: NodeId, target: NodeId) -> Self {
        Self::new(EdgeId::for_endpoints(&source, &target), source, target)
    }

    pub fn touches(&self, node_id: &NodeId) -> bool {
        &self.source == node_id || &self.target == node_id
    }
}

/// One persisted graph: the unit of persistence and of optimistic updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasState {
    pub id: StateId,
    #[serde(default = "default_state_title")]
    pub title: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

fn default_state_title() -> String {
    DEFAULT_STATE_TITLE.to_owned()
}

impl CanvasState {
    pub fn empty(id: StateId) -> Self {
        Self {
            id,
            title: default_state_title(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| &node.id == node_id)
    }

    pub fn node_mut(&mut self, node_id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|node| &node.id == node_id)
    }

    pub fn contains_node(&self, node_id: &NodeId) -> bool {
        self.node(node_id).is_some()
    }

    /// Both endpoints live in this state.
    pub fn edge_is_internal(&self, edge: &Edge) -> bool {
        self.contains_node(&edge.source) && self.contains_node(&edge.target)
    }
}

/// Whole-field update of a [`CanvasState`]; `nodes`/`edges` are replaced as entire arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanvasPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<Node>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<Edge>>,
}

impl CanvasPatch {
    pub fn nodes(nodes: Vec<Node>) -> Self {
        Self {
            nodes: Some(nodes),
            ..Self::default()
        }
    }

    pub fn edges(edges: Vec<Edge>) -> Self {
        Self {
            edges: Some(edges),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.nodes.is_none() && self.edges.is_none()
    }

    pub fn merge(&mut self, newer: CanvasPatch) {
        if newer.title.is_some() {
            self.title = newer.title;
        }
        if newer.nodes.is_some() {
            self.nodes = newer.nodes;
        }
        if newer.edges.is_some() {
            self.edges = newer.edges;
        }
    }

    /// Returns `true` if `state` changed.
    pub fn apply_to(&self, state: &mut CanvasState) -> bool {
        let mut changed = false;
        if let Some(title) = &self.title {
            changed |= &state.title != title;
            state.title.clone_from(title);
        }
        if let Some(nodes) = &self.nodes {
            changed |= &state.nodes != nodes;
            state.nodes.clone_from(nodes);
        }
        if let Some(edges) = &self.edges {
            changed |= &state.edges != edges;
            state.edges.clone_from(edges);
        }
        changed
    }
}

/// Topic list entry for a canvas state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: StateId,
    pub title: String,
}
