// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Ancestor context resolution.
//!
//! Walks edges backwards from a focus node, then linearizes the ancestors farthest-first into
//! the message sequence sent to the model. The focus node's own messages are not included.

use std::collections::{HashMap, HashSet, VecDeque};

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::config::ContextConfig;
use crate::ledger::MessageLedger;
use crate::model::{CanvasState, Message, MessageId, Node, NodeId, Role};

/// An ancestor reached by the backward search, with its minimum hop count from the focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ancestor {
    pub node_id: NodeId,
    pub distance: usize,
}

/// Ancestors in emission order plus every edge the search traversed, as `(source, target)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AncestorSearch {
    pub ancestors: Vec<Ancestor>,
    pub activated_edges: Vec<(NodeId, NodeId)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedContext {
    pub messages: Vec<Message>,
    pub ancestors: Vec<Ancestor>,
    pub activated_edges: Vec<(NodeId, NodeId)>,
}

/// Breadth-first search over reversed edges. Each node is expanded at most once, so cycles
/// terminate. Ancestors whose node is missing from the state are skipped.
pub fn find_ancestors(state: &CanvasState, focus: &NodeId) -> AncestorSearch {
    let mut parents: HashMap<&NodeId, SmallVec<[&NodeId; 2]>> = HashMap::new();
    for edge in &state.edges {
        parents.entry(&edge.target).or_default().push(&edge.source);
    }

    let mut visited: HashSet<&NodeId> = HashSet::new();
    let mut queue: VecDeque<(&NodeId, usize)> = VecDeque::from([(focus, 0)]);
    let mut reached: Vec<(&Node, usize, usize)> = Vec::new();
    let mut activated_edges = Vec::new();

    while let Some((node_id, distance)) = queue.pop_front() {
        if !visited.insert(node_id) {
            continue;
        }

        if node_id != focus {
            match state.node(node_id) {
                Some(node) => reached.push((node, distance, reached.len())),
                None => warn!(
                    state_id = %state.id,
                    node_id = %node_id,
                    "skipping ancestor without node metadata"
                ),
            }
        }

        for parent in parents.get(node_id).into_iter().flatten() {
            if visited.contains(parent) {
                continue;
            }
            queue.push_back((*parent, distance + 1));
            activated_edges.push(((*parent).clone(), node_id.clone()));
        }
    }

    reached.sort_by(|(a, a_distance, a_order), (b, b_distance, b_order)| {
        b_distance
            .cmp(a_distance)
            .then(a.created_at.cmp(&b.created_at))
            .then(a_order.cmp(b_order))
    });

    AncestorSearch {
        ancestors: reached
            .into_iter()
            .map(|(node, distance, _)| Ancestor {
                node_id: node.id.clone(),
                distance,
            })
            .collect(),
        activated_edges,
    }
}

pub fn resolve_context(
    state: &CanvasState,
    ledger: &MessageLedger,
    focus: &NodeId,
    config: &ContextConfig,
) -> ResolvedContext {
    let search = find_ancestors(state, focus);
    let mut messages = Vec::new();

    for ancestor in &search.ancestors {
        let Some(node) = state.node(&ancestor.node_id) else {
            continue;
        };
        match node.meta.context_summary() {
            Some(summary) => messages.push(summary_message(node, summary)),
            None => messages.extend_from_slice(ledger.messages(&state.id, &node.id)),
        }
    }

    if search.activated_edges.len() > config.edge_description_threshold {
        let description = describe_edges(state, &search.activated_edges);
        messages.push(Message::synthetic(
            MessageId::derived("graph_description", focus),
            Role::User,
            format!(
                "The above conversation messages are from a knowledge graph. And the edges are {description}"
            ),
        ));
    }

    debug!(
        state_id = %state.id,
        focus = %focus,
        ancestors = search.ancestors.len(),
        edges = search.activated_edges.len(),
        messages = messages.len(),
        "resolved ancestor context"
    );

    ResolvedContext {
        messages,
        ancestors: search.ancestors,
        activated_edges: search.activated_edges,
    }
}

fn summary_message(node: &Node, summary: &str) -> Message {
    Message::synthetic(
        MessageId::derived("summary", &node.id),
        Role::User,
        format!(
            "<summary><title>{}</title>{summary}</summary>",
            node.meta.title
        ),
    )
}

/// `(A -> B), (C -> D)` for every edge whose endpoints both resolve.
fn describe_edges(state: &CanvasState, edges: &[(NodeId, NodeId)]) -> String {
    edges
        .iter()
        .filter_map(|(source, target)| {
            let source = state.node(source)?;
            let target = state.node(target)?;
            Some(format!(
                "({} -> {})",
                display_title(source),
                display_title(target)
            ))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn display_title(node: &Node) -> &str {
    if node.meta.title.is_empty() {
        node.id.as_str()
    } else {
        node.meta.title.as_str()
    }
}

#[cfg(test)]
mod tests;
