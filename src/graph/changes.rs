// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Structural diffs over node/edge arrays.
//!
//! These are pure: each function takes the current array and returns the next one, leaving
//! persistence to the caller (the whole array is written, never a per-element delta).

use crate::model::{Edge, EdgeId, Node, NodeId, Position};

#[derive(Debug, Clone, PartialEq)]
pub enum NodeChange {
    Add(Node),
    Replace(Node),
    Position { id: NodeId, position: Position },
    Remove { id: NodeId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeChange {
    Add(Edge),
    Replace(Edge),
    Remove { id: EdgeId },
}

/// Changes naming unknown ids are ignored; `Add` of an existing id is ignored too.
pub fn apply_node_changes(changes: &[NodeChange], nodes: &[Node]) -> Vec<Node> {
    let mut next = nodes.to_vec();
    for change in changes {
        match change {
            NodeChange::Add(node) => {
                if !next.iter().any(|existing| existing.id == node.id) {
                    next.push(node.clone());
                }
            }
            NodeChange::Replace(node) => {
                if let Some(existing) = next.iter_mut().find(|existing| existing.id == node.id) {
                    *existing = node.clone();
                }
            }
            NodeChange::Position { id, position } => {
                if let Some(existing) = next.iter_mut().find(|existing| &existing.id == id) {
                    existing.position = *position;
                }
            }
            NodeChange::Remove { id } => next.retain(|existing| &existing.id != id),
        }
    }
    next
}

pub fn apply_edge_changes(changes: &[EdgeChange], edges: &[Edge]) -> Vec<Edge> {
    let mut next = edges.to_vec();
    for change in changes {
        match change {
            EdgeChange::Add(edge) => {
                if !next.iter().any(|existing| existing.id == edge.id) {
                    next.push(edge.clone());
                }
            }
            EdgeChange::Replace(edge) => {
                if let Some(existing) = next.iter_mut().find(|existing| existing.id == edge.id) {
                    *existing = edge.clone();
                }
            }
            EdgeChange::Remove { id } => next.retain(|existing| &existing.id != id),
        }
    }
    next
}

/// Appends `edge` unless an edge with the same endpoints already exists.
pub fn add_edge(edge: Edge, edges: &[Edge]) -> Option<Vec<Edge>> {
    let duplicate = edges
        .iter()
        .any(|existing| existing.source == edge.source && existing.target == edge.target);
    if duplicate {
        return None;
    }
    let mut next = edges.to_vec();
    next.push(edge);
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::{add_edge, apply_edge_changes, apply_node_changes, EdgeChange, NodeChange};
    use crate::model::fixtures::{canvas_fork, chat_node, edge, nid};
    use crate::model::{EdgeId, Position};

    #[test]
    fn node_changes_apply_in_order() {
        let state = canvas_fork();
        let next = apply_node_changes(
            &[
                NodeChange::Position {
                    id: nid("a"),
                    position: Position::new(10.0, 20.0),
                },
                NodeChange::Remove { id: nid("b") },
                NodeChange::Add(chat_node("c", 9)),
                NodeChange::Add(chat_node("a", 9)),
            ],
            &state.nodes,
        );

        let ids = next.iter().map(|node| node.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["root", "a", "c"]);
        assert_eq!(next[1].position, Position::new(10.0, 20.0));
        assert_eq!(next[1].created_at, 2);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let state = canvas_fork();
        let next = apply_node_changes(&[NodeChange::Remove { id: nid("zzz") }], &state.nodes);
        assert_eq!(next, state.nodes);

        let next = apply_edge_changes(
            &[EdgeChange::Remove {
                id: EdgeId::new("missing").expect("edge id"),
            }],
            &state.edges,
        );
        assert_eq!(next, state.edges);
    }

    #[test]
    fn edge_remove_and_replace() {
        let state = canvas_fork();
        let first = state.edges[0].clone();
        let mut replaced = state.edges[1].clone();
        replaced.target = nid("a");

        let next = apply_edge_changes(
            &[
                EdgeChange::Remove { id: first.id.clone() },
                EdgeChange::Replace(replaced.clone()),
            ],
            &state.edges,
        );
        assert_eq!(next, vec![replaced]);
    }

    #[test]
    fn add_edge_skips_duplicate_endpoints() {
        let state = canvas_fork();
        assert_eq!(add_edge(edge("root", "a"), &state.edges), None);

        let next = add_edge(edge("a", "b"), &state.edges).expect("new edge");
        assert_eq!(next.len(), 3);
        assert_eq!(next[2].source, nid("a"));
    }
}
