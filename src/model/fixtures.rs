// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use super::canvas::{CanvasState, Edge, Node, NodeKind, NodeMeta, Position};
use super::ids::{MessageId, NodeId, StateId};
use super::message::{Message, NewMessage, Role};

pub(crate) fn sid(value: &str) -> StateId {
    StateId::new(value).expect("state id")
}

pub(crate) fn nid(value: &str) -> NodeId {
    NodeId::new(value).expect("node id")
}

pub(crate) fn mid(value: &str) -> MessageId {
    MessageId::new(value).expect("message id")
}

/// A chat node titled after its id, created at `created_at`.
pub(crate) fn chat_node(id: &str, created_at: i64) -> Node {
    let mut node = Node::new(nid(id), Position::default(), NodeKind::Chat, NodeMeta::titled(id));
    node.created_at = created_at;
    node
}

pub(crate) fn edge(source: &str, target: &str) -> Edge {
    Edge::between(nid(source), nid(target))
}

pub(crate) fn message(id: &str, role: Role, content: &str, node: &str) -> Message {
    let mut message = NewMessage::user(nid(node), content).into_message(mid(id));
    message.role = role;
    message
}

/// `root -> left`, `root -> right`: two branches sharing one ancestor.
pub(crate) fn canvas_fork() -> CanvasState {
    let mut state = CanvasState::empty(sid("s:fork"));
    state.nodes = vec![chat_node("root", 1), chat_node("left", 2), chat_node("right", 3)];
    state.edges = vec![edge("root", "left"), edge("root", "right")];
    state
}

/// `a -> b -> d`, `a -> c -> d`, `e -> d`: a diamond with an extra parent on the merge node.
pub(crate) fn canvas_diamond() -> CanvasState {
    let mut state = CanvasState::empty(sid("s:diamond"));
    state.nodes = vec![
        chat_node("a", 1),
        chat_node("b", 2),
        chat_node("c", 3),
        chat_node("d", 4),
        chat_node("e", 5),
    ];
    state.edges = vec![
        edge("a", "b"),
        edge("a", "c"),
        edge("b", "d"),
        edge("c", "d"),
        edge("e", "d"),
    ];
    state
}

#[cfg(test)]
mod tests {
    use super::{canvas_diamond, canvas_fork};

    #[test]
    fn fixture_edges_stay_inside_their_state() {
        for state in [canvas_fork(), canvas_diamond()] {
            assert!(state.edges.iter().all(|edge| state.edge_is_internal(edge)));
        }
    }

    #[test]
    fn fixture_states_share_no_node_ids() {
        let fork = canvas_fork();
        let diamond = canvas_diamond();
        assert!(fork.nodes.iter().all(|node| !diamond.contains_node(&node.id)));
    }
}
