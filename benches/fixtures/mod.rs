// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

#![allow(dead_code)]

// Shared deterministic benchmark fixtures (no RNG).

use chatgraph::ledger::{MessageDispatch, MessageLedger};
use chatgraph::model::{
    CanvasState, Edge, Message, MessageId, NewMessage, Node, NodeId, NodeKind, NodeMeta, Position,
    Role, StateId,
};

pub struct Canvas {
    pub state: CanvasState,
    pub ledger: MessageLedger,
    pub focus: NodeId,
}

fn node_id(index: usize) -> NodeId {
    NodeId::new(format!("bench_node_{index:05}")).expect("node id")
}

fn node(index: usize) -> Node {
    let mut node = Node::new(
        node_id(index),
        Position::new(0.0, index as f64 * 80.0),
        NodeKind::Chat,
        NodeMeta::titled(format!("Topic {index}")),
    );
    node.created_at = index as i64;
    node
}

fn fill_ledger(state: &CanvasState, messages_per_node: usize) -> MessageLedger {
    let mut ledger = MessageLedger::new();
    for node in &state.nodes {
        for turn in 0..messages_per_node {
            let id = MessageId::new(format!("{}_m{turn:03}", node.id)).expect("message id");
            let mut value = NewMessage::user(node.id.clone(), format!("turn {turn} of {}", node.id));
            if turn % 2 == 1 {
                value.role = Role::Assistant;
            }
            ledger.dispatch(&state.id, &node.id, &MessageDispatch::create(id, value));
        }
    }
    ledger
}

fn canvas(name: &str, nodes: Vec<Node>, edges: Vec<Edge>, messages_per_node: usize) -> Canvas {
    let mut state = CanvasState::empty(StateId::new(name).expect("state id"));
    state.nodes = nodes;
    state.edges = edges;
    let ledger = fill_ledger(&state, messages_per_node);
    let focus = state.nodes.last().map(|node| node.id.clone()).expect("nodes");
    Canvas {
        state,
        ledger,
        focus,
    }
}

/// `0 -> 1 -> ... -> len-1`, focus on the last node.
pub fn chain(len: usize, messages_per_node: usize) -> Canvas {
    let nodes = (0..len).map(node).collect();
    let edges = (1..len)
        .map(|index| Edge::between(node_id(index - 1), node_id(index)))
        .collect();
    canvas("bench_chain", nodes, edges, messages_per_node)
}

/// `width` independent parents merging into one focus node.
pub fn fan_in(width: usize, messages_per_node: usize) -> Canvas {
    let nodes = (0..=width).map(node).collect();
    let edges = (0..width)
        .map(|index| Edge::between(node_id(index), node_id(width)))
        .collect();
    canvas("bench_fan_in", nodes, edges, messages_per_node)
}

/// `layers` rows of `width` nodes, each node linked to every node of the next row.
pub fn lattice(layers: usize, width: usize, messages_per_node: usize) -> Canvas {
    let count = layers * width + 1;
    let nodes = (0..count).map(node).collect();
    let mut edges = Vec::new();
    for layer in 0..layers.saturating_sub(1) {
        for from in 0..width {
            for to in 0..width {
                edges.push(Edge::between(
                    node_id(layer * width + from),
                    node_id((layer + 1) * width + to),
                ));
            }
        }
    }
    let last_row = (layers - 1) * width;
    for from in 0..width {
        edges.push(Edge::between(node_id(last_row + from), node_id(count - 1)));
    }
    canvas("bench_lattice", nodes, edges, messages_per_node)
}

/// A single node's transcript, as streamed chunks see it.
pub fn transcript(len: usize) -> Vec<Message> {
    let state = chain(1, len);
    state
        .ledger
        .messages(&state.state.id, &state.focus)
        .to_vec()
}
