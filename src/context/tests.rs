// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use rstest::rstest;

use super::{find_ancestors, resolve_context, Ancestor};
use crate::config::ContextConfig;
use crate::ledger::MessageLedger;
use crate::model::fixtures::{canvas_diamond, canvas_fork, chat_node, edge, message, nid, sid};
use crate::model::{CanvasState, Message, Role};

fn ids(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|message| message.id.as_str()).collect()
}

fn fork_ledger(state: &CanvasState) -> MessageLedger {
    let mut ledger = MessageLedger::new();
    ledger.replace(&state.id, &nid("root"), vec![message("m1", Role::User, "r", "root")]);
    ledger.replace(&state.id, &nid("left"), vec![message("m2", Role::User, "l", "left")]);
    ledger.replace(&state.id, &nid("right"), vec![message("m3", Role::User, "r", "right")]);
    ledger
}

#[test]
fn sibling_branches_are_not_ancestors() {
    let state = canvas_fork();
    let ledger = fork_ledger(&state);

    let resolved = resolve_context(&state, &ledger, &nid("right"), &ContextConfig::default());
    assert_eq!(ids(&resolved.messages), vec!["m1"]);
    assert_eq!(
        resolved.ancestors,
        vec![Ancestor {
            node_id: nid("root"),
            distance: 1
        }]
    );
}

#[test]
fn root_focus_has_empty_context() {
    let state = canvas_fork();
    let ledger = fork_ledger(&state);
    let resolved = resolve_context(&state, &ledger, &nid("root"), &ContextConfig::default());
    assert!(resolved.messages.is_empty());
    assert!(resolved.activated_edges.is_empty());
}

#[test]
fn summary_replaces_the_transcript() {
    let mut state = canvas_fork();
    if let Some(root) = state.node_mut(&nid("root")) {
        root.meta.title = "X".to_owned();
        root.meta.summary = "Discussed pricing".to_owned();
        root.meta.use_summary = true;
    }
    let mut ledger = MessageLedger::new();
    ledger.replace(
        &state.id,
        &nid("root"),
        (1..=5)
            .map(|i| message(&format!("m{i}"), Role::User, "stored", "root"))
            .collect(),
    );

    let resolved = resolve_context(&state, &ledger, &nid("left"), &ContextConfig::default());
    assert_eq!(resolved.messages.len(), 1);
    let summary = &resolved.messages[0];
    assert_eq!(summary.role, Role::User);
    assert_eq!(summary.id.as_str(), "summary_root");
    assert_eq!(
        summary.content,
        "<summary><title>X</title>Discussed pricing</summary>"
    );
}

#[test]
fn empty_summary_falls_back_to_messages() {
    let mut state = canvas_fork();
    if let Some(root) = state.node_mut(&nid("root")) {
        root.meta.use_summary = true;
    }
    let ledger = fork_ledger(&state);
    let resolved = resolve_context(&state, &ledger, &nid("left"), &ContextConfig::default());
    assert_eq!(ids(&resolved.messages), vec!["m1"]);
}

#[test]
fn farther_ancestors_come_first() {
    // far -> mid -> near -> focus
    let mut state = CanvasState::empty(sid("s:chain"));
    state.nodes = vec![
        chat_node("near", 1),
        chat_node("mid", 2),
        chat_node("far", 3),
        chat_node("focus", 4),
    ];
    state.edges = vec![edge("near", "focus"), edge("mid", "near"), edge("far", "mid")];

    let mut ledger = MessageLedger::new();
    for (node, first, second) in [("far", "f1", "f2"), ("mid", "m1", "m2"), ("near", "n1", "n2")] {
        ledger.replace(
            &state.id,
            &nid(node),
            vec![
                message(first, Role::User, "q", node),
                message(second, Role::Assistant, "a", node),
            ],
        );
    }

    let resolved = resolve_context(&state, &ledger, &nid("focus"), &ContextConfig::default());
    assert_eq!(ids(&resolved.messages), vec!["f1", "f2", "m1", "m2", "n1", "n2"]);
}

#[test]
fn diamond_orders_by_distance_then_creation_time() {
    let state = canvas_diamond();
    let search = find_ancestors(&state, &nid("d"));

    let order = search
        .ancestors
        .iter()
        .map(|ancestor| (ancestor.node_id.as_str(), ancestor.distance))
        .collect::<Vec<_>>();
    assert_eq!(order, vec![("a", 2), ("b", 1), ("c", 1), ("e", 1)]);
    assert_eq!(search.activated_edges.len(), 5);
}

#[test]
fn creation_time_breaks_distance_ties() {
    let mut state = canvas_diamond();
    if let Some(b) = state.node_mut(&nid("b")) {
        b.created_at = 10;
    }
    let search = find_ancestors(&state, &nid("d"));
    let order = search
        .ancestors
        .iter()
        .map(|ancestor| ancestor.node_id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(order, vec!["a", "c", "e", "b"]);
}

#[test]
fn branched_context_gets_an_edge_description() {
    let state = canvas_diamond();
    let resolved = resolve_context(
        &state,
        &MessageLedger::new(),
        &nid("d"),
        &ContextConfig::default(),
    );

    let last = resolved.messages.last().expect("edge description");
    assert_eq!(last.id.as_str(), "graph_description_d");
    assert_eq!(
        last.content,
        "The above conversation messages are from a knowledge graph. And the edges are \
         (b -> d), (c -> d), (e -> d), (a -> b), (a -> c)"
    );
}

fn has_edge_description(messages: &[Message]) -> bool {
    messages
        .iter()
        .any(|message| message.id.as_str().starts_with("graph_description_"))
}

// focus `b` traverses one edge, focus `d` traverses five
#[rstest]
#[case(0, true, true)]
#[case(3, false, true)]
#[case(4, false, true)]
#[case(5, false, false)]
fn edge_description_threshold(
    #[case] threshold: usize,
    #[case] described_for_b: bool,
    #[case] described_for_d: bool,
) {
    let state = canvas_diamond();
    let ledger = MessageLedger::new();
    let config = ContextConfig {
        edge_description_threshold: threshold,
    };

    let resolved = resolve_context(&state, &ledger, &nid("b"), &config);
    assert_eq!(has_edge_description(&resolved.messages), described_for_b);

    let resolved = resolve_context(&state, &ledger, &nid("d"), &config);
    assert_eq!(has_edge_description(&resolved.messages), described_for_d);
}

#[test]
fn cycles_terminate_and_visit_each_node_once() {
    let mut state = CanvasState::empty(sid("s:cycle"));
    state.nodes = vec![chat_node("a", 1), chat_node("b", 2), chat_node("c", 3)];
    state.edges = vec![edge("a", "b"), edge("b", "c"), edge("c", "a"), edge("a", "c")];

    let search = find_ancestors(&state, &nid("a"));
    let mut seen = search
        .ancestors
        .iter()
        .map(|ancestor| ancestor.node_id.as_str())
        .collect::<Vec<_>>();
    seen.sort_unstable();
    assert_eq!(seen, vec!["b", "c"]);
    assert!(search
        .ancestors
        .iter()
        .all(|ancestor| ancestor.node_id != nid("a")));
}

#[test]
fn self_loop_is_harmless() {
    let mut state = CanvasState::empty(sid("s:loop"));
    state.nodes = vec![chat_node("a", 1)];
    state.edges = vec![edge("a", "a")];
    let search = find_ancestors(&state, &nid("a"));
    assert!(search.ancestors.is_empty());
    assert!(search.activated_edges.is_empty());
}

#[test]
fn missing_ancestor_is_skipped() {
    let mut state = canvas_fork();
    state.edges.push(edge("ghost", "root"));
    let ledger = fork_ledger(&state);

    let resolved = resolve_context(&state, &ledger, &nid("left"), &ContextConfig::default());
    assert_eq!(ids(&resolved.messages), vec!["m1"]);
    assert_eq!(resolved.activated_edges.len(), 2);
}
