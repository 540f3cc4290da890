// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::Arc;

use chatgraph::model::{Edge, NodeId, NodeKind, NodeMetaPatch, Position, Role};
use chatgraph::service::{GenerationError, PersistOp};
use chatgraph::store::InMemoryPersistence;
use chatgraph::stream::ScriptedCompletion;
use chatgraph::{ConversationEngine, EngineEvent, GenerationStatus};

struct Session {
    store: Arc<InMemoryPersistence>,
    completion: Arc<ScriptedCompletion>,
    engine: ConversationEngine,
}

fn session() -> Session {
    let store = Arc::new(InMemoryPersistence::new());
    let completion = Arc::new(ScriptedCompletion::new());
    let engine = ConversationEngine::new(store.clone(), completion.clone());
    Session {
        store,
        completion,
        engine,
    }
}

async fn node(session: &Session, title: &str) -> NodeId {
    let meta = NodeMetaPatch {
        title: Some(title.to_owned()),
        ..NodeMetaPatch::default()
    };
    session
        .engine
        .add_node(Position::default(), NodeKind::Chat, meta)
        .await
        .unwrap_or_else(|err| panic!("failed to add node {title}: {err}"))
}

async fn turn(session: &Session, node_id: &NodeId, question: &str, answer: &str) {
    session.completion.push_reply(answer);
    let report = session.engine.send_message(node_id, question).await.unwrap();
    assert_eq!(report.status, GenerationStatus::Finished);
}

fn link(session: &Session, source: &NodeId, target: &NodeId) {
    assert!(session
        .engine
        .add_edge(Edge::between(source.clone(), target.clone()))
        .unwrap());
}

#[tokio::test]
async fn sibling_branches_do_not_see_each_other() {
    let session = session();
    let root = node(&session, "root").await;
    let a = node(&session, "a").await;
    let b = node(&session, "b").await;
    link(&session, &root, &a);
    link(&session, &root, &b);

    turn(&session, &root, "m1", "r1").await;
    turn(&session, &a, "m2", "r2").await;
    turn(&session, &b, "m3", "r3").await;

    let resolved = session.engine.resolve_context(&b).unwrap();
    let contents: Vec<_> = resolved
        .messages
        .iter()
        .map(|message| message.content.as_str())
        .collect();
    assert_eq!(contents, vec!["m1", "r1"]);
    assert_eq!(resolved.ancestors.len(), 1);
    assert_eq!(resolved.ancestors[0].node_id, root);

    // The request for `b` carried root's transcript followed by b's own turn.
    let request = &session.completion.requests()[2];
    let sent: Vec<_> = request
        .messages
        .iter()
        .map(|message| message.content.as_str())
        .collect();
    assert_eq!(sent, vec!["m1", "r1", "m3"]);
}

#[tokio::test]
async fn summarized_ancestor_contributes_one_message() {
    let session = session();
    let x = node(&session, "Pricing").await;
    let y = node(&session, "Follow-up").await;
    link(&session, &x, &y);
    for index in 0..3 {
        turn(&session, &x, &format!("q{index}"), &format!("a{index}")).await;
    }
    assert_eq!(session.engine.messages(&x).len(), 6);

    session
        .engine
        .update_node_meta(
            &x,
            NodeMetaPatch {
                summary: Some("Discussed pricing".to_owned()),
                use_summary: Some(true),
                ..NodeMetaPatch::default()
            },
        )
        .unwrap();

    let resolved = session.engine.resolve_context(&y).unwrap();
    assert_eq!(resolved.messages.len(), 1);
    assert_eq!(resolved.messages[0].role, Role::User);
    assert!(resolved.messages[0].content.contains("Discussed pricing"));
}

#[tokio::test]
async fn first_node_brings_its_own_state() {
    let session = session();
    let mut events = session.engine.subscribe();
    assert_eq!(session.engine.active_state_id(), None);

    let node_id = node(&session, "first").await;

    let state = session.engine.active_state().expect("state created");
    assert_eq!(state.nodes.len(), 1);
    assert_eq!(state.nodes[0].id, node_id);
    assert_eq!(session.store.call_count(PersistOp::CreateCanvasState), 1);
    assert_eq!(session.store.call_count(PersistOp::CreateNode), 1);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&EngineEvent::TopicsChanged));
    assert!(seen.contains(&EngineEvent::CanvasChanged {
        state_id: state.id.clone()
    }));

    session.engine.flush_persistence().await.unwrap();
    assert_eq!(session.store.canvas(&state.id).unwrap().nodes.len(), 1);
}

#[tokio::test]
async fn stopping_without_a_generation_is_harmless() {
    let session = session();
    assert!(session.engine.stop_generate_message(None).is_empty());

    let node_id = node(&session, "idle").await;
    turn(&session, &node_id, "hi", "hello").await;
    assert!(session.engine.stop_generate_message(None).is_empty());
    assert!(session.engine.chat_loading_ids().is_empty());
    assert_eq!(session.engine.messages(&node_id).len(), 2);
}

#[tokio::test]
async fn errored_reply_is_replaced_by_a_fresh_generation() {
    let session = session();
    let node_id = node(&session, "retry").await;
    session
        .completion
        .push_refusal(GenerationError::Upstream {
            status: Some(529),
            message: "overloaded".to_owned(),
        });
    let failed = session
        .engine
        .send_message(&node_id, "question")
        .await
        .unwrap();
    let errored = session
        .engine
        .message(&failed.assistant_message_id)
        .expect("assistant message kept");
    assert!(errored.error.is_some());

    session.completion.push_reply("answer");
    let report = session
        .engine
        .delete_and_regenerate(&failed.assistant_message_id)
        .await
        .unwrap();

    assert_eq!(report.status, GenerationStatus::Finished);
    assert_eq!(report.user_message_id, failed.user_message_id);
    assert_ne!(report.assistant_message_id, failed.assistant_message_id);
    assert_eq!(session.engine.message(&failed.assistant_message_id), None);

    let messages = session.engine.messages(&node_id);
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "answer");
    assert_eq!(messages[1].parent_id.as_ref(), Some(&failed.user_message_id));
    assert!(messages[1].error.is_none());
}
