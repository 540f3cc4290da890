// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use crate::model::{Message, MessageId, MessagePatch, NewMessage};

/// One reducer operation over a node's message list.
///
/// Timestamps travel inside the operation so that replaying it is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageDispatch {
    CreateMessage {
        id: MessageId,
        value: NewMessage,
        created_at: i64,
    },
    UpdateMessage {
        id: MessageId,
        patch: MessagePatch,
        updated_at: i64,
    },
    DeleteMessages {
        ids: Vec<MessageId>,
    },
    /// Swaps an optimistic id for the id issued by persistence, keeping the list position.
    ReconcileMessage {
        temp_id: MessageId,
        id: MessageId,
    },
}

impl MessageDispatch {
    pub fn create(id: MessageId, value: NewMessage) -> Self {
        Self::CreateMessage {
            id,
            value,
            created_at: crate::model::now_ms(),
        }
    }

    pub fn update(id: MessageId, patch: MessagePatch) -> Self {
        Self::UpdateMessage {
            id,
            patch,
            updated_at: crate::model::now_ms(),
        }
    }

    pub fn delete(ids: Vec<MessageId>) -> Self {
        Self::DeleteMessages { ids }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateMessage { .. } => "createMessage",
            Self::UpdateMessage { .. } => "updateMessage",
            Self::DeleteMessages { .. } => "deleteMessages",
            Self::ReconcileMessage { .. } => "reconcileMessage",
        }
    }
}

/// Pure `(old, op) -> new`. Operations naming unknown ids leave the list untouched, and
/// creating an id that already exists is a no-op.
pub fn reduce_messages(messages: &[Message], dispatch: &MessageDispatch) -> Vec<Message> {
    let mut next = messages.to_vec();
    match dispatch {
        MessageDispatch::CreateMessage {
            id,
            value,
            created_at,
        } => {
            if next.iter().any(|message| &message.id == id) {
                return next;
            }
            let mut message = value.clone().into_message(id.clone());
            message.created_at = *created_at;
            message.updated_at = *created_at;
            next.push(message);
        }
        MessageDispatch::UpdateMessage {
            id,
            patch,
            updated_at,
        } => {
            if let Some(message) = next.iter_mut().find(|message| &message.id == id) {
                let before = message.clone();
                patch.apply_to(message);
                if *message != before {
                    message.updated_at = *updated_at;
                }
            }
        }
        MessageDispatch::DeleteMessages { ids } => {
            next.retain(|message| !ids.contains(&message.id));
        }
        MessageDispatch::ReconcileMessage { temp_id, id } => {
            if next.iter().any(|message| &message.id == id) {
                next.retain(|message| &message.id != temp_id);
            } else if let Some(message) = next.iter_mut().find(|message| &message.id == temp_id) {
                message.id = id.clone();
            }
            for message in &mut next {
                if message.parent_id.as_ref() == Some(temp_id) {
                    message.parent_id = Some(id.clone());
                }
            }
        }
    }
    next
}

#[cfg(test)]
mod tests {
    use super::{reduce_messages, MessageDispatch};
    use crate::model::fixtures::{message, mid, nid};
    use crate::model::{Message, MessagePatch, NewMessage, Role};

    fn seeded() -> Vec<Message> {
        vec![
            message("m1", Role::User, "hello", "n1"),
            message("m2", Role::Assistant, "hi there", "n1"),
        ]
    }

    #[test]
    fn update_applied_twice_equals_applied_once() {
        let op = MessageDispatch::UpdateMessage {
            id: mid("m2"),
            patch: MessagePatch::content("hi again"),
            updated_at: 42,
        };
        let once = reduce_messages(&seeded(), &op);
        let twice = reduce_messages(&once, &op);
        assert_eq!(once, twice);
        assert_eq!(once[1].content, "hi again");
        assert_eq!(once[1].updated_at, 42);
    }

    #[test]
    fn update_of_unknown_id_is_a_no_op() {
        let op = MessageDispatch::update(mid("nope"), MessagePatch::content("x"));
        assert_eq!(reduce_messages(&seeded(), &op), seeded());
    }

    #[test]
    fn unchanged_update_keeps_timestamp() {
        let messages = seeded();
        let op = MessageDispatch::UpdateMessage {
            id: mid("m1"),
            patch: MessagePatch::content("hello"),
            updated_at: 99,
        };
        assert_eq!(reduce_messages(&messages, &op), messages);
    }

    #[test]
    fn create_appends_and_ignores_existing_id() {
        let op = MessageDispatch::CreateMessage {
            id: mid("m3"),
            value: NewMessage::user(nid("n1"), "again"),
            created_at: 7,
        };
        let next = reduce_messages(&seeded(), &op);
        assert_eq!(next.len(), 3);
        assert_eq!(next[2].created_at, 7);
        assert_eq!(next[2].graph_node_id, Some(nid("n1")));
        assert_eq!(reduce_messages(&next, &op), next);
    }

    #[test]
    fn delete_removes_every_listed_id() {
        let next = reduce_messages(
            &seeded(),
            &MessageDispatch::delete(vec![mid("m1"), mid("m2"), mid("zz")]),
        );
        assert!(next.is_empty());
    }

    #[test]
    fn reconcile_replaces_in_place_and_rewrites_parents() {
        let mut messages = seeded();
        messages[0].id = mid("tmp_1");
        messages[1].parent_id = Some(mid("tmp_1"));

        let next = reduce_messages(
            &messages,
            &MessageDispatch::ReconcileMessage {
                temp_id: mid("tmp_1"),
                id: mid("m1"),
            },
        );
        assert_eq!(next[0].id, mid("m1"));
        assert_eq!(next[1].parent_id, Some(mid("m1")));
    }

    #[test]
    fn reconcile_drops_temp_when_authoritative_id_is_present() {
        let mut messages = seeded();
        messages.push(message("tmp_2", Role::User, "hello", "n1"));

        let next = reduce_messages(
            &messages,
            &MessageDispatch::ReconcileMessage {
                temp_id: mid("tmp_2"),
                id: mid("m1"),
            },
        );
        assert_eq!(next, seeded());
    }
}
