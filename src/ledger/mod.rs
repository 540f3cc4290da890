// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Per-node message lists.
//!
//! Every mutation goes through [`reduce_messages`]; the ledger only commits the result when it
//! differs from the stored list, so replaying an identical operation never reports a change.

use std::collections::{HashMap, HashSet};

use crate::model::{Message, MessageId, NodeId, StateId};

mod reducer;

pub use reducer::{reduce_messages, MessageDispatch};

pub type LedgerKey = (StateId, NodeId);

#[derive(Debug, Clone, Default)]
pub struct MessageLedger {
    entries: HashMap<LedgerKey, Vec<Message>>,
    detached: HashSet<LedgerKey>,
}

impl MessageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The visible list for a node; empty for unknown or detached nodes.
    pub fn messages(&self, state_id: &StateId, node_id: &NodeId) -> &[Message] {
        let key = (state_id.clone(), node_id.clone());
        if self.detached.contains(&key) {
            return &[];
        }
        self.entries.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Applies `dispatch` to the node's list. Returns `true` if the list changed.
    pub fn dispatch(
        &mut self,
        state_id: &StateId,
        node_id: &NodeId,
        dispatch: &MessageDispatch,
    ) -> bool {
        let key = (state_id.clone(), node_id.clone());
        let current = self.entries.get(&key).map(Vec::as_slice).unwrap_or(&[]);
        let next = reduce_messages(current, dispatch);
        if next.as_slice() == current {
            return false;
        }
        self.entries.insert(key, next);
        true
    }

    /// Replaces a node's list wholesale (used when loading from persistence).
    pub fn replace(&mut self, state_id: &StateId, node_id: &NodeId, messages: Vec<Message>) -> bool {
        let key = (state_id.clone(), node_id.clone());
        self.detached.remove(&key);
        if self.entries.get(&key) == Some(&messages) {
            return false;
        }
        self.entries.insert(key, messages);
        true
    }

    /// Hides a node's messages without purging them.
    pub fn detach(&mut self, state_id: &StateId, node_id: &NodeId) {
        self.detached.insert((state_id.clone(), node_id.clone()));
    }

    pub fn is_detached(&self, state_id: &StateId, node_id: &NodeId) -> bool {
        self.detached
            .contains(&(state_id.clone(), node_id.clone()))
    }

    /// Drops every entry of a state, detached or not.
    pub fn purge_state(&mut self, state_id: &StateId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(owner, _), _| owner != state_id);
        self.detached.retain(|(owner, _)| owner != state_id);
        before - self.entries.len()
    }

    /// Locates a visible message by id.
    pub fn find(&self, message_id: &MessageId) -> Option<(&LedgerKey, &Message)> {
        self.entries
            .iter()
            .filter(|(key, _)| !self.detached.contains(*key))
            .find_map(|(key, messages)| {
                messages
                    .iter()
                    .find(|message| &message.id == message_id)
                    .map(|message| (key, message))
            })
    }

    pub fn total_messages(&self) -> usize {
        self.entries
            .iter()
            .filter(|(key, _)| !self.detached.contains(*key))
            .map(|(_, messages)| messages.len())
            .sum()
    }
}
