// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::model::MessageId;

#[derive(Debug, Default)]
struct RegistryState {
    tokens: HashMap<MessageId, CancellationToken>,
    // start order of `tokens`, oldest first
    order: Vec<MessageId>,
    reasoning: BTreeSet<MessageId>,
}

impl RegistryState {
    fn remove(&mut self, message_id: &MessageId) -> Option<CancellationToken> {
        let token = self.tokens.remove(message_id)?;
        self.order.retain(|id| id != message_id);
        self.reasoning.remove(message_id);
        Some(token)
    }
}

/// In-flight generations keyed by assistant message id.
///
/// Each generation owns its own cancellation token, so stopping one never touches another.
#[derive(Debug, Default)]
pub struct GenerationRegistry {
    state: Mutex<RegistryState>,
}

impl GenerationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a generation and returns its token. A stale entry for the same id is cancelled.
    pub fn begin(&self, message_id: &MessageId) -> CancellationToken {
        let token = CancellationToken::new();
        let mut state = self.state.lock().expect("generation registry lock poisoned");
        if let Some(stale) = state.remove(message_id) {
            stale.cancel();
        }
        state.tokens.insert(message_id.clone(), token.clone());
        state.order.push(message_id.clone());
        token
    }

    /// Unregisters a generation that reached a terminal state.
    pub fn finish(&self, message_id: &MessageId) -> bool {
        let mut state = self.state.lock().expect("generation registry lock poisoned");
        state.remove(message_id).is_some()
    }

    /// Cancels one generation, or every generation when `message_id` is `None`.
    ///
    /// Returns the ids that were cancelled; an empty list means nothing was in flight.
    pub fn cancel(&self, message_id: Option<&MessageId>) -> Vec<MessageId> {
        let mut state = self.state.lock().expect("generation registry lock poisoned");
        let targets = match message_id {
            Some(message_id) => state
                .tokens
                .contains_key(message_id)
                .then(|| vec![message_id.clone()])
                .unwrap_or_default(),
            None => state.order.clone(),
        };
        for target in &targets {
            if let Some(token) = state.remove(target) {
                token.cancel();
            }
        }
        targets
    }

    pub fn is_loading(&self, message_id: &MessageId) -> bool {
        let state = self.state.lock().expect("generation registry lock poisoned");
        state.tokens.contains_key(message_id)
    }

    /// Ids with a generation in flight, oldest first.
    pub fn chat_loading_ids(&self) -> Vec<MessageId> {
        let state = self.state.lock().expect("generation registry lock poisoned");
        state.order.clone()
    }

    /// Returns `true` if the flag changed. Ignored for ids that are not in flight.
    pub fn set_reasoning(&self, message_id: &MessageId, loading: bool) -> bool {
        let mut state = self.state.lock().expect("generation registry lock poisoned");
        if !loading {
            return state.reasoning.remove(message_id);
        }
        if !state.tokens.contains_key(message_id) {
            return false;
        }
        state.reasoning.insert(message_id.clone())
    }

    pub fn reasoning_loading_ids(&self) -> Vec<MessageId> {
        let state = self.state.lock().expect("generation registry lock poisoned");
        state.reasoning.iter().cloned().collect()
    }

    /// While any generation runs, the host should refuse to unload.
    pub fn is_unload_blocked(&self) -> bool {
        let state = self.state.lock().expect("generation registry lock poisoned");
        !state.tokens.is_empty()
    }
}
