// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::PersistConfig;
use crate::model::{CanvasPatch, NodeId, NodeMetaPatch, StateId};
use crate::service::{PersistError, PersistenceService};

/// Merge key of the scheduler: one pending write per canvas state and per node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PersistTarget {
    Canvas(StateId),
    Node(NodeId),
}

impl fmt::Display for PersistTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Canvas(state_id) => write!(f, "canvas:{state_id}"),
            Self::Node(node_id) => write!(f, "node:{node_id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PendingUpdate {
    Canvas(CanvasPatch),
    Node(NodeMetaPatch),
}

impl PendingUpdate {
    fn merge(&mut self, newer: PendingUpdate) {
        match (self, newer) {
            (Self::Canvas(pending), Self::Canvas(newer)) => pending.merge(newer),
            (Self::Node(pending), Self::Node(newer)) => pending.merge(newer),
            (pending, newer) => *pending = newer,
        }
    }
}

/// Called for every write that fails, whether flushed by a timer or explicitly.
pub type FailureHook = Arc<dyn Fn(&PersistTarget, &PersistError) + Send + Sync>;

#[derive(Debug)]
struct PendingEntry {
    update: PendingUpdate,
    first_scheduled_at: Instant,
    deadline: Instant,
    timer_id: u64,
}

#[derive(Debug, Default)]
struct SchedulerState {
    pending: HashMap<PersistTarget, PendingEntry>,
    write_locks: HashMap<PersistTarget, Arc<tokio::sync::Mutex<()>>>,
    next_timer_id: u64,
}

struct SchedulerInner {
    persistence: Arc<dyn PersistenceService>,
    config: PersistConfig,
    state: Mutex<SchedulerState>,
    on_failure: Option<FailureHook>,
}

/// Debounced, coalescing writer for canvas and node-meta updates.
///
/// Each target gets its own timer task, started lazily by the first `schedule` and ended once
/// the entry is written or discarded. Writes to one target are serialized.
#[derive(Clone)]
pub struct PersistenceScheduler {
    inner: Arc<SchedulerInner>,
}

impl fmt::Debug for PersistenceScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceScheduler")
            .field("config", &self.inner.config)
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl PersistenceScheduler {
    pub fn new(persistence: Arc<dyn PersistenceService>, config: PersistConfig) -> Self {
        Self::with_failure_hook(persistence, config, None)
    }

    pub fn with_failure_hook(
        persistence: Arc<dyn PersistenceService>,
        config: PersistConfig,
        on_failure: Option<FailureHook>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                persistence,
                config,
                state: Mutex::new(SchedulerState::default()),
                on_failure,
            }),
        }
    }

    pub fn schedule_canvas(&self, state_id: &StateId, patch: CanvasPatch) {
        if patch.is_empty() {
            return;
        }
        self.schedule(
            PersistTarget::Canvas(state_id.clone()),
            PendingUpdate::Canvas(patch),
        );
    }

    pub fn schedule_node(&self, node_id: &NodeId, patch: NodeMetaPatch) {
        if patch.is_empty() {
            return;
        }
        self.schedule(PersistTarget::Node(node_id.clone()), PendingUpdate::Node(patch));
    }

    /// Merges `update` into the pending entry for `target` and (re)arms its deadline.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, target: PersistTarget, update: PendingUpdate) {
        let now = Instant::now();
        let debounce = self.inner.config.debounce();
        let max_wait = self.inner.config.max_wait();

        let spawn_timer = {
            let mut state = self.inner.state.lock().expect("scheduler lock poisoned");
            match state.pending.get_mut(&target) {
                Some(entry) => {
                    entry.update.merge(update);
                    entry.deadline = (now + debounce).min(entry.first_scheduled_at + max_wait);
                    None
                }
                None => {
                    state.next_timer_id += 1;
                    let timer_id = state.next_timer_id;
                    state.pending.insert(
                        target.clone(),
                        PendingEntry {
                            update,
                            first_scheduled_at: now,
                            deadline: now + debounce,
                            timer_id,
                        },
                    );
                    Some(timer_id)
                }
            }
        };

        debug!(persist_target = %target, "persistence write scheduled");
        if let Some(timer_id) = spawn_timer {
            let inner = self.inner.clone();
            tokio::spawn(async move { run_timer(inner, target, timer_id).await });
        }
    }

    /// Writes pending updates now: one target, or every target when `target` is `None`.
    ///
    /// Every pending write is attempted; the first failure is returned.
    pub async fn flush(&self, target: Option<&PersistTarget>) -> Result<(), PersistError> {
        let targets = match target {
            Some(target) => vec![target.clone()],
            None => {
                let state = self.inner.state.lock().expect("scheduler lock poisoned");
                state.pending.keys().cloned().collect()
            }
        };

        let mut first_error = None;
        for target in targets {
            if let Err(err) = write_target(&self.inner, &target, None).await {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Discards pending updates without writing them. Returns how many were dropped.
    pub fn cancel(&self, target: Option<&PersistTarget>) -> usize {
        let mut state = self.inner.state.lock().expect("scheduler lock poisoned");
        match target {
            Some(target) => usize::from(state.pending.remove(target).is_some()),
            None => {
                let dropped = state.pending.len();
                state.pending.clear();
                dropped
            }
        }
    }

    /// Discards everything pending for a canvas state and the given nodes.
    pub fn cancel_state(&self, state_id: &StateId, node_ids: &[NodeId]) -> usize {
        let mut state = self.inner.state.lock().expect("scheduler lock poisoned");
        let before = state.pending.len();
        state.pending.retain(|target, _| match target {
            PersistTarget::Canvas(pending) => pending != state_id,
            PersistTarget::Node(pending) => !node_ids.contains(pending),
        });
        before - state.pending.len()
    }

    pub fn pending_count(&self) -> usize {
        let state = self.inner.state.lock().expect("scheduler lock poisoned");
        state.pending.len()
    }

    pub fn pending(&self, target: &PersistTarget) -> Option<PendingUpdate> {
        let state = self.inner.state.lock().expect("scheduler lock poisoned");
        state.pending.get(target).map(|entry| entry.update.clone())
    }

    #[cfg(test)]
    fn write_lock_count(&self) -> usize {
        let state = self.inner.state.lock().expect("scheduler lock poisoned");
        state.write_locks.len()
    }
}

async fn run_timer(inner: Arc<SchedulerInner>, target: PersistTarget, timer_id: u64) {
    loop {
        let deadline = {
            let state = inner.state.lock().expect("scheduler lock poisoned");
            match state.pending.get(&target) {
                Some(entry) if entry.timer_id == timer_id => entry.deadline,
                _ => return,
            }
        };
        tokio::time::sleep_until(deadline).await;

        let due = {
            let state = inner.state.lock().expect("scheduler lock poisoned");
            match state.pending.get(&target) {
                Some(entry) if entry.timer_id == timer_id => entry.deadline <= Instant::now(),
                _ => return,
            }
        };
        if due {
            // failures are already reported through the hook
            let _ = write_target(&inner, &target, Some(timer_id)).await;
            return;
        }
    }
}

fn write_lock(inner: &SchedulerInner, target: &PersistTarget) -> Arc<tokio::sync::Mutex<()>> {
    let mut state = inner.state.lock().expect("scheduler lock poisoned");
    state
        .write_locks
        .entry(target.clone())
        .or_default()
        .clone()
}

/// Drops the write lock of `target` once nothing is pending and no other writer holds it.
fn release_write_lock(
    inner: &SchedulerInner,
    target: &PersistTarget,
    lock: Arc<tokio::sync::Mutex<()>>,
) {
    let mut state = inner.state.lock().expect("scheduler lock poisoned");
    // one reference in the map, one held here
    if !state.pending.contains_key(target) && Arc::strong_count(&lock) == 2 {
        state.write_locks.remove(target);
    }
}

/// Writes the pending entry for `target` under its write lock.
///
/// With `timer_id` set, only the entry armed by that timer is taken.
async fn write_target(
    inner: &SchedulerInner,
    target: &PersistTarget,
    timer_id: Option<u64>,
) -> Result<(), PersistError> {
    let lock = write_lock(inner, target);
    let result = {
        let _guard = lock.lock().await;
        send_pending(inner, target, timer_id).await
    };
    release_write_lock(inner, target, lock);
    result
}

async fn send_pending(
    inner: &SchedulerInner,
    target: &PersistTarget,
    timer_id: Option<u64>,
) -> Result<(), PersistError> {
    let update = {
        let mut state = inner.state.lock().expect("scheduler lock poisoned");
        let owned = state
            .pending
            .get(target)
            .is_some_and(|entry| timer_id.map_or(true, |timer_id| entry.timer_id == timer_id));
        if !owned {
            return Ok(());
        }
        match state.pending.remove(target) {
            Some(entry) => entry.update,
            None => return Ok(()),
        }
    };

    let result = match (target, &update) {
        (PersistTarget::Canvas(state_id), PendingUpdate::Canvas(patch)) => {
            inner.persistence.update_canvas_state(state_id, patch).await
        }
        (PersistTarget::Node(node_id), PendingUpdate::Node(patch)) => {
            inner.persistence.update_node(node_id, patch).await
        }
        (PersistTarget::Canvas(_), PendingUpdate::Node(_))
        | (PersistTarget::Node(_), PendingUpdate::Canvas(_)) => {
            warn!(persist_target = %target, "dropping pending update of mismatched kind");
            Ok(())
        }
    };

    match &result {
        Ok(()) => debug!(persist_target = %target, "persistence write flushed"),
        Err(err) => {
            warn!(persist_target = %target, error = %err, "persistence write failed");
            if let Some(on_failure) = &inner.on_failure {
                on_failure(target, err);
            }
        }
    }
    result
}
