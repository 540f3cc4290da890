// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Persistence plumbing.
//!
//! The scheduler debounces canvas and node-meta writes in front of any
//! [`PersistenceService`](crate::service::PersistenceService); the in-memory backend serves
//! embedding hosts without a database and the test suites.

pub mod memory;
pub mod scheduler;

pub use memory::{InMemoryPersistence, PersistCall};
pub use scheduler::{FailureHook, PendingUpdate, PersistTarget, PersistenceScheduler};
