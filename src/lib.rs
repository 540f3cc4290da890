// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! chatgraph: branching chat canvases with ancestor context and streamed replies.
//!
//! A canvas state is a directed graph of conversation nodes. Sending a message on a node
//! resolves the messages of its ancestors into the model context, streams the reply into the
//! node's ledger and persists everything through injected collaborators.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod graph;
pub mod ledger;
pub mod model;
pub mod service;
pub mod store;
pub mod stream;

pub use config::EngineConfig;
pub use engine::{ConversationEngine, EngineBuilder, EngineEvent, GenerationReport, GenerationStatus};
pub use error::EngineError;
