// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Core data model.
//!
//! A canvas state holds nodes and edges; every node owns an ordered message list kept by the
//! ledger under `(state_id, node_id)`.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod canvas;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod ids;
pub mod message;

pub use canvas::{
    CanvasPatch, CanvasState, Edge, Node, NodeKind, NodeMeta, NodeMetaPatch, Position, Topic,
    DEFAULT_STATE_TITLE,
};
pub use ids::{EdgeId, Id, IdError, MessageId, NodeId, StateId, TEMP_ID_PREFIX};
pub use message::{
    Citation, GroundingSearch, Message, MessageError, MessageErrorKind, MessageMetadata,
    MessagePatch, NewMessage, Reasoning, Role, Usage, LOADING_CONTENT,
};

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
