// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;

use crate::model::{MessageId, NodeId, StateId};
use crate::service::{GenerationError, PersistError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    NoActiveState,
    NoFocusNode,
    StateNotFound { state_id: StateId },
    NodeNotFound { node_id: NodeId },
    DuplicateNode { node_id: NodeId, state_id: StateId },
    MetaNotFound { node_id: NodeId },
    MessageNotFound { message_id: MessageId },
    InvalidEdge { source: NodeId, target: NodeId },
    EmptyMessage,
    NoMessages { node_id: NodeId },
    SummaryInProgress,
    CreateMessage { source: PersistError },
    UpdateMessage { source: PersistError },
    Persist { source: PersistError },
    GenerationCancelled { message_id: MessageId },
    Generation { message_id: MessageId, source: GenerationError },
    Summary { node_id: NodeId, source: GenerationError },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveState => f.write_str("no active canvas state"),
            Self::NoFocusNode => f.write_str("no node in focus"),
            Self::StateNotFound { state_id } => write!(f, "canvas state not found (id={state_id})"),
            Self::NodeNotFound { node_id } => write!(f, "node not found (id={node_id})"),
            Self::DuplicateNode { node_id, state_id } => {
                write!(f, "node {node_id} already belongs to canvas state {state_id}")
            }
            Self::MetaNotFound { node_id } => write!(f, "node meta not found (id={node_id})"),
            Self::MessageNotFound { message_id } => {
                write!(f, "message not found (id={message_id})")
            }
            Self::InvalidEdge { source, target } => write!(
                f,
                "edge {source} -> {target} must connect two nodes of the active state"
            ),
            Self::EmptyMessage => f.write_str("message content is empty"),
            Self::NoMessages { node_id } => write!(f, "node {node_id} has no messages"),
            Self::SummaryInProgress => f.write_str("a summary is already being generated"),
            Self::CreateMessage { source } => write!(f, "cannot create message: {source}"),
            Self::UpdateMessage { source } => write!(f, "cannot update message: {source}"),
            Self::Persist { source } => write!(f, "persistence error: {source}"),
            Self::GenerationCancelled { message_id } => {
                write!(f, "generation cancelled (message={message_id})")
            }
            Self::Generation { message_id, source } => {
                write!(f, "generation failed (message={message_id}): {source}")
            }
            Self::Summary { node_id, source } => {
                write!(f, "summary failed (node={node_id}): {source}")
            }
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CreateMessage { source }
            | Self::UpdateMessage { source }
            | Self::Persist { source } => Some(source),
            Self::Generation { source, .. } | Self::Summary { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<PersistError> for EngineError {
    fn from(source: PersistError) -> Self {
        Self::Persist { source }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::EngineError;
    use crate::service::{PersistError, PersistOp};

    #[test]
    fn persistence_failures_keep_their_source() {
        let err: EngineError =
            PersistError::backend(PersistOp::DeleteNode, "disk full").into();
        assert_eq!(err.to_string(), "persistence error: deleteNode failed: disk full");
        assert!(err.source().is_some());
        assert!(EngineError::NoActiveState.source().is_none());
    }
}
