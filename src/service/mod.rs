// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Collaborator contracts consumed by the engine.
//!
//! The engine owns no storage, model transport or layout algorithm. It talks to a
//! [`PersistenceService`] for CRUD, a [`CompletionService`] for streamed model output and,
//! optionally, a [`LayoutService`] for repositioning nodes.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::model::{
    CanvasPatch, CanvasState, Edge, GroundingSearch, Message, MessageId, MessagePatch, NewMessage,
    Node, NodeId, NodeMetaPatch, StateId, Topic, Usage,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistOp {
    CreateCanvasState,
    GetCanvasState,
    UpdateCanvasState,
    DeleteCanvasState,
    CreateNode,
    UpdateNode,
    DeleteNode,
    CreateMessage,
    UpdateMessage,
    DeleteMessages,
    ListTopics,
}

impl PersistOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateCanvasState => "createCanvasState",
            Self::GetCanvasState => "getCanvasState",
            Self::UpdateCanvasState => "updateCanvasState",
            Self::DeleteCanvasState => "deleteCanvasState",
            Self::CreateNode => "createNode",
            Self::UpdateNode => "updateNode",
            Self::DeleteNode => "deleteNode",
            Self::CreateMessage => "createMessage",
            Self::UpdateMessage => "updateMessage",
            Self::DeleteMessages => "deleteMessages",
            Self::ListTopics => "listTopics",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistError {
    Backend { op: PersistOp, reason: String },
    NotFound { op: PersistOp, id: String },
}

impl PersistError {
    pub fn backend(op: PersistOp, reason: impl Into<String>) -> Self {
        Self::Backend {
            op,
            reason: reason.into(),
        }
    }

    pub fn op(&self) -> PersistOp {
        match self {
            Self::Backend { op, .. } | Self::NotFound { op, .. } => *op,
        }
    }
}

impl fmt::Display for PersistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend { op, reason } => write!(f, "{} failed: {reason}", op.as_str()),
            Self::NotFound { op, id } => write!(f, "{} failed: {id} not found", op.as_str()),
        }
    }
}

impl std::error::Error for PersistError {}

/// A canvas state as loaded from persistence, with each node's stored messages.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCanvas {
    pub state: CanvasState,
    pub messages: BTreeMap<NodeId, Vec<Message>>,
}

/// CRUD access to the backing store. Every call may fail with a typed [`PersistError`].
#[async_trait]
pub trait PersistenceService: Send + Sync {
    async fn create_canvas_state(&self, title: Option<&str>) -> Result<StateId, PersistError>;

    async fn get_canvas_state(&self, id: &StateId) -> Result<Option<StoredCanvas>, PersistError>;

    async fn update_canvas_state(
        &self,
        id: &StateId,
        patch: &CanvasPatch,
    ) -> Result<(), PersistError>;

    async fn delete_canvas_state(&self, id: &StateId) -> Result<(), PersistError>;

    /// Allocates the node's authoritative id. Position and kind are owned by the canvas blob.
    async fn create_node(
        &self,
        state_id: &StateId,
        meta: &NodeMetaPatch,
    ) -> Result<Node, PersistError>;

    async fn update_node(&self, id: &NodeId, meta: &NodeMetaPatch) -> Result<(), PersistError>;

    async fn delete_node(&self, id: &NodeId) -> Result<(), PersistError>;

    async fn create_message(&self, params: &NewMessage) -> Result<MessageId, PersistError>;

    async fn update_message(&self, id: &MessageId, patch: &MessagePatch)
        -> Result<(), PersistError>;

    async fn delete_messages(&self, ids: &[MessageId]) -> Result<(), PersistError>;

    async fn list_topics(&self) -> Result<Vec<Topic>, PersistError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    Upstream { status: Option<u16>, message: String },
    Protocol(String),
    NoResponse,
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream {
                status: Some(status),
                message,
            } => write!(f, "model service error ({status}): {message}"),
            Self::Upstream {
                status: None,
                message,
            } => write!(f, "model service error: {message}"),
            Self::Protocol(message) => write!(f, "malformed model stream: {message}"),
            Self::NoResponse => f.write_str("model service returned no response"),
        }
    }
}

impl std::error::Error for GenerationError {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub model: String,
    pub provider: String,
    pub params: CompletionParams,
    /// Cancelled when the generation is stopped; services should end the stream early.
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    Text(String),
    Reasoning(String),
    Grounding(GroundingSearch),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinishMeta {
    pub usage: Option<Usage>,
    pub tps: Option<f64>,
    pub ttft: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionEvent {
    Chunk(Chunk),
    /// Terminal event carrying the provider's final text.
    Finished { content: String, meta: FinishMeta },
}

pub type CompletionStream = BoxStream<'static, Result<CompletionEvent, GenerationError>>;

/// Streaming chat completion. The stream ends after `Finished` or the first `Err`.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn stream_completion(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionStream, GenerationError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Pure repositioning of a graph; used for visual arrangement only.
pub trait LayoutService: Send + Sync {
    fn layout(&self, nodes: &[Node], edges: &[Edge]) -> LayoutResult;
}

#[cfg(test)]
mod tests {
    use super::{GenerationError, PersistError, PersistOp};

    #[test]
    fn persist_error_display_names_the_operation() {
        let err = PersistError::backend(PersistOp::CreateMessage, "connection reset");
        assert_eq!(err.to_string(), "createMessage failed: connection reset");
        assert_eq!(err.op(), PersistOp::CreateMessage);

        let err = PersistError::NotFound {
            op: PersistOp::UpdateNode,
            id: "n9".to_owned(),
        };
        assert_eq!(err.to_string(), "updateNode failed: n9 not found");
    }

    #[test]
    fn generation_error_display_includes_status_when_known() {
        let err = GenerationError::Upstream {
            status: Some(429),
            message: "rate limited".to_owned(),
        };
        assert_eq!(err.to_string(), "model service error (429): rate limited");
    }
}
