// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{MessageId, NodeId};

/// Placeholder content of an assistant message whose first token has not arrived yet.
pub const LOADING_CONTENT: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageErrorKind {
    CreateMessageError,
    UpdateMessageError,
    GenerationError,
}

/// Error tag stored on a message so the failure stays visible and retryable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageError {
    #[serde(rename = "type")]
    pub kind: MessageErrorKind,
    pub message: String,
}

impl MessageError {
    pub fn new(kind: MessageErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reasoning {
    pub content: String,
    /// Milliseconds between the first reasoning chunk and the first text chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingSearch {
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub search_queries: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Output tokens per second, when the provider reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tps: Option<f64>,
    /// Time to first token in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttft: Option<u64>,
    /// The generation was stopped by the user; content is partial.
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_node_id: Option<NodeId>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MessageError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<GroundingSearch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl Message {
    /// A message that only exists for the model call (summaries, graph description).
    pub fn synthetic(id: MessageId, role: Role, content: impl Into<String>) -> Self {
        let now = super::now_ms();
        Self {
            id,
            role,
            content: content.into(),
            parent_id: None,
            graph_node_id: None,
            created_at: now,
            updated_at: now,
            error: None,
            reasoning: None,
            search: None,
            metadata: None,
            model: None,
            provider: None,
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.id.is_temporary()
    }
}

/// Parameters for creating a message, both locally and through persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub graph_node_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl NewMessage {
    pub fn user(graph_node_id: NodeId, content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            graph_node_id,
            parent_id: None,
            model: None,
            provider: None,
        }
    }

    pub fn into_message(self, id: MessageId) -> Message {
        let now = super::now_ms();
        Message {
            id,
            role: self.role,
            content: self.content,
            parent_id: self.parent_id,
            graph_node_id: Some(self.graph_node_id),
            created_at: now,
            updated_at: now,
            error: None,
            reasoning: None,
            search: None,
            metadata: None,
            model: self.model,
            provider: self.provider,
        }
    }
}

/// Partial update of a [`Message`]; `None` fields are left untouched.
///
/// `error` uses a nested option so a patch can clear an error (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Option<MessageError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<GroundingSearch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl MessagePatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn error(error: MessageError) -> Self {
        Self {
            error: Some(Some(error)),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.error.is_none()
            && self.reasoning.is_none()
            && self.search.is_none()
            && self.metadata.is_none()
            && self.model.is_none()
            && self.provider.is_none()
    }

    /// Applies the patch; `updated_at` is left to the caller so the operation stays pure.
    pub fn apply_to(&self, message: &mut Message) {
        if let Some(content) = &self.content {
            message.content.clone_from(content);
        }
        if let Some(error) = &self.error {
            message.error.clone_from(error);
        }
        if let Some(reasoning) = &self.reasoning {
            message.reasoning = Some(reasoning.clone());
        }
        if let Some(search) = &self.search {
            message.search = Some(search.clone());
        }
        if let Some(metadata) = &self.metadata {
            message.metadata = Some(metadata.clone());
        }
        if let Some(model) = &self.model {
            message.model = Some(model.clone());
        }
        if let Some(provider) = &self.provider {
            message.provider = Some(provider.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_can_set_and_clear_error() {
        let node_id = NodeId::new("n1").expect("node id");
        let mut message = NewMessage::user(node_id, "hi")
            .into_message(MessageId::new("m1").expect("message id"));

        MessagePatch::error(MessageError::new(MessageErrorKind::CreateMessageError, "boom"))
            .apply_to(&mut message);
        assert_eq!(
            message.error.as_ref().map(|error| error.kind),
            Some(MessageErrorKind::CreateMessageError)
        );

        MessagePatch {
            error: Some(None),
            ..MessagePatch::default()
        }
        .apply_to(&mut message);
        assert_eq!(message.error, None);
        assert_eq!(message.content, "hi");
    }

    #[test]
    fn error_tag_serializes_with_type_field() {
        let error = MessageError::new(MessageErrorKind::GenerationError, "upstream 500");
        let value = serde_json::to_value(&error).expect("serialize");
        assert_eq!(value["type"], "GenerationError");
        assert_eq!(value["message"], "upstream 500");
    }
}
