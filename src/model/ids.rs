// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Nereid and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Prefix carried by optimistic message ids that were never confirmed by persistence.
pub const TEMP_ID_PREFIX: &str = "tmp_";

/// A stable identifier for canvas states, nodes, edges and messages.
///
/// Ids are issued by the persistence backend and are opaque to the engine. The only enforced
/// shape is a non-empty string without `/`, so an id is always usable as a single path segment
/// by persistence backends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T> {
    value: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    pub fn new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        validate_id_segment(&value)?;
        Ok(Self {
            value,
            _marker: PhantomData,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_string(self) -> String {
        self.value
    }

    fn from_trusted(value: String) -> Self {
        Self {
            value,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<T> AsRef<str> for Id<T> {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl<T> Borrow<str> for Id<T> {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl<T> FromStr for Id<T> {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_owned())
    }
}

impl<T> TryFrom<String> for Id<T> {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de, T> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::new(value).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    Empty,
    ContainsSlash,
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("id must not be empty"),
            Self::ContainsSlash => f.write_str("id must not contain '/'"),
        }
    }
}

impl std::error::Error for IdError {}

fn validate_id_segment(value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty);
    }
    if value.contains('/') {
        return Err(IdError::ContainsSlash);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateIdTag {}
pub type StateId = Id<StateIdTag>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeIdTag {}
pub type NodeId = Id<NodeIdTag>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeIdTag {}
pub type EdgeId = Id<EdgeIdTag>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageIdTag {}
pub type MessageId = Id<MessageIdTag>;

impl MessageId {
    /// Allocates a fresh optimistic id (`tmp_<random>`).
    pub fn temporary() -> Self {
        Self::from_trusted(format!("{TEMP_ID_PREFIX}{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn is_temporary(&self) -> bool {
        self.value.starts_with(TEMP_ID_PREFIX)
    }

    /// Id of a context-only message derived from a node (`summary_<node>`).
    pub fn derived(prefix: &str, node_id: &NodeId) -> Self {
        Self::from_trusted(format!("{prefix}_{node_id}"))
    }
}

impl EdgeId {
    /// Deterministic id for an edge that arrives without one.
    pub fn for_endpoints(source: &NodeId, target: &NodeId) -> Self {
        Self::from_trusted(format!("edge__{source}-{target}"))
    }
}

#[cfg(test)]
mod tests {
    use super::{EdgeId, Id, IdError, MessageId, NodeId};

    #[test]
    fn id_rejects_empty() {
        let result: Result<Id<()>, _> = Id::new("");
        assert_eq!(result, Err(IdError::Empty));
    }

    #[test]
    fn id_rejects_slash() {
        let result: Result<Id<()>, _> = Id::new("a/b");
        assert_eq!(result, Err(IdError::ContainsSlash));
    }

    #[test]
    fn temporary_message_ids_are_unique_and_flagged() {
        let a = MessageId::temporary();
        let b = MessageId::temporary();
        assert_ne!(a, b);
        assert!(a.is_temporary());
        assert!(a.as_str().starts_with("tmp_"));
        assert!(!MessageId::new("msg-1").expect("message id").is_temporary());
    }

    #[test]
    fn edge_id_for_endpoints_is_a_valid_segment() {
        let source = NodeId::new("n1").expect("node id");
        let target = NodeId::new("n2").expect("node id");
        let edge_id = EdgeId::for_endpoints(&source, &target);
        assert_eq!(edge_id.as_str(), "edge__n1-n2");
        assert!(EdgeId::new(edge_id.as_str()).is_ok());
    }

    #[test]
    fn ids_round_trip_through_json_and_reject_invalid_text() {
        let id = NodeId::new("node-7").expect("node id");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"node-7\"");

        let back: NodeId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);

        let err = serde_json::from_str::<NodeId>("\"a/b\"").unwrap_err();
        assert!(err.to_string().contains("'/'"));
    }
}
