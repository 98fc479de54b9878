//! Entity identity and kind tags.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, globally unique entity identifier.
///
/// Fresh identities are UUID v4 strings; any non-empty string read back from
/// a document is accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Generate a new random identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Closed tag distinguishing the entity kinds.
///
/// Written to documents as the `type` field. It is diagnostic only: the
/// `class` field decides which constructor runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Type,
    Attribute,
    Port,
    Node,
    Graph,
    Collection,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Type,
        EntityKind::Attribute,
        EntityKind::Port,
        EntityKind::Node,
        EntityKind::Graph,
        EntityKind::Collection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Type => "Type",
            EntityKind::Attribute => "Attribute",
            EntityKind::Port => "Port",
            EntityKind::Node => "Node",
            EntityKind::Graph => "Graph",
            EntityKind::Collection => "Collection",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
