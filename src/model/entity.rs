//! The entity record stored in the registry.

use std::fmt;

use hashbrown::HashSet;
use indexmap::IndexMap;

use super::{EntityId, EntityKind, Value};

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortMode {
    Input,
    Output,
}

impl PortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortMode::Input => "INPUT",
            PortMode::Output => "OUTPUT",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_uppercase().as_str() {
            "INPUT" => Some(PortMode::Input),
            "OUTPUT" => Some(PortMode::Output),
            _ => None,
        }
    }
}

impl fmt::Display for PortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked entity.
///
/// `class` names the catalog entry that built it and that will rebuild it on
/// decode. `parent` is a non-owning back-reference stamped by collections.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) class: String,
    pub(crate) parent: Option<EntityId>,
    pub(crate) body: Body,
}

impl Entity {
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn kind(&self) -> EntityKind {
        self.body.kind()
    }

    pub fn parent(&self) -> Option<&EntityId> {
        self.parent.as_ref()
    }

    pub fn body(&self) -> &Body {
        &self.body
    }
}

/// Kind-specific state. Relations are always identities, never owned entities.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Value(TypedValue),
    Attribute(AttributeBody),
    Port(PortBody),
    Node(NodeBody),
    Graph(GraphBody),
    Collection(CollectionBody),
}

impl Body {
    pub fn kind(&self) -> EntityKind {
        match self {
            Body::Value(_) => EntityKind::Type,
            Body::Attribute(_) => EntityKind::Attribute,
            Body::Port(_) => EntityKind::Port,
            Body::Node(_) => EntityKind::Node,
            Body::Graph(_) => EntityKind::Graph,
            Body::Collection(_) => EntityKind::Collection,
        }
    }
}

/// Payload of a typed value. `None` means "unset": reads fall back to the
/// class default.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypedValue {
    pub(crate) data: Option<Value>,
}

impl TypedValue {
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeBody {
    /// Keyed collection of named typed values.
    pub(crate) fields: EntityId,
    /// Attribute whose value this one mirrors.
    pub(crate) link: Option<EntityId>,
}

impl AttributeBody {
    pub fn fields(&self) -> &EntityId { &self.fields }
    pub fn link(&self) -> Option<&EntityId> { self.link.as_ref() }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortBody {
    pub(crate) mode: PortMode,
    pub(crate) fields: EntityId,
    /// Reference collection of connected ports.
    pub(crate) connections: EntityId,
}

impl PortBody {
    pub fn mode(&self) -> PortMode { self.mode }
    pub fn fields(&self) -> &EntityId { &self.fields }
    pub fn connections(&self) -> &EntityId { &self.connections }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeBody {
    pub(crate) attributes: EntityId,
    pub(crate) inputs: EntityId,
    pub(crate) outputs: EntityId,
}

impl NodeBody {
    pub fn attributes(&self) -> &EntityId { &self.attributes }
    pub fn inputs(&self) -> &EntityId { &self.inputs }
    pub fn outputs(&self) -> &EntityId { &self.outputs }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphBody {
    pub(crate) nodes: EntityId,
    pub(crate) graphs: EntityId,
}

impl GraphBody {
    pub fn nodes(&self) -> &EntityId { &self.nodes }
    pub fn graphs(&self) -> &EntityId { &self.graphs }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionBody {
    pub(crate) members: Members,
}

impl CollectionBody {
    pub fn members(&self) -> &Members { &self.members }
}

/// Storage of a typed collection: ordered or keyed.
#[derive(Debug, Clone, PartialEq)]
pub enum Members {
    Sequence(Vec<EntityId>),
    Mapping(IndexMap<String, EntityId>),
}

impl Members {
    pub fn len(&self) -> usize {
        match self {
            Members::Sequence(items) => items.len(),
            Members::Mapping(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        match self {
            Members::Sequence(items) => items.contains(id),
            Members::Mapping(entries) => entries.values().any(|v| v == id),
        }
    }

    /// Member identities in order.
    pub fn ids(&self) -> Vec<EntityId> {
        match self {
            Members::Sequence(items) => items.clone(),
            Members::Mapping(entries) => entries.values().cloned().collect(),
        }
    }

    /// Remove every occurrence of `id`. Returns how many were removed.
    pub(crate) fn purge(&mut self, id: &EntityId) -> usize {
        let before = self.len();
        match self {
            Members::Sequence(items) => items.retain(|item| item != id),
            Members::Mapping(entries) => entries.retain(|_, item| item != id),
        }
        before - self.len()
    }

    /// Drop every member in `ids`. Returns how many slots were removed.
    pub(crate) fn purge_all(&mut self, ids: &HashSet<EntityId>) -> usize {
        let before = self.len();
        match self {
            Members::Sequence(items) => items.retain(|item| !ids.contains(item)),
            Members::Mapping(entries) => entries.retain(|_, item| !ids.contains(item)),
        }
        before - self.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_mode_parse() {
        assert_eq!(PortMode::parse("input"), Some(PortMode::Input));
        assert_eq!(PortMode::parse("OUTPUT"), Some(PortMode::Output));
        assert_eq!(PortMode::parse("sideways"), None);
    }

    #[test]
    fn test_members_purge() {
        let a = EntityId::new("a");
        let b = EntityId::new("b");
        let mut seq = Members::Sequence(vec![a.clone(), b.clone(), a.clone()]);
        assert_eq!(seq.purge(&a), 2);
        assert_eq!(seq.ids(), vec![b.clone()]);

        let mut map = Members::Mapping(IndexMap::from([("x".to_string(), b.clone())]));
        assert!(map.contains(&b));
        assert_eq!(map.purge(&b), 1);
        assert!(map.is_empty());
    }
}
