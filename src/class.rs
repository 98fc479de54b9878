//! # Class Catalog
//!
//! Maps serialized class names to construction recipes. A `ClassDef` is data:
//! it says which kind of entity to build, which named members to create, which
//! native types a typed value accepts, and how a node computes its result.
//! Behaviour lives in the context operations that read these recipes.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::context::Context;
use crate::model::{EntityId, EntityKind, PortMode, Value, ValueType};
use crate::ops::Trail;
use crate::{Error, Result};

/// Computes a node's result.
pub type ComputeFn = fn(&Context, &EntityId, &mut Trail) -> Result<Value>;

/// A named member created when the owner is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub name: String,
    pub class: String,
}

impl Slot {
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self { name: name.into(), class: class.into() }
    }
}

/// Accepted types, cast and default of a typed value class.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSpec {
    pub accepts: SmallVec<[ValueType; 4]>,
    /// Type every accepted value is converted to before storage.
    pub cast: Option<ValueType>,
    pub default: Value,
    /// When set, `data` holds the identity of a live entity of this kind.
    pub reference: Option<EntityKind>,
}

impl ValueSpec {
    pub fn primitive(accepts: &[ValueType], default: impl Into<Value>) -> Self {
        Self {
            accepts: accepts.iter().copied().collect(),
            cast: None,
            default: default.into(),
            reference: None,
        }
    }

    pub fn reference(target: EntityKind) -> Self {
        Self {
            accepts: SmallVec::from_slice(&[ValueType::String]),
            cast: None,
            default: Value::Null,
            reference: Some(target),
        }
    }

    pub fn cast_to(mut self, target: ValueType) -> Self {
        self.cast = Some(target);
        self
    }

    pub fn is_reference(&self) -> bool {
        self.reference.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Sequence,
    Mapping,
}

/// Member rules of a typed collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    pub shape: Shape,
    pub members: SmallVec<[EntityKind; 2]>,
    pub unique: bool,
    /// Members are referenced, not owned: encoded as identities and never
    /// re-parented.
    pub references: bool,
}

impl CollectionSpec {
    pub fn new(shape: Shape, members: &[EntityKind]) -> Self {
        Self {
            shape,
            members: members.iter().copied().collect(),
            unique: false,
            references: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn references(mut self) -> Self {
        self.references = true;
        self
    }

    pub fn accepts(&self, kind: EntityKind) -> bool {
        self.members.contains(&kind)
    }
}

#[derive(Clone)]
pub struct NodeSpec {
    pub attributes: Vec<Slot>,
    pub inputs: Vec<Slot>,
    pub outputs: Vec<Slot>,
    pub compute: Option<ComputeFn>,
}

impl fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeSpec")
            .field("attributes", &self.attributes)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("compute", &self.compute.is_some())
            .finish()
    }
}

/// What to build for a class.
#[derive(Debug, Clone)]
pub enum Blueprint {
    /// Registered for lookup, never constructible.
    Abstract(EntityKind),
    Value(ValueSpec),
    Attribute { fields: Vec<Slot> },
    Port { mode: PortMode, fields: Vec<Slot> },
    Node(NodeSpec),
    Graph,
    Collection(CollectionSpec),
}

impl Blueprint {
    pub fn kind(&self) -> EntityKind {
        match self {
            Blueprint::Abstract(kind) => *kind,
            Blueprint::Value(_) => EntityKind::Type,
            Blueprint::Attribute { .. } => EntityKind::Attribute,
            Blueprint::Port { .. } => EntityKind::Port,
            Blueprint::Node(_) => EntityKind::Node,
            Blueprint::Graph => EntityKind::Graph,
            Blueprint::Collection(_) => EntityKind::Collection,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub blueprint: Blueprint,
}

impl ClassDef {
    pub fn new(name: impl Into<String>, blueprint: Blueprint) -> Self {
        Self { name: name.into(), blueprint }
    }

    pub fn kind(&self) -> EntityKind {
        self.blueprint.kind()
    }

    pub fn value_spec(&self) -> Result<&ValueSpec> {
        match &self.blueprint {
            Blueprint::Value(spec) => Ok(spec),
            _ => Err(Error::Contract(format!("{} is not a typed value class", self.name))),
        }
    }

    pub fn collection_spec(&self) -> Result<&CollectionSpec> {
        match &self.blueprint {
            Blueprint::Collection(spec) => Ok(spec),
            _ => Err(Error::Contract(format!("{} is not a collection class", self.name))),
        }
    }
}

// ============================================================================
// ClassRegistry
// ============================================================================

/// Name → class recipe.
#[derive(Debug, Clone, Default)]
pub struct ClassRegistry {
    classes: HashMap<String, Arc<ClassDef>>,
}

impl ClassRegistry {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog holding every built-in class.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtin::install(&mut registry);
        registry
    }

    /// Add or replace a class. Returns the replaced definition.
    pub fn register(&mut self, def: ClassDef) -> Option<Arc<ClassDef>> {
        self.classes.insert(def.name.clone(), Arc::new(def))
    }

    pub fn get(&self, name: &str) -> Result<Arc<ClassDef>> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownClass(name.to_owned()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.classes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_class_lookup_fails() {
        let registry = ClassRegistry::new();
        assert!(matches!(registry.get("Ghost"), Err(Error::UnknownClass(name)) if name == "Ghost"));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ClassRegistry::new();
        let first = ClassDef::new("Flag", Blueprint::Value(ValueSpec::primitive(&[ValueType::Bool], false)));
        assert!(registry.register(first).is_none());

        let second = ClassDef::new("Flag", Blueprint::Value(ValueSpec::primitive(&[ValueType::Bool], true)));
        let replaced = registry.register(second).unwrap();
        assert_eq!(replaced.value_spec().unwrap().default, Value::Bool(false));
        assert_eq!(registry.get("Flag").unwrap().value_spec().unwrap().default, Value::Bool(true));
    }

    #[test]
    fn test_blueprint_kinds() {
        assert_eq!(Blueprint::Graph.kind(), EntityKind::Graph);
        assert_eq!(Blueprint::Abstract(EntityKind::Node).kind(), EntityKind::Node);
        let spec = CollectionSpec::new(Shape::Sequence, &[EntityKind::Port]).unique().references();
        assert!(spec.unique && spec.references && spec.accepts(EntityKind::Port));
        assert!(!spec.accepts(EntityKind::Node));
    }
}
