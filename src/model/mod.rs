//! # Entity Model
//!
//! Plain data that every other layer passes around: identities, kind tags,
//! primitive values and the entity record stored in the registry.
//!
//! Design rule: no context access, no I/O, no events here.

pub mod id;
pub mod value;
pub mod entity;

pub use id::{EntityId, EntityKind};
pub use value::{Value, ValueType};
pub use entity::{
    AttributeBody, Body, CollectionBody, Entity, GraphBody, Members, NodeBody, PortBody,
    PortMode, TypedValue,
};
