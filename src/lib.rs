//! # entity-graph — Identity-Tracked Entity Graphs
//!
//! A substrate for typed, mutable object graphs (typed values, attributes,
//! ports, nodes, graphs, collections) whose members carry globally unique
//! identities, reference each other by identity (cycles and forward
//! references included), and round-trip through JSON documents.
//!
//! ## Design Principles
//!
//! 1. **Arena + identity**: the `Registry` owns every entity; everything else
//!    holds `EntityId`s. Cycles need no special handling.
//! 2. **Explicit context**: `Context` bundles registry, class catalog, event bus
//!    and resolver. Tests get a fresh one instead of clearing a global.
//! 3. **Factory construction**: identity is claimed before the body is built and
//!    the entity is registered before the constructor returns.
//! 4. **Table-driven serialization**: each entity shape declares identity,
//!    primary and relation fields once; relations are encoded as identities.
//!
//! ## Quick Start
//!
//! ```rust
//! use entity_graph::{Context, Create, DecodeOptions, Value};
//!
//! # fn example() -> entity_graph::Result<()> {
//! let mut ctx = Context::new();
//!
//! let driver = ctx.create_with("StringAttribute", Create::new().data("driver"))?;
//! let driven = ctx.create("StringAttribute")?;
//! ctx.link(&driven, &driver)?;
//! assert_eq!(ctx.data(&driven)?, Value::from("driver"));
//!
//! let doc = ctx.serialize(&driven)?;
//! let same = ctx.deserialize(&doc, DecodeOptions::new().relations(true))?;
//! assert_eq!(same, driven);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod registry;
pub mod events;
pub mod resolver;
pub mod class;
pub mod builtin;
pub mod collection;
pub mod ops;
pub mod serialize;
pub mod io;
pub mod config;
pub mod context;
pub mod shared;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Entity, EntityId, EntityKind, Body, Members, PortMode, Value, ValueType,
};

// ============================================================================
// Re-exports: Core services
// ============================================================================

pub use registry::Registry;
pub use events::{Action, Call, EventBus, EventName, EventPayload, Hook, Phase, SubscriptionId};
pub use resolver::{ReferenceScope, ResolveReport, Setter};
pub use class::{Blueprint, ClassDef, ClassRegistry, CollectionSpec, Shape, Slot, ValueSpec};
pub use serialize::{Document, FieldClass};
pub use config::{CollisionPolicy, Config, DecodeOptions};
pub use context::{Context, Create};
pub use shared::SharedContext;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Contract violation: {0}")]
    Contract(String),

    #[error("Malformed document: {0}")]
    Document(String),

    #[error("Type error: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("Cycle detected at {0}")]
    Cycle(String),

    #[error("A reference scope is already active")]
    ScopeActive,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
