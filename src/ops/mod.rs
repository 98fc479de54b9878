//! # Entity Operations
//!
//! Behaviour of the concrete entity kinds, as methods on [`Context`]:
//!
//! - `value`: typed-value data, validation, references
//! - `attribute`: fields, links, read-through
//! - `port`: connections and pulled data
//! - `node`: member lookup, computed data, graphs
//!
//! `data` is the single read entry point. It walks links, connections and
//! node computations with a [`Trail`] so that a cyclic pull fails with
//! [`Error::Cycle`] instead of recursing forever.

pub mod value;
pub mod attribute;
pub mod port;
pub mod node;

use hashbrown::HashSet;

use crate::context::Context;
use crate::model::{EntityId, EntityKind, Value};
use crate::{Error, Result};

/// Entities currently being read on one pull path.
#[derive(Debug, Default)]
pub struct Trail {
    visited: HashSet<EntityId>,
}

impl Trail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as being read. Re-entering it is a cycle.
    pub fn enter(&mut self, id: &EntityId) -> Result<()> {
        if self.visited.insert(id.clone()) {
            Ok(())
        } else {
            Err(Error::Cycle(id.to_string()))
        }
    }

    pub fn leave(&mut self, id: &EntityId) {
        self.visited.remove(id);
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.visited.contains(id)
    }
}

impl Context {
    /// Current value of any readable entity.
    pub fn data(&self, id: &EntityId) -> Result<Value> {
        self.pull(id, &mut Trail::new())
    }

    /// `data` on an existing pull path. Used by node computations.
    pub fn pull(&self, id: &EntityId, trail: &mut Trail) -> Result<Value> {
        let kind = self.kind(id)?;
        trail.enter(id)?;
        let result = match kind {
            EntityKind::Type => self.get_data(id),
            EntityKind::Attribute => self.attribute_data(id, trail),
            EntityKind::Port => self.port_data(id, trail),
            EntityKind::Node => self.node_data(id, trail),
            EntityKind::Graph | EntityKind::Collection => {
                Err(Error::Contract(format!("{kind} {id} has no data")))
            }
        };
        trail.leave(id);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trail_detects_reentry() {
        let mut trail = Trail::new();
        let id = EntityId::new("a");
        trail.enter(&id).unwrap();
        assert!(matches!(trail.enter(&id), Err(Error::Cycle(_))));
        trail.leave(&id);
        assert!(trail.enter(&id).is_ok());
    }

    #[test]
    fn test_collections_have_no_data() {
        let mut ctx = Context::new();
        let graph = ctx.create("Graph").unwrap();
        assert!(matches!(ctx.data(&graph), Err(Error::Contract(_))));
    }
}
