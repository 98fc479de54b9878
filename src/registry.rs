//! Identity registry.
//!
//! The arena that owns every live entity, keyed by identity, with a per-kind
//! bucket index for diagnostics and counting and a parent index for
//! ownership walks.
//!
//! ## Limitations
//!
//! - **Single owner**: mutation goes through `&mut self`. Cross-thread use must
//!   go through `SharedContext`, which serializes access behind one mutex.
//! - **No implicit collection**: entities stay tracked until removed.

use hashbrown::{HashMap, HashSet};
use indexmap::IndexSet;
use tracing::{debug, warn};

use crate::model::{Entity, EntityId, EntityKind};
use crate::{Error, Result};

// ============================================================================
// Registry
// ============================================================================

/// Map from identity to live entity.
#[derive(Debug, Default)]
pub struct Registry {
    instances: HashMap<EntityId, Entity>,
    /// kind → identities of that kind
    buckets: HashMap<EntityKind, HashSet<EntityId>>,
    /// parent → identities it owns, in adoption order
    owned: HashMap<EntityId, IndexSet<EntityId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True iff `id` is usable for a new entity: non-empty and not live.
    pub fn is_valid(&self, id: &EntityId) -> bool {
        !id.is_empty() && !self.instances.contains_key(id)
    }

    /// Pick the identity for a new entity: the requested one if it is valid,
    /// otherwise a freshly generated one.
    pub fn claim_id(&self, requested: Option<&EntityId>) -> EntityId {
        if let Some(id) = requested {
            if self.is_valid(id) {
                return id.clone();
            }
            if !id.is_empty() {
                warn!(target: "entity_graph::registry", id = %id, "Requested identity is in use, generating a fresh one");
            }
        }

        loop {
            let id = EntityId::generate();
            if self.is_valid(&id) {
                return id;
            }
        }
    }

    /// Record `entity` under its identity.
    ///
    /// Overwriting a live identity is a contract violation; callers claim
    /// identities through `claim_id` first.
    pub fn add_instance(&mut self, entity: Entity) -> Result<()> {
        if self.instances.contains_key(&entity.id) {
            return Err(Error::Contract(format!(
                "identity {} is already registered",
                entity.id
            )));
        }

        self.buckets.entry(entity.kind()).or_default().insert(entity.id.clone());
        if let Some(parent) = &entity.parent {
            self.owned.entry(parent.clone()).or_default().insert(entity.id.clone());
        }
        debug!(target: "entity_graph::registry", id = %entity.id, class = %entity.class, "Instance registered");
        self.instances.insert(entity.id.clone(), entity);
        Ok(())
    }

    /// Drop the mapping for `id`. An absent identity is logged, not an error.
    pub fn remove_instance(&mut self, id: &EntityId) -> Option<Entity> {
        let removed = self.instances.remove(id);
        match &removed {
            Some(entity) => {
                if let Some(bucket) = self.buckets.get_mut(&entity.kind()) {
                    bucket.remove(id);
                }
                if let Some(parent) = &entity.parent {
                    self.disown(parent, id);
                }
            }
            None => {
                warn!(target: "entity_graph::registry", id = %id, "Instance already removed");
            }
        }
        removed
    }

    pub fn get_instance(&self, id: &EntityId) -> Option<&Entity> {
        self.instances.get(id)
    }

    pub(crate) fn get_instance_mut(&mut self, id: &EntityId) -> Option<&mut Entity> {
        self.instances.get_mut(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.instances.contains_key(id)
    }

    /// Wipe every tracked entity.
    pub fn clear_all(&mut self) {
        debug!(target: "entity_graph::registry", count = self.instances.len(), "Clearing all instances");
        self.instances.clear();
        self.buckets.clear();
        self.owned.clear();
    }

    /// Identities whose parent is `parent`, live or not yet registered.
    pub fn children(&self, parent: &EntityId) -> Vec<EntityId> {
        self.owned
            .get(parent)
            .map(|owned| owned.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Re-parent a live entity, keeping the parent index in step.
    /// Returns false if `id` is not live.
    pub(crate) fn set_parent(&mut self, id: &EntityId, parent: Option<EntityId>) -> bool {
        let Some(entity) = self.instances.get_mut(id) else {
            return false;
        };
        if entity.parent == parent {
            return true;
        }
        let previous = std::mem::replace(&mut entity.parent, parent.clone());
        if let Some(previous) = previous {
            self.disown(&previous, id);
        }
        if let Some(parent) = parent {
            self.owned.entry(parent).or_default().insert(id.clone());
        }
        true
    }

    fn disown(&mut self, parent: &EntityId, id: &EntityId) {
        if let Some(owned) = self.owned.get_mut(parent) {
            owned.shift_remove(id);
            if owned.is_empty() {
                self.owned.remove(parent);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Number of live entities of `kind`.
    pub fn count(&self, kind: EntityKind) -> usize {
        self.buckets.get(&kind).map_or(0, HashSet::len)
    }

    /// Identities of live entities of `kind`, in no particular order.
    pub fn ids(&self, kind: EntityKind) -> Vec<EntityId> {
        self.buckets
            .get(&kind)
            .map(|bucket| bucket.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.instances.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.instances.values_mut()
    }
}

// ============================================================================
// Tests
// ============================================================================
