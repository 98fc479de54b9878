//! # Typed Collections
//!
//! Ordered (sequence) and keyed (mapping) containers whose members must be
//! of a declared kind, optionally unique. Inserting into an owned collection
//! stamps the collection's own parent onto the member; reference collections
//! (e.g. port connections) hold identities without claiming ownership.
//!
//! Rejections follow the data-shape policy: `Ok(false)` plus a warning.
//! Calling a keyed operation on a sequence (or the reverse) is a contract
//! violation and returns `Err`.

use tracing::warn;

use crate::class::{CollectionSpec, Shape};
use crate::context::Context;
use crate::events::{around, Action, Call, Hook};
use crate::model::{Body, Entity, EntityId, EntityKind, Members};
use crate::{Error, Result};

/// Where an admitted member goes.
#[derive(Debug, Clone)]
pub(crate) enum Place {
    End,
    At(usize),
    Key(String),
}

impl Context {
    pub(crate) fn collection_spec(&self, collection: &EntityId) -> Result<CollectionSpec> {
        Ok(self.def_of(collection)?.collection_spec()?.clone())
    }

    fn members_of(&self, collection: &EntityId) -> Result<&Members> {
        match self.entity(collection)?.body() {
            Body::Collection(body) => Ok(body.members()),
            other => Err(Error::Contract(format!(
                "{collection} is a {}, not a collection",
                other.kind()
            ))),
        }
    }

    fn members_mut(&mut self, collection: &EntityId) -> Result<&mut Members> {
        match &mut self.entity_mut(collection)?.body {
            Body::Collection(body) => Ok(&mut body.members),
            other => Err(Error::Contract(format!(
                "{collection} is a {}, not a collection",
                other.kind()
            ))),
        }
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// True if `item` may be inserted into `collection`: it is live, of an
    /// accepted kind and (for unique collections) not already present.
    pub fn validate_item(&self, collection: &EntityId, item: &EntityId) -> Result<bool> {
        let spec = self.collection_spec(collection)?;
        let Some(entity) = self.get(item) else {
            warn!(target: "entity_graph::collection", collection = %collection, item = %item, "Member is not live");
            return Ok(false);
        };
        if !spec.accepts(entity.kind()) {
            warn!(
                target: "entity_graph::collection",
                collection = %collection,
                item = %item,
                kind = %entity.kind(),
                "Member kind not accepted"
            );
            return Ok(false);
        }
        if spec.unique && self.members_of(collection)?.contains(item) {
            warn!(target: "entity_graph::collection", collection = %collection, item = %item, "Duplicate member rejected");
            return Ok(false);
        }
        Ok(true)
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Add to the end of a sequence.
    pub fn append(&mut self, collection: &EntityId, item: &EntityId) -> Result<bool> {
        self.admit(collection, item, Place::End)
    }

    /// Insert into a sequence at `index` (clamped to the length).
    pub fn insert(&mut self, collection: &EntityId, index: usize, item: &EntityId) -> Result<bool> {
        self.admit(collection, item, Place::At(index))
    }

    /// Bind `key` to `item` in a mapping, replacing any previous member.
    pub fn set_entry(&mut self, collection: &EntityId, key: &str, item: &EntityId) -> Result<bool> {
        self.admit(collection, item, Place::Key(key.to_owned()))
    }

    /// Append to a sequence, or bind a mapping entry keyed by the item's identity.
    pub fn add(&mut self, collection: &EntityId, item: &EntityId) -> Result<bool> {
        match self.collection_spec(collection)?.shape {
            Shape::Sequence => self.append(collection, item),
            Shape::Mapping => self.set_entry(collection, item.as_str(), item),
        }
    }

    pub(crate) fn admit(&mut self, collection: &EntityId, item: &EntityId, place: Place) -> Result<bool> {
        let spec = self.collection_spec(collection)?;
        match (spec.shape, &place) {
            (Shape::Sequence, Place::Key(_)) => {
                return Err(Error::Contract(format!("{collection} is ordered, not keyed")));
            }
            (Shape::Mapping, Place::End | Place::At(_)) => {
                return Err(Error::Contract(format!("{collection} is keyed, not ordered")));
            }
            _ => {}
        }

        if let (Place::Key(key), Members::Mapping(entries)) = (&place, self.members_of(collection)?) {
            if entries.get(key) == Some(item) {
                return Ok(true);
            }
        }
        if !self.validate_item(collection, item)? {
            return Ok(false);
        }

        let mut call = Call::on(collection, EntityKind::Collection).arg(item.as_str());
        if let Place::Key(key) = &place {
            call = call.arg(key.as_str());
        }
        let hooks = Hook::lifecycle(EntityKind::Collection, Action::MemberAdded);

        around(self, &hooks, &call, |ctx| {
            let owner = ctx.entity(collection)?.parent.clone();
            match (ctx.members_mut(collection)?, place) {
                (Members::Sequence(items), Place::End) => items.push(item.clone()),
                (Members::Sequence(items), Place::At(index)) => {
                    let index = index.min(items.len());
                    items.insert(index, item.clone());
                }
                (Members::Mapping(entries), Place::Key(key)) => {
                    entries.insert(key, item.clone());
                }
                _ => return Err(Error::Contract(format!("{collection} changed shape"))),
            }
            if let (false, Some(owner)) = (spec.references, owner) {
                ctx.registry.set_parent(item, Some(owner));
            }
            Ok(true)
        })
    }

    // ========================================================================
    // Removal
    // ========================================================================

    /// Remove every occurrence of `item`. The entity itself stays live.
    pub fn remove(&mut self, collection: &EntityId, item: &EntityId) -> Result<bool> {
        if !self.members_of(collection)?.contains(item) {
            warn!(target: "entity_graph::collection", collection = %collection, item = %item, "Member not present");
            return Ok(false);
        }
        self.detach(collection, item, None)
    }

    /// Remove the member bound to `key` and return it.
    pub fn remove_entry(&mut self, collection: &EntityId, key: &str) -> Result<Option<EntityId>> {
        let Members::Mapping(entries) = self.members_of(collection)? else {
            return Err(Error::Contract(format!("{collection} is ordered, not keyed")));
        };
        let Some(item) = entries.get(key).cloned() else {
            warn!(target: "entity_graph::collection", collection = %collection, key = key, "No such entry");
            return Ok(None);
        };
        self.detach(collection, &item, Some(key))?;
        Ok(Some(item))
    }

    fn detach(&mut self, collection: &EntityId, item: &EntityId, key: Option<&str>) -> Result<bool> {
        let references = self.collection_spec(collection)?.references;
        let call = Call::on(collection, EntityKind::Collection).arg(item.as_str());
        let hooks = Hook::lifecycle(EntityKind::Collection, Action::MemberRemoved);

        around(self, &hooks, &call, |ctx| {
            let owner = ctx.entity(collection)?.parent.clone();
            match (ctx.members_mut(collection)?, key) {
                (Members::Mapping(entries), Some(key)) => {
                    entries.shift_remove(key);
                }
                (members, _) => {
                    members.purge(item);
                }
            }
            if !references && owner.is_some() {
                if ctx.registry.get_instance(item).and_then(Entity::parent) == owner.as_ref() {
                    ctx.registry.set_parent(item, None);
                }
            }
            Ok(true)
        })
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Member identities in order.
    pub fn members(&self, collection: &EntityId) -> Result<Vec<EntityId>> {
        Ok(self.members_of(collection)?.ids())
    }

    pub fn member_at(&self, collection: &EntityId, index: usize) -> Result<Option<EntityId>> {
        Ok(match self.members_of(collection)? {
            Members::Sequence(items) => items.get(index).cloned(),
            Members::Mapping(entries) => entries.get_index(index).map(|(_, id)| id.clone()),
        })
    }

    pub fn entry(&self, collection: &EntityId, key: &str) -> Result<Option<EntityId>> {
        match self.members_of(collection)? {
            Members::Mapping(entries) => Ok(entries.get(key).cloned()),
            Members::Sequence(_) => Err(Error::Contract(format!("{collection} is ordered, not keyed"))),
        }
    }

    pub fn keys(&self, collection: &EntityId) -> Result<Vec<String>> {
        match self.members_of(collection)? {
            Members::Mapping(entries) => Ok(entries.keys().cloned().collect()),
            Members::Sequence(_) => Err(Error::Contract(format!("{collection} is ordered, not keyed"))),
        }
    }

    pub fn collection_len(&self, collection: &EntityId) -> Result<usize> {
        Ok(self.members_of(collection)?.len())
    }

    pub fn collection_contains(&self, collection: &EntityId, item: &EntityId) -> Result<bool> {
        Ok(self.members_of(collection)?.contains(item))
    }

    // ========================================================================
    // Parent propagation
    // ========================================================================

    /// Set the parent of `id`. For an owned collection the new parent is also
    /// stamped onto every member.
    pub fn set_parent(&mut self, id: &EntityId, parent: Option<EntityId>) -> Result<()> {
        if !self.registry.set_parent(id, parent.clone()) {
            return Err(Error::NotFound(format!("entity {id}")));
        }

        let Body::Collection(body) = &self.entity(id)?.body else {
            return Ok(());
        };
        let members = body.members().ids();
        if self.collection_spec(id)?.references {
            return Ok(());
        }
        for member in members {
            self.registry.set_parent(&member, parent.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::{CONNECTION_LIST, NODE_COLLECTION};
    use crate::Create;

    #[test]
    fn test_kind_enforcement() {
        let mut ctx = Context::new();
        let nodes = ctx.create(NODE_COLLECTION).unwrap();
        let value = ctx.create("GenericInt").unwrap();

        assert!(!ctx.append(&nodes, &value).unwrap());
        assert_eq!(ctx.collection_len(&nodes).unwrap(), 0);
    }

    #[test]
    fn test_uniqueness_enforcement() {
        let mut ctx = Context::new();
        let nodes = ctx.create(NODE_COLLECTION).unwrap();
        let node = ctx.create("Node").unwrap();

        assert!(ctx.append(&nodes, &node).unwrap());
        assert!(!ctx.append(&nodes, &node).unwrap());
        assert_eq!(ctx.members(&nodes).unwrap(), vec![node]);
    }

    #[test]
    fn test_insert_clamps_index() {
        let mut ctx = Context::new();
        let nodes = ctx.create(NODE_COLLECTION).unwrap();
        let a = ctx.create("Node").unwrap();
        let b = ctx.create("Node").unwrap();

        ctx.append(&nodes, &a).unwrap();
        ctx.insert(&nodes, 0, &b).unwrap();
        let c = ctx.create("Node").unwrap();
        ctx.insert(&nodes, 99, &c).unwrap();
        assert_eq!(ctx.members(&nodes).unwrap(), vec![b, a, c.clone()]);
        assert_eq!(ctx.member_at(&nodes, 2).unwrap(), Some(c));
    }

    #[test]
    fn test_keyed_operation_on_sequence_is_contract_error() {
        let mut ctx = Context::new();
        let nodes = ctx.create(NODE_COLLECTION).unwrap();
        let node = ctx.create("Node").unwrap();
        assert!(matches!(ctx.set_entry(&nodes, "x", &node), Err(Error::Contract(_))));
    }

    #[test]
    fn test_parent_propagation() {
        let mut ctx = Context::new();
        let owner = ctx.create("Graph").unwrap();
        let nodes = ctx.create_with(NODE_COLLECTION, Create::new().parent(owner.clone())).unwrap();
        let node = ctx.create("Node").unwrap();

        ctx.append(&nodes, &node).unwrap();
        assert_eq!(ctx.parent(&node).unwrap(), Some(&owner));

        ctx.set_parent(&nodes, None).unwrap();
        assert_eq!(ctx.parent(&node).unwrap(), None);
    }

    #[test]
    fn test_reference_collection_does_not_reparent() {
        let mut ctx = Context::new();
        let holder = ctx.create("Node").unwrap();
        let list = ctx.create_with(CONNECTION_LIST, Create::new().parent(holder)).unwrap();
        let port = ctx.create("InputPort").unwrap();

        assert!(ctx.append(&list, &port).unwrap());
        assert_eq!(ctx.parent(&port).unwrap(), None);
    }

    #[test]
    fn test_mapping_set_remove() {
        let mut ctx = Context::new();
        let fields = ctx.create("FieldCollection").unwrap();
        let a = ctx.create("GenericInt").unwrap();
        let b = ctx.create("GenericStr").unwrap();

        assert!(ctx.set_entry(&fields, "a", &a).unwrap());
        assert!(ctx.set_entry(&fields, "a", &a).unwrap());
        assert!(ctx.add(&fields, &b).unwrap());
        assert_eq!(ctx.keys(&fields).unwrap(), vec!["a".to_string(), b.to_string()]);

        assert_eq!(ctx.remove_entry(&fields, "a").unwrap(), Some(a.clone()));
        assert_eq!(ctx.entry(&fields, "a").unwrap(), None);
        assert!(ctx.contains(&a));
        assert!(!ctx.remove(&fields, &a).unwrap());
    }
}
