//! # Context
//!
//! The explicit owner of one entity world: identity registry, class catalog,
//! event bus and (while a load scope is open) the reference resolver.
//!
//! Every constructor goes through [`Context::construct`], which claims the
//! identity, fires the `Created` hooks, builds the body and registers the
//! result. No entity exists outside a registry.

use std::sync::Arc;

use hashbrown::HashSet;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::builtin::{
    ATTRIBUTE_COLLECTION, CONNECTION_LIST, FIELD_COLLECTION, GRAPH_COLLECTION, NODE_COLLECTION,
    PORT_COLLECTION, VALUE_FIELD,
};
use crate::class::{Blueprint, ClassDef, ClassRegistry, Shape, Slot};
use crate::config::Config;
use crate::events::{around, Action, Call, EventBus, EventName, EventPayload, Hook, Observable, SubscriptionId};
use crate::model::{
    AttributeBody, Body, CollectionBody, Entity, EntityId, EntityKind, GraphBody, Members, NodeBody,
    PortBody, TypedValue, Value,
};
use crate::registry::Registry;
use crate::resolver::Resolver;
use crate::{Error, Result};

// ============================================================================
// Construction arguments
// ============================================================================

/// Optional arguments of [`Context::create_with`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Create {
    /// Identity to reuse. Ignored (with a warning) when it is already live.
    pub id: Option<EntityId>,
    /// Initial data. For attributes this is the `value` field.
    pub data: Option<Value>,
    /// Initial field values of an attribute or port.
    pub fields: Vec<(String, Value)>,
    pub parent: Option<EntityId>,
}

impl Create {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<EntityId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn data(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn parent(mut self, parent: impl Into<EntityId>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

// ============================================================================
// Context
// ============================================================================

#[derive(Debug)]
pub struct Context {
    pub(crate) config: Config,
    pub(crate) classes: ClassRegistry,
    pub(crate) registry: Registry,
    pub(crate) events: EventBus,
    pub(crate) resolver: Option<Resolver>,
    /// Identities built since a journal was opened, oldest first.
    pub(crate) journal: Option<Vec<EntityId>>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Observable for Context {
    fn event_bus(&self) -> &EventBus {
        &self.events
    }
}

impl Context {
    /// A fresh world with the built-in classes and the standard lifecycle events.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            classes: ClassRegistry::with_builtins(),
            registry: Registry::new(),
            events: EventBus::new(),
            resolver: None,
            journal: None,
        }
    }

    /// Replace the class catalog.
    pub fn with_classes(mut self, classes: ClassRegistry) -> Self {
        self.classes = classes;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    pub fn classes_mut(&mut self) -> &mut ClassRegistry {
        &mut self.classes
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Subscribe to a declared event.
    pub fn on<F>(&mut self, event: impl Into<EventName>, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&EventPayload<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.events.register(event, callback)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.registry.get_instance(id)
    }

    /// Like `get`, but a missing identity is an error.
    pub fn entity(&self, id: &EntityId) -> Result<&Entity> {
        self.registry
            .get_instance(id)
            .ok_or_else(|| Error::NotFound(format!("entity {id}")))
    }

    pub(crate) fn entity_mut(&mut self, id: &EntityId) -> Result<&mut Entity> {
        self.registry
            .get_instance_mut(id)
            .ok_or_else(|| Error::NotFound(format!("entity {id}")))
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.registry.contains(id)
    }

    pub fn kind(&self, id: &EntityId) -> Result<EntityKind> {
        Ok(self.entity(id)?.kind())
    }

    pub fn class_of(&self, id: &EntityId) -> Result<&str> {
        Ok(self.entity(id)?.class())
    }

    pub fn parent(&self, id: &EntityId) -> Result<Option<&EntityId>> {
        Ok(self.entity(id)?.parent())
    }

    /// Catalog entry of a live entity.
    pub(crate) fn def_of(&self, id: &EntityId) -> Result<Arc<ClassDef>> {
        self.classes.get(self.entity(id)?.class())
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.registry.count(kind)
    }

    /// Forget every entity. Subscriptions and classes are kept.
    pub fn clear_all(&mut self) {
        self.registry.clear_all();
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Build an entity of `class` with default contents.
    pub fn create(&mut self, class: &str) -> Result<EntityId> {
        self.create_with(class, Create::new())
    }

    pub fn create_with(&mut self, class: &str, options: Create) -> Result<EntityId> {
        let def = self.classes.get(class)?;
        let Create { id, data, mut fields, parent } = options;

        match (&def.blueprint, data) {
            (Blueprint::Value(_), data) if fields.is_empty() => {
                let requested = id.as_ref();
                self.construct(&def, requested, parent, |ctx, _| Ok(Body::Value(ctx.build_value(&def, data))))
            }
            (Blueprint::Attribute { fields: slots }, data) => {
                if let Some(data) = data {
                    fields.insert(0, (VALUE_FIELD.to_owned(), data));
                }
                self.construct(&def, id.as_ref(), parent, |ctx, owner| {
                    let fields = ctx.spawn(owner, FIELD_COLLECTION, slots, fields)?;
                    Ok(Body::Attribute(AttributeBody { fields, link: None }))
                })
            }
            (Blueprint::Port { mode, fields: slots }, None) => {
                self.construct(&def, id.as_ref(), parent, |ctx, owner| {
                    let fields = ctx.spawn(owner, FIELD_COLLECTION, slots, fields)?;
                    let connections = ctx.create_with(CONNECTION_LIST, Create::new().parent(owner.clone()))?;
                    Ok(Body::Port(PortBody { mode: *mode, fields, connections }))
                })
            }
            (_, None) if fields.is_empty() => {
                self.construct(&def, id.as_ref(), parent, |ctx, owner| ctx.build_default(&def, owner))
            }
            _ => Err(Error::Contract(format!(
                "{} does not take the given data or fields",
                def.name
            ))),
        }
    }

    /// Claim an identity, run `build` between the `Created` hooks and
    /// register the result.
    ///
    /// `build` receives the claimed identity so that it can create owned
    /// members parented to it. If it fails, those members are discarded.
    pub(crate) fn construct<F>(
        &mut self,
        def: &ClassDef,
        requested: Option<&EntityId>,
        parent: Option<EntityId>,
        build: F,
    ) -> Result<EntityId>
    where
        F: FnOnce(&mut Context, &EntityId) -> Result<Body>,
    {
        if let Blueprint::Abstract(_) = def.blueprint {
            return Err(Error::Contract(format!("{} is abstract and cannot be constructed", def.name)));
        }

        let kind = def.kind();
        let id = self.registry.claim_id(requested);
        let hooks = Hook::lifecycle(kind, Action::Created);
        let call = Call::on(&id, kind).arg(def.name.as_str());

        around(self, &hooks, &call, |ctx| {
            let body = match build(ctx, &id) {
                Ok(body) => body,
                Err(e) => {
                    ctx.discard_children(&id);
                    return Err(e);
                }
            };
            ctx.registry.add_instance(Entity {
                id: id.clone(),
                class: def.name.clone(),
                parent,
                body,
            })?;
            if let Some(journal) = ctx.journal.as_mut() {
                journal.push(id.clone());
            }
            Ok(id.clone())
        })
    }

    /// Body of a node, graph or collection with every declared member created.
    fn build_default(&mut self, def: &ClassDef, owner: &EntityId) -> Result<Body> {
        match &def.blueprint {
            Blueprint::Node(spec) => {
                let attributes = self.spawn(owner, ATTRIBUTE_COLLECTION, &spec.attributes, Vec::new())?;
                let inputs = self.spawn(owner, PORT_COLLECTION, &spec.inputs, Vec::new())?;
                let outputs = self.spawn(owner, PORT_COLLECTION, &spec.outputs, Vec::new())?;
                Ok(Body::Node(NodeBody { attributes, inputs, outputs }))
            }
            Blueprint::Graph => {
                let nodes = self.create_with(NODE_COLLECTION, Create::new().parent(owner.clone()))?;
                let graphs = self.create_with(GRAPH_COLLECTION, Create::new().parent(owner.clone()))?;
                Ok(Body::Graph(GraphBody { nodes, graphs }))
            }
            Blueprint::Collection(spec) => Ok(Body::Collection(CollectionBody {
                members: match spec.shape {
                    Shape::Sequence => Members::Sequence(Vec::new()),
                    Shape::Mapping => Members::Mapping(IndexMap::new()),
                },
            })),
            _ => Err(Error::Contract(format!("{} needs construction arguments", def.name))),
        }
    }

    /// Create a keyed collection owned by `owner` holding one member per slot.
    ///
    /// `values` seeds the data of typed-value members by slot name; a name
    /// with no matching slot is a contract violation.
    pub(crate) fn spawn(
        &mut self,
        owner: &EntityId,
        collection_class: &str,
        slots: &[Slot],
        mut values: Vec<(String, Value)>,
    ) -> Result<EntityId> {
        let collection = self.create_with(collection_class, Create::new().parent(owner.clone()))?;

        for slot in slots {
            let data = values
                .iter()
                .position(|(name, _)| *name == slot.name)
                .map(|i| values.remove(i).1);
            let member = self.create_with(&slot.class, Create { data, ..Create::default() })?;
            if !self.set_entry(&collection, &slot.name, &member)? {
                return Err(Error::Contract(format!(
                    "{} cannot hold member {} of class {}",
                    collection_class, slot.name, slot.class
                )));
            }
        }

        if let Some((name, _)) = values.first() {
            return Err(Error::Contract(format!(
                "no field named {name} (or given more than once) on {owner}"
            )));
        }
        Ok(collection)
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Stop tracking `id` and everything it owns.
    ///
    /// Owned entities are those whose `parent` is `id`. Once the whole tree
    /// is gone, its identities are scrubbed from every collection and link
    /// that still names them. Deleting an untracked identity logs a warning
    /// and returns `Ok(false)`.
    pub fn delete(&mut self, id: &EntityId) -> Result<bool> {
        let mut removed = HashSet::new();
        let result = self.delete_tree(id, &mut removed);
        self.scrub(&removed);
        result
    }

    fn delete_tree(&mut self, id: &EntityId, removed: &mut HashSet<EntityId>) -> Result<bool> {
        let Some(entity) = self.registry.get_instance(id) else {
            warn!(target: "entity_graph::context", id = %id, "Delete of an untracked entity ignored");
            return Ok(false);
        };
        let kind = entity.kind();
        let call = Call::on(id, kind).arg(entity.class());
        let hooks = Hook::lifecycle(kind, Action::Deleted);

        around(self, &hooks, &call, |ctx| {
            for child in ctx.registry.children(id) {
                ctx.delete_tree(&child, removed)?;
            }
            ctx.registry.remove_instance(id);
            removed.insert(id.clone());
            debug!(target: "entity_graph::context", id = %id, kind = %kind, "Entity deleted");
            Ok(true)
        })
    }

    /// Identities whose parent is `id`.
    pub fn children(&self, id: &EntityId) -> Vec<EntityId> {
        self.registry.children(id)
    }

    /// One pass over the registry dropping every reference to `removed`.
    fn scrub(&mut self, removed: &HashSet<EntityId>) {
        if removed.is_empty() {
            return;
        }
        for entity in self.registry.iter_mut() {
            match &mut entity.body {
                Body::Collection(collection) => {
                    let purged = collection.members.purge_all(removed);
                    if purged > 0 {
                        debug!(target: "entity_graph::context", collection = %entity.id, purged = purged, "Deleted members scrubbed");
                    }
                }
                Body::Attribute(attribute) => {
                    if attribute.link.as_ref().is_some_and(|link| removed.contains(link)) {
                        attribute.link = None;
                    }
                }
                _ => {}
            }
        }
    }

    fn discard_children(&mut self, id: &EntityId) {
        let children = self.children(id);
        self.discard(&children);
    }

    /// Delete whichever of `ids` are still live, newest first, as one batch.
    pub(crate) fn discard(&mut self, ids: &[EntityId]) {
        let mut removed = HashSet::new();
        for id in ids.iter().rev() {
            if !self.registry.contains(id) {
                continue;
            }
            if let Err(e) = self.delete_tree(id, &mut removed) {
                warn!(target: "entity_graph::context", id = %id, error = %e, "Could not discard entity");
            }
        }
        self.scrub(&removed);
    }

    /// Initial payload of a typed value. Rejected data leaves it unset.
    fn build_value(&self, def: &ClassDef, data: Option<Value>) -> TypedValue {
        let Ok(spec) = def.value_spec() else {
            return TypedValue::default();
        };
        let data = data.and_then(|value| {
            let got = value.type_name();
            let accepted = self.accept_data(spec, value);
            if accepted.is_none() {
                warn!(target: "entity_graph::context", class = %def.name, got = %got, "Initial data rejected, using default");
            }
            accepted
        });
        TypedValue { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_create_registers_entity() {
        let mut ctx = Context::new();
        let id = ctx.create("GenericInt").unwrap();
        assert_eq!(ctx.kind(&id).unwrap(), EntityKind::Type);
        assert_eq!(ctx.class_of(&id).unwrap(), "GenericInt");
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_requested_identity_is_honoured() {
        let mut ctx = Context::new();
        let id = ctx.create_with("GenericStr", Create::new().id("fixed")).unwrap();
        assert_eq!(id.as_str(), "fixed");

        let other = ctx.create_with("GenericStr", Create::new().id("fixed")).unwrap();
        assert_ne!(other, id);
    }

    #[test]
    fn test_abstract_class_cannot_be_built() {
        let mut ctx = Context::new();
        let result = ctx.create("GenericType");
        assert!(matches!(result, Err(Error::Contract(_))));
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_unknown_field_discards_members() {
        let mut ctx = Context::new();
        let result = ctx.create_with("StringAttribute", Create::new().field("colour", "red"));
        assert!(matches!(result, Err(Error::Contract(_))));
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_node_members_are_parented_to_node() {
        let mut ctx = Context::new();
        let node = ctx.create("SumNode").unwrap();
        let Body::Node(body) = ctx.entity(&node).unwrap().body().clone() else {
            panic!("not a node");
        };

        assert_eq!(ctx.parent(&body.inputs).unwrap(), Some(&node));
        for port in ctx.members(&body.inputs).unwrap() {
            assert_eq!(ctx.parent(&port).unwrap(), Some(&node));
        }
    }

    #[test]
    fn test_delete_cascades_to_owned_members() {
        let mut ctx = Context::new();
        let node = ctx.create("ParameterNode").unwrap();
        assert!(ctx.len() > 1);

        assert!(ctx.delete(&node).unwrap());
        assert!(ctx.is_empty());
        assert!(!ctx.delete(&node).unwrap());
    }

    #[test]
    fn test_created_hooks_fire_around_construction() {
        let mut ctx = Context::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for event in ["TypePreCreated", "TypePostCreated"] {
            let log = Arc::clone(&log);
            ctx.on(event, move |payload| {
                log.lock().push((payload.event.to_string(), payload.call.args.clone()));
                Ok(())
            })
            .unwrap();
        }

        ctx.create("GenericBool").unwrap();
        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].0, "TypePreCreated");
        assert_eq!(log[1].1, vec![Value::from("GenericBool")]);
    }
}
