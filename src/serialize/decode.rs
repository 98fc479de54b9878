//! Document → entity.
//!
//! Decode runs in two phases. The relation fields are popped and parsed
//! first; the entity is built from its identity and primary fields (owned
//! parts are decoded recursively and parented to it); then, if relations were
//! requested, every popped relation is resolved through the context's
//! resolver and attached with the matching setter.
//!
//! A decode that fails deletes every entity it built.

use serde_json::Value as Json;
use tracing::{debug, warn};

use super::{schema, Attach, Document, FieldClass};
use crate::builtin::{
    ATTRIBUTE_COLLECTION, CONNECTION_LIST, FIELD_COLLECTION, GRAPH_COLLECTION, NODE_COLLECTION,
    PORT_COLLECTION,
};
use crate::class::{Blueprint, ClassDef, Shape};
use crate::config::{CollisionPolicy, DecodeOptions};
use crate::context::{Context, Create};
use crate::model::{
    AttributeBody, Body, CollectionBody, EntityId, EntityKind, GraphBody, Members, NodeBody,
    PortBody, PortMode, TypedValue, Value,
};
use crate::ops::value::accept;
use crate::{Error, Result};

impl Context {
    /// Rebuild an entity from `doc`.
    ///
    /// If the document's identity is live and the collision policy is
    /// `ReuseLive`, the live entity is returned untouched.
    pub fn deserialize(&mut self, doc: &Document, options: DecodeOptions) -> Result<EntityId> {
        let outer = self.journal.replace(Vec::new());
        let result = self.decode(doc, options, None);
        let built = std::mem::replace(&mut self.journal, outer).unwrap_or_default();

        match result {
            Ok(id) => {
                if let Some(outer) = self.journal.as_mut() {
                    outer.extend(built);
                }
                Ok(id)
            }
            Err(e) => {
                warn!(target: "entity_graph::serialize", error = %e, discarded = built.len(), "Decode failed, discarding partial entities");
                self.discard(&built);
                Err(e)
            }
        }
    }

    /// `owner` is set for parts nested inside another entity's document.
    /// Such parts always get an identity of their own: they are never shared
    /// with a live entity.
    fn decode(&mut self, doc: &Document, options: DecodeOptions, owner: Option<&EntityId>) -> Result<EntityId> {
        let class = doc
            .get("class")
            .and_then(Json::as_str)
            .ok_or_else(|| Error::Document("missing class".into()))?;
        let def = self.classes.get(class)?;

        if let Some(tag) = doc.get("type").and_then(Json::as_str) {
            if tag != def.kind().as_str() {
                warn!(target: "entity_graph::serialize", class = class, tag = tag, "Type tag does not match class");
            }
        }

        let requested = match doc.get("id") {
            None | Some(Json::Null) => None,
            Some(Json::String(raw)) => Some(EntityId::new(raw.as_str())),
            Some(other) => return Err(Error::Document(format!("id must be a string, got {other}"))),
        };
        if let Some(id) = requested.as_ref().filter(|id| self.contains(id)) {
            if owner.is_none() && options.collision == CollisionPolicy::ReuseLive {
                debug!(target: "entity_graph::serialize", id = %id, "Identity is live, reusing instance");
                return Ok(id.clone());
            }
            debug!(target: "entity_graph::serialize", id = %id, "Identity is live, decoding under a fresh one");
        }

        let mut primary = doc.clone();
        let mut relations: Vec<(Targets, Attach)> = Vec::new();
        for field in schema(&def).iter().filter(|field| field.class == FieldClass::Relation) {
            let (Some(value), Some((parse, attach))) = (primary.remove(field.name), field.decode) else {
                continue;
            };
            relations.push((parse(&value)?, attach));
        }

        let id = self.construct(&def, requested.as_ref(), owner.cloned(), |ctx, id| {
            ctx.decode_body(&def, id, &primary, options)
        })?;

        if let Blueprint::Collection(spec) = &def.blueprint {
            if !spec.references {
                self.decode_members(&id, spec.shape, &primary, options, owner)?;
            }
        }

        if options.relations {
            for (targets, attach) in relations {
                attach(self, &id, targets)?;
            }
        } else if !relations.is_empty() {
            debug!(target: "entity_graph::serialize", id = %id, count = relations.len(), "Relations not requested, left unset");
        }

        Ok(id)
    }

    fn decode_body(&mut self, def: &ClassDef, id: &EntityId, doc: &Document, options: DecodeOptions) -> Result<Body> {
        match &def.blueprint {
            Blueprint::Abstract(_) => Err(Error::Contract(format!("{} is abstract", def.name))),
            Blueprint::Value(spec) => {
                let data = match doc.get("data") {
                    _ if spec.is_reference() => None,
                    None | Some(Json::Null) => None,
                    Some(json) => {
                        let value = Value::from(json);
                        let got = value.type_name();
                        let accepted = accept(spec, value);
                        if accepted.is_none() {
                            warn!(target: "entity_graph::serialize", id = %id, class = %def.name, got = %got, "Stored data rejected, using default");
                        }
                        accepted
                    }
                };
                Ok(Body::Value(TypedValue { data }))
            }
            Blueprint::Attribute { fields } => {
                let fields = self.decode_part(doc, "fields", id, options, |ctx| {
                    ctx.spawn(id, FIELD_COLLECTION, fields, Vec::new())
                })?;
                Ok(Body::Attribute(AttributeBody { fields, link: None }))
            }
            Blueprint::Port { mode, fields } => {
                if let Some(tag) = doc.get("mode").and_then(Json::as_str) {
                    let stored = PortMode::parse(tag)
                        .ok_or_else(|| Error::Document(format!("unknown port mode {tag}")))?;
                    if stored != *mode {
                        warn!(target: "entity_graph::serialize", id = %id, stored = %stored, class = %def.name, "Port mode differs from class, keeping class mode");
                    }
                }
                let fields = self.decode_part(doc, "fields", id, options, |ctx| {
                    ctx.spawn(id, FIELD_COLLECTION, fields, Vec::new())
                })?;
                let connections = self.create_with(CONNECTION_LIST, Create::new().parent(id.clone()))?;
                Ok(Body::Port(PortBody { mode: *mode, fields, connections }))
            }
            Blueprint::Node(spec) => {
                let attributes = self.decode_part(doc, "attributes", id, options, |ctx| {
                    ctx.spawn(id, ATTRIBUTE_COLLECTION, &spec.attributes, Vec::new())
                })?;
                let inputs = self.decode_part(doc, "inputs", id, options, |ctx| {
                    ctx.spawn(id, PORT_COLLECTION, &spec.inputs, Vec::new())
                })?;
                let outputs = self.decode_part(doc, "outputs", id, options, |ctx| {
                    ctx.spawn(id, PORT_COLLECTION, &spec.outputs, Vec::new())
                })?;
                Ok(Body::Node(NodeBody { attributes, inputs, outputs }))
            }
            Blueprint::Graph => {
                let nodes = self.decode_part(doc, "nodes", id, options, |ctx| {
                    ctx.create_with(NODE_COLLECTION, Create::new().parent(id.clone()))
                })?;
                let graphs = self.decode_part(doc, "graphs", id, options, |ctx| {
                    ctx.create_with(GRAPH_COLLECTION, Create::new().parent(id.clone()))
                })?;
                Ok(Body::Graph(GraphBody { nodes, graphs }))
            }
            Blueprint::Collection(spec) => Ok(Body::Collection(CollectionBody {
                members: match spec.shape {
                    Shape::Sequence => Members::Sequence(Vec::new()),
                    Shape::Mapping => Members::Mapping(Default::default()),
                },
            })),
        }
    }

    /// Decode the owned collection stored under `key`, or build a default one
    /// when the document has none.
    fn decode_part<F>(&mut self, doc: &Document, key: &str, owner: &EntityId, options: DecodeOptions, fallback: F) -> Result<EntityId>
    where
        F: FnOnce(&mut Context) -> Result<EntityId>,
    {
        match doc.get(key) {
            None | Some(Json::Null) => fallback(self),
            Some(Json::Object(part)) => {
                let id = self.decode(part, options, Some(owner))?;
                if self.kind(&id)? != EntityKind::Collection {
                    return Err(Error::Document(format!("{key} must be a collection document")));
                }
                Ok(id)
            }
            Some(other) => Err(Error::Document(format!("{key} must be an object, got {other}"))),
        }
    }

    /// Decode and admit the members of an owned-member collection.
    fn decode_members(
        &mut self,
        collection: &EntityId,
        shape: Shape,
        doc: &Document,
        options: DecodeOptions,
        owner: Option<&EntityId>,
    ) -> Result<()> {
        match shape {
            Shape::Mapping => {
                let entries = match doc.get("entries") {
                    None | Some(Json::Null) => return Ok(()),
                    Some(Json::Object(entries)) => entries,
                    Some(_) => return Err(Error::Document("entries must be an object".into())),
                };
                for (key, value) in entries {
                    let Json::Object(member_doc) = value else {
                        return Err(Error::Document(format!("entry {key} must be a document")));
                    };
                    let member = self.decode(member_doc, options, owner)?;
                    if !self.set_entry(collection, key, &member)? {
                        self.drop_rejected(&member, owner)?;
                    }
                }
            }
            Shape::Sequence => {
                let items = match doc.get("items") {
                    None | Some(Json::Null) => return Ok(()),
                    Some(Json::Array(items)) => items,
                    Some(_) => return Err(Error::Document("items must be an array".into())),
                };
                for value in items {
                    let Json::Object(member_doc) = value else {
                        return Err(Error::Document("items must hold documents".into()));
                    };
                    let member = self.decode(member_doc, options, owner)?;
                    if !self.append(collection, &member)? {
                        self.drop_rejected(&member, owner)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// A decoded owned member that its collection refused is deleted; a
    /// top-level one may be a reused live entity and is left alone.
    fn drop_rejected(&mut self, member: &EntityId, owner: Option<&EntityId>) -> Result<()> {
        if owner.is_some() {
            self.delete(member)?;
        }
        Ok(())
    }
}

// ============================================================================
// Relation parsers and attachers
// ============================================================================

/// Identities named by one relation field, read before anything is built.
/// Entries of a keyed relation carry their key.
#[derive(Debug, Default)]
pub(super) struct Targets(Vec<(Option<String>, EntityId)>);

fn single_id(value: &Json) -> Result<Option<EntityId>> {
    match value {
        Json::Null => Ok(None),
        Json::String(raw) if raw.is_empty() => Ok(None),
        Json::String(raw) => Ok(Some(EntityId::new(raw.as_str()))),
        other => Err(Error::Document(format!("expected an identity, got {other}"))),
    }
}

pub(super) fn one(value: &Json) -> Result<Targets> {
    Ok(Targets(single_id(value)?.map(|id| (None, id)).into_iter().collect()))
}

pub(super) fn many(value: &Json) -> Result<Targets> {
    match value {
        Json::Null => Ok(Targets::default()),
        Json::Array(items) => items
            .iter()
            .map(|item| match item {
                Json::String(raw) => Ok((None, EntityId::new(raw.as_str()))),
                other => Err(Error::Document(format!("expected an identity, got {other}"))),
            })
            .collect::<Result<Vec<_>>>()
            .map(Targets),
        other => Err(Error::Document(format!("expected a list of identities, got {other}"))),
    }
}

pub(super) fn keyed(value: &Json) -> Result<Targets> {
    let entries = match value {
        Json::Null => return Ok(Targets::default()),
        Json::Object(entries) => entries,
        other => return Err(Error::Document(format!("expected keyed identities, got {other}"))),
    };
    let mut targets = Vec::with_capacity(entries.len());
    for (key, target) in entries {
        if let Some(target) = single_id(target)? {
            targets.push((Some(key.clone()), target));
        }
    }
    Ok(Targets(targets))
}

pub(super) fn attach_reference(ctx: &mut Context, id: &EntityId, targets: Targets) -> Result<()> {
    for (_, target) in targets.0 {
        let owner = id.clone();
        ctx.resolve_or_defer(
            &target,
            Box::new(move |ctx: &mut Context, target: &EntityId| ctx.set_reference(&owner, target)),
        )?;
    }
    Ok(())
}

pub(super) fn attach_link(ctx: &mut Context, id: &EntityId, targets: Targets) -> Result<()> {
    for (_, target) in targets.0 {
        let owner = id.clone();
        ctx.resolve_or_defer(
            &target,
            Box::new(move |ctx: &mut Context, target: &EntityId| ctx.link(&owner, target)),
        )?;
    }
    Ok(())
}

pub(super) fn attach_connections(ctx: &mut Context, id: &EntityId, targets: Targets) -> Result<()> {
    for (_, target) in targets.0 {
        let owner = id.clone();
        ctx.resolve_or_defer(
            &target,
            Box::new(move |ctx: &mut Context, target: &EntityId| {
                if ctx.kind(target)? != EntityKind::Port {
                    warn!(target: "entity_graph::serialize", port = %owner, other = %target, "Connection target is not a port");
                    return Ok(false);
                }
                ctx.join_ports(&owner, target)
            }),
        )?;
    }
    Ok(())
}

pub(super) fn attach_items(ctx: &mut Context, id: &EntityId, targets: Targets) -> Result<()> {
    for (_, target) in targets.0 {
        let owner = id.clone();
        ctx.resolve_or_defer(
            &target,
            Box::new(move |ctx: &mut Context, target: &EntityId| ctx.append(&owner, target)),
        )?;
    }
    Ok(())
}

pub(super) fn attach_entries(ctx: &mut Context, id: &EntityId, targets: Targets) -> Result<()> {
    for (key, target) in targets.0 {
        let Some(key) = key else {
            continue;
        };
        let owner = id.clone();
        ctx.resolve_or_defer(
            &target,
            Box::new(move |ctx: &mut Context, target: &EntityId| ctx.set_entry(&owner, &key, target)),
        )?;
    }
    Ok(())
}
