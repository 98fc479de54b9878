//! # Entity Serialization
//!
//! Every entity shape declares its document fields once, in a static table.
//! Each field is classified:
//!
//! | Class | Encoded as | On decode |
//! |-------|------------|-----------|
//! | Identity | `class`, `type`, `id` | selects the class and requested identity |
//! | Primary | self-contained data, owned parts inline | rebuilds the entity |
//! | Relation | identity string or list of identity strings | attached afterwards, through the resolver |
//!
//! A relation is never inlined: shared or cyclic neighbours appear once, in
//! their own documents.

mod decode;

use std::fmt;

use serde_json::Value as Json;

use crate::class::{Blueprint, ClassDef, Shape};
use crate::context::Context;
use crate::model::{Body, Entity, EntityId, Members};
use crate::{Error, Result};

/// One encoded entity.
pub type Document = serde_json::Map<String, Json>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    Identity,
    Primary,
    Relation,
}

type Encode = fn(&Context, &Entity) -> Result<Json>;
type Parse = fn(&Json) -> Result<decode::Targets>;
type Attach = fn(&mut Context, &EntityId, decode::Targets) -> Result<()>;

/// A document field: its name, class, encoder and (for relations) the
/// parser that reads its identities and the setter that attaches them.
pub struct Field {
    pub name: &'static str,
    pub class: FieldClass,
    encode: Encode,
    decode: Option<(Parse, Attach)>,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("class", &self.class)
            .finish()
    }
}

const fn identity(name: &'static str, encode: Encode) -> Field {
    Field { name, class: FieldClass::Identity, encode, decode: None }
}

const fn primary(name: &'static str, encode: Encode) -> Field {
    Field { name, class: FieldClass::Primary, encode, decode: None }
}

const fn relation(name: &'static str, encode: Encode, parse: Parse, attach: Attach) -> Field {
    Field { name, class: FieldClass::Relation, encode, decode: Some((parse, attach)) }
}

// ============================================================================
// Field tables
// ============================================================================

const IDENTITY: &[Field] = &[
    identity("class", encode_class),
    identity("type", encode_type),
    identity("id", encode_id),
];

const PRIMITIVE_VALUE: &[Field] = &[primary("data", encode_data)];

const REFERENCE_VALUE: &[Field] = &[relation("data", encode_data, decode::one, decode::attach_reference)];

const ATTRIBUTE: &[Field] = &[
    primary("fields", encode_fields),
    relation("link", encode_link, decode::one, decode::attach_link),
];

const PORT: &[Field] = &[
    primary("mode", encode_mode),
    primary("fields", encode_fields),
    relation("connections", encode_connections, decode::many, decode::attach_connections),
];

const NODE: &[Field] = &[
    primary("attributes", encode_attributes),
    primary("inputs", encode_inputs),
    primary("outputs", encode_outputs),
];

const GRAPH: &[Field] = &[
    primary("nodes", encode_nodes),
    primary("graphs", encode_graphs),
];

const MAPPING: &[Field] = &[primary("entries", encode_entries)];

const REFERENCE_MAPPING: &[Field] = &[relation("entries", encode_entry_ids, decode::keyed, decode::attach_entries)];

const SEQUENCE: &[Field] = &[primary("items", encode_items)];

const REFERENCE_SEQUENCE: &[Field] = &[relation("items", encode_item_ids, decode::many, decode::attach_items)];

/// Non-identity fields of `def`.
fn schema(def: &ClassDef) -> &'static [Field] {
    match &def.blueprint {
        Blueprint::Abstract(_) => &[],
        Blueprint::Value(spec) if spec.is_reference() => REFERENCE_VALUE,
        Blueprint::Value(_) => PRIMITIVE_VALUE,
        Blueprint::Attribute { .. } => ATTRIBUTE,
        Blueprint::Port { .. } => PORT,
        Blueprint::Node(_) => NODE,
        Blueprint::Graph => GRAPH,
        Blueprint::Collection(spec) => match (spec.shape, spec.references) {
            (Shape::Mapping, false) => MAPPING,
            (Shape::Mapping, true) => REFERENCE_MAPPING,
            (Shape::Sequence, false) => SEQUENCE,
            (Shape::Sequence, true) => REFERENCE_SEQUENCE,
        },
    }
}

fn fields(def: &ClassDef) -> impl Iterator<Item = &'static Field> {
    IDENTITY.iter().chain(schema(def))
}

// ============================================================================
// Context surface
// ============================================================================

impl Context {
    fn schema_names(&self, id: &EntityId, class: FieldClass) -> Result<Vec<&'static str>> {
        let def = self.def_of(id)?;
        Ok(fields(&def)
            .filter(|field| field.class == class)
            .map(|field| field.name)
            .collect())
    }

    pub fn identity_attributes(&self, id: &EntityId) -> Result<Vec<&'static str>> {
        self.schema_names(id, FieldClass::Identity)
    }

    pub fn primary_attributes(&self, id: &EntityId) -> Result<Vec<&'static str>> {
        self.schema_names(id, FieldClass::Primary)
    }

    pub fn relation_attributes(&self, id: &EntityId) -> Result<Vec<&'static str>> {
        self.schema_names(id, FieldClass::Relation)
    }

    /// Encode `id` as one flat document. Owned parts are nested; relations
    /// are identities.
    pub fn serialize(&self, id: &EntityId) -> Result<Document> {
        let entity = self.entity(id)?;
        let def = self.classes.get(entity.class())?;

        let mut doc = Document::new();
        for field in fields(&def) {
            doc.insert(field.name.to_owned(), (field.encode)(self, entity)?);
        }
        Ok(doc)
    }
}

// ============================================================================
// Encoders
// ============================================================================

fn shape_error(entity: &Entity, field: &str) -> Error {
    Error::Contract(format!(
        "{} {} has no {field} field",
        entity.kind(),
        entity.id()
    ))
}

fn owned(ctx: &Context, id: &EntityId) -> Result<Json> {
    Ok(Json::Object(ctx.serialize(id)?))
}

fn id_array(ids: Vec<EntityId>) -> Json {
    Json::Array(ids.into_iter().map(|id| Json::String(id.as_str().to_owned())).collect())
}

fn encode_class(_: &Context, entity: &Entity) -> Result<Json> {
    Ok(Json::String(entity.class().to_owned()))
}

fn encode_type(_: &Context, entity: &Entity) -> Result<Json> {
    Ok(Json::String(entity.kind().as_str().to_owned()))
}

fn encode_id(_: &Context, entity: &Entity) -> Result<Json> {
    Ok(Json::String(entity.id().as_str().to_owned()))
}

fn encode_data(_: &Context, entity: &Entity) -> Result<Json> {
    match entity.body() {
        Body::Value(value) => Ok(value.data().map_or(Json::Null, Json::from)),
        _ => Err(shape_error(entity, "data")),
    }
}

fn encode_fields(ctx: &Context, entity: &Entity) -> Result<Json> {
    match entity.body() {
        Body::Attribute(body) => owned(ctx, body.fields()),
        Body::Port(body) => owned(ctx, body.fields()),
        _ => Err(shape_error(entity, "fields")),
    }
}

fn encode_link(_: &Context, entity: &Entity) -> Result<Json> {
    match entity.body() {
        Body::Attribute(body) => Ok(body
            .link()
            .map_or(Json::Null, |link| Json::String(link.as_str().to_owned()))),
        _ => Err(shape_error(entity, "link")),
    }
}

fn encode_mode(_: &Context, entity: &Entity) -> Result<Json> {
    match entity.body() {
        Body::Port(body) => Ok(Json::String(body.mode().as_str().to_owned())),
        _ => Err(shape_error(entity, "mode")),
    }
}

fn encode_connections(ctx: &Context, entity: &Entity) -> Result<Json> {
    match entity.body() {
        Body::Port(body) => Ok(id_array(ctx.members(body.connections())?)),
        _ => Err(shape_error(entity, "connections")),
    }
}

fn encode_attributes(ctx: &Context, entity: &Entity) -> Result<Json> {
    match entity.body() {
        Body::Node(body) => owned(ctx, body.attributes()),
        _ => Err(shape_error(entity, "attributes")),
    }
}

fn encode_inputs(ctx: &Context, entity: &Entity) -> Result<Json> {
    match entity.body() {
        Body::Node(body) => owned(ctx, body.inputs()),
        _ => Err(shape_error(entity, "inputs")),
    }
}

fn encode_outputs(ctx: &Context, entity: &Entity) -> Result<Json> {
    match entity.body() {
        Body::Node(body) => owned(ctx, body.outputs()),
        _ => Err(shape_error(entity, "outputs")),
    }
}

fn encode_nodes(ctx: &Context, entity: &Entity) -> Result<Json> {
    match entity.body() {
        Body::Graph(body) => owned(ctx, body.nodes()),
        _ => Err(shape_error(entity, "nodes")),
    }
}

fn encode_graphs(ctx: &Context, entity: &Entity) -> Result<Json> {
    match entity.body() {
        Body::Graph(body) => owned(ctx, body.graphs()),
        _ => Err(shape_error(entity, "graphs")),
    }
}

fn encode_entries(ctx: &Context, entity: &Entity) -> Result<Json> {
    match entity.body() {
        Body::Collection(body) => match body.members() {
            Members::Mapping(entries) => {
                let mut out = Document::new();
                for (key, member) in entries {
                    out.insert(key.clone(), owned(ctx, member)?);
                }
                Ok(Json::Object(out))
            }
            Members::Sequence(_) => Err(shape_error(entity, "entries")),
        },
        _ => Err(shape_error(entity, "entries")),
    }
}

fn encode_items(ctx: &Context, entity: &Entity) -> Result<Json> {
    match entity.body() {
        Body::Collection(body) => match body.members() {
            Members::Sequence(items) => Ok(Json::Array(
                items.iter().map(|item| owned(ctx, item)).collect::<Result<_>>()?,
            )),
            Members::Mapping(_) => Err(shape_error(entity, "items")),
        },
        _ => Err(shape_error(entity, "items")),
    }
}

fn encode_entry_ids(_: &Context, entity: &Entity) -> Result<Json> {
    match entity.body() {
        Body::Collection(body) => match body.members() {
            Members::Mapping(entries) => Ok(Json::Object(
                entries
                    .iter()
                    .map(|(key, member)| (key.clone(), Json::String(member.as_str().to_owned())))
                    .collect(),
            )),
            Members::Sequence(_) => Err(shape_error(entity, "entries")),
        },
        _ => Err(shape_error(entity, "entries")),
    }
}

fn encode_item_ids(_: &Context, entity: &Entity) -> Result<Json> {
    match entity.body() {
        Body::Collection(body) => Ok(id_array(body.members().ids())),
        _ => Err(shape_error(entity, "items")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Create;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_typed_value_document() {
        let mut ctx = Context::new();
        let id = ctx.create_with("GenericInt", Create::new().id("v1").data(30)).unwrap();

        let doc = ctx.serialize(&id).unwrap();
        assert_eq!(
            Json::Object(doc),
            json!({"class": "GenericInt", "type": "Type", "id": "v1", "data": 30})
        );
    }

    #[test]
    fn test_field_classes() {
        let mut ctx = Context::new();
        let port = ctx.create("InputPort").unwrap();
        assert_eq!(ctx.identity_attributes(&port).unwrap(), vec!["class", "type", "id"]);
        assert_eq!(ctx.primary_attributes(&port).unwrap(), vec!["mode", "fields"]);
        assert_eq!(ctx.relation_attributes(&port).unwrap(), vec!["connections"]);
    }

    #[test]
    fn test_relations_are_identities() {
        let mut ctx = Context::new();
        let a = ctx.create_with("StringAttribute", Create::new().id("a")).unwrap();
        let b = ctx.create_with("StringAttribute", Create::new().id("b")).unwrap();
        ctx.link(&a, &b).unwrap();

        let doc = ctx.serialize(&a).unwrap();
        assert_eq!(doc["link"], json!("b"));
        assert!(doc["fields"].is_object());
    }

    #[test]
    fn test_connections_encode_as_id_list() {
        let mut ctx = Context::new();
        let out = ctx.create_with("OutputPort", Create::new().id("out")).unwrap();
        let input = ctx.create_with("InputPort", Create::new().id("in")).unwrap();
        ctx.connect(&out, &input).unwrap();

        let doc = ctx.serialize(&out).unwrap();
        assert_eq!(doc["connections"], json!(["in"]));
        assert_eq!(doc["mode"], json!("OUTPUT"));
    }

    #[test]
    fn test_keyed_collection_keeps_entry_order() {
        let mut ctx = Context::new();
        let attribute = ctx.create("IntAttribute").unwrap();
        let fields = ctx.field_collection(&attribute).unwrap();

        let doc = ctx.serialize(&fields).unwrap();
        let keys: Vec<&String> = doc["entries"].as_object().unwrap().keys().collect();
        assert_eq!(keys, ["reference", "value", "label", "default"]);
    }
}
