//! End-to-end tests for typed collections.
//!
//! Member-kind and uniqueness enforcement, parent propagation, keyed and
//! ordered access, and collection documents.

use entity_graph::{
    Blueprint, ClassDef, CollectionSpec, Context, Create, DecodeOptions, EntityId, EntityKind, Error,
    Shape, Value,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn owned_nodes(ctx: &mut Context) -> (EntityId, EntityId) {
    let graph = ctx.create("Graph").unwrap();
    let nodes = ctx.create_with("NodeCollection", Create::new().parent(graph.clone())).unwrap();
    (graph, nodes)
}

// ============================================================================
// 1. Kind enforcement
// ============================================================================

#[test]
fn test_wrong_kind_is_rejected_and_length_unchanged() {
    let mut ctx = Context::new();
    let (_, nodes) = owned_nodes(&mut ctx);
    let node = ctx.create("Node").unwrap();
    let port = ctx.create("InputPort").unwrap();

    assert!(ctx.append(&nodes, &node).unwrap());
    assert!(!ctx.append(&nodes, &port).unwrap());
    assert!(!ctx.insert(&nodes, 0, &port).unwrap());
    assert_eq!(ctx.collection_len(&nodes).unwrap(), 1);
    assert!(!ctx.validate_item(&nodes, &port).unwrap());
}

#[test]
fn test_shape_mismatch_is_contract_error() {
    let mut ctx = Context::new();
    let (_, nodes) = owned_nodes(&mut ctx);
    let node = ctx.create("Node").unwrap();

    assert!(matches!(ctx.set_entry(&nodes, "n", &node), Err(Error::Contract(_))));
    assert!(matches!(ctx.keys(&nodes), Err(Error::Contract(_))));
}

// ============================================================================
// 2. Uniqueness
// ============================================================================

#[test]
fn test_duplicate_member_is_rejected() {
    let mut ctx = Context::new();
    let (_, nodes) = owned_nodes(&mut ctx);
    let node = ctx.create("Node").unwrap();

    assert!(ctx.append(&nodes, &node).unwrap());
    assert!(!ctx.append(&nodes, &node).unwrap());
    assert_eq!(ctx.members(&nodes).unwrap(), vec![node]);
}

#[test]
fn test_non_unique_collection_accepts_repeats() {
    let mut ctx = Context::new();
    ctx.classes_mut().register(ClassDef::new(
        "ValueBag",
        Blueprint::Collection(CollectionSpec::new(Shape::Sequence, &[EntityKind::Type])),
    ));
    let bag = ctx.create("ValueBag").unwrap();
    let v = ctx.create("GenericInt").unwrap();

    assert!(ctx.append(&bag, &v).unwrap());
    assert!(ctx.append(&bag, &v).unwrap());
    assert_eq!(ctx.collection_len(&bag).unwrap(), 2);

    assert!(ctx.remove(&bag, &v).unwrap());
    assert_eq!(ctx.collection_len(&bag).unwrap(), 0);
}

// ============================================================================
// 3. Parent propagation
// ============================================================================

#[test]
fn test_member_takes_collection_parent() {
    let mut ctx = Context::new();
    let (graph, nodes) = owned_nodes(&mut ctx);
    let node = ctx.create("Node").unwrap();

    ctx.append(&nodes, &node).unwrap();
    assert_eq!(ctx.parent(&node).unwrap(), Some(&graph));

    ctx.remove(&nodes, &node).unwrap();
    assert_eq!(ctx.parent(&node).unwrap(), None);
    assert!(ctx.contains(&node));
}

#[test]
fn test_reparenting_collection_moves_members() {
    let mut ctx = Context::new();
    let (_, nodes) = owned_nodes(&mut ctx);
    let node = ctx.create("Node").unwrap();
    ctx.append(&nodes, &node).unwrap();

    let other = ctx.create("Graph").unwrap();
    ctx.set_parent(&nodes, Some(other.clone())).unwrap();
    assert_eq!(ctx.parent(&node).unwrap(), Some(&other));
}

#[test]
fn test_reference_collection_does_not_claim_members() {
    let mut ctx = Context::new();
    let owner = ctx.create("Graph").unwrap();
    let list = ctx.create_with("ConnectionList", Create::new().parent(owner)).unwrap();
    let port = ctx.create("InputPort").unwrap();

    assert!(ctx.append(&list, &port).unwrap());
    assert_eq!(ctx.parent(&port).unwrap(), None);
}

// ============================================================================
// 4. Keyed access
// ============================================================================

#[test]
fn test_keyed_access_keeps_insertion_order() {
    let mut ctx = Context::new();
    let fields = ctx.create("FieldCollection").unwrap();
    let ids: Vec<_> = ["zeta", "alpha", "mid"]
        .iter()
        .map(|key| {
            let v = ctx.create("GenericStr").unwrap();
            assert!(ctx.set_entry(&fields, key, &v).unwrap());
            v
        })
        .collect();

    assert_eq!(ctx.keys(&fields).unwrap(), vec!["zeta", "alpha", "mid"]);
    assert_eq!(ctx.entry(&fields, "alpha").unwrap(), Some(ids[1].clone()));
    assert_eq!(ctx.member_at(&fields, 2).unwrap(), Some(ids[2].clone()));

    assert_eq!(ctx.remove_entry(&fields, "alpha").unwrap(), Some(ids[1].clone()));
    assert_eq!(ctx.remove_entry(&fields, "alpha").unwrap(), None);
    assert_eq!(ctx.keys(&fields).unwrap(), vec!["zeta", "mid"]);
}

#[test]
fn test_add_keys_mapping_by_identity() {
    let mut ctx = Context::new();
    let fields = ctx.create("FieldCollection").unwrap();
    let v = ctx.create_with("GenericInt", Create::new().id("v7")).unwrap();

    assert!(ctx.add(&fields, &v).unwrap());
    assert_eq!(ctx.entry(&fields, "v7").unwrap(), Some(v));
}

// ============================================================================
// 5. Documents
// ============================================================================

#[test]
fn test_owned_collection_round_trip() {
    let mut ctx = Context::new();
    let fields = ctx.create_with("FieldCollection", Create::new().id("fc")).unwrap();
    let a = ctx.create_with("GenericInt", Create::new().id("fa").data(1)).unwrap();
    let b = ctx.create_with("GenericStr", Create::new().id("fb").data("two")).unwrap();
    ctx.set_entry(&fields, "a", &a).unwrap();
    ctx.set_entry(&fields, "b", &b).unwrap();

    let doc = ctx.serialize(&fields).unwrap();
    assert_eq!(
        serde_json::Value::Object(doc.clone()),
        json!({
            "class": "FieldCollection",
            "type": "Collection",
            "id": "fc",
            "entries": {
                "a": {"class": "GenericInt", "type": "Type", "id": "fa", "data": 1},
                "b": {"class": "GenericStr", "type": "Type", "id": "fb", "data": "two"}
            }
        })
    );

    ctx.clear_all();
    let back = ctx.deserialize(&doc, DecodeOptions::new()).unwrap();
    assert_eq!(back, fields);
    assert_eq!(ctx.keys(&fields).unwrap(), vec!["a", "b"]);
    let member = ctx.entry(&fields, "b").unwrap().unwrap();
    assert_eq!(ctx.get_data(&member).unwrap(), Value::from("two"));
}

#[test]
fn test_reference_collection_encodes_identities() {
    let mut ctx = Context::new();
    let list = ctx.create_with("ConnectionList", Create::new().id("cl")).unwrap();
    let port = ctx.create_with("InputPort", Create::new().id("p")).unwrap();
    ctx.append(&list, &port).unwrap();

    let doc = ctx.serialize(&list).unwrap();
    assert_eq!(doc["items"], json!(["p"]));
    assert_eq!(ctx.relation_attributes(&list).unwrap(), vec!["items"]);
}
