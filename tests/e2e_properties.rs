//! Property tests: identity uniqueness, collection enforcement and data
//! preservation across encode/decode.

use std::collections::HashSet;

use entity_graph::{CollisionPolicy, Context, Create, DecodeOptions, EntityId, Value};
use proptest::prelude::*;

const VALUE_CLASSES: &[&str] = &["GenericInt", "GenericFloat", "GenericStr", "GenericBool", "Node", "InputPort"];

fn arb_class() -> impl Strategy<Value = &'static str> {
    prop::sample::select(VALUE_CLASSES)
}

fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Int),
        (-1.0e9f64..1.0e9).prop_map(Value::Float),
        "[a-z]{0,12}".prop_map(Value::String),
        any::<bool>().prop_map(Value::Bool),
    ]
}

proptest! {
    /// Every construction yields an identity no other live entity holds,
    /// including when callers request identities that collide.
    #[test]
    fn prop_identities_are_unique(
        classes in prop::collection::vec(arb_class(), 1..40),
        requested in prop::collection::vec(prop::option::of("[a-c]"), 1..40),
    ) {
        let mut ctx = Context::new();
        let mut seen: HashSet<EntityId> = HashSet::new();
        for (class, id) in classes.iter().zip(requested.iter().cycle()) {
            let mut options = Create::new();
            if let Some(id) = id {
                options = options.id(id.as_str());
            }
            let created = ctx.create_with(class, options).unwrap();
            prop_assert!(seen.insert(created));
        }
        for id in &seen {
            prop_assert!(ctx.contains(id));
        }
    }

    /// A unique node collection holds each node once and never anything else.
    #[test]
    fn prop_collection_holds_only_accepted_unique_members(
        picks in prop::collection::vec((arb_class(), any::<bool>()), 1..30),
    ) {
        let mut ctx = Context::new();
        let nodes = ctx.create("NodeCollection").unwrap();
        let mut accepted: Vec<EntityId> = Vec::new();

        for (class, repeat) in picks {
            let item = match (repeat, accepted.last()) {
                (true, Some(last)) => last.clone(),
                _ => ctx.create(class).unwrap(),
            };
            let before = ctx.collection_len(&nodes).unwrap();
            let expected = ctx.kind(&item).unwrap() == entity_graph::EntityKind::Node
                && !accepted.contains(&item);

            prop_assert_eq!(ctx.append(&nodes, &item).unwrap(), expected);
            if expected {
                accepted.push(item);
                prop_assert_eq!(ctx.collection_len(&nodes).unwrap(), before + 1);
            } else {
                prop_assert_eq!(ctx.collection_len(&nodes).unwrap(), before);
            }
        }
        prop_assert_eq!(ctx.members(&nodes).unwrap(), accepted);
    }

    /// Forked decode keeps the stored data of any accepted value.
    #[test]
    fn prop_forked_copy_keeps_data(value in arb_value()) {
        let mut ctx = Context::new();
        let class = match &value {
            Value::Int(_) => "GenericInt",
            Value::Float(_) => "GenericFloat",
            Value::String(_) => "GenericStr",
            _ => "GenericBool",
        };
        let original = ctx.create_with(class, Create::new().data(value.clone())).unwrap();
        let doc = ctx.serialize(&original).unwrap();

        let copy = ctx
            .deserialize(&doc, DecodeOptions::new().collision(CollisionPolicy::Fork))
            .unwrap();
        prop_assert_ne!(&copy, &original);
        prop_assert_eq!(ctx.get_data(&copy).unwrap(), value);
    }
}
