//! Built-in classes.
//!
//! | Kind | Classes |
//! |------|---------|
//! | Type | `GenericInt`, `GenericFloat`, `GenericStr`, `GenericBool`, `GenericList`, `GenericMap`, `ReferencedNode`, `ReferencedAttribute`, `ReferencedPort` |
//! | Attribute | `GenericAttribute`, `StringAttribute`, `IntAttribute` |
//! | Port | `InputPort`, `OutputPort` |
//! | Node | `Node`, `ParameterNode`, `SumNode` |
//! | Graph | `Graph` |
//! | Collection | `FieldCollection`, `AttributeCollection`, `PortCollection`, `NodeCollection`, `GraphCollection`, `ConnectionList` |

use crate::class::{Blueprint, ClassDef, ClassRegistry, CollectionSpec, NodeSpec, Shape, Slot, ValueSpec};
use crate::context::Context;
use crate::model::{EntityId, EntityKind, PortMode, Value, ValueType};
use crate::ops::Trail;
use crate::{Error, Result};

// Owned member collections created by constructors.
pub const FIELD_COLLECTION: &str = "FieldCollection";
pub const ATTRIBUTE_COLLECTION: &str = "AttributeCollection";
pub const PORT_COLLECTION: &str = "PortCollection";
pub const NODE_COLLECTION: &str = "NodeCollection";
pub const GRAPH_COLLECTION: &str = "GraphCollection";
pub const CONNECTION_LIST: &str = "ConnectionList";

// Conventional field names.
pub const VALUE_FIELD: &str = "value";
pub const DEFAULT_FIELD: &str = "default";
pub const LABEL_FIELD: &str = "label";
pub const REFERENCE_FIELD: &str = "reference";

/// Register every built-in class into `registry`.
pub fn install(registry: &mut ClassRegistry) {
    use ValueType as T;

    let values = [
        ("GenericInt", ValueSpec::primitive(&[T::Int, T::Float], 0).cast_to(T::Int)),
        ("GenericFloat", ValueSpec::primitive(&[T::Float, T::Int], 0.0).cast_to(T::Float)),
        ("GenericStr", ValueSpec::primitive(&[T::String], "")),
        ("GenericBool", ValueSpec::primitive(&[T::Bool], false)),
        ("GenericList", ValueSpec::primitive(&[T::List], Value::List(Vec::new()))),
        ("GenericMap", ValueSpec::primitive(&[T::Map], Value::Map(Default::default()))),
        ("ReferencedNode", ValueSpec::reference(EntityKind::Node)),
        ("ReferencedAttribute", ValueSpec::reference(EntityKind::Attribute)),
        ("ReferencedPort", ValueSpec::reference(EntityKind::Port)),
    ];
    for (name, spec) in values {
        registry.register(ClassDef::new(name, Blueprint::Value(spec)));
    }

    registry.register(ClassDef::new("GenericType", Blueprint::Abstract(EntityKind::Type)));

    // Attributes
    let base_fields = vec![Slot::new(REFERENCE_FIELD, "ReferencedAttribute")];
    let typed_fields = |class: &str| {
        let mut fields = base_fields.clone();
        fields.extend([
            Slot::new(VALUE_FIELD, class),
            Slot::new(LABEL_FIELD, "GenericStr"),
            Slot::new(DEFAULT_FIELD, class),
        ]);
        fields
    };
    registry.register(ClassDef::new("GenericAttribute", Blueprint::Attribute { fields: base_fields.clone() }));
    registry.register(ClassDef::new("StringAttribute", Blueprint::Attribute { fields: typed_fields("GenericStr") }));
    registry.register(ClassDef::new("IntAttribute", Blueprint::Attribute { fields: typed_fields("GenericInt") }));

    // Ports
    let port_fields = vec![Slot::new(LABEL_FIELD, "GenericStr")];
    registry.register(ClassDef::new("InputPort", Blueprint::Port { mode: PortMode::Input, fields: port_fields.clone() }));
    registry.register(ClassDef::new("OutputPort", Blueprint::Port { mode: PortMode::Output, fields: port_fields }));

    // Nodes
    registry.register(ClassDef::new("Node", Blueprint::Node(NodeSpec {
        attributes: Vec::new(),
        inputs: Vec::new(),
        outputs: Vec::new(),
        compute: None,
    })));
    registry.register(ClassDef::new("ParameterNode", Blueprint::Node(NodeSpec {
        attributes: vec![Slot::new("type", "StringAttribute"), Slot::new(VALUE_FIELD, "IntAttribute")],
        inputs: Vec::new(),
        outputs: vec![Slot::new("product", "OutputPort")],
        compute: Some(parameter_data),
    })));
    registry.register(ClassDef::new("SumNode", Blueprint::Node(NodeSpec {
        attributes: Vec::new(),
        inputs: vec![Slot::new("entry0", "InputPort"), Slot::new("entry1", "InputPort")],
        outputs: vec![Slot::new("product", "OutputPort")],
        compute: Some(sum_data),
    })));

    registry.register(ClassDef::new("Graph", Blueprint::Graph));

    // Collections
    let collections = [
        (FIELD_COLLECTION, CollectionSpec::new(Shape::Mapping, &[EntityKind::Type])),
        (ATTRIBUTE_COLLECTION, CollectionSpec::new(Shape::Mapping, &[EntityKind::Attribute]).unique()),
        (PORT_COLLECTION, CollectionSpec::new(Shape::Mapping, &[EntityKind::Port]).unique()),
        (NODE_COLLECTION, CollectionSpec::new(Shape::Sequence, &[EntityKind::Node]).unique()),
        (GRAPH_COLLECTION, CollectionSpec::new(Shape::Sequence, &[EntityKind::Graph]).unique()),
        (CONNECTION_LIST, CollectionSpec::new(Shape::Sequence, &[EntityKind::Port]).unique().references()),
    ];
    for (name, spec) in collections {
        registry.register(ClassDef::new(name, Blueprint::Collection(spec)));
    }
}

// ============================================================================
// Node computations
// ============================================================================

/// `ParameterNode`: the value of its `value` attribute.
fn parameter_data(ctx: &Context, node: &EntityId, trail: &mut Trail) -> Result<Value> {
    match ctx.attribute(node, VALUE_FIELD)? {
        Some(attribute) => ctx.pull(&attribute, trail),
        None => Ok(Value::Null),
    }
}

/// `SumNode`: numeric sum of every connected input. Unconnected inputs count
/// as nothing; any float input makes the result a float.
fn sum_data(ctx: &Context, node: &EntityId, trail: &mut Trail) -> Result<Value> {
    let mut int_total: i64 = 0;
    let mut float_total: Option<f64> = None;

    for port in ctx.input_ports(node)? {
        match ctx.pull(&port, trail)? {
            Value::Null => {}
            Value::Int(i) => match float_total.as_mut() {
                Some(total) => *total += i as f64,
                None => int_total = int_total.saturating_add(i),
            },
            Value::Float(f) => {
                *float_total.get_or_insert(int_total as f64) += f;
            }
            other => {
                return Err(Error::TypeMismatch {
                    expected: "INTEGER or FLOAT".into(),
                    got: other.type_name(),
                });
            }
        }
    }

    Ok(float_total.map_or(Value::Int(int_total), Value::Float))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_installed() {
        let registry = ClassRegistry::with_builtins();
        for name in ["GenericInt", "StringAttribute", "InputPort", "SumNode", "Graph", CONNECTION_LIST] {
            assert!(registry.contains(name), "missing {name}");
        }
        assert_eq!(registry.get("GenericType").unwrap().kind(), EntityKind::Type);
    }

    #[test]
    fn test_generic_int_spec() {
        let registry = ClassRegistry::with_builtins();
        let def = registry.get("GenericInt").unwrap();
        let spec = def.value_spec().unwrap();
        assert_eq!(spec.cast, Some(ValueType::Int));
        assert_eq!(spec.default, Value::Int(0));
        assert!(!spec.is_reference());
    }

    #[test]
    fn test_connection_list_is_reference_collection() {
        let registry = ClassRegistry::with_builtins();
        let def = registry.get(CONNECTION_LIST).unwrap();
        let spec = def.collection_spec().unwrap();
        assert!(spec.references && spec.unique);
        assert_eq!(spec.shape, Shape::Sequence);
    }
}
