//! Nodes and graphs.

use tracing::warn;

use crate::class::Blueprint;
use crate::context::Context;
use crate::model::{Body, EntityId, EntityKind, GraphBody, NodeBody, PortMode, Value};
use crate::ops::Trail;
use crate::{Error, Result};

impl Context {
    fn node_body(&self, id: &EntityId) -> Result<&NodeBody> {
        match self.entity(id)?.body() {
            Body::Node(body) => Ok(body),
            other => Err(Error::Contract(format!("{id} is a {}, not a node", other.kind()))),
        }
    }

    fn graph_body(&self, id: &EntityId) -> Result<&GraphBody> {
        match self.entity(id)?.body() {
            Body::Graph(body) => Ok(body),
            other => Err(Error::Contract(format!("{id} is a {}, not a graph", other.kind()))),
        }
    }

    // ========================================================================
    // Node members
    // ========================================================================

    pub fn attribute_collection(&self, node: &EntityId) -> Result<EntityId> {
        Ok(self.node_body(node)?.attributes.clone())
    }

    pub fn input_collection(&self, node: &EntityId) -> Result<EntityId> {
        Ok(self.node_body(node)?.inputs.clone())
    }

    pub fn output_collection(&self, node: &EntityId) -> Result<EntityId> {
        Ok(self.node_body(node)?.outputs.clone())
    }

    pub fn attribute(&self, node: &EntityId, name: &str) -> Result<Option<EntityId>> {
        self.entry(&self.attribute_collection(node)?, name)
    }

    pub fn input(&self, node: &EntityId, name: &str) -> Result<Option<EntityId>> {
        self.entry(&self.input_collection(node)?, name)
    }

    pub fn output(&self, node: &EntityId, name: &str) -> Result<Option<EntityId>> {
        self.entry(&self.output_collection(node)?, name)
    }

    pub fn attributes(&self, node: &EntityId) -> Result<Vec<EntityId>> {
        self.members(&self.attribute_collection(node)?)
    }

    pub fn input_ports(&self, node: &EntityId) -> Result<Vec<EntityId>> {
        self.members(&self.input_collection(node)?)
    }

    pub fn output_ports(&self, node: &EntityId) -> Result<Vec<EntityId>> {
        self.members(&self.output_collection(node)?)
    }

    pub fn add_attribute(&mut self, node: &EntityId, name: &str, attribute: &EntityId) -> Result<bool> {
        let attributes = self.attribute_collection(node)?;
        self.set_entry(&attributes, name, attribute)
    }

    /// Add an input port under `name`. An output port is rejected.
    pub fn add_input(&mut self, node: &EntityId, name: &str, port: &EntityId) -> Result<bool> {
        let inputs = self.input_collection(node)?;
        self.add_port(&inputs, name, port, PortMode::Input)
    }

    /// Add an output port under `name`. An input port is rejected.
    pub fn add_output(&mut self, node: &EntityId, name: &str, port: &EntityId) -> Result<bool> {
        let outputs = self.output_collection(node)?;
        self.add_port(&outputs, name, port, PortMode::Output)
    }

    fn add_port(&mut self, ports: &EntityId, name: &str, port: &EntityId, mode: PortMode) -> Result<bool> {
        if self.get(port).map(|entity| entity.kind()) == Some(EntityKind::Port) && self.mode(port)? != mode {
            warn!(target: "entity_graph::ops", port = %port, expected = %mode, "Port has the wrong direction");
            return Ok(false);
        }
        self.set_entry(ports, name, port)
    }

    /// Run the class computation. Nodes without one read as null.
    pub(crate) fn node_data(&self, id: &EntityId, trail: &mut Trail) -> Result<Value> {
        let def = self.def_of(id)?;
        match &def.blueprint {
            Blueprint::Node(spec) => match spec.compute {
                Some(compute) => compute(self, id, trail),
                None => Ok(Value::Null),
            },
            _ => Err(Error::Contract(format!("{} is not a node class", def.name))),
        }
    }

    // ========================================================================
    // Graphs
    // ========================================================================

    pub fn graph_nodes(&self, graph: &EntityId) -> Result<Vec<EntityId>> {
        self.members(&self.graph_body(graph)?.nodes.clone())
    }

    pub fn subgraphs(&self, graph: &EntityId) -> Result<Vec<EntityId>> {
        self.members(&self.graph_body(graph)?.graphs.clone())
    }

    pub fn add_node(&mut self, graph: &EntityId, node: &EntityId) -> Result<bool> {
        let nodes = self.graph_body(graph)?.nodes.clone();
        self.append(&nodes, node)
    }

    pub fn add_subgraph(&mut self, graph: &EntityId, subgraph: &EntityId) -> Result<bool> {
        if graph == subgraph {
            warn!(target: "entity_graph::ops", graph = %graph, "Graph cannot contain itself");
            return Ok(false);
        }
        let graphs = self.graph_body(graph)?.graphs.clone();
        self.append(&graphs, subgraph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Create;

    #[test]
    fn test_parameter_node_reads_value_attribute() {
        let mut ctx = Context::new();
        let node = ctx.create("ParameterNode").unwrap();
        let value = ctx.attribute(&node, "value").unwrap().unwrap();
        ctx.set_data(&value, 5).unwrap();

        assert_eq!(ctx.data(&node).unwrap(), Value::Int(5));
        let product = ctx.output(&node, "product").unwrap().unwrap();
        assert_eq!(ctx.data(&product).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_sum_node_pulls_through_connections() {
        let mut ctx = Context::new();
        let left = ctx.create("ParameterNode").unwrap();
        let right = ctx.create("ParameterNode").unwrap();
        let sum = ctx.create("SumNode").unwrap();

        for (param, data, entry) in [(&left, 2, "entry0"), (&right, 40, "entry1")] {
            let value = ctx.attribute(param, "value").unwrap().unwrap();
            ctx.set_data(&value, data).unwrap();
            let product = ctx.output(param, "product").unwrap().unwrap();
            let input = ctx.input(&sum, entry).unwrap().unwrap();
            assert!(ctx.connect(&product, &input).unwrap());
        }

        assert_eq!(ctx.data(&sum).unwrap(), Value::Int(42));
    }

    #[test]
    fn test_sum_with_unconnected_input() {
        let mut ctx = Context::new();
        let sum = ctx.create("SumNode").unwrap();
        assert_eq!(ctx.data(&sum).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_feedback_loop_is_a_cycle() {
        let mut ctx = Context::new();
        let sum = ctx.create("SumNode").unwrap();
        let product = ctx.output(&sum, "product").unwrap().unwrap();
        let input = ctx.input(&sum, "entry0").unwrap().unwrap();
        ctx.connect(&product, &input).unwrap();

        assert!(matches!(ctx.data(&sum), Err(Error::Cycle(_))));
    }

    #[test]
    fn test_add_ports_checks_direction() {
        let mut ctx = Context::new();
        let node = ctx.create("Node").unwrap();
        let input = ctx.create("InputPort").unwrap();
        let output = ctx.create("OutputPort").unwrap();

        assert!(!ctx.add_input(&node, "in", &output).unwrap());
        assert!(ctx.add_input(&node, "in", &input).unwrap());
        assert!(ctx.add_output(&node, "out", &output).unwrap());
        assert_eq!(ctx.parent(&input).unwrap(), Some(&node));
    }

    #[test]
    fn test_graph_membership() {
        let mut ctx = Context::new();
        let graph = ctx.create("Graph").unwrap();
        let inner = ctx.create("Graph").unwrap();
        let node = ctx.create_with("Node", Create::new()).unwrap();

        assert!(ctx.add_node(&graph, &node).unwrap());
        assert!(!ctx.add_node(&graph, &node).unwrap());
        assert!(ctx.add_subgraph(&graph, &inner).unwrap());
        assert!(!ctx.add_subgraph(&graph, &graph).unwrap());

        assert_eq!(ctx.graph_nodes(&graph).unwrap(), vec![node.clone()]);
        assert_eq!(ctx.subgraphs(&graph).unwrap(), vec![inner]);
        assert_eq!(ctx.parent(&node).unwrap(), Some(&graph));

        ctx.delete(&graph).unwrap();
        assert!(ctx.is_empty());
    }
}
