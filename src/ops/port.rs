//! Ports and their connections.
//!
//! A connection is recorded on both ends: each port's `connections` list
//! names the other. Input ports read from their first live connection;
//! output ports read from the node that owns them.

use tracing::warn;

use crate::context::Context;
use crate::model::{Body, EntityId, EntityKind, PortBody, PortMode, Value};
use crate::ops::Trail;
use crate::{Error, Result};

impl Context {
    fn port_body(&self, id: &EntityId) -> Result<&PortBody> {
        match self.entity(id)?.body() {
            Body::Port(body) => Ok(body),
            other => Err(Error::Contract(format!("{id} is a {}, not a port", other.kind()))),
        }
    }

    pub fn mode(&self, id: &EntityId) -> Result<PortMode> {
        Ok(self.port_body(id)?.mode)
    }

    /// Connected ports, in connection order.
    pub fn connections(&self, id: &EntityId) -> Result<Vec<EntityId>> {
        let list = self.port_body(id)?.connections.clone();
        self.members(&list)
    }

    pub fn is_connected(&self, a: &EntityId, b: &EntityId) -> Result<bool> {
        let list = self.port_body(a)?.connections.clone();
        self.collection_contains(&list, b)
    }

    /// Connect two ports. Returns false for a self-connection, a target that
    /// is not a live port, or ports that are already connected.
    pub fn connect(&mut self, a: &EntityId, b: &EntityId) -> Result<bool> {
        self.port_body(a)?;
        if a == b {
            warn!(target: "entity_graph::ops", port = %a, "Port cannot connect to itself");
            return Ok(false);
        }
        if self.get(b).map(|entity| entity.kind()) != Some(EntityKind::Port) {
            warn!(target: "entity_graph::ops", port = %a, other = %b, "Connection target is not a live port");
            return Ok(false);
        }
        if self.is_connected(a, b)? && self.is_connected(b, a)? {
            warn!(target: "entity_graph::ops", port = %a, other = %b, "Ports already connected");
            return Ok(false);
        }
        self.join_ports(a, b)
    }

    /// Make both ends list each other. Idempotent; rolls back the first end
    /// if the second rejects.
    pub(crate) fn join_ports(&mut self, a: &EntityId, b: &EntityId) -> Result<bool> {
        let a_list = self.port_body(a)?.connections.clone();
        let b_list = self.port_body(b)?.connections.clone();

        let mut added = false;
        if !self.collection_contains(&a_list, b)? {
            if !self.append(&a_list, b)? {
                return Ok(false);
            }
            added = true;
        }
        if !self.collection_contains(&b_list, a)? && !self.append(&b_list, a)? {
            if added {
                self.remove(&a_list, b)?;
            }
            return Ok(false);
        }
        Ok(true)
    }

    /// Remove the connection from both ends. Returns false if there was none.
    pub fn disconnect(&mut self, a: &EntityId, b: &EntityId) -> Result<bool> {
        let a_list = self.port_body(a)?.connections.clone();
        let b_list = self.port_body(b)?.connections.clone();

        let mut changed = false;
        if self.collection_contains(&a_list, b)? {
            changed |= self.remove(&a_list, b)?;
        }
        if self.collection_contains(&b_list, a)? {
            changed |= self.remove(&b_list, a)?;
        }
        if !changed {
            warn!(target: "entity_graph::ops", port = %a, other = %b, "Ports were not connected");
        }
        Ok(changed)
    }

    pub(crate) fn port_data(&self, id: &EntityId, trail: &mut Trail) -> Result<Value> {
        match self.mode(id)? {
            PortMode::Input => {
                for source in self.connections(id)? {
                    if self.contains(&source) {
                        return self.pull(&source, trail);
                    }
                }
                Ok(Value::Null)
            }
            PortMode::Output => {
                let Some(node) = self.parent(id)?.cloned() else {
                    return Ok(Value::Null);
                };
                if self.kind(&node)? == EntityKind::Node {
                    self.pull(&node, trail)
                } else {
                    Ok(Value::Null)
                }
            }
        }
    }
}
