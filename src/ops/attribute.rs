//! Attributes and the field sets shared with ports.

use tracing::{debug, warn};

use crate::builtin::{DEFAULT_FIELD, REFERENCE_FIELD, VALUE_FIELD};
use crate::context::Context;
use crate::events::{around, Action, Call, Hook};
use crate::model::{AttributeBody, Body, EntityId, EntityKind, Value};
use crate::ops::Trail;
use crate::{Error, Result};

impl Context {
    fn attribute_body(&self, id: &EntityId) -> Result<&AttributeBody> {
        match self.entity(id)?.body() {
            Body::Attribute(body) => Ok(body),
            other => Err(Error::Contract(format!("{id} is a {}, not an attribute", other.kind()))),
        }
    }

    fn attribute_body_mut(&mut self, id: &EntityId) -> Result<&mut AttributeBody> {
        match &mut self.entity_mut(id)?.body {
            Body::Attribute(body) => Ok(body),
            other => Err(Error::Contract(format!("{id} is a {}, not an attribute", other.kind()))),
        }
    }

    // ========================================================================
    // Fields
    // ========================================================================

    /// Keyed collection holding the fields of an attribute or port.
    pub fn field_collection(&self, id: &EntityId) -> Result<EntityId> {
        match self.entity(id)?.body() {
            Body::Attribute(body) => Ok(body.fields.clone()),
            Body::Port(body) => Ok(body.fields.clone()),
            other => Err(Error::Contract(format!("{} {id} has no fields", other.kind()))),
        }
    }

    pub fn field(&self, id: &EntityId, name: &str) -> Result<Option<EntityId>> {
        let fields = self.field_collection(id)?;
        self.entry(&fields, name)
    }

    pub fn field_names(&self, id: &EntityId) -> Result<Vec<String>> {
        let fields = self.field_collection(id)?;
        self.keys(&fields)
    }

    pub fn field_data(&self, id: &EntityId, name: &str) -> Result<Value> {
        let field = self
            .field(id, name)?
            .ok_or_else(|| Error::NotFound(format!("field {name} on {id}")))?;
        self.get_data(&field)
    }

    pub fn set_field(&mut self, id: &EntityId, name: &str, value: impl Into<Value>) -> Result<bool> {
        let field = self
            .field(id, name)?
            .ok_or_else(|| Error::NotFound(format!("field {name} on {id}")))?;
        self.set_data(&field, value)
    }

    // ========================================================================
    // Links
    // ========================================================================

    /// Make `id` mirror the value of `target`. Links may form cycles; reads
    /// stop at the first attribute seen twice.
    pub fn link(&mut self, id: &EntityId, target: &EntityId) -> Result<bool> {
        self.attribute_body(id)?;
        if id == target {
            warn!(target: "entity_graph::ops", id = %id, "Attribute cannot link to itself");
            return Ok(false);
        }
        if self.get(target).map(|entity| entity.kind()) != Some(EntityKind::Attribute) {
            warn!(target: "entity_graph::ops", id = %id, target_id = %target, "Link target is not a live attribute");
            return Ok(false);
        }

        let call = Call::on(id, EntityKind::Attribute).arg(target.as_str());
        let hooks = Hook::lifecycle(EntityKind::Attribute, Action::LinkChanged);
        around(self, &hooks, &call, |ctx| {
            ctx.attribute_body_mut(id)?.link = Some(target.clone());
            Ok(true)
        })
    }

    /// Drop the link. Returns false if there was none.
    pub fn unlink(&mut self, id: &EntityId) -> Result<bool> {
        if self.attribute_body(id)?.link.is_none() {
            return Ok(false);
        }
        let call = Call::on(id, EntityKind::Attribute);
        let hooks = Hook::lifecycle(EntityKind::Attribute, Action::LinkChanged);
        around(self, &hooks, &call, |ctx| {
            ctx.attribute_body_mut(id)?.link = None;
            Ok(true)
        })
    }

    pub fn linked(&self, id: &EntityId) -> Result<Option<EntityId>> {
        Ok(self.attribute_body(id)?.link.clone())
    }

    // ========================================================================
    // Read-through
    // ========================================================================

    /// Link target, then referenced attribute, then own value, then default.
    pub(crate) fn attribute_data(&self, id: &EntityId, trail: &mut Trail) -> Result<Value> {
        if let Some(link) = self.linked(id)? {
            if trail.contains(&link) {
                warn!(target: "entity_graph::ops", id = %id, link = %link, "Link cycle, reading own value");
            } else if self.contains(&link) {
                return self.pull(&link, trail);
            } else {
                debug!(target: "entity_graph::ops", id = %id, link = %link, "Dangling link ignored");
            }
        }

        if let Some(field) = self.field(id, REFERENCE_FIELD)? {
            if let Some(target) = self.reference(&field)? {
                if !trail.contains(&target) {
                    return self.pull(&target, trail);
                }
                warn!(target: "entity_graph::ops", id = %id, reference = %target, "Reference cycle, reading own value");
            }
        }

        let value_field = self.field(id, VALUE_FIELD)?;
        if let Some(field) = &value_field {
            if let Some(value) = self.raw_data(field)? {
                return Ok(value);
            }
        }
        if let Some(field) = self.field(id, DEFAULT_FIELD)? {
            return self.get_data(&field);
        }
        match value_field {
            Some(field) => self.get_data(&field),
            None => Ok(Value::Null),
        }
    }
}
