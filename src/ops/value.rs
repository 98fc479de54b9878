//! Typed values: one primitive payload constrained to a tuple of accepted
//! types, with a class default used while unset.

use tracing::{debug, warn};

use crate::builtin::VALUE_FIELD;
use crate::class::ValueSpec;
use crate::context::Context;
use crate::events::{around, Action, Call, Hook};
use crate::model::{Body, EntityId, EntityKind, TypedValue, Value};
use crate::{Error, Result};

/// Validate `value` against `spec` and apply the class cast.
///
/// `None` means rejected. Non-finite floats are rejected since documents
/// cannot carry them.
pub(crate) fn accept(spec: &ValueSpec, value: Value) -> Option<Value> {
    if !spec.accepts.contains(&value.value_type()) || !value.is_finite() {
        return None;
    }
    match spec.cast {
        Some(target) => value.cast(target),
        None => Some(value),
    }
}

impl Context {
    /// `accept`, and for referenced values the identity must name a live
    /// entity of the referenced kind.
    pub(crate) fn accept_data(&self, spec: &ValueSpec, value: Value) -> Option<Value> {
        let value = accept(spec, value)?;
        let Some(kind) = spec.reference else {
            return Some(value);
        };
        let Value::String(raw) = &value else {
            return None;
        };
        let found = self.get(&EntityId::new(raw.as_str())).map(|entity| entity.kind());
        (found == Some(kind)).then_some(value)
    }

    fn typed(&self, id: &EntityId) -> Result<&TypedValue> {
        match self.entity(id)?.body() {
            Body::Value(value) => Ok(value),
            other => Err(Error::Contract(format!("{id} is a {}, not a typed value", other.kind()))),
        }
    }

    /// Current data, or the class default while unset.
    pub fn get_data(&self, id: &EntityId) -> Result<Value> {
        match self.raw_data(id)? {
            Some(value) => Ok(value),
            None => self.default_data(id),
        }
    }

    /// Stored data only; `None` while unset.
    pub fn raw_data(&self, id: &EntityId) -> Result<Option<Value>> {
        Ok(self.typed(id)?.data.clone())
    }

    pub fn default_data(&self, id: &EntityId) -> Result<Value> {
        Ok(self.def_of(id)?.value_spec()?.default.clone())
    }

    /// Would `set_data(id, value)` accept `value`?
    pub fn validate_data(&self, id: &EntityId, value: &Value) -> Result<bool> {
        let def = self.def_of(id)?;
        Ok(self.accept_data(def.value_spec()?, value.clone()).is_some())
    }

    /// Validate, cast and store. On an attribute this sets its `value` field.
    ///
    /// A value outside the accepted types is rejected with `Ok(false)`.
    pub fn set_data(&mut self, id: &EntityId, value: impl Into<Value>) -> Result<bool> {
        let value = value.into();
        match self.kind(id)? {
            EntityKind::Type => {
                let def = self.def_of(id)?;
                let spec = def.value_spec()?;
                let got = value.type_name();
                let Some(accepted) = self.accept_data(spec, value) else {
                    warn!(
                        target: "entity_graph::ops",
                        id = %id,
                        class = %def.name,
                        accepts = ?spec.accepts,
                        got = %got,
                        "Data rejected"
                    );
                    return Ok(false);
                };

                let call = Call::on(id, EntityKind::Type).arg(accepted.clone());
                let hooks = Hook::lifecycle(EntityKind::Type, Action::DataChanged);
                around(self, &hooks, &call, |ctx| {
                    if let Body::Value(typed) = &mut ctx.entity_mut(id)?.body {
                        typed.data = Some(accepted);
                    }
                    Ok(true)
                })
            }
            EntityKind::Attribute => {
                let field = self
                    .field(id, VALUE_FIELD)?
                    .ok_or_else(|| Error::Contract(format!("attribute {id} has no {VALUE_FIELD} field")))?;
                let call = Call::on(id, EntityKind::Attribute).arg(value.clone());
                let hooks = Hook::lifecycle(EntityKind::Attribute, Action::DataChanged);
                around(self, &hooks, &call, |ctx| ctx.set_data(&field, value))
            }
            kind => Err(Error::Contract(format!("{kind} {id} holds no settable data"))),
        }
    }

    /// Reset to unset, so reads return the default again.
    pub fn del_data(&mut self, id: &EntityId) -> Result<()> {
        match self.kind(id)? {
            EntityKind::Type => {
                let call = Call::on(id, EntityKind::Type);
                let hooks = Hook::lifecycle(EntityKind::Type, Action::DataChanged);
                around(self, &hooks, &call, |ctx| {
                    if let Body::Value(typed) = &mut ctx.entity_mut(id)?.body {
                        typed.data = None;
                    }
                    Ok(())
                })
            }
            EntityKind::Attribute => {
                let field = self
                    .field(id, VALUE_FIELD)?
                    .ok_or_else(|| Error::Contract(format!("attribute {id} has no {VALUE_FIELD} field")))?;
                self.del_data(&field)
            }
            kind => Err(Error::Contract(format!("{kind} {id} holds no settable data"))),
        }
    }

    // ========================================================================
    // Referenced values
    // ========================================================================

    /// Point a referenced value at `target`, which must be live and of the
    /// kind the class references.
    pub fn set_reference(&mut self, id: &EntityId, target: &EntityId) -> Result<bool> {
        let def = self.def_of(id)?;
        let Some(kind) = def.value_spec()?.reference else {
            return Err(Error::Contract(format!("{} does not hold references", def.name)));
        };

        match self.get(target).map(|entity| entity.kind()) {
            Some(found) if found == kind => self.set_data(id, target.as_str()),
            found => {
                warn!(
                    target: "entity_graph::ops",
                    id = %id,
                    target_id = %target,
                    expected = %kind,
                    found = ?found,
                    "Reference target rejected"
                );
                Ok(false)
            }
        }
    }

    /// Live target of a referenced value. A dangling identity reads as `None`.
    pub fn reference(&self, id: &EntityId) -> Result<Option<EntityId>> {
        let def = self.def_of(id)?;
        let Some(kind) = def.value_spec()?.reference else {
            return Err(Error::Contract(format!("{} does not hold references", def.name)));
        };
        let Some(Value::String(raw)) = self.raw_data(id)? else {
            return Ok(None);
        };

        let target = EntityId::new(raw);
        match self.get(&target) {
            Some(entity) if entity.kind() == kind => Ok(Some(target)),
            _ => {
                debug!(target: "entity_graph::ops", id = %id, target_id = %target, "Dangling reference");
                Ok(None)
            }
        }
    }
}
