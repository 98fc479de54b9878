//! # Reference Resolver
//!
//! Two-phase wiring for batch decode. While a [`ReferenceScope`] is open, a
//! reference to an identity that is not yet live is parked together with the
//! setter that would attach it. When the scope closes, every parked setter is
//! replayed against whatever became live in the meantime. Identities still
//! missing are logged and left unset; one dangling reference never fails the
//! batch.
//!
//! Outside a scope, resolution is instant-only.

use std::fmt;
use std::ops::{Deref, DerefMut};

use indexmap::IndexMap;
use tracing::{debug, error, warn};

use crate::context::Context;
use crate::model::{Entity, EntityId};
use crate::{Error, Result};

/// Attaches a resolved entity onto the field that asked for it.
///
/// Returns `Ok(false)` when the attaching operation rejected the target.
pub type Setter = Box<dyn FnOnce(&mut Context, &EntityId) -> Result<bool> + Send>;

/// Parked setters, keyed by the identity they wait for.
#[derive(Default)]
pub(crate) struct Resolver {
    pending: IndexMap<EntityId, Vec<Setter>>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Outcome of closing a scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Setters that attached their target.
    pub resolved: usize,
    /// Setters whose target was live but rejected (or that failed).
    pub rejected: usize,
    /// Identities that never became live.
    pub unresolved: Vec<EntityId>,
}

impl ResolveReport {
    pub fn is_complete(&self) -> bool {
        self.rejected == 0 && self.unresolved.is_empty()
    }
}

// ============================================================================
// Context operations
// ============================================================================

impl Context {
    /// The live entity under `id`, if any.
    pub fn request_instant_reference(&self, id: &EntityId) -> Option<&Entity> {
        self.registry.get_instance(id)
    }

    /// Park `setter` until `id` can be resolved at scope exit.
    ///
    /// Missing or empty arguments are ignored so that optional references can
    /// be requested unconditionally. Returns true if the setter was parked.
    pub fn request_deferred_reference(&mut self, id: Option<&EntityId>, setter: Option<Setter>) -> bool {
        let (Some(id), Some(setter)) = (id, setter) else {
            return false;
        };
        if id.is_empty() {
            return false;
        }
        let Some(resolver) = self.resolver.as_mut() else {
            warn!(target: "entity_graph::resolver", id = %id, "Deferred reference requested outside a scope");
            return false;
        };
        resolver.pending.entry(id.clone()).or_default().push(setter);
        true
    }

    pub fn in_reference_scope(&self) -> bool {
        self.resolver.is_some()
    }

    /// Attach `target` now if it is live, otherwise park the setter.
    ///
    /// Outside a scope, a missing target is left unset.
    pub(crate) fn resolve_or_defer(&mut self, target: &EntityId, setter: Setter) -> Result<()> {
        if self.registry.contains(target) {
            setter(self, target)?;
            return Ok(());
        }
        if self.request_deferred_reference(Some(target), Some(setter)) {
            debug!(target: "entity_graph::resolver", id = %target, "Reference deferred");
        }
        Ok(())
    }

    /// Open a scope. Only one may be open per context.
    pub fn reference_scope(&mut self) -> Result<ReferenceScope<'_>> {
        if self.resolver.is_some() {
            return Err(Error::ScopeActive);
        }
        self.resolver = Some(Resolver::default());
        Ok(ReferenceScope { ctx: self, finished: false })
    }

    /// Run `f` inside a scope and close it.
    pub fn with_references<T, F>(&mut self, f: F) -> Result<(T, ResolveReport)>
    where
        F: FnOnce(&mut Context) -> Result<T>,
    {
        let mut scope = self.reference_scope()?;
        let value = f(&mut scope)?;
        Ok((value, scope.finish()))
    }

    /// Replay every parked setter and close the scope.
    pub(crate) fn resolve_references(&mut self) -> ResolveReport {
        let mut report = ResolveReport::default();
        let Some(resolver) = self.resolver.take() else {
            return report;
        };

        for (target, setters) in resolver.pending {
            if !self.registry.contains(&target) {
                error!(target: "entity_graph::resolver", id = %target, setters = setters.len(), "Unresolved reference left unset");
                report.unresolved.push(target);
                continue;
            }
            for setter in setters {
                match setter(self, &target) {
                    Ok(true) => report.resolved += 1,
                    Ok(false) => report.rejected += 1,
                    Err(e) => {
                        error!(target: "entity_graph::resolver", id = %target, error = %e, "Deferred setter failed");
                        report.rejected += 1;
                    }
                }
            }
        }

        debug!(
            target: "entity_graph::resolver",
            resolved = report.resolved,
            rejected = report.rejected,
            unresolved = report.unresolved.len(),
            "Reference scope closed"
        );
        report
    }
}

// ============================================================================
// ReferenceScope
// ============================================================================

/// Guard for an open scope. Derefs to the context; dropping it resolves.
pub struct ReferenceScope<'a> {
    ctx: &'a mut Context,
    finished: bool,
}

impl ReferenceScope<'_> {
    /// Close the scope and report what was wired.
    pub fn finish(mut self) -> ResolveReport {
        self.finished = true;
        self.ctx.resolve_references()
    }
}

impl Deref for ReferenceScope<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        &*self.ctx
    }
}

impl DerefMut for ReferenceScope<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        &mut *self.ctx
    }
}

impl Drop for ReferenceScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.ctx.resolve_references();
        }
    }
}
