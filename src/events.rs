//! # Lifecycle Event Bus
//!
//! Named events, each with an ordered list of callbacks. Entity operations
//! announce themselves through [`around`], which fires the `Pre` hooks before
//! the wrapped call and the `Post` hooks after it, both with the call's
//! arguments. Entity code never calls observers directly.
//!
//! A failing callback is logged and skipped; it never aborts the operation
//! that triggered it.

use std::fmt;
use std::sync::Arc;

use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::error;

use crate::model::{EntityId, EntityKind, Value};
use crate::{Error, Result};

// ============================================================================
// Names, phases, hooks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Pre,
    Post,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Pre => "Pre",
            Phase::Post => "Post",
        }
    }
}

/// Lifecycle operations that entities announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Created,
    Deleted,
    DataChanged,
    LinkChanged,
    MemberAdded,
    MemberRemoved,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::Created,
        Action::Deleted,
        Action::DataChanged,
        Action::LinkChanged,
        Action::MemberAdded,
        Action::MemberRemoved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Created => "Created",
            Action::Deleted => "Deleted",
            Action::DataChanged => "DataChanged",
            Action::LinkChanged => "LinkChanged",
            Action::MemberAdded => "MemberAdded",
            Action::MemberRemoved => "MemberRemoved",
        }
    }
}

/// Name of an event, e.g. `NodePreCreated`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventName(String);

impl EventName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The standard name for `kind`/`phase`/`action`.
    pub fn lifecycle(kind: EntityKind, phase: Phase, action: Action) -> Self {
        Self(format!("{}{}{}", kind.as_str(), phase.as_str(), action.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        Self(name.to_owned())
    }
}

/// An event declared against a wrapped operation, tagged with when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    pub event: EventName,
    pub phase: Phase,
}

impl Hook {
    pub fn pre(event: impl Into<EventName>) -> Self {
        Self { event: event.into(), phase: Phase::Pre }
    }

    pub fn post(event: impl Into<EventName>) -> Self {
        Self { event: event.into(), phase: Phase::Post }
    }

    /// The standard `Pre` + `Post` pair for a lifecycle operation.
    pub fn lifecycle(kind: EntityKind, action: Action) -> [Hook; 2] {
        [
            Hook { event: EventName::lifecycle(kind, Phase::Pre, action), phase: Phase::Pre },
            Hook { event: EventName::lifecycle(kind, Phase::Post, action), phase: Phase::Post },
        ]
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Arguments of a wrapped call, handed unchanged to every callback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Call {
    pub entity: Option<EntityId>,
    pub kind: Option<EntityKind>,
    pub args: Vec<Value>,
}

impl Call {
    pub fn on(entity: &EntityId, kind: EntityKind) -> Self {
        Self { entity: Some(entity.clone()), kind: Some(kind), args: Vec::new() }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }
}

/// What a callback receives.
#[derive(Debug, Clone, Copy)]
pub struct EventPayload<'a> {
    pub event: &'a EventName,
    pub phase: Phase,
    pub call: &'a Call,
}

/// Event callback. Returning `Err` is logged by the bus.
pub type Callback = Arc<dyn Fn(&EventPayload<'_>) -> Result<()> + Send + Sync>;

/// Handle returned by `register`, used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

// ============================================================================
// EventBus
// ============================================================================

pub struct EventBus {
    events: HashMap<EventName, SmallVec<[(SubscriptionId, Callback); 2]>>,
    next_subscription: u64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.events.len())
            .field("callbacks", &self.events.values().map(SmallVec::len).sum::<usize>())
            .finish()
    }
}

impl EventBus {
    /// A bus with every standard lifecycle event declared.
    pub fn new() -> Self {
        let mut bus = Self::empty();
        for kind in EntityKind::ALL {
            for action in Action::ALL {
                for phase in [Phase::Pre, Phase::Post] {
                    bus.declare(EventName::lifecycle(kind, phase, action));
                }
            }
        }
        bus
    }

    /// A bus with no events declared.
    pub fn empty() -> Self {
        Self { events: HashMap::new(), next_subscription: 1 }
    }

    /// Declare a custom event. Returns false if it already existed.
    pub fn declare(&mut self, event: impl Into<EventName>) -> bool {
        let event = event.into();
        if self.events.contains_key(&event) {
            return false;
        }
        self.events.insert(event, SmallVec::new());
        true
    }

    pub fn is_declared(&self, event: &EventName) -> bool {
        self.events.contains_key(event)
    }

    /// Append `callback` to `event`. Registering the same closure twice
    /// yields two subscriptions.
    pub fn register<F>(&mut self, event: impl Into<EventName>, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&EventPayload<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let event = event.into();
        let id = SubscriptionId(self.next_subscription);
        let callbacks = self
            .events
            .get_mut(&event)
            .ok_or_else(|| Error::UnknownEvent(event.to_string()))?;

        callbacks.push((id, Arc::new(callback)));
        self.next_subscription += 1;
        Ok(id)
    }

    pub fn deregister(&mut self, event: impl Into<EventName>, subscription: SubscriptionId) -> Result<()> {
        let event = event.into();
        let callbacks = self
            .events
            .get_mut(&event)
            .ok_or_else(|| Error::UnknownEvent(event.to_string()))?;

        let position = callbacks
            .iter()
            .position(|(id, _)| *id == subscription)
            .ok_or_else(|| Error::NotFound(format!("subscription {subscription:?} on {event}")))?;
        callbacks.remove(position);
        Ok(())
    }

    pub fn callbacks(&self, event: &EventName) -> usize {
        self.events.get(event).map_or(0, SmallVec::len)
    }

    /// Invoke every callback of `event` in registration order.
    ///
    /// Returns how many callbacks completed without error.
    pub fn trigger(&self, event: &EventName, phase: Phase, call: &Call) -> Result<usize> {
        let callbacks = self
            .events
            .get(event)
            .ok_or_else(|| Error::UnknownEvent(event.to_string()))?;

        let payload = EventPayload { event, phase, call };
        let mut ok = 0;
        for (id, callback) in callbacks {
            match callback(&payload) {
                Ok(()) => ok += 1,
                Err(e) => {
                    error!(target: "entity_graph::events", event = %event, subscription = ?id, error = %e, "Event callback failed");
                }
            }
        }
        Ok(ok)
    }

    fn fire(&self, hooks: &[Hook], phase: Phase, call: &Call) {
        for hook in hooks.iter().filter(|hook| hook.phase == phase) {
            if let Err(e) = self.trigger(&hook.event, phase, call) {
                error!(target: "entity_graph::events", event = %hook.event, error = %e, "Hook could not fire");
            }
        }
    }
}

// ============================================================================
// Wrapping
// ============================================================================

/// Anything that carries an event bus.
pub trait Observable {
    fn event_bus(&self) -> &EventBus;
}

impl Observable for EventBus {
    fn event_bus(&self) -> &EventBus {
        self
    }
}

/// Result of a wrapped call: whether it took effect.
///
/// `Err` and `Ok(false)` did not, so their `Post` hooks stay silent.
pub trait Outcome {
    fn took_effect(&self) -> bool;
}

impl Outcome for () {
    fn took_effect(&self) -> bool {
        true
    }
}

impl Outcome for bool {
    fn took_effect(&self) -> bool {
        *self
    }
}

impl Outcome for EntityId {
    fn took_effect(&self) -> bool {
        true
    }
}

impl<T: Outcome> Outcome for Result<T> {
    fn took_effect(&self) -> bool {
        matches!(self, Ok(value) if value.took_effect())
    }
}

/// Run `f` between the `Pre` and `Post` hooks.
///
/// `Post` fires only if `f` took effect. The result of `f` is returned
/// unchanged.
pub fn around<C, R, F>(target: &mut C, hooks: &[Hook], call: &Call, f: F) -> R
where
    C: Observable + ?Sized,
    R: Outcome,
    F: FnOnce(&mut C) -> R,
{
    target.event_bus().fire(hooks, Phase::Pre, call);
    let result = f(target);
    if result.took_effect() {
        target.event_bus().fire(hooks, Phase::Post, call);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder(bus: &mut EventBus, event: &str) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.register(event, move |payload| {
            sink.lock().push(format!("{}:{:?}", payload.event, payload.call.args));
            Ok(())
        })
        .unwrap();
        seen
    }

    #[test]
    fn test_standard_events_are_declared() {
        let bus = EventBus::new();
        assert!(bus.is_declared(&EventName::from("NodePreCreated")));
        assert!(bus.is_declared(&EventName::from("TypePostDataChanged")));
        assert!(!bus.is_declared(&EventName::from("NodeExploded")));
    }

    #[test]
    fn test_register_unknown_event_fails() {
        let mut bus = EventBus::new();
        let result = bus.register("Nope", |_| Ok(()));
        assert!(matches!(result, Err(Error::UnknownEvent(_))));
    }

    #[test]
    fn test_duplicate_registration_fires_twice() {
        let mut bus = EventBus::empty();
        bus.declare("Ping");
        let count = Arc::new(Mutex::new(0));
        for _ in 0..2 {
            let count = Arc::clone(&count);
            bus.register("Ping", move |_| {
                *count.lock() += 1;
                Ok(())
            })
            .unwrap();
        }

        bus.trigger(&"Ping".into(), Phase::Post, &Call::default()).unwrap();
        assert_eq!(*count.lock(), 2);
    }

    #[test]
    fn test_deregister_unregistered_fails() {
        let mut bus = EventBus::empty();
        bus.declare("Ping");
        let id = bus.register("Ping", |_| Ok(())).unwrap();

        bus.deregister("Ping", id).unwrap();
        assert_eq!(bus.callbacks(&"Ping".into()), 0);
        assert!(matches!(bus.deregister("Ping", id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_failing_callback_does_not_stop_others() {
        let mut bus = EventBus::empty();
        bus.declare("Ping");
        bus.register("Ping", |_| Err(Error::Contract("boom".into()))).unwrap();
        let seen = recorder(&mut bus, "Ping");

        let ok = bus.trigger(&"Ping".into(), Phase::Post, &Call::default().arg(1)).unwrap();
        assert_eq!(ok, 1);
        assert_eq!(seen.lock().as_slice(), ["Ping:[Int(1)]"]);
    }

    #[test]
    fn test_around_orders_pre_body_post() {
        let mut bus = EventBus::empty();
        bus.declare("Before");
        bus.declare("After");
        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        for name in ["Before", "After"] {
            let log = Arc::clone(&log);
            bus.register(name, move |payload| {
                log.lock().push(payload.event.to_string());
                Ok(())
            })
            .unwrap();
        }

        let hooks = [Hook::pre("Before"), Hook::post("After")];
        let body_log = Arc::clone(&log);
        let result = around(&mut bus, &hooks, &Call::default().arg("x"), |_| {
            body_log.lock().push("body".into());
            Ok(true)
        });

        assert!(result.unwrap());
        assert_eq!(log.lock().as_slice(), ["Before", "body", "After"]);
    }

    #[test]
    fn test_around_skips_post_when_call_has_no_effect() {
        let mut bus = EventBus::empty();
        bus.declare("Before");
        bus.declare("After");
        let before = recorder(&mut bus, "Before");
        let after = recorder(&mut bus, "After");
        let hooks = [Hook::pre("Before"), Hook::post("After")];

        let rejected: Result<bool> = around(&mut bus, &hooks, &Call::default(), |_| Ok(false));
        let failed: Result<()> = around(&mut bus, &hooks, &Call::default(), |_| {
            Err(Error::Contract("boom".into()))
        });

        assert!(!rejected.unwrap());
        assert!(failed.is_err());
        assert_eq!(before.lock().len(), 2);
        assert!(after.lock().is_empty());
    }

    #[test]
    fn test_payload_carries_call_arguments() {
        let mut bus = EventBus::new();
        let seen = recorder(&mut bus, "TypePreDataChanged");
        let hooks = Hook::lifecycle(EntityKind::Type, Action::DataChanged);
        let id = EntityId::new("v");

        around(&mut bus, &hooks, &Call::on(&id, EntityKind::Type).arg(7), |_| ());
        assert_eq!(seen.lock().as_slice(), ["TypePreDataChanged:[Int(7)]"]);
    }
}
