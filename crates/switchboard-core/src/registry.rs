//! Keyed collections of signals and slots.
//!
//! Components usually expose their signals and slots under string keys so
//! that wiring can be described by name. [`Signals`] stores type-erased
//! signals, [`Slots`] stores slots, and [`connect`] links one to the other.
//!
//! ```
//! use std::sync::Arc;
//! use switchboard_core::{Signal, Slot};
//! use switchboard_core::registry::{self, Signals, Slots};
//!
//! let signals = Signals::new();
//! signals.insert("modified", Arc::new(Signal::<(u32,)>::new()));
//!
//! let slots = Slots::new();
//! slots.insert("update", Slot::new(|_revision: u32| {}));
//!
//! let connection = registry::connect(&signals, "modified", &slots, "update").unwrap();
//! assert!(!connection.expired());
//!
//! let modified = signals.get::<(u32,)>("modified").unwrap();
//! modified.emit((1,));
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::connection::Connection;
use crate::error::{ComError, RegistryError};
use crate::logging::targets;
use crate::signal::{Signal, SignalBase};
use crate::signature::Args;
use crate::slot::Slot;
use crate::worker::Worker;

/// Slots registered under string keys.
#[derive(Default)]
pub struct Slots {
    slots: RwLock<BTreeMap<String, Slot>>,
}

impl Slots {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `slot` under `key`, returning the slot it replaces.
    pub fn insert(&self, key: impl Into<String>, slot: Slot) -> Option<Slot> {
        self.slots.write().insert(key.into(), slot)
    }

    /// The slot registered under `key`.
    pub fn get(&self, key: &str) -> Option<Slot> {
        self.slots.read().get(key).cloned()
    }

    /// Unregister and return the slot under `key`.
    pub fn remove(&self, key: &str) -> Option<Slot> {
        self.slots.write().remove(key)
    }

    /// Registered keys, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.slots.read().keys().cloned().collect()
    }

    /// Number of registered slots.
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether no slots are registered.
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Bind every registered slot to `worker`.
    pub fn set_worker(&self, worker: &Worker) {
        let slots: Vec<Slot> = self.slots.read().values().cloned().collect();
        tracing::debug!(target: targets::REGISTRY, worker = %worker.id(), count = slots.len(), "binding slots to worker");
        for slot in slots {
            slot.set_worker(worker.clone());
        }
    }
}

/// Type-erased signals registered under string keys.
#[derive(Default)]
pub struct Signals {
    signals: RwLock<BTreeMap<String, Arc<dyn SignalBase>>>,
}

impl Signals {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `signal` under `key`, returning the signal it replaces.
    pub fn insert<A: Args + Clone>(
        &self,
        key: impl Into<String>,
        signal: Arc<Signal<A>>,
    ) -> Option<Arc<dyn SignalBase>> {
        self.signals.write().insert(key.into(), signal)
    }

    /// The signal under `key`, if it carries arguments of type `A`.
    pub fn get<A: Args + Clone>(&self, key: &str) -> Option<Arc<Signal<A>>> {
        self.require(key).ok()
    }

    /// The signal under `key`, with the reason it could not be returned.
    pub fn require<A: Args + Clone>(&self, key: &str) -> Result<Arc<Signal<A>>, RegistryError> {
        let signal = self
            .get_base(key)
            .ok_or_else(|| RegistryError::UnknownSignal(key.to_string()))?;
        signal
            .into_any()
            .downcast::<Signal<A>>()
            .map_err(|_| RegistryError::SignatureMismatch(key.to_string()))
    }

    /// The signal under `key`, without a type check.
    pub fn get_base(&self, key: &str) -> Option<Arc<dyn SignalBase>> {
        self.signals.read().get(key).cloned()
    }

    /// Unregister and return the signal under `key`.
    pub fn remove(&self, key: &str) -> Option<Arc<dyn SignalBase>> {
        self.signals.write().remove(key)
    }

    /// Registered keys, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.signals.read().keys().cloned().collect()
    }

    /// Number of registered signals.
    pub fn len(&self) -> usize {
        self.signals.read().len()
    }

    /// Whether no signals are registered.
    pub fn is_empty(&self) -> bool {
        self.signals.read().is_empty()
    }
}

/// Connect the slot under `slot_key` to the signal under `signal_key`.
pub fn connect(
    signals: &Signals,
    signal_key: &str,
    slots: &Slots,
    slot_key: &str,
) -> Result<Connection, ComError> {
    let signal = signals
        .get_base(signal_key)
        .ok_or_else(|| RegistryError::UnknownSignal(signal_key.to_string()))?;
    let slot = slots
        .get(slot_key)
        .ok_or_else(|| RegistryError::UnknownSlot(slot_key.to_string()))?;

    tracing::debug!(target: targets::REGISTRY, signal = signal_key, slot = slot_key, "connecting by key");
    Ok(signal.connect_slot(&slot)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SignalError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_slots_insert_get_remove() {
        let slots = Slots::new();
        assert!(slots.is_empty());

        let slot = Slot::new(|| {});
        assert!(slots.insert("b", slot.clone()).is_none());
        slots.insert("a", Slot::new(|| {}));

        assert_eq!(slots.keys(), ["a", "b"]);
        assert_eq!(slots.get("b"), Some(slot.clone()));
        assert_eq!(slots.remove("b"), Some(slot));
        assert!(slots.get("b").is_none());
        assert_eq!(slots.len(), 1);
    }

    #[test]
    fn test_slots_set_worker() {
        let worker = Worker::new();
        let slots = Slots::new();
        slots.insert("first", Slot::new(|| 1));
        slots.insert("second", Slot::new(|| 2));

        slots.set_worker(&worker);

        for key in slots.keys() {
            let slot = slots.get(&key).unwrap();
            assert_eq!(slot.worker(), Some(worker.clone()));
        }
        let second = slots.get("second").unwrap();
        assert_eq!(second.async_call::<i32, _>(()).unwrap().get(), Ok(2));

        worker.stop();
    }

    #[test]
    fn test_signals_typed_lookup() {
        let signals = Signals::new();
        signals.insert("modified", Arc::new(Signal::<(u32,)>::new()));

        assert!(signals.get::<(u32,)>("modified").is_some());
        assert!(signals.get::<(i64,)>("modified").is_none());
        assert_eq!(
            signals.require::<(i64,)>("modified").unwrap_err(),
            RegistryError::SignatureMismatch("modified".to_string())
        );
        assert_eq!(
            signals.require::<(u32,)>("missing").unwrap_err(),
            RegistryError::UnknownSignal("missing".to_string())
        );
        assert_eq!(signals.keys(), ["modified"]);
        assert_eq!(signals.len(), 1);

        assert!(signals.remove("modified").is_some());
        assert!(signals.is_empty());
    }

    #[test]
    fn test_connect_by_key() {
        let signals = Signals::new();
        let signal = Arc::new(Signal::<(u32, String)>::new());
        signals.insert("modified", signal.clone());

        let seen = Arc::new(AtomicU32::new(0));
        let s = seen.clone();
        let slots = Slots::new();
        slots.insert(
            "update",
            Slot::new(move |revision: u32| {
                s.store(revision, Ordering::SeqCst);
            }),
        );
        slots.insert("wrong", Slot::new(|_: String| {}));

        let connection = connect(&signals, "modified", &slots, "update").unwrap();
        assert!(!connection.expired());
        signal.emit((7, "seven".to_string()));
        assert_eq!(seen.load(Ordering::SeqCst), 7);

        assert!(matches!(
            connect(&signals, "missing", &slots, "update"),
            Err(ComError::Registry(RegistryError::UnknownSignal(_)))
        ));
        assert!(matches!(
            connect(&signals, "modified", &slots, "missing"),
            Err(ComError::Registry(RegistryError::UnknownSlot(_)))
        ));
        assert!(matches!(
            connect(&signals, "modified", &slots, "update"),
            Err(ComError::Signal(SignalError::AlreadyConnected))
        ));
        assert!(matches!(
            connect(&signals, "modified", &slots, "wrong"),
            Err(ComError::Signal(SignalError::BadSlot(_)))
        ));
    }
}
