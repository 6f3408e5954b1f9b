//! Signal implementation for Switchboard.
//!
//! A [`Signal`] is a publisher that multicasts an argument tuple to every
//! connected [`Slot`]. Slots are invoked in connection order, either on the
//! emitting thread ([`emit`](Signal::emit)) or on their bound workers
//! ([`async_emit`](Signal::async_emit)).
//!
//! # Connection rules
//!
//! A slot can be connected if its parameter types are a prefix of the
//! signal's argument types. It then receives only the leading arguments it
//! declares:
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI32, Ordering};
//! use switchboard_core::{Signal, Slot};
//!
//! let total = Arc::new(AtomicI32::new(0));
//!
//! let t = total.clone();
//! let both = Slot::new(move |a: i32, b: i32| {
//!     t.fetch_add(a + b, Ordering::SeqCst);
//! });
//! let t = total.clone();
//! let first = Slot::new(move |a: i32| {
//!     t.fetch_add(a, Ordering::SeqCst);
//! });
//!
//! let signal = Signal::<(i32, i32)>::new();
//! signal.connect(&both).unwrap();
//! signal.connect(&first).unwrap();
//!
//! signal.emit((40, 2));
//! assert_eq!(total.load(Ordering::SeqCst), 82);
//! ```
//!
//! # Thread Safety
//!
//! Signals are `Send + Sync`. The connection list is guarded by a
//! reader/writer lock; emission copies the list and releases the lock before
//! any slot runs, so slots may connect, disconnect or emit re-entrantly.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::connection::{Connection, ConnectionId, ConnectionInner};
use crate::error::{SignalError, SlotError};
use crate::logging::{span_names, targets};
use crate::signature::{Args, ParamType};
use crate::slot::{Slot, SlotInner};

pub(crate) struct SignalCore {
    name: Option<String>,
    params: Vec<ParamType>,
    connections: RwLock<Vec<Arc<ConnectionInner>>>,
}

impl SignalCore {
    fn new(name: Option<String>, params: Vec<ParamType>) -> Self {
        Self {
            name,
            params,
            connections: RwLock::new(Vec::new()),
        }
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    pub(crate) fn remove(&self, id: ConnectionId) {
        self.connections.write().retain(|conn| conn.id() != id);
    }

    fn find(&self, slot: &Slot) -> Option<Arc<ConnectionInner>> {
        self.connections
            .read()
            .iter()
            .find(|conn| conn.slot_id() == slot.id() && conn.is_connected())
            .cloned()
    }

    fn connect(self: &Arc<Self>, slot: &Slot) -> Result<Connection, SignalError> {
        let matched = slot.signature().match_args(&self.params);
        if !matched.is_callable() {
            return Err(SignalError::BadSlot(format!(
                "slot {} {} cannot be connected to signal '{}': {matched}",
                slot.inner().label(),
                slot.signature(),
                self.label()
            )));
        }

        let connection = ConnectionInner::new(self, slot.inner());
        {
            let mut connections = self.connections.write();
            if connections
                .iter()
                .any(|conn| conn.slot_id() == slot.id() && conn.is_connected())
            {
                return Err(SignalError::AlreadyConnected);
            }
            connections.push(connection.clone());
        }
        slot.inner().attach(&connection);

        tracing::debug!(
            target: targets::SIGNAL,
            signal = self.label(),
            slot = %slot.id(),
            "slot connected"
        );
        Ok(Connection::new(&connection))
    }

    fn disconnect_all(&self) {
        let connections = std::mem::take(&mut *self.connections.write());
        if !connections.is_empty() {
            tracing::debug!(
                target: targets::SIGNAL,
                signal = self.label(),
                count = connections.len(),
                "disconnecting all slots"
            );
        }
        for connection in connections {
            connection.disconnect_slot_side();
        }
    }

    fn connection_count(&self) -> usize {
        self.connections
            .read()
            .iter()
            .filter(|conn| conn.is_connected())
            .count()
    }

    /// Call `invoke` for every live, unblocked slot in connection order.
    ///
    /// The list is copied under the read lock and the lock released before
    /// any slot runs. Returns the number of successful deliveries.
    fn deliver(&self, mut invoke: impl FnMut(&Arc<SlotInner>) -> Result<(), SlotError>) -> usize {
        let snapshot = self.connections.read().clone();
        let mut delivered = 0;

        for connection in snapshot {
            if connection.is_blocked() {
                tracing::trace!(target: targets::SIGNAL, slot = %connection.slot_id(), "connection blocked, skipping");
                continue;
            }
            let Some(slot) = connection.slot() else {
                // The slot is gone or the link was cut mid-emission
                connection.disconnect();
                continue;
            };
            match invoke(&slot) {
                Ok(()) => delivered += 1,
                Err(error) => tracing::warn!(
                    target: targets::SIGNAL,
                    signal = self.label(),
                    slot = %slot.label(),
                    %error,
                    "slot delivery failed"
                ),
            }
        }

        delivered
    }
}

impl Drop for SignalCore {
    fn drop(&mut self) {
        for connection in self.connections.get_mut().drain(..) {
            connection.disconnect_slot_side();
        }
    }
}

/// A type-safe signal carrying arguments of type `A`.
///
/// `A` is a tuple of up to eight elements; use `()` for signals without
/// arguments and `(T,)` for a single argument. Arguments are cloned once per
/// connected slot.
///
/// # Example
///
/// ```
/// use switchboard_core::{Signal, Slot};
///
/// let signal = Signal::<(String,)>::with_name("title_changed");
/// let slot = Slot::new(|title: String| println!("title: {title}"));
///
/// let connection = signal.connect(&slot).unwrap();
/// signal.emit(("Hello".to_string(),));
///
/// signal.disconnect(&slot).unwrap();
/// assert!(connection.expired());
/// ```
pub struct Signal<A> {
    core: Arc<SignalCore>,
    _marker: PhantomData<fn(A)>,
}

impl<A: Args + Clone> Signal<A> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self::from_core(None)
    }

    /// Create a new named signal. The name appears in log output.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self::from_core(Some(name.into()))
    }

    fn from_core(name: Option<String>) -> Self {
        Self {
            core: Arc::new(SignalCore::new(name, A::param_types())),
            _marker: PhantomData,
        }
    }

    /// The signal's name, if it was given one.
    pub fn name(&self) -> Option<&str> {
        self.core.name.as_deref()
    }

    /// The argument types this signal emits.
    pub fn param_types(&self) -> &[ParamType] {
        &self.core.params
    }

    /// Connect a slot at the end of the connection order.
    ///
    /// Fails with [`SignalError::AlreadyConnected`] if the slot is already
    /// connected to this signal, and with [`SignalError::BadSlot`] if its
    /// parameters are not a prefix of the signal's arguments.
    pub fn connect(&self, slot: &Slot) -> Result<Connection, SignalError> {
        self.core.connect(slot)
    }

    /// Disconnect a slot.
    ///
    /// Fails with [`SignalError::BadSlot`] if the slot is not connected.
    pub fn disconnect(&self, slot: &Slot) -> Result<(), SignalError> {
        let connection = self.core.find(slot).ok_or_else(|| {
            SignalError::BadSlot(format!("no such slot connected: {}", slot.inner().label()))
        })?;
        connection.disconnect();
        Ok(())
    }

    /// Remove the link behind `connection` if it belongs to this signal.
    ///
    /// Idempotent: expired handles and handles of other signals are ignored.
    pub fn disconnect_connection(&self, connection: &Connection) {
        if let Some(inner) = connection.live() {
            if inner.belongs_to(&self.core) {
                inner.disconnect();
            }
        }
    }

    /// Disconnect every slot.
    pub fn disconnect_all(&self) {
        self.core.disconnect_all();
    }

    /// The connection to `slot`, if there is one.
    pub fn connection(&self, slot: &Slot) -> Option<Connection> {
        self.core.find(slot).map(|conn| Connection::new(&conn))
    }

    /// Whether `slot` is connected to this signal.
    pub fn is_connected(&self, slot: &Slot) -> bool {
        self.core.find(slot).is_some()
    }

    /// Number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.core.connection_count()
    }

    /// Invoke every connected, unblocked slot on the calling thread, in
    /// connection order.
    ///
    /// A slot that fails is logged and skipped; delivery to the remaining
    /// slots continues.
    pub fn emit(&self, args: A) {
        let span = tracing::trace_span!(target: targets::SIGNAL, span_names::EMIT, signal = self.core.label());
        let _enter = span.enter();

        self.core.deliver(|slot| {
            slot.run_values(&self.core.params, args.clone().into_values())
        });
    }

    /// Post an invocation to the bound worker of every connected, unblocked
    /// slot, and return how many were posted.
    ///
    /// The calls proceed independently; there is no ordering between slots
    /// on different workers. Slots without a worker are logged and skipped.
    pub fn async_emit(&self, args: A) -> usize {
        let span = tracing::trace_span!(target: targets::SIGNAL, span_names::ASYNC_EMIT, signal = self.core.label());
        let _enter = span.enter();

        self.core.deliver(|slot| {
            slot.async_run_values(&self.core.params, args.clone().into_values())
                .map(drop)
        })
    }
}

impl<A: Args + Clone> Default for Signal<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.core.name)
            .field("connections", &self.core.connection_count())
            .finish()
    }
}

/// Type-erased access to a signal, independent of its argument types.
pub trait SignalBase: Send + Sync {
    /// The signal's name, if any.
    fn name(&self) -> Option<&str>;

    /// The argument types the signal emits.
    fn param_types(&self) -> &[ParamType];

    /// Connect a slot; see [`Signal::connect`].
    fn connect_slot(&self, slot: &Slot) -> Result<Connection, SignalError>;

    /// Disconnect all connections.
    fn disconnect_all(&self);

    /// Get the number of active connections.
    fn connection_count(&self) -> usize;

    /// Upcast for downcasting to the concrete `Signal<A>`.
    fn as_any(&self) -> &dyn Any;

    /// Upcast a shared handle for downcasting to `Arc<Signal<A>>`.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<A: Args + Clone> SignalBase for Signal<A> {
    fn name(&self) -> Option<&str> {
        Signal::name(self)
    }

    fn param_types(&self) -> &[ParamType] {
        Signal::param_types(self)
    }

    fn connect_slot(&self, slot: &Slot) -> Result<Connection, SignalError> {
        self.connect(slot)
    }

    fn disconnect_all(&self) {
        Signal::disconnect_all(self);
    }

    fn connection_count(&self) -> usize {
        Signal::connection_count(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

static_assertions::assert_impl_all!(Signal<(i32, String)>: Send, Sync);
