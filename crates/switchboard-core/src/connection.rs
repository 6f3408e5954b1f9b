//! Signal-to-slot links, blocking and scoped disconnection.
//!
//! A [`Connection`] is a weak handle to a link between one signal and one
//! slot. The link itself is owned by the signal; the handle expires as soon
//! as the link is disconnected, the signal is dropped or the slot is
//! dropped.
//!
//! ```
//! use switchboard_core::{Signal, Slot};
//!
//! let signal = Signal::<(i32,)>::new();
//! let slot = Slot::new(|_: i32| {});
//!
//! let connection = signal.connect(&slot).unwrap();
//! {
//!     let _blocker = connection.blocker();
//!     assert!(connection.is_blocked());
//!     signal.emit((1,)); // skipped
//! }
//! assert!(!connection.is_blocked());
//!
//! connection.disconnect();
//! assert!(connection.expired());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::logging::targets;
use crate::signal::SignalCore;
use crate::slot::{SlotId, SlotInner};

/// Counter for unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

pub(crate) struct ConnectionInner {
    id: ConnectionId,
    signal: Weak<SignalCore>,
    slot: Weak<SlotInner>,
    slot_id: SlotId,
    connected: AtomicBool,
    blockers: AtomicUsize,
}

impl ConnectionInner {
    pub(crate) fn new(signal: &Arc<SignalCore>, slot: &Arc<SlotInner>) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)),
            signal: Arc::downgrade(signal),
            slot: Arc::downgrade(slot),
            slot_id: slot.id(),
            connected: AtomicBool::new(true),
            blockers: AtomicUsize::new(0),
        })
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn slot_id(&self) -> SlotId {
        self.slot_id
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn is_blocked(&self) -> bool {
        self.blockers.load(Ordering::Acquire) > 0
    }

    /// The connected slot, if the link is live and the slot still exists.
    pub(crate) fn slot(&self) -> Option<Arc<SlotInner>> {
        if self.is_connected() {
            self.slot.upgrade()
        } else {
            None
        }
    }

    pub(crate) fn belongs_to(&self, signal: &Arc<SignalCore>) -> bool {
        std::ptr::eq(self.signal.as_ptr(), Arc::as_ptr(signal))
    }

    /// Mark the link disconnected. Returns `false` if it already was.
    fn mark_disconnected(&self) -> bool {
        self.connected.swap(false, Ordering::AcqRel)
    }

    /// Disconnect from both ends.
    pub(crate) fn disconnect(&self) {
        if !self.mark_disconnected() {
            return;
        }
        tracing::trace!(target: targets::CONNECTION, connection = self.id.0, slot = %self.slot_id, "disconnecting");
        if let Some(signal) = self.signal.upgrade() {
            signal.remove(self.id);
        }
        if let Some(slot) = self.slot.upgrade() {
            slot.detach(self.id);
        }
    }

    /// Disconnect while the slot is being torn down.
    pub(crate) fn disconnect_signal_side(&self) {
        if !self.mark_disconnected() {
            return;
        }
        tracing::trace!(target: targets::CONNECTION, connection = self.id.0, slot = %self.slot_id, "slot dropped, disconnecting");
        if let Some(signal) = self.signal.upgrade() {
            signal.remove(self.id);
        }
    }

    /// Disconnect while the signal is clearing its own list.
    pub(crate) fn disconnect_slot_side(&self) {
        if !self.mark_disconnected() {
            return;
        }
        if let Some(slot) = self.slot.upgrade() {
            slot.detach(self.id);
        }
    }
}

/// Handle to a signal/slot link.
///
/// The default value is a handle that was never connected, and is expired.
#[derive(Clone, Default)]
pub struct Connection {
    inner: Weak<ConnectionInner>,
}

impl Connection {
    pub(crate) fn new(inner: &Arc<ConnectionInner>) -> Self {
        Self {
            inner: Arc::downgrade(inner),
        }
    }

    /// The identity of the link, or `None` if the handle has expired.
    pub fn id(&self) -> Option<ConnectionId> {
        self.live().map(|inner| inner.id)
    }

    /// Remove the link. Idempotent; does nothing on an expired handle.
    pub fn disconnect(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.disconnect();
        }
    }

    /// Whether the link is gone.
    pub fn expired(&self) -> bool {
        self.live().is_none()
    }

    /// Whether emissions currently skip this link.
    pub fn is_blocked(&self) -> bool {
        self.live().is_some_and(|inner| inner.is_blocked())
    }

    /// Block the link until the returned token (and every clone of it) is
    /// dropped or released.
    ///
    /// Blocking an expired handle returns an inert token.
    pub fn blocker(&self) -> Blocker {
        Blocker::new(self.inner.clone())
    }

    /// Turn this handle into one that disconnects when dropped.
    pub fn scoped(self) -> ScopedConnection {
        ScopedConnection { connection: self }
    }

    pub(crate) fn live(&self) -> Option<Arc<ConnectionInner>> {
        self.inner.upgrade().filter(|inner| inner.is_connected())
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("blocked", &self.is_blocked())
            .finish()
    }
}

/// Token that keeps a connection blocked while it is alive.
///
/// Tokens are counted: the connection stays blocked until all of them are
/// released. Cloning an active token adds another block.
#[must_use = "the connection is unblocked as soon as the blocker is dropped"]
pub struct Blocker {
    connection: Weak<ConnectionInner>,
    active: bool,
}

impl Blocker {
    fn new(connection: Weak<ConnectionInner>) -> Self {
        let active = match connection.upgrade() {
            Some(inner) => {
                inner.blockers.fetch_add(1, Ordering::AcqRel);
                true
            }
            None => false,
        };
        Self { connection, active }
    }

    /// Drop this token's block early. Idempotent.
    pub fn release(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }
        if let Some(inner) = self.connection.upgrade() {
            inner.blockers.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Whether this token still holds a block.
    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Clone for Blocker {
    fn clone(&self) -> Self {
        if self.active {
            Self::new(self.connection.clone())
        } else {
            Self {
                connection: self.connection.clone(),
                active: false,
            }
        }
    }
}

impl Drop for Blocker {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Blocker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blocker").field("active", &self.active).finish()
    }
}

/// A connection that is disconnected when this guard is dropped.
#[must_use = "the connection is disconnected as soon as the guard is dropped"]
pub struct ScopedConnection {
    connection: Connection,
}

impl ScopedConnection {
    /// The guarded connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Give up the guard and keep the link alive.
    pub fn into_inner(mut self) -> Connection {
        std::mem::take(&mut self.connection)
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.connection.disconnect();
    }
}

impl fmt::Debug for ScopedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopedConnection").field(&self.connection).finish()
    }
}

static_assertions::assert_impl_all!(Connection: Send, Sync, Clone);
static_assertions::assert_impl_all!(Blocker: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Signal, Slot};
    use std::sync::atomic::AtomicI32;

    fn counting_slot() -> (Slot, Arc<AtomicI32>) {
        let count = Arc::new(AtomicI32::new(0));
        let counter = count.clone();
        let slot = Slot::new(move |_: i32| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (slot, count)
    }

    #[test]
    fn test_default_connection_is_expired() {
        let connection = Connection::default();
        assert!(connection.expired());
        assert!(connection.id().is_none());
        assert!(!connection.is_blocked());
        connection.disconnect();
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let signal = Signal::<(i32,)>::new();
        let (slot, count) = counting_slot();

        let connection = signal.connect(&slot).unwrap();
        assert!(!connection.expired());
        assert_eq!(signal.connection_count(), 1);

        connection.disconnect();
        connection.disconnect();
        assert!(connection.expired());
        assert_eq!(signal.connection_count(), 0);
        assert_eq!(slot.connection_count(), 0);

        signal.emit((1,));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_blockers_are_counted() {
        let signal = Signal::<(i32,)>::new();
        let (slot, count) = counting_slot();
        let connection = signal.connect(&slot).unwrap();

        let mut first = connection.blocker();
        let second = first.clone();
        signal.emit((1,));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        first.release();
        assert!(!first.is_active());
        assert!(connection.is_blocked());
        signal.emit((1,));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        drop(second);
        assert!(!connection.is_blocked());
        signal.emit((1,));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_blocker_outliving_connection() {
        let signal = Signal::<(i32,)>::new();
        let (slot, _count) = counting_slot();
        let connection = signal.connect(&slot).unwrap();

        let blocker = connection.blocker();
        connection.disconnect();
        assert!(blocker.is_active());
        drop(blocker);

        assert!(!connection.blocker().is_active());
    }

    #[test]
    fn test_scoped_connection() {
        let signal = Signal::<(i32,)>::new();
        let (slot, count) = counting_slot();

        {
            let scoped = signal.connect(&slot).unwrap().scoped();
            assert!(!scoped.connection().expired());
            signal.emit((1,));
        }
        signal.emit((1,));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(signal.connection_count(), 0);

        let kept = signal.connect(&slot).unwrap().scoped().into_inner();
        assert!(!kept.expired());
        signal.emit((1,));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_expired_when_signal_dropped() {
        let signal = Signal::<(i32,)>::new();
        let (slot, _count) = counting_slot();
        let connection = signal.connect(&slot).unwrap();

        drop(signal);
        assert!(connection.expired());
        assert_eq!(slot.connection_count(), 0);
    }

    #[test]
    fn test_expired_when_slot_dropped() {
        let signal = Signal::<(i32,)>::new();
        let (slot, _count) = counting_slot();
        let connection = signal.connect(&slot).unwrap();

        drop(slot);
        assert!(connection.expired());
        assert_eq!(signal.connection_count(), 0);
    }
}
