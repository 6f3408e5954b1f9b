//! Invocable subscriber units.
//!
//! A [`Slot`] wraps a callable together with its runtime [`Signature`] and an
//! optional [`Worker`]. It can be invoked directly on the calling thread
//! ([`run`](Slot::run), [`call`](Slot::call)) or posted to a worker
//! ([`async_run`](Slot::async_run), [`async_call`](Slot::async_call)).
//!
//! # Argument matching
//!
//! Arguments are supplied as tuples. A slot accepts any argument list whose
//! leading elements have its parameter types; extra trailing arguments are
//! dropped before the call. This lets one signal fan out to slots that only
//! care about a prefix of its arguments:
//!
//! ```
//! use switchboard_core::Slot;
//!
//! let sum = Slot::new(|a: i32, b: i32| a + b);
//! assert_eq!(sum.call::<i32, _>((40, 2)).unwrap(), 42);
//! // The trailing string is ignored
//! assert_eq!(sum.call::<i32, _>((40, 2, "ignored")).unwrap(), 42);
//! // Too few arguments cannot be matched
//! assert!(sum.run((40,)).is_err());
//! ```
//!
//! # Weak calls
//!
//! A call posted to the slot's bound worker only holds a weak reference to
//! the slot. Right before running on the worker thread it re-checks that the
//! slot is still alive and still bound to that same worker; if
//! [`set_worker`](Slot::set_worker) moved the slot in the meantime, the call
//! is skipped and its future resolves with [`SlotError::WorkerChanged`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::binder::{MethodFn, SlotFn};
use crate::connection::{ConnectionId, ConnectionInner};
use crate::error::SlotError;
use crate::future::{SlotFuture, promise_pair};
use crate::logging::targets;
use crate::signature::{ArgMatch, ArgValue, Args, ParamType, ReturnValue, Signature};
use crate::worker::{Worker, WorkerId};

/// Type-erased callable stored in a slot.
///
/// Receives exactly `arity` values of the declared parameter types and
/// returns `None` only if a value fails to downcast.
pub(crate) type Invoker = Arc<dyn Fn(Vec<ArgValue>) -> Option<ReturnValue> + Send + Sync>;

/// Counter for unique slot IDs.
static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a slot, shared by all clones of its handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u64);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

/// Which flavour of invocation failed, to pick the error variant.
#[derive(Clone, Copy)]
enum Invocation {
    Run,
    Call,
}

impl Invocation {
    fn error(self, message: String) -> SlotError {
        match self {
            Self::Run => SlotError::BadRun(message),
            Self::Call => SlotError::BadCall(message),
        }
    }
}

/// Where an asynchronous invocation is posted.
enum Target<'a> {
    /// The slot's bound worker; the weak-call check applies.
    Bound,
    /// A worker supplied by the caller.
    Explicit(Option<&'a Worker>),
}

pub(crate) struct SlotInner {
    id: SlotId,
    name: Option<String>,
    signature: Signature,
    invoker: Invoker,
    worker: RwLock<Option<Worker>>,
    connections: Mutex<Vec<(ConnectionId, Weak<ConnectionInner>)>>,
}

impl SlotInner {
    pub(crate) fn id(&self) -> SlotId {
        self.id
    }

    pub(crate) fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("'{name}' ({})", self.id),
            None => self.id.to_string(),
        }
    }

    fn worker_id(&self) -> Option<WorkerId> {
        self.worker.read().as_ref().map(Worker::id)
    }

    /// Record a connection on the slot side.
    ///
    /// A disconnect marks the link before detaching it, so checking under the
    /// lock means a link cut before this point is never recorded.
    pub(crate) fn attach(&self, connection: &Arc<ConnectionInner>) {
        let mut connections = self.connections.lock();
        if connection.is_connected() {
            connections.push((connection.id(), Arc::downgrade(connection)));
        }
    }

    pub(crate) fn detach(&self, id: ConnectionId) {
        self.connections.lock().retain(|(conn_id, _)| *conn_id != id);
    }

    fn connection_count(&self) -> usize {
        self.connections
            .lock()
            .iter()
            .filter(|(_, weak)| weak.upgrade().is_some_and(|conn| conn.is_connected()))
            .count()
    }

    /// Match the supplied arguments and truncate them to the slot's arity.
    fn prepare(
        &self,
        supplied: &[ParamType],
        mut values: Vec<ArgValue>,
        invocation: Invocation,
    ) -> Result<Vec<ArgValue>, SlotError> {
        match self.signature.match_args(supplied) {
            ArgMatch::Exact => Ok(values),
            ArgMatch::Truncated { dropped } => {
                tracing::trace!(target: targets::SLOT, slot = %self.id, dropped, "dropping trailing arguments");
                values.truncate(self.signature.arity());
                Ok(values)
            }
            mismatch => Err(invocation.error(format!(
                "slot {} {} cannot take the supplied arguments: {mismatch}",
                self.label(),
                self.signature
            ))),
        }
    }

    fn invoke(&self, values: Vec<ArgValue>, invocation: Invocation) -> Result<ReturnValue, SlotError> {
        (self.invoker)(values).ok_or_else(|| {
            invocation.error(format!("slot {} rejected its arguments", self.label()))
        })
    }

    fn check_return<R: 'static>(&self) -> Result<(), SlotError> {
        if self.signature.ret().is::<R>() {
            Ok(())
        } else {
            Err(SlotError::BadCall(format!(
                "slot {} returns {}, not {}",
                self.label(),
                self.signature.ret(),
                std::any::type_name::<R>()
            )))
        }
    }

    /// Synchronous run with type-erased arguments, used by signal emission.
    pub(crate) fn run_values(
        &self,
        supplied: &[ParamType],
        values: Vec<ArgValue>,
    ) -> Result<(), SlotError> {
        let values = self.prepare(supplied, values, Invocation::Run)?;
        self.invoke(values, Invocation::Run).map(drop)
    }

    /// Asynchronous run on the bound worker with type-erased arguments.
    pub(crate) fn async_run_values(
        self: &Arc<Self>,
        supplied: &[ParamType],
        values: Vec<ArgValue>,
    ) -> Result<SlotFuture<()>, SlotError> {
        self.post(Target::Bound, supplied, values, Invocation::Run, |_| Ok(()))
    }

    fn post<R, C>(
        self: &Arc<Self>,
        target: Target<'_>,
        supplied: &[ParamType],
        values: Vec<ArgValue>,
        invocation: Invocation,
        convert: C,
    ) -> Result<SlotFuture<R>, SlotError>
    where
        R: Send + 'static,
        C: FnOnce(ReturnValue) -> Result<R, SlotError> + Send + 'static,
    {
        let values = self.prepare(supplied, values, invocation)?;

        let (worker, expected) = match target {
            Target::Bound => {
                let worker = self.worker.read().clone().ok_or(SlotError::NoWorker)?;
                let id = worker.id();
                (worker, Some(id))
            }
            Target::Explicit(Some(worker)) => (worker.clone(), None),
            Target::Explicit(None) => return Err(SlotError::NoWorker),
        };

        let (promise, future) = promise_pair();
        let weak = Arc::downgrade(self);
        worker.post(move || {
            let result = weak_call(&weak, expected, values, invocation).and_then(convert);
            promise.resolve(result);
        })?;

        tracing::trace!(target: targets::SLOT, slot = %self.id, worker = %worker.id(), "posted asynchronous call");
        Ok(future)
    }
}

/// Body of a posted call, evaluated on the target worker's thread.
fn weak_call(
    weak: &Weak<SlotInner>,
    expected: Option<WorkerId>,
    values: Vec<ArgValue>,
    invocation: Invocation,
) -> Result<ReturnValue, SlotError> {
    let slot = weak.upgrade().ok_or(SlotError::SlotDropped)?;

    if let Some(expected) = expected {
        let current = slot.worker_id();
        if current != Some(expected) {
            tracing::debug!(
                target: targets::SLOT,
                slot = %slot.id,
                posted_to = %expected,
                bound_to = ?current,
                "slot worker changed, skipping call"
            );
            return Err(SlotError::WorkerChanged);
        }
    }

    slot.invoke(values, invocation)
}

fn downcast_return<R: 'static>(value: ReturnValue) -> Result<R, SlotError> {
    value
        .downcast::<R>()
        .map(|boxed| *boxed)
        .map_err(|_| SlotError::BadCall(format!("return value is not {}", std::any::type_name::<R>())))
}

impl Drop for SlotInner {
    fn drop(&mut self) {
        let connections = std::mem::take(self.connections.get_mut());
        for (_, weak) in connections {
            if let Some(connection) = weak.upgrade() {
                connection.disconnect_signal_side();
            }
        }
    }
}

/// A type-checked, invocable subscriber.
///
/// `Slot` is a shared handle: clones refer to the same slot. The slot lives
/// until its last handle is dropped, at which point every connection to it
/// is disconnected. Signals only keep weak references to their slots.
///
/// Build slots with [`Slot::new`], [`Slot::from_method`] or a
/// [`Binder`](crate::Binder) when leading arguments should be pre-bound.
#[derive(Clone)]
pub struct Slot {
    inner: Arc<SlotInner>,
}

impl Slot {
    /// Create a slot from a function or closure.
    ///
    /// ```
    /// use switchboard_core::Slot;
    ///
    /// fn sum(a: i32, b: i32) -> i32 {
    ///     a + b
    /// }
    ///
    /// let slot = Slot::new(sum);
    /// assert_eq!(slot.arity(), 2);
    /// assert_eq!(slot.signature().to_string(), "fn(i32, i32) -> i32");
    /// ```
    pub fn new<F, A, R>(f: F) -> Self
    where
        F: SlotFn<A, R>,
        R: 'static,
    {
        let signature = Signature::new(F::param_types(), ParamType::of::<R>());
        Self::from_parts(signature, f.into_invoker(), None, None)
    }

    /// Create a slot from a method bound to a shared receiver.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicI32, Ordering};
    /// use switchboard_core::Slot;
    ///
    /// struct Counter(AtomicI32);
    ///
    /// impl Counter {
    ///     fn add(&self, n: i32) -> i32 {
    ///         self.0.fetch_add(n, Ordering::SeqCst) + n
    ///     }
    /// }
    ///
    /// let counter = Arc::new(Counter(AtomicI32::new(0)));
    /// let slot = Slot::from_method(counter.clone(), Counter::add);
    /// assert_eq!(slot.call::<i32, _>((5,)).unwrap(), 5);
    /// ```
    pub fn from_method<T, F, A, R>(receiver: Arc<T>, method: F) -> Self
    where
        F: MethodFn<T, A, R>,
        R: 'static,
    {
        let signature = Signature::new(F::param_types(), ParamType::of::<R>());
        Self::from_parts(signature, method.into_invoker(receiver), None, None)
    }

    pub(crate) fn from_parts(
        signature: Signature,
        invoker: Invoker,
        name: Option<String>,
        worker: Option<Worker>,
    ) -> Self {
        Self {
            inner: Arc::new(SlotInner {
                id: SlotId(NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed)),
                name,
                signature,
                invoker,
                worker: RwLock::new(worker),
                connections: Mutex::new(Vec::new()),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<SlotInner> {
        &self.inner
    }

    /// The identity of this slot.
    pub fn id(&self) -> SlotId {
        self.inner.id
    }

    /// The slot's name, if it was given one.
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// The slot's call signature.
    pub fn signature(&self) -> &Signature {
        &self.inner.signature
    }

    /// Number of parameters the slot declares.
    pub fn arity(&self) -> usize {
        self.inner.signature.arity()
    }

    /// Number of signals this slot is currently connected to.
    pub fn connection_count(&self) -> usize {
        self.inner.connection_count()
    }

    /// The worker asynchronous calls are posted to, if any.
    pub fn worker(&self) -> Option<Worker> {
        self.inner.worker.read().clone()
    }

    /// Bind the slot to a worker, or unbind it with `None`.
    ///
    /// Calls already posted to the previous worker that have not started yet
    /// will resolve with [`SlotError::WorkerChanged`] instead of running.
    pub fn set_worker(&self, worker: impl Into<Option<Worker>>) {
        let worker = worker.into();
        tracing::debug!(
            target: targets::SLOT,
            slot = %self.inner.id,
            worker = ?worker.as_ref().map(Worker::id),
            "rebinding slot worker"
        );
        // Swap under the lock, drop the previous handle outside it
        let previous = std::mem::replace(&mut *self.inner.worker.write(), worker);
        drop(previous);
    }

    /// Invoke the slot on the calling thread, discarding its result.
    ///
    /// Fails with [`SlotError::BadRun`] if the arguments cannot be matched.
    pub fn run<A: Args>(&self, args: A) -> Result<(), SlotError> {
        self.inner.run_values(&A::param_types(), args.into_values())
    }

    /// Invoke the slot on the calling thread and return its result.
    ///
    /// Fails with [`SlotError::BadCall`] if the arguments cannot be matched or
    /// `R` is not the slot's return type.
    pub fn call<R: 'static, A: Args>(&self, args: A) -> Result<R, SlotError> {
        let values = self
            .inner
            .prepare(&A::param_types(), args.into_values(), Invocation::Call)?;
        self.inner.check_return::<R>()?;
        let value = self.inner.invoke(values, Invocation::Call)?;
        downcast_return(value)
    }

    /// Post the slot to its bound worker, discarding its result.
    ///
    /// Returns immediately. Argument mismatches fail with
    /// [`SlotError::BadRun`] and an unbound slot with [`SlotError::NoWorker`],
    /// both at call time rather than through the future.
    pub fn async_run<A: Args>(&self, args: A) -> Result<SlotFuture<()>, SlotError> {
        self.inner.post(
            Target::Bound,
            &A::param_types(),
            args.into_values(),
            Invocation::Run,
            |_| Ok(()),
        )
    }

    /// Post the slot to its bound worker and return a future of its result.
    pub fn async_call<R, A>(&self, args: A) -> Result<SlotFuture<R>, SlotError>
    where
        R: Send + 'static,
        A: Args,
    {
        self.post_call(Target::Bound, args)
    }

    /// Post the slot to `worker` instead of its bound worker.
    ///
    /// Fails with [`SlotError::NoWorker`] if `worker` is `None`. The slot's
    /// own binding is neither used nor checked.
    pub fn async_run_on<A: Args>(
        &self,
        worker: Option<&Worker>,
        args: A,
    ) -> Result<SlotFuture<()>, SlotError> {
        self.inner.post(
            Target::Explicit(worker),
            &A::param_types(),
            args.into_values(),
            Invocation::Run,
            |_| Ok(()),
        )
    }

    /// Post the slot to `worker` and return a future of its result.
    pub fn async_call_on<R, A>(
        &self,
        worker: Option<&Worker>,
        args: A,
    ) -> Result<SlotFuture<R>, SlotError>
    where
        R: Send + 'static,
        A: Args,
    {
        self.post_call(Target::Explicit(worker), args)
    }

    fn post_call<R, A>(&self, target: Target<'_>, args: A) -> Result<SlotFuture<R>, SlotError>
    where
        R: Send + 'static,
        A: Args,
    {
        let supplied = A::param_types();
        if !self.inner.signature.match_args(&supplied).is_callable() {
            // Report the argument mismatch ahead of the return type
            self.inner.prepare(&supplied, Vec::new(), Invocation::Call)?;
        }
        self.inner.check_return::<R>()?;
        self.inner.post(
            target,
            &supplied,
            args.into_values(),
            Invocation::Call,
            downcast_return::<R>,
        )
    }
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Slot {}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("signature", &self.inner.signature.to_string())
            .field("worker", &self.inner.worker_id())
            .finish()
    }
}

static_assertions::assert_impl_all!(Slot: Send, Sync, Clone);
