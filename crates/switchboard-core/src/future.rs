//! Result handles for asynchronous slot invocations.
//!
//! Every `async_run`/`async_call` returns a [`SlotFuture`] immediately. The
//! task posted to the worker owns the matching [`Promise`] and resolves it
//! once the slot has run, or with an error if the call was cancelled.
//!
//! A `SlotFuture` can be consumed in two ways:
//!
//! - Blocking, with [`SlotFuture::wait`] / [`SlotFuture::get`]
//! - As a `std::future::Future`, from any async runtime
//!
//! # Related
//!
//! - [`crate::Slot::async_call`] - Produces a `SlotFuture<R>`
//! - [`crate::Signal::async_emit`] - Fire-and-forget; futures are discarded

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::SlotError;

enum Outcome<R> {
    Pending(Option<Waker>),
    Ready(Result<R, SlotError>),
    Taken,
}

struct FutureState<R> {
    outcome: Mutex<Outcome<R>>,
    condvar: Condvar,
}

/// The eventual result of an asynchronous slot invocation.
pub struct SlotFuture<R> {
    inner: Arc<FutureState<R>>,
}

/// The write side of a [`SlotFuture`].
///
/// Dropping an unresolved promise resolves the future with
/// [`SlotError::Abandoned`], so a waiter never blocks forever on a task that
/// was discarded or panicked.
pub(crate) struct Promise<R> {
    inner: Option<Arc<FutureState<R>>>,
}

/// Create a connected promise/future pair.
pub(crate) fn promise_pair<R>() -> (Promise<R>, SlotFuture<R>) {
    let state = Arc::new(FutureState {
        outcome: Mutex::new(Outcome::Pending(None)),
        condvar: Condvar::new(),
    });

    (
        Promise {
            inner: Some(state.clone()),
        },
        SlotFuture { inner: state },
    )
}

impl<R> Promise<R> {
    /// Resolve the future with the call's outcome.
    pub(crate) fn resolve(mut self, result: Result<R, SlotError>) {
        if let Some(state) = self.inner.take() {
            Self::complete(&state, result);
        }
    }

    fn complete(state: &FutureState<R>, result: Result<R, SlotError>) {
        let waker = {
            let mut outcome = state.outcome.lock();
            let previous = std::mem::replace(&mut *outcome, Outcome::Ready(result));
            state.condvar.notify_all();
            match previous {
                Outcome::Pending(waker) => waker,
                _ => None,
            }
        };
        // Wake outside the lock; the executor may poll immediately.
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

impl<R> Drop for Promise<R> {
    fn drop(&mut self) {
        if let Some(state) = self.inner.take() {
            Self::complete(&state, Err(SlotError::Abandoned));
        }
    }
}

impl<R> SlotFuture<R> {
    /// Check whether the result is available without blocking.
    pub fn is_ready(&self) -> bool {
        !matches!(*self.inner.outcome.lock(), Outcome::Pending(_))
    }

    /// Block until the result is available.
    pub fn wait(&self) {
        let mut outcome = self.inner.outcome.lock();
        while matches!(*outcome, Outcome::Pending(_)) {
            self.inner.condvar.wait(&mut outcome);
        }
    }

    /// Block until the result is available or the timeout elapses.
    ///
    /// Returns `true` if the result is available.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut outcome = self.inner.outcome.lock();
        // Wakeups without a resolution wait again for the remaining time
        while matches!(*outcome, Outcome::Pending(_)) {
            if self.inner.condvar.wait_until(&mut outcome, deadline).timed_out() {
                break;
            }
        }
        !matches!(*outcome, Outcome::Pending(_))
    }

    /// Block until the result is available and return it.
    pub fn get(self) -> Result<R, SlotError> {
        let mut outcome = self.inner.outcome.lock();
        while matches!(*outcome, Outcome::Pending(_)) {
            self.inner.condvar.wait(&mut outcome);
        }
        take_ready(&mut outcome)
    }
}

fn take_ready<R>(outcome: &mut Outcome<R>) -> Result<R, SlotError> {
    match std::mem::replace(outcome, Outcome::Taken) {
        Outcome::Ready(result) => result,
        // `get` consumes the future and `poll` stops after `Ready`, so a
        // second take means the future was polled after completion.
        Outcome::Taken | Outcome::Pending(_) => Err(SlotError::Abandoned),
    }
}

impl<R> Future for SlotFuture<R> {
    type Output = Result<R, SlotError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut outcome = self.inner.outcome.lock();
        if let Outcome::Pending(waker) = &mut *outcome {
            *waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        Poll::Ready(take_ready(&mut outcome))
    }
}

impl<R> fmt::Debug for SlotFuture<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotFuture")
            .field("ready", &self.is_ready())
            .finish()
    }
}

static_assertions::assert_impl_all!(SlotFuture<i32>: Send, Sync, Unpin);

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_resolve_then_get() {
        let (promise, future) = promise_pair::<i32>();
        assert!(!future.is_ready());
        promise.resolve(Ok(42));
        assert!(future.is_ready());
        assert_eq!(future.get(), Ok(42));
    }

    #[test]
    fn test_get_blocks_until_resolved() {
        let (promise, future) = promise_pair::<String>();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            promise.resolve(Ok("done".to_string()));
        });

        assert_eq!(future.get(), Ok("done".to_string()));
        handle.join().unwrap();
    }

    #[test]
    fn test_dropped_promise_abandons() {
        let (promise, future) = promise_pair::<()>();
        drop(promise);
        assert_eq!(future.get(), Err(SlotError::Abandoned));
    }

    #[test]
    fn test_error_is_delivered() {
        let (promise, future) = promise_pair::<()>();
        promise.resolve(Err(SlotError::WorkerChanged));
        future.wait();
        assert_eq!(future.get(), Err(SlotError::WorkerChanged));
    }

    #[test]
    fn test_wait_timeout() {
        let (promise, future) = promise_pair::<u8>();
        assert!(!future.wait_timeout(Duration::from_millis(10)));
        promise.resolve(Ok(1));
        assert!(future.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_wait_timeout_ignores_early_wakeup() {
        let (promise, future) = promise_pair::<u8>();
        let state = future.inner.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            // Wake the waiter without resolving
            state.condvar.notify_all();
            thread::sleep(Duration::from_millis(40));
            promise.resolve(Ok(3));
        });

        assert!(future.wait_timeout(Duration::from_secs(5)));
        assert_eq!(future.get(), Ok(3));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_waits_full_duration() {
        let (_promise, future) = promise_pair::<u8>();
        let started = Instant::now();
        assert!(!future.wait_timeout(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_await_future() {
        let (promise, future) = promise_pair::<i32>();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            promise.resolve(Ok(7));
        });

        assert_eq!(future.await, Ok(7));
        handle.join().unwrap();
    }
}
