//! Core messaging for Switchboard.
//!
//! This crate provides an in-process publish/subscribe layer for components
//! that run on several threads:
//!
//! - **Slots**: type-checked callables with a runtime signature, invocable
//!   directly or on a worker thread
//! - **Signals**: publishers that multicast an argument tuple to every
//!   connected slot
//! - **Connections**: handles to signal/slot links, with blocking and scoped
//!   disconnection
//! - **Workers**: dedicated threads that run posted tasks in FIFO order
//! - **Registries**: signals and slots keyed by name
//!
//! # Signal/Slot Example
//!
//! ```
//! use switchboard_core::{Signal, Slot, Worker};
//!
//! fn sum(a: i32, b: i32) -> i32 {
//!     a + b
//! }
//!
//! let slot = Slot::new(sum);
//! assert_eq!(slot.call::<i32, _>((40, 2)).unwrap(), 42);
//!
//! // Slots can run on a worker thread
//! let worker = Worker::new();
//! slot.set_worker(worker.clone());
//! let future = slot.async_call::<i32, _>((40, 2)).unwrap();
//! assert_eq!(future.get().unwrap(), 42);
//!
//! // Signals fan out to every connected slot
//! let changed = Signal::<(i32, i32)>::new();
//! let connection = changed.connect(&slot).unwrap();
//! changed.emit((1, 2));
//! changed.async_emit((3, 4));
//!
//! connection.disconnect();
//! worker.stop();
//! ```
//!
//! # Argument matching
//!
//! Slots accept argument lists that start with their declared parameter
//! types; extra trailing arguments are dropped. A signal can therefore be
//! connected to any slot whose parameters are a prefix of its arguments.
//! See [`signature`] for the matching rules.

mod binder;
mod connection;
mod error;
mod future;
pub mod logging;
pub mod registry;
pub mod signal;
pub mod signature;
mod slot;
pub mod worker;

pub use binder::{Binder, MethodFn, SlotFn, new_method_slot, new_slot};
pub use connection::{Blocker, Connection, ConnectionId, ScopedConnection};
pub use error::{
    BindError, ComError, RegistryError, Result, SignalError, SlotError, WorkerError,
};
pub use future::SlotFuture;
pub use registry::{Signals, Slots};
pub use signal::{Signal, SignalBase};
pub use signature::{ArgMatch, Args, ParamType, Signature};
pub use slot::{Slot, SlotId};
pub use worker::{Worker, WorkerBuilder, WorkerConfig, WorkerId};
