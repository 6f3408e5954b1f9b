//! Error types for Switchboard.

use std::io;

/// The main error type for Switchboard operations.
///
/// Each subsystem has its own error enum; this type wraps them so callers
/// mixing signals, slots and workers can propagate with a single `?`.
#[derive(Debug, thiserror::Error)]
pub enum ComError {
    /// Slot invocation error.
    #[error("Slot error: {0}")]
    Slot(#[from] SlotError),
    /// Signal connection error.
    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),
    /// Worker error.
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
    /// Slot construction error.
    #[error("Bind error: {0}")]
    Bind(#[from] BindError),
    /// Keyed registry error.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Errors raised when invoking a slot, synchronously or through a worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    /// The supplied arguments could not be matched to the slot's parameters
    /// for a `run`/`async_run`.
    #[error("Bad run: {0}")]
    BadRun(String),
    /// The supplied arguments or the requested return type could not be
    /// matched for a `call`/`async_call`.
    #[error("Bad call: {0}")]
    BadCall(String),
    /// Asynchronous invocation without a bound or explicit worker.
    #[error("No worker available for asynchronous invocation")]
    NoWorker,
    /// The slot was rebound to another worker between posting and running.
    #[error("Slot worker changed before the call could run")]
    WorkerChanged,
    /// The target worker no longer accepts tasks.
    #[error("Worker has been stopped")]
    WorkerStopped,
    /// The slot was dropped before a queued call could run.
    #[error("Slot has been dropped")]
    SlotDropped,
    /// The queued call was discarded without producing a result.
    #[error("Asynchronous call was abandoned before completion")]
    Abandoned,
}

impl From<WorkerError> for SlotError {
    fn from(_: WorkerError) -> Self {
        Self::WorkerStopped
    }
}

/// Signal connection errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignalError {
    /// The slot cannot be connected to (or is not connected to) the signal.
    #[error("Bad slot: {0}")]
    BadSlot(String),
    /// The slot is already connected to this signal.
    #[error("Slot already connected")]
    AlreadyConnected,
}

/// Worker errors.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The worker has been stopped and rejects new tasks.
    #[error("Worker has been stopped")]
    Stopped,
    /// The worker thread could not be spawned.
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Errors raised while building a slot from a callable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    /// More leading arguments were bound than the callable accepts.
    #[error("Cannot bind {bound} argument(s) to a callable of arity {arity}")]
    TooManyArguments { bound: usize, arity: usize },
    /// A bound value does not have the type of the parameter it binds.
    #[error("Bound argument {index} has type {found}, expected {expected}")]
    TypeMismatch {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
}

/// Keyed registry errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No signal is registered under the key.
    #[error("Unknown signal '{0}'")]
    UnknownSignal(String),
    /// No slot is registered under the key.
    #[error("Unknown slot '{0}'")]
    UnknownSlot(String),
    /// The signal registered under the key has a different argument type.
    #[error("Signal '{0}' does not carry the requested argument types")]
    SignatureMismatch(String),
}

/// A specialized Result type for Switchboard operations.
pub type Result<T> = std::result::Result<T, ComError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_error_maps_to_stopped() {
        let err: SlotError = WorkerError::Stopped.into();
        assert_eq!(err, SlotError::WorkerStopped);
    }

    #[test]
    fn test_com_error_wraps_sources() {
        let err: ComError = SignalError::AlreadyConnected.into();
        assert!(matches!(err, ComError::Signal(SignalError::AlreadyConnected)));
        assert_eq!(err.to_string(), "Signal error: Slot already connected");
    }

    #[test]
    fn test_bind_error_display() {
        let err = BindError::TooManyArguments { bound: 3, arity: 2 };
        assert_eq!(err.to_string(), "Cannot bind 3 argument(s) to a callable of arity 2");
    }
}
