//! Logging facilities for Switchboard.
//!
//! Switchboard uses the `tracing` crate for instrumentation. Nothing is
//! printed unless the application installs a subscriber:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("switchboard_core::signal=trace")
//!         .init();
//! }
//! ```
//!
//! Failures that multicast delivery swallows on purpose (a subscriber with an
//! incompatible signature, a slot without a worker, a weak call cancelled by a
//! worker swap) are reported here rather than to the emitter.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core framework target.
    pub const CORE: &str = "switchboard_core";
    /// Signal emission and connection management.
    pub const SIGNAL: &str = "switchboard_core::signal";
    /// Slot dispatch, including weak-call cancellation.
    pub const SLOT: &str = "switchboard_core::slot";
    /// Connection lifecycle and blocking.
    pub const CONNECTION: &str = "switchboard_core::connection";
    /// Worker threads and their queues.
    pub const WORKER: &str = "switchboard_core::worker";
    /// Keyed signal/slot registries.
    pub const REGISTRY: &str = "switchboard_core::registry";
}

/// Span names used throughout Switchboard for tracing.
pub mod span_names {
    /// Synchronous emission span.
    pub const EMIT: &str = "switchboard::emit";
    /// Asynchronous emission span.
    pub const ASYNC_EMIT: &str = "switchboard::async_emit";
    /// Worker task execution span.
    pub const WORKER_TASK: &str = "switchboard::worker_task";
}

#[macro_export]
macro_rules! sb_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "switchboard_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! sb_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "switchboard_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! sb_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "switchboard_core", $($arg)*)
    };
}

#[macro_export]
macro_rules! sb_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "switchboard_core", $($arg)*)
    };
}
