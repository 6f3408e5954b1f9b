//! Single-threaded task queues.
//!
//! A [`Worker`] owns one dedicated thread and a FIFO queue of zero-argument
//! tasks. It is the unit of thread affinity for slots: a slot bound to a
//! worker runs its asynchronous invocations on that worker's thread, in the
//! order they were posted.
//!
//! # Example
//!
//! ```
//! use switchboard_core::Worker;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let worker = Worker::new();
//! let counter = Arc::new(AtomicUsize::new(0));
//!
//! for _ in 0..3 {
//!     let counter = counter.clone();
//!     worker.post(move || {
//!         counter.fetch_add(1, Ordering::SeqCst);
//!     }).unwrap();
//! }
//!
//! // Drains the queue before returning
//! worker.stop();
//! assert_eq!(counter.load(Ordering::SeqCst), 3);
//! assert!(worker.post(|| {}).is_err());
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use crate::error::WorkerError;
use crate::logging::{span_names, targets};

/// Counter for unique worker IDs.
static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a worker.
///
/// Two handles to the same worker share an ID; distinct workers never do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Configuration for creating a Worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name for the worker thread.
    pub name: String,
    /// Stack size for the worker thread in bytes. `None` uses the default.
    pub stack_size: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "switchboard-worker".to_string(),
            stack_size: None,
        }
    }
}

impl WorkerConfig {
    /// Create a new configuration with the given thread name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Builder for creating Workers with custom configuration.
#[derive(Debug, Default)]
pub struct WorkerBuilder {
    config: WorkerConfig,
}

impl WorkerBuilder {
    /// Create a new WorkerBuilder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the thread name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the stack size for the worker thread.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Spawn the worker thread.
    pub fn spawn(self) -> Result<Worker, WorkerError> {
        Worker::with_config(self.config)
    }
}

/// A unit of work posted to a worker.
pub type Task = Box<dyn FnOnce() + Send>;

enum WorkerTask {
    Execute(Task),
    Shutdown,
}

/// State shared between the worker handles and the worker thread.
struct WorkerState {
    /// Whether the worker accepts new tasks.
    running: AtomicBool,
    /// Count of tasks posted but not yet finished.
    pending_tasks: AtomicUsize,
}

struct WorkerInner {
    id: WorkerId,
    name: String,
    thread_id: ThreadId,
    task_sender: Sender<WorkerTask>,
    /// Held across the running check and the send, so `Shutdown` is always
    /// the last message queued.
    send_lock: Mutex<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
    state: Arc<WorkerState>,
}

impl WorkerInner {
    fn request_stop(&self) -> bool {
        let _send = self.send_lock.lock();
        let was_running = self.state.running.swap(false, Ordering::AcqRel);
        if was_running {
            // The receiver only disappears once the thread exits
            let _ = self.task_sender.send(WorkerTask::Shutdown);
        }
        was_running
    }
}

impl Drop for WorkerInner {
    fn drop(&mut self) {
        // Don't block in drop - the last handle may live on the worker itself
        if self.request_stop() {
            tracing::debug!(target: targets::WORKER, worker = %self.id, "last handle dropped, worker shutting down");
        }
    }
}

/// A dedicated thread with its own FIFO task queue.
///
/// `Worker` is a cheap, clonable handle; clones refer to the same thread and
/// compare equal. The thread shuts down once [`stop`](Self::stop) is called
/// or the last handle is dropped, after draining queued tasks.
///
/// # Thread Safety
///
/// `Worker` is `Send + Sync`. Any thread may post tasks; they run on the
/// worker thread strictly in post order.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

impl Worker {
    /// Create and start a worker with default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the operating system fails to create the thread, like
    /// `std::thread::spawn`. Use [`WorkerBuilder::spawn`] to handle the error.
    pub fn new() -> Self {
        Self::with_config(WorkerConfig::default()).expect("failed to spawn worker thread")
    }

    /// Create and start a worker with custom configuration.
    pub fn with_config(config: WorkerConfig) -> Result<Self, WorkerError> {
        let (sender, receiver) = unbounded();
        let state = Arc::new(WorkerState {
            running: AtomicBool::new(true),
            pending_tasks: AtomicUsize::new(0),
        });
        let id = WorkerId(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed));

        let mut builder = thread::Builder::new().name(config.name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let thread_state = state.clone();
        let handle = builder
            .spawn(move || {
                worker_loop(id, receiver, &thread_state);
                thread_state.running.store(false, Ordering::Release);
            })
            .map_err(WorkerError::Spawn)?;

        tracing::debug!(target: targets::WORKER, worker = %id, name = %config.name, "worker started");

        Ok(Self {
            inner: Arc::new(WorkerInner {
                id,
                name: config.name,
                thread_id: handle.thread().id(),
                task_sender: sender,
                send_lock: Mutex::new(()),
                handle: Mutex::new(Some(handle)),
                state,
            }),
        })
    }

    /// Create a worker through a [`WorkerBuilder`].
    pub fn builder() -> WorkerBuilder {
        WorkerBuilder::new()
    }

    /// The identity of this worker.
    pub fn id(&self) -> WorkerId {
        self.inner.id
    }

    /// The worker's thread name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The ID of the worker's thread.
    pub fn thread_id(&self) -> ThreadId {
        self.inner.thread_id
    }

    /// Check whether the calling thread is this worker's thread.
    pub fn is_current_thread(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    /// Check if the worker still accepts tasks.
    pub fn is_running(&self) -> bool {
        self.inner.state.running.load(Ordering::Acquire)
    }

    /// Get the number of posted tasks that have not finished yet.
    pub fn pending_tasks(&self) -> usize {
        self.inner.state.pending_tasks.load(Ordering::Acquire)
    }

    /// Post a task to run on the worker thread.
    ///
    /// Tasks run in post order. Fails with [`WorkerError::Stopped`] once the
    /// worker has been stopped.
    pub fn post<F>(&self, task: F) -> Result<(), WorkerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let _send = self.inner.send_lock.lock();
        if !self.is_running() {
            return Err(WorkerError::Stopped);
        }

        self.inner.state.pending_tasks.fetch_add(1, Ordering::AcqRel);

        match self
            .inner
            .task_sender
            .send(WorkerTask::Execute(Box::new(task)))
        {
            Ok(()) => Ok(()),
            Err(_) => {
                self.inner.state.pending_tasks.fetch_sub(1, Ordering::AcqRel);
                Err(WorkerError::Stopped)
            }
        }
    }

    /// Stop the worker after draining its queue.
    ///
    /// Blocks until the worker thread has finished every task posted before
    /// the call, unless called from the worker thread itself, in which case
    /// shutdown is only requested. Calling `stop` more than once is harmless.
    pub fn stop(&self) {
        if self.inner.request_stop() {
            tracing::debug!(target: targets::WORKER, worker = %self.inner.id, "stop requested");
        }

        if self.is_current_thread() {
            return;
        }

        let handle = self.inner.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!(target: targets::WORKER, worker = %self.inner.id, "worker thread panicked");
            }
        }
    }
}

impl Default for Worker {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Worker {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Worker {}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("running", &self.is_running())
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}

static_assertions::assert_impl_all!(Worker: Send, Sync, Clone);

/// The main worker loop that processes tasks.
fn worker_loop(id: WorkerId, receiver: Receiver<WorkerTask>, state: &WorkerState) {
    while let Ok(task) = receiver.recv() {
        match task {
            WorkerTask::Execute(task) => run_task(id, task, state),
            WorkerTask::Shutdown => {
                // Process remaining tasks before exiting
                while let Ok(task) = receiver.try_recv() {
                    if let WorkerTask::Execute(task) = task {
                        run_task(id, task, state);
                    }
                }
                break;
            }
        }
    }
    tracing::debug!(target: targets::WORKER, worker = %id, "worker stopped");
}

fn run_task(id: WorkerId, task: Task, state: &WorkerState) {
    let span = tracing::trace_span!(target: targets::WORKER, span_names::WORKER_TASK, worker = %id);
    let _entered = span.enter();

    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        tracing::error!(target: targets::WORKER, worker = %id, "task panicked");
    }
    state.pending_tasks.fetch_sub(1, Ordering::AcqRel);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::time::Duration;

    #[test]
    fn test_worker_creation() {
        let worker = Worker::new();
        assert!(worker.is_running());
        assert_eq!(worker.pending_tasks(), 0);
        worker.stop();
        assert!(!worker.is_running());
    }

    #[test]
    fn test_worker_with_config() {
        let worker = WorkerBuilder::new()
            .name("test-worker")
            .stack_size(256 * 1024)
            .spawn()
            .unwrap();

        assert_eq!(worker.name(), "test-worker");
        let (tx, rx) = crossbeam_channel::bounded(1);
        worker
            .post(move || {
                let _ = tx.send(thread::current().name().map(str::to_string));
            })
            .unwrap();
        assert_eq!(rx.recv().unwrap().as_deref(), Some("test-worker"));
        worker.stop();
    }

    #[test]
    fn test_sequential_processing() {
        let worker = Worker::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..10 {
            let order_clone = order.clone();
            worker
                .post(move || {
                    order_clone.lock().push(i);
                })
                .unwrap();
        }

        worker.stop();

        assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_graceful_shutdown_drains_queue() {
        let worker = Worker::new();
        let counter = Arc::new(AtomicI32::new(0));

        for _ in 0..5 {
            let counter_clone = counter.clone();
            worker
                .post(move || {
                    thread::sleep(Duration::from_millis(10));
                    counter_clone.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        worker.stop();

        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(worker.pending_tasks(), 0);
    }

    #[test]
    fn test_post_after_stop() {
        let worker = Worker::new();
        worker.stop();

        let result = worker.post(|| {});
        assert!(matches!(result, Err(WorkerError::Stopped)));

        // Stopping twice is harmless
        worker.stop();
    }

    #[test]
    fn test_tasks_run_on_worker_thread() {
        let worker = Worker::new();
        let (tx, rx) = crossbeam_channel::bounded(1);

        worker
            .post(move || {
                let _ = tx.send(thread::current().id());
            })
            .unwrap();

        assert_eq!(rx.recv().unwrap(), worker.thread_id());
        assert!(!worker.is_current_thread());
        worker.stop();
    }

    #[test]
    fn test_worker_identity() {
        let w1 = Worker::new();
        let w2 = Worker::new();
        let w1_clone = w1.clone();

        assert_eq!(w1, w1_clone);
        assert_ne!(w1, w2);
        assert_ne!(w1.id(), w2.id());

        w1.stop();
        w2.stop();
    }

    #[test]
    fn test_multiple_posters() {
        let worker = Worker::new();
        let counter = Arc::new(AtomicI32::new(0));

        let mut handles = vec![];
        for _ in 0..5 {
            let w = worker.clone();
            let c = counter.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..10 {
                    let c2 = c.clone();
                    w.post(move || {
                        c2.fetch_add(1, Ordering::SeqCst);
                    })
                    .unwrap();
                }
            }));
        }

        for h in handles {
            h.join().unwrap();
        }

        worker.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let worker = Worker::new();
        let counter = Arc::new(AtomicI32::new(0));

        worker.post(|| panic!("boom")).unwrap();
        let counter_clone = counter.clone();
        worker
            .post(move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        worker.stop();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_from_worker_thread() {
        let worker = Worker::new();
        let inner = worker.clone();
        let (tx, rx) = crossbeam_channel::bounded(1);

        worker
            .post(move || {
                // Must not deadlock joining itself
                inner.stop();
                let _ = tx.send(inner.is_running());
            })
            .unwrap();

        assert_eq!(rx.recv().unwrap(), false);
        worker.stop();
    }

    #[test]
    fn test_drop_last_handle_shuts_down() {
        let worker = Worker::new();
        let (tx, rx) = crossbeam_channel::bounded(1);
        worker
            .post(move || {
                thread::sleep(Duration::from_millis(20));
                let _ = tx.send(());
            })
            .unwrap();
        drop(worker);

        // Queued work still completes
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_posts_racing_stop_all_run() {
        for _ in 0..20 {
            let worker = Worker::new();
            let executed = Arc::new(AtomicI32::new(0));

            let posters: Vec<_> = (0..4)
                .map(|_| {
                    let worker = worker.clone();
                    let executed = executed.clone();
                    thread::spawn(move || {
                        let mut accepted = 0;
                        for _ in 0..200 {
                            let executed = executed.clone();
                            let posted = worker.post(move || {
                                executed.fetch_add(1, Ordering::SeqCst);
                            });
                            if posted.is_ok() {
                                accepted += 1;
                            }
                        }
                        accepted
                    })
                })
                .collect();

            thread::sleep(Duration::from_micros(200));
            worker.stop();

            let accepted: i32 = posters.into_iter().map(|h| h.join().unwrap()).sum();
            // Every accepted task ran before the thread exited
            assert_eq!(executed.load(Ordering::SeqCst), accepted);
            assert_eq!(worker.pending_tasks(), 0);
        }
    }
}
