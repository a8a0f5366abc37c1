//! Serial task queues: the ordering primitive behind every manager subsystem.
//!
//! Each subsystem (screens, sessions, focus) owns exactly one queue.  Work that
//! crosses a subsystem boundary is never executed on the caller's thread; it is
//! posted to the owning queue and runs there strictly in submission order.
//!
//! # Two implementations
//!
//! - [`SerialTaskQueue`] – one named worker thread draining a FIFO of boxed
//!   closures, plus a deadline heap for delayed tasks.  Used by the server.
//! - [`ImmediateTaskQueue`] – runs tasks on the posting thread.  A task posted
//!   while another task is running is parked and drained afterwards, so the
//!   FIFO guarantee still holds.  Delayed tasks wait until
//!   [`ImmediateTaskQueue::fire_delayed`] is called, which makes debounce logic
//!   deterministic in unit tests.
//!
//! # Blocking with a timeout
//!
//! [`run_sync`](trait.TaskQueue.html#method.run_sync) posts a closure and
//! blocks the caller until it has produced a value or the timeout elapses.  A
//! timeout yields `None` rather than hanging.  Calling it from the queue's own
//! worker runs the closure inline instead of deadlocking on itself.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, warn};

/// A unit of work posted to a queue.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Errors raised while creating a queue.
#[derive(Debug, Error)]
pub enum TaskQueueError {
    /// The OS refused to spawn the worker thread.
    #[error("failed to spawn worker thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// A single-consumer FIFO of closures.
pub trait TaskQueue: Send + Sync {
    /// Appends `task` to the queue.
    fn post(&self, task: Task);

    /// Runs `task` no earlier than `delay` from now.
    fn post_delayed(&self, task: Task, delay: Duration);

    /// Returns `true` when the calling thread is the one draining this queue.
    fn is_current(&self) -> bool;
}

impl dyn TaskQueue {
    /// Runs `f` on the queue and waits up to `timeout` for its result.
    ///
    /// Returns `None` if the task did not complete in time (or the queue has
    /// shut down and dropped it).
    pub fn run_sync<R, F>(&self, timeout: Duration, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_current() {
            return Some(f());
        }
        let (tx, rx) = mpsc::channel();
        self.post(Box::new(move || {
            // The waiter may already have timed out; nothing to do then.
            let _ = tx.send(f());
        }));
        match rx.recv_timeout(timeout) {
            Ok(value) => Some(value),
            Err(RecvTimeoutError::Timeout) => {
                warn!("queued task did not complete within {timeout:?}");
                None
            }
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

fn run_task(queue: &str, task: Task) {
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        error!("task on queue {queue} panicked; worker keeps running");
    }
}

// ── SerialTaskQueue ───────────────────────────────────────────────────────────

enum Message {
    Run(Task),
    Delayed(Task, Instant),
    Shutdown,
}

struct DelayedTask {
    deadline: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for DelayedTask {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for DelayedTask {}

impl PartialOrd for DelayedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedTask {
    // Reversed so that `BinaryHeap` (a max-heap) pops the earliest deadline.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A queue drained by one dedicated, named worker thread.
pub struct SerialTaskQueue {
    name: String,
    sender: Mutex<Option<Sender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl SerialTaskQueue {
    /// Spawns the worker thread and returns the queue handle.
    ///
    /// # Errors
    ///
    /// Returns [`TaskQueueError::Spawn`] if the thread cannot be created.
    pub fn spawn(name: &str) -> Result<Arc<Self>, TaskQueueError> {
        let (tx, rx) = mpsc::channel();
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || worker_loop(&thread_name, rx))
            .map_err(|source| TaskQueueError::Spawn {
                name: name.to_string(),
                source,
            })?;
        debug!("task queue {name} started");
        Ok(Arc::new(Self {
            name: name.to_string(),
            worker_id: handle.thread().id(),
            sender: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
        }))
    }

    /// The worker thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops accepting work, lets already-queued tasks finish, and joins the
    /// worker.  Pending delayed tasks are dropped.  Idempotent.
    pub fn shutdown(&self) {
        if let Some(tx) = self.sender.lock().take() {
            let _ = tx.send(Message::Shutdown);
        }
        if self.is_current() {
            // Joining ourselves would never return; the loop exits on its own.
            return;
        }
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!("task queue {} worker panicked during shutdown", self.name);
            }
        }
    }

    fn send(&self, message: Message) {
        match self.sender.lock().as_ref() {
            Some(tx) => {
                if tx.send(message).is_err() {
                    warn!("task queue {} worker is gone; task dropped", self.name);
                }
            }
            None => warn!("task queue {} is shut down; task dropped", self.name),
        }
    }
}

impl TaskQueue for SerialTaskQueue {
    fn post(&self, task: Task) {
        self.send(Message::Run(task));
    }

    fn post_delayed(&self, task: Task, delay: Duration) {
        self.send(Message::Delayed(task, Instant::now() + delay));
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.worker_id
    }
}

impl Drop for SerialTaskQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(name: &str, rx: Receiver<Message>) {
    let mut delayed: BinaryHeap<DelayedTask> = BinaryHeap::new();
    let mut seq = 0u64;

    loop {
        let now = Instant::now();
        while delayed.peek().is_some_and(|next| next.deadline <= now) {
            if let Some(due) = delayed.pop() {
                run_task(name, due.task);
            }
        }

        let message = match delayed.peek() {
            Some(next) => {
                let wait = next.deadline.saturating_duration_since(Instant::now());
                match rx.recv_timeout(wait) {
                    Ok(message) => message,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(message) => message,
                Err(_) => break,
            },
        };

        match message {
            Message::Run(task) => run_task(name, task),
            Message::Delayed(task, deadline) => {
                seq += 1;
                delayed.push(DelayedTask { deadline, seq, task });
            }
            Message::Shutdown => break,
        }
    }
    debug!("task queue {name} stopped");
}

// ── ImmediateTaskQueue ────────────────────────────────────────────────────────

#[derive(Default)]
struct ImmediateState {
    runner: Option<ThreadId>,
    pending: VecDeque<Task>,
    delayed: Vec<(Duration, Task)>,
}

/// Deterministic queue for tests: runs work on the posting thread.
#[derive(Default)]
pub struct ImmediateTaskQueue {
    state: Mutex<ImmediateState>,
}

impl ImmediateTaskQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of delayed tasks waiting for [`fire_delayed`](Self::fire_delayed).
    pub fn delayed_len(&self) -> usize {
        self.state.lock().delayed.len()
    }

    /// Runs every parked delayed task, shortest delay first, as if its timer
    /// had expired.  Returns how many ran.
    pub fn fire_delayed(&self) -> usize {
        let mut due = std::mem::take(&mut self.state.lock().delayed);
        due.sort_by_key(|(delay, _)| *delay);
        let count = due.len();
        for (_, task) in due {
            self.post(task);
        }
        count
    }

    fn drain(&self, first: Task) {
        let mut next = Some(first);
        while let Some(task) = next {
            task();
            let mut state = self.state.lock();
            next = state.pending.pop_front();
            if next.is_none() {
                state.runner = None;
            }
        }
    }
}

impl TaskQueue for ImmediateTaskQueue {
    fn post(&self, task: Task) {
        {
            let mut state = self.state.lock();
            if state.runner.is_some() {
                state.pending.push_back(task);
                return;
            }
            state.runner = Some(thread::current().id());
        }
        self.drain(task);
    }

    fn post_delayed(&self, task: Task, delay: Duration) {
        self.state.lock().delayed.push((delay, task));
    }

    fn is_current(&self) -> bool {
        self.state.lock().runner == Some(thread::current().id())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, impl Fn(u32) -> Task) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = Arc::clone(&log);
        let make = move |n: u32| -> Task {
            let log = Arc::clone(&log_clone);
            Box::new(move || log.lock().push(n))
        };
        (log, make)
    }

    #[test]
    fn test_serial_queue_runs_tasks_in_submission_order() {
        // Arrange
        let queue = SerialTaskQueue::spawn("test-order").unwrap();
        let (log, make) = recorder();

        // Act
        for n in 0..50 {
            queue.post(make(n));
        }
        let queue_dyn: Arc<dyn TaskQueue> = queue.clone();
        queue_dyn.run_sync(Duration::from_secs(2), || ()).unwrap();

        // Assert
        assert_eq!(*log.lock(), (0..50).collect::<Vec<_>>());
        queue.shutdown();
    }

    #[test]
    fn test_serial_queue_run_sync_returns_value() {
        let queue: Arc<dyn TaskQueue> = SerialTaskQueue::spawn("test-sync").unwrap();
        let value = queue.run_sync(Duration::from_secs(2), || 6 * 7);
        assert_eq!(value, Some(42));
    }

    #[test]
    fn test_serial_queue_run_sync_times_out() {
        // Arrange: occupy the worker for longer than the timeout.
        let queue: Arc<dyn TaskQueue> = SerialTaskQueue::spawn("test-timeout").unwrap();
        queue.post(Box::new(|| thread::sleep(Duration::from_millis(300))));

        // Act
        let value = queue.run_sync(Duration::from_millis(20), || 1);

        // Assert
        assert_eq!(value, None);
    }

    #[test]
    fn test_serial_queue_nested_run_sync_does_not_deadlock() {
        let queue: Arc<dyn TaskQueue> = SerialTaskQueue::spawn("test-nested").unwrap();
        let inner = Arc::clone(&queue);
        let value = queue.run_sync(Duration::from_secs(2), move || {
            inner.run_sync(Duration::from_secs(2), || 5).unwrap_or(0) + 1
        });
        assert_eq!(value, Some(6));
    }

    #[test]
    fn test_serial_queue_delayed_task_runs_after_immediate_tasks() {
        // Arrange
        let queue = SerialTaskQueue::spawn("test-delayed").unwrap();
        let (log, make) = recorder();

        // Act
        queue.post_delayed(make(2), Duration::from_millis(30));
        queue.post(make(1));
        thread::sleep(Duration::from_millis(150));

        // Assert
        assert_eq!(*log.lock(), vec![1, 2]);
    }

    #[test]
    fn test_serial_queue_survives_panicking_task() {
        let queue = SerialTaskQueue::spawn("test-panic").unwrap();
        queue.post(Box::new(|| panic!("boom")));
        let queue_dyn: Arc<dyn TaskQueue> = queue.clone();
        assert_eq!(queue_dyn.run_sync(Duration::from_secs(2), || 3), Some(3));
    }

    #[test]
    fn test_serial_queue_drops_tasks_after_shutdown() {
        let queue = SerialTaskQueue::spawn("test-shutdown").unwrap();
        queue.shutdown();
        let queue_dyn: Arc<dyn TaskQueue> = queue;
        assert_eq!(queue_dyn.run_sync(Duration::from_millis(50), || 1), None);
    }

    #[test]
    fn test_immediate_queue_defers_nested_posts_until_current_task_finishes() {
        // Arrange
        let queue = ImmediateTaskQueue::new();
        let (log, make) = recorder();
        let inner_queue = Arc::clone(&queue);
        let nested = make(2);
        let log_outer = Arc::clone(&log);

        // Act
        queue.post(Box::new(move || {
            log_outer.lock().push(1);
            inner_queue.post(nested);
            log_outer.lock().push(3);
        }));

        // Assert: 2 runs after the outer task, not in the middle of it.
        assert_eq!(*log.lock(), vec![1, 3, 2]);
    }

    #[test]
    fn test_immediate_queue_parks_delayed_tasks_until_fired() {
        let queue = ImmediateTaskQueue::new();
        let (log, make) = recorder();

        queue.post_delayed(make(7), Duration::from_millis(10));
        assert!(log.lock().is_empty());
        assert_eq!(queue.delayed_len(), 1);

        assert_eq!(queue.fire_delayed(), 1);
        assert_eq!(*log.lock(), vec![7]);
        assert_eq!(queue.delayed_len(), 0);
    }

    #[test]
    fn test_immediate_queue_run_sync_inside_task_runs_inline() {
        let queue = ImmediateTaskQueue::new();
        let queue_dyn: Arc<dyn TaskQueue> = queue.clone();
        let inner = Arc::clone(&queue_dyn);
        let value = queue_dyn.run_sync(Duration::from_millis(10), move || {
            inner.run_sync(Duration::from_millis(10), || 4)
        });
        assert_eq!(value, Some(Some(4)));
    }
}
