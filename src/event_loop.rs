//! Per-thread event loop: FIFO task queue plus timers.
//!
//! An [`EventLoop`] is bound to the thread that constructs it. Any thread may
//! [`post`](EventLoop::post) tasks (fire-and-forget, FIFO) or
//! [`send`](EventLoop::send) them (blocking until executed); the owning
//! thread calls [`run`](EventLoop::run), which alternates between draining
//! the queue and servicing due timers until [`quit`](EventLoop::quit) is
//! observed.
//!
//! The wake primitive is a mutex/condvar pair: `post` and the timer setters
//! nudge the condvar, `run` sleeps on it until the next timer deadline.
//!
//! `EventLoop` is a cheap cloneable handle; clones address the same loop.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use slotmap::{new_key_type, SlotMap};

use crate::error::LoopError;
use crate::registry::{self, current_thread_id, ThreadId};

new_key_type! {
    /// A stable identifier for a repeating timer, returned by
    /// [`EventLoop::set_repeat_timer`] and accepted by
    /// [`EventLoop::kill_timer`].
    pub struct TimerId;
}

/// Repeating timers never fire back-to-back faster than this.
const MIN_REPEAT_INTERVAL: Duration = Duration::from_millis(1);

// ---------------------------------------------------------------------------
// Completion pair for blocking sends
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, PartialEq, Eq)]
enum CompletionStatus {
    Pending,
    Done,
    Aborted,
}

struct CompletionState {
    status: Mutex<CompletionStatus>,
    condvar: Condvar,
}

/// Sender side of a completion pair. Signals when the task has executed;
/// dropping it unsignaled (task never ran, or panicked mid-run) aborts the
/// waiter instead of leaving it blocked.
pub(crate) struct CompletionHandle {
    inner: Arc<CompletionState>,
    signaled: bool,
}

impl CompletionHandle {
    fn settle(&mut self, status: CompletionStatus) {
        if self.signaled {
            return;
        }
        self.signaled = true;
        let mut guard = self.inner.status.lock();
        *guard = status;
        self.inner.condvar.notify_all();
    }

    pub(crate) fn signal_done(mut self) {
        self.settle(CompletionStatus::Done);
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        self.settle(CompletionStatus::Aborted);
    }
}

/// Waiter side of a completion pair.
pub(crate) struct CompletionWaiter {
    inner: Arc<CompletionState>,
}

impl CompletionWaiter {
    /// Block until the task executes. Returns `false` if the task was
    /// abandoned (the loop quit before running it).
    pub(crate) fn wait(self) -> bool {
        let mut status = self.inner.status.lock();
        while *status == CompletionStatus::Pending {
            self.inner.condvar.wait(&mut status);
        }
        *status == CompletionStatus::Done
    }
}

pub(crate) fn completion_pair() -> (CompletionHandle, CompletionWaiter) {
    let state = Arc::new(CompletionState {
        status: Mutex::new(CompletionStatus::Pending),
        condvar: Condvar::new(),
    });
    (
        CompletionHandle {
            inner: state.clone(),
            signaled: false,
        },
        CompletionWaiter { inner: state },
    )
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

enum Task {
    Plain(Box<dyn FnOnce() + Send>),
    Sync(Box<dyn FnOnce() + Send>, CompletionHandle),
}

impl Task {
    fn execute(self) {
        match self {
            Task::Plain(f) => f(),
            Task::Sync(f, completion) => {
                f();
                completion.signal_done();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Timer wheel
// ---------------------------------------------------------------------------

enum TimerCallback {
    Once(Option<Box<dyn FnOnce() + Send>>),
    Repeat(Arc<dyn Fn() + Send + Sync>),
}

struct TimerData {
    next_fire: Instant,
    interval: Duration,
    callback: TimerCallback,
}

/// An entry in the timer queue (min-heap by fire time).
#[derive(Clone, Copy)]
struct TimerQueueEntry {
    id: TimerId,
    fire_time: Instant,
}

impl PartialEq for TimerQueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time
    }
}

impl Eq for TimerQueueEntry {}

impl PartialOrd for TimerQueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerQueueEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other.fire_time.cmp(&self.fire_time)
    }
}

enum TimerFire {
    Once(Box<dyn FnOnce() + Send>),
    Repeat(Arc<dyn Fn() + Send + Sync>),
}

impl TimerFire {
    fn invoke(self) {
        match self {
            TimerFire::Once(f) => f(),
            TimerFire::Repeat(f) => f(),
        }
    }
}

struct TimerWheel {
    timers: SlotMap<TimerId, TimerData>,
    queue: BinaryHeap<TimerQueueEntry>,
}

impl TimerWheel {
    fn new() -> Self {
        Self {
            timers: SlotMap::with_key(),
            queue: BinaryHeap::new(),
        }
    }

    fn insert_once(&mut self, fire_time: Instant, callback: Box<dyn FnOnce() + Send>) -> TimerId {
        let id = self.timers.insert(TimerData {
            next_fire: fire_time,
            interval: Duration::ZERO,
            callback: TimerCallback::Once(Some(callback)),
        });
        self.queue.push(TimerQueueEntry { id, fire_time });
        id
    }

    fn insert_repeat(
        &mut self,
        interval: Duration,
        callback: Arc<dyn Fn() + Send + Sync>,
    ) -> TimerId {
        let interval = interval.max(MIN_REPEAT_INTERVAL);
        let fire_time = Instant::now() + interval;
        let id = self.timers.insert(TimerData {
            next_fire: fire_time,
            interval,
            callback: TimerCallback::Repeat(callback),
        });
        self.queue.push(TimerQueueEntry { id, fire_time });
        id
    }

    fn remove(&mut self, id: TimerId) -> bool {
        self.timers.remove(id).is_some()
    }

    /// Collect the callbacks of every timer due at `now`; repeating timers
    /// are rescheduled, one-shot timers are removed.
    fn collect_expired(&mut self, now: Instant) -> Vec<TimerFire> {
        let mut fires = Vec::new();
        while let Some(entry) = self.queue.peek() {
            if entry.fire_time > now {
                break;
            }
            let entry = self.queue.pop().unwrap();
            let Some(timer) = self.timers.get_mut(entry.id) else {
                // Killed while queued.
                continue;
            };
            match &mut timer.callback {
                TimerCallback::Once(callback) => {
                    if let Some(callback) = callback.take() {
                        fires.push(TimerFire::Once(callback));
                    }
                    self.timers.remove(entry.id);
                }
                TimerCallback::Repeat(callback) => {
                    fires.push(TimerFire::Repeat(callback.clone()));
                    timer.next_fire = now + timer.interval;
                    self.queue.push(TimerQueueEntry {
                        id: entry.id,
                        fire_time: timer.next_fire,
                    });
                }
            }
        }
        fires
    }

    /// When the next live timer fires, if any.
    fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(entry) = self.queue.peek() {
            if self.timers.contains_key(entry.id) {
                return Some(entry.fire_time);
            }
            self.queue.pop();
        }
        None
    }
}

// ---------------------------------------------------------------------------
// The loop proper
// ---------------------------------------------------------------------------

struct QueueState {
    tasks: VecDeque<Task>,
    /// Set by every waker under the queue lock so `run` never misses a wake
    /// that lands between its deadline computation and its wait.
    woken: bool,
}

struct LoopShared {
    owner: ThreadId,
    queue: Mutex<QueueState>,
    wake: Condvar,
    quit: AtomicBool,
    running: AtomicBool,
    timers: Mutex<TimerWheel>,
}

impl LoopShared {
    fn notify(&self) {
        let mut queue = self.queue.lock();
        queue.woken = true;
        self.wake.notify_one();
    }
}

/// A per-thread FIFO executor with single-shot and repeating timers.
///
/// See the [module docs](self) for the threading contract.
#[derive(Clone)]
pub struct EventLoop {
    shared: Arc<LoopShared>,
}

impl EventLoop {
    /// Create an event loop bound to the calling thread and register it so
    /// other threads can find it through
    /// [`registry::lookup`](crate::registry::lookup).
    pub fn new() -> Self {
        let lp = Self::new_unregistered();
        registry::register(&lp);
        lp
    }

    pub(crate) fn new_unregistered() -> Self {
        Self {
            shared: Arc::new(LoopShared {
                owner: current_thread_id(),
                queue: Mutex::new(QueueState {
                    tasks: VecDeque::new(),
                    woken: false,
                }),
                wake: Condvar::new(),
                quit: AtomicBool::new(false),
                running: AtomicBool::new(false),
                timers: Mutex::new(TimerWheel::new()),
            }),
        }
    }

    /// The thread this loop is bound to.
    pub fn thread_id(&self) -> ThreadId {
        self.shared.owner
    }

    /// Whether `quit` has been observed (or requested).
    pub fn has_quit(&self) -> bool {
        self.shared.quit.load(Ordering::SeqCst)
    }

    pub(crate) fn same_loop(&self, other: &EventLoop) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Enqueue `task` for execution on the loop's thread and return
    /// immediately. Safe from any thread; tasks run in FIFO order.
    ///
    /// Posting to a loop that has quit silently drops the task.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.has_quit() {
            tracing::trace!(target: "crosswire::event_loop", "post to quit loop dropped");
            return;
        }
        let mut queue = self.shared.queue.lock();
        queue.tasks.push_back(Task::Plain(Box::new(task)));
        queue.woken = true;
        self.shared.wake.notify_one();
    }

    /// Enqueue `task` and block until the loop has executed it.
    ///
    /// Called from the owning thread, the task executes inline (there is no
    /// way for the loop to make progress while its own thread is blocked).
    /// Fails with [`LoopError::Terminated`] if the loop has quit — including
    /// the race where the loop quits after the task was enqueued but before
    /// it ran.
    pub fn send<F>(&self, task: F) -> Result<(), LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        if current_thread_id() == self.shared.owner {
            task();
            return Ok(());
        }
        let waiter = self.send_deferred(task)?;
        if waiter.wait() {
            Ok(())
        } else {
            Err(LoopError::Terminated)
        }
    }

    /// Enqueue a completion-tracked task without waiting. The caller decides
    /// when (and whether) to block on the waiter.
    pub(crate) fn send_deferred<F>(&self, task: F) -> Result<CompletionWaiter, LoopError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.has_quit() {
            return Err(LoopError::Terminated);
        }
        let (handle, waiter) = completion_pair();
        let mut queue = self.shared.queue.lock();
        queue.tasks.push_back(Task::Sync(Box::new(task), handle));
        queue.woken = true;
        self.shared.wake.notify_one();
        Ok(waiter)
    }

    /// Schedule `task` to run once on the loop's thread after `interval`.
    ///
    /// A zero interval is equivalent to [`post`](Self::post).
    pub fn set_single_shot_timer<F>(&self, interval: Duration, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if interval.is_zero() {
            self.post(task);
            return;
        }
        if self.has_quit() {
            tracing::trace!(target: "crosswire::event_loop", "timer on quit loop dropped");
            return;
        }
        self.shared
            .timers
            .lock()
            .insert_once(Instant::now() + interval, Box::new(task));
        self.shared.notify();
    }

    /// Schedule `task` to run every `interval` on the loop's thread until
    /// [`kill_timer`](Self::kill_timer) is called with the returned id.
    pub fn set_repeat_timer<F>(&self, interval: Duration, task: F) -> TimerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self
            .shared
            .timers
            .lock()
            .insert_repeat(interval, Arc::new(task));
        self.shared.notify();
        id
    }

    /// Cancel a repeating timer. Idempotent. A callback already in flight
    /// completes; no subsequent callback fires.
    pub fn kill_timer(&self, id: TimerId) {
        self.shared.timers.lock().remove(id);
        self.shared.notify();
    }

    /// Ask the loop to stop. Safe from any thread; `run` returns after
    /// finishing the batch of callbacks it has already dispatched.
    pub fn quit(&self) {
        self.shared.quit.store(true, Ordering::SeqCst);
        self.shared.notify();
    }

    /// Process tasks and timers on the calling thread until [`quit`](Self::quit).
    ///
    /// Must be called on the thread the loop was constructed on. Pending
    /// blocking sends are aborted on exit, and the loop unregisters itself.
    /// A panicking task propagates out of `run`; the dispatcher installs no
    /// recovery handlers.
    #[tracing::instrument(skip_all, target = "crosswire::event_loop", level = "debug")]
    pub fn run(&self) -> Result<(), LoopError> {
        let shared = &self.shared;
        if current_thread_id() != shared.owner {
            return Err(LoopError::WrongThread);
        }
        if shared.running.swap(true, Ordering::SeqCst) {
            return Err(LoopError::AlreadyRunning);
        }
        tracing::debug!(target: "crosswire::event_loop", id = ?shared.owner, "event loop running");

        while !shared.quit.load(Ordering::SeqCst) {
            // Drain the FIFO into a local batch; the lock is never held
            // across callback execution.
            let batch: Vec<Task> = {
                let mut queue = shared.queue.lock();
                queue.woken = false;
                queue.tasks.drain(..).collect()
            };
            for task in batch {
                task.execute();
            }

            let fires = shared.timers.lock().collect_expired(Instant::now());
            for fire in fires {
                fire.invoke();
            }

            if shared.quit.load(Ordering::SeqCst) {
                break;
            }

            let deadline = shared.timers.lock().next_deadline();
            let mut queue = shared.queue.lock();
            if queue.woken || !queue.tasks.is_empty() {
                continue;
            }
            match deadline {
                Some(deadline) => {
                    self.shared.wake.wait_until(&mut queue, deadline);
                }
                None => self.shared.wake.wait(&mut queue),
            }
        }

        self.shutdown();
        tracing::debug!(target: "crosswire::event_loop", id = ?shared.owner, "event loop stopped");
        Ok(())
    }

    /// Mark terminated, abort pending blocking sends, unregister.
    fn shutdown(&self) {
        let shared = &self.shared;
        shared.quit.store(true, Ordering::SeqCst);
        let abandoned: Vec<Task> = shared.queue.lock().tasks.drain(..).collect();
        // Dropping a Sync task drops its completion handle, which unblocks
        // the sender with a termination error.
        drop(abandoned);
        shared.running.store(false, Ordering::SeqCst);
        registry::unregister_if_same(shared.owner, self);
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}
