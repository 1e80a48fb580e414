//! Object-level timers built on the event loop's timer facility.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::TimerError;
use crate::event_loop::{EventLoop, TimerId};
use crate::object::{Object, ObjectCore};
use crate::registry;
use crate::signal::Signal;

struct ActiveTimer {
    event_loop: EventLoop,
    id: TimerId,
}

/// A repeating timer that emits [`timeout`](Self::timeout) on each tick.
///
/// `Timer` is an [`Object`]: connect its `timeout` signal to slots like any
/// other signal. The timer registers on the event loop of the thread that
/// calls [`start`](Self::start), and its ticks run on that loop's thread.
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use crosswire::{connect, Timer};
///
/// let timer = Timer::new();
/// // ... connect(&timer, |t| &t.timeout, &receiver, Receiver::on_tick) ...
/// timer.start(Duration::from_millis(50)).unwrap();
/// ```
pub struct Timer {
    core: ObjectCore,
    /// Emitted on every tick of a timer started with [`start`](Self::start).
    pub timeout: Signal<()>,
    active: Mutex<Option<ActiveTimer>>,
    weak_self: Weak<Timer>,
}

impl Timer {
    /// Create a stopped timer homed on the calling thread.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            core: ObjectCore::new(),
            timeout: Signal::new(),
            active: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    /// Start repeating every `interval`, emitting [`timeout`](Self::timeout)
    /// on each tick. A no-op while already alive.
    ///
    /// Requires an event loop on the calling thread. A tick that races the
    /// timer's destruction is dropped rather than emitted.
    pub fn start(&self, interval: Duration) -> Result<(), TimerError> {
        let timer = self.weak_self.clone();
        self.install(interval, move || {
            if let Some(timer) = timer.upgrade() {
                timer.timeout.emit(());
            }
        })
    }

    /// Start repeating every `interval`, running `task` directly on each
    /// tick instead of emitting the signal. A no-op while already alive.
    pub fn start_with<F>(&self, interval: Duration, task: F) -> Result<(), TimerError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.install(interval, task)
    }

    fn install<F>(&self, interval: Duration, task: F) -> Result<(), TimerError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut active = self.active.lock();
        if active.is_some() {
            return Ok(());
        }
        let event_loop = registry::current_loop().ok_or(TimerError::NoEventLoop)?;
        let id = event_loop.set_repeat_timer(interval, task);
        *active = Some(ActiveTimer { event_loop, id });
        Ok(())
    }

    /// Cancel the repeating timer. Idempotent; a tick already in flight
    /// completes, no further tick fires.
    pub fn stop(&self) {
        if let Some(active) = self.active.lock().take() {
            active.event_loop.kill_timer(active.id);
        }
    }

    /// Whether the timer is currently running.
    pub fn is_alive(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Run `task` once on the calling thread's event loop after `interval`.
    ///
    /// A zero interval is equivalent to posting `task`.
    pub fn single_shot<F>(interval: Duration, task: F) -> Result<(), TimerError>
    where
        F: FnOnce() + Send + 'static,
    {
        let event_loop = registry::current_loop().ok_or(TimerError::NoEventLoop)?;
        event_loop.set_single_shot_timer(interval, task);
        Ok(())
    }
}

impl Object for Timer {
    fn object_core(&self) -> &ObjectCore {
        &self.core
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::Thread;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_start_without_loop_fails() {
        let timer = Timer::new();
        assert_eq!(
            timer.start(Duration::from_millis(10)),
            Err(TimerError::NoEventLoop)
        );
        assert!(!timer.is_alive());
    }

    #[test]
    fn test_single_shot_without_loop_fails() {
        let result = std::thread::spawn(|| Timer::single_shot(Duration::ZERO, || {}))
            .join()
            .unwrap();
        assert_eq!(result, Err(TimerError::NoEventLoop));
    }

    #[test]
    fn test_start_on_worker_ticks_and_stops() {
        let worker = Thread::new();
        let event_loop = worker.event_loop().unwrap();
        let timer = Timer::new();
        let ticks = Arc::new(AtomicUsize::new(0));

        let started = {
            let timer = timer.clone();
            let ticks = ticks.clone();
            let (tx, rx) = crossbeam_channel::bounded(1);
            event_loop.post(move || {
                let ticks2 = ticks.clone();
                let result = timer.start_with(Duration::from_millis(5), move || {
                    ticks2.fetch_add(1, Ordering::SeqCst);
                });
                let _ = tx.send(result);
            });
            rx.recv().unwrap()
        };
        assert_eq!(started, Ok(()));
        assert!(timer.is_alive());

        std::thread::sleep(Duration::from_millis(60));
        timer.stop();
        assert!(!timer.is_alive());
        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop >= 2, "expected several ticks, got {after_stop}");

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
        worker.quit();
    }

    #[test]
    fn test_start_while_alive_is_noop() {
        let worker = Thread::new();
        let event_loop = worker.event_loop().unwrap();
        let timer = Timer::new();
        let (tx, rx) = crossbeam_channel::bounded(1);
        {
            let timer = timer.clone();
            event_loop.post(move || {
                let first = timer.start(Duration::from_millis(500));
                let second = timer.start(Duration::from_millis(1));
                let _ = tx.send((first, second));
            });
        }
        let (first, second) = rx.recv().unwrap();
        assert_eq!(first, Ok(()));
        assert_eq!(second, Ok(()));
        assert!(timer.is_alive());
        timer.stop();
        worker.quit();
    }

    #[test]
    fn test_dropped_timer_tick_is_skipped() {
        let worker = Thread::new();
        let event_loop = worker.event_loop().unwrap();
        let timer = Timer::new();
        {
            let timer = timer.clone();
            event_loop.post(move || {
                let _ = timer.start(Duration::from_millis(5));
            });
        }
        // Drop every handle without stopping: the loop-side callback only
        // holds the timer weakly and must fall silent.
        std::thread::sleep(Duration::from_millis(20));
        drop(timer);
        std::thread::sleep(Duration::from_millis(20));
        worker.quit();
    }
}
