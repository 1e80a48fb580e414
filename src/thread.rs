//! Worker threads hosting event loops.

use crossbeam_channel::bounded;

use crate::event_loop::EventLoop;
use crate::registry::{self, current_thread_id, ThreadId};

/// A detached worker thread whose body hosts an [`EventLoop`].
///
/// The constructor returns only once the worker's loop is addressable
/// through the registry, so a `Thread` can immediately be used as a
/// [`move_to_thread`](crate::object::Object::move_to_thread) target.
///
/// The worker is detached; it ends when its loop quits (see
/// [`quit`](Self::quit)).
pub struct Thread {
    id: ThreadId,
}

impl Thread {
    /// Spawn a worker running the default body: construct an [`EventLoop`]
    /// and run it until quit.
    pub fn new() -> Self {
        Self::spawn(|| {
            let event_loop = EventLoop::new();
            if let Err(err) = event_loop.run() {
                tracing::error!(target: "crosswire::thread", %err, "worker loop failed");
            }
        })
    }

    /// Spawn a worker running `body`.
    ///
    /// `body` must construct and register an [`EventLoop`] early on: the
    /// constructor publishes the worker's thread id and then spin-yields
    /// until the registry can resolve it, so a body that never registers a
    /// loop leaves the constructor spinning.
    pub fn spawn<F>(body: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        std::thread::Builder::new()
            .name("crosswire-worker".to_string())
            .spawn(move || {
                let _ = tx.send(current_thread_id());
                body();
            })
            .expect("failed to spawn worker thread");

        let id = rx.recv().expect("worker thread died before publishing its id");
        while registry::lookup(id).is_none() {
            std::thread::yield_now();
        }
        Thread { id }
    }

    /// The worker's thread id.
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// The worker's event loop, if still registered.
    pub fn event_loop(&self) -> Option<EventLoop> {
        registry::lookup(self.id)
    }

    /// Ask the worker's loop to quit. The worker thread then ends.
    pub fn quit(&self) {
        if let Some(event_loop) = self.event_loop() {
            event_loop.quit();
        }
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&Thread> for ThreadId {
    fn from(thread: &Thread) -> Self {
        thread.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_worker_is_addressable_on_return() {
        let worker = Thread::new();
        assert!(worker.event_loop().is_some());
        worker.quit();
    }

    #[test]
    fn test_post_runs_on_worker() {
        let worker = Thread::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let worker_id = worker.id();
        let event_loop = worker.event_loop().unwrap();
        event_loop
            .send(move || {
                assert_eq!(current_thread_id(), worker_id);
                ran2.store(true, Ordering::SeqCst);
            })
            .unwrap();
        assert!(ran.load(Ordering::SeqCst));
        worker.quit();
    }

    #[test]
    fn test_quit_unregisters_loop() {
        let worker = Thread::new();
        worker.quit();
        // The loop unregisters itself as run() returns.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while worker.event_loop().is_some() {
            assert!(std::time::Instant::now() < deadline, "loop never unregistered");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_custom_body() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let worker = Thread::spawn(move || {
            ran2.store(true, Ordering::SeqCst);
            let event_loop = EventLoop::new();
            let _ = event_loop.run();
        });
        assert!(ran.load(Ordering::SeqCst));
        worker.quit();
    }
}
