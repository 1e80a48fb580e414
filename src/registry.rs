//! Per-thread identity tokens and the process-wide event loop registry.
//!
//! Every OS thread that touches crosswire is lazily assigned a [`ThreadId`]
//! token. The registry maps those tokens to the [`EventLoop`] running on the
//! thread (at most one per thread); [`lookup`] is callable from any thread
//! and is how queued deliveries find their target.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::event_loop::EventLoop;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: ThreadId = ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
}

/// A process-unique token identifying an OS thread.
///
/// Tokens are assigned on first use and never reused, so a token can safely
/// outlive its thread (lookups for a dead thread simply miss).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
    pub(crate) fn as_u64(self) -> u64 {
        self.0
    }

    pub(crate) fn from_u64(raw: u64) -> Self {
        Self(raw)
    }
}

/// The token of the calling thread.
pub fn current_thread_id() -> ThreadId {
    THREAD_ID.with(|id| *id)
}

static EVENT_LOOPS: Mutex<Option<HashMap<ThreadId, EventLoop>>> = Mutex::new(None);

/// Bind `event_loop` to the calling thread.
///
/// Only one loop per thread is supported; registering again replaces the
/// previous entry (last writer wins).
pub fn register(event_loop: &EventLoop) {
    let id = current_thread_id();
    tracing::trace!(target: "crosswire::registry", ?id, "registering event loop");
    EVENT_LOOPS
        .lock()
        .get_or_insert_with(HashMap::new)
        .insert(id, event_loop.clone());
}

/// Remove the calling thread's entry, if any.
pub fn unregister() {
    let id = current_thread_id();
    if let Some(loops) = EVENT_LOOPS.lock().as_mut() {
        if loops.remove(&id).is_some() {
            tracing::trace!(target: "crosswire::registry", ?id, "unregistered event loop");
        }
    }
}

/// The loop registered for `id`, from any thread.
pub fn lookup(id: ThreadId) -> Option<EventLoop> {
    EVENT_LOOPS.lock().as_ref().and_then(|loops| loops.get(&id).cloned())
}

/// The loop registered for the calling thread.
pub fn current_loop() -> Option<EventLoop> {
    lookup(current_thread_id())
}

/// Remove the entry for `id` only if it still refers to `event_loop`.
///
/// Used on loop teardown so that a replacement registered in the meantime is
/// left untouched.
pub(crate) fn unregister_if_same(id: ThreadId, event_loop: &EventLoop) {
    if let Some(loops) = EVENT_LOOPS.lock().as_mut() {
        if loops.get(&id).is_some_and(|l| l.same_loop(event_loop)) {
            loops.remove(&id);
            tracing::trace!(target: "crosswire::registry", ?id, "unregistered event loop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_thread_id_stable() {
        assert_eq!(current_thread_id(), current_thread_id());
    }

    #[test]
    fn test_thread_ids_differ_across_threads() {
        let here = current_thread_id();
        let there = std::thread::spawn(current_thread_id).join().unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn test_register_lookup_unregister() {
        let lp = EventLoop::new_unregistered();
        register(&lp);
        let id = current_thread_id();
        assert!(lookup(id).is_some());
        unregister();
        assert!(lookup(id).is_none());
    }

    #[test]
    fn test_reregister_replaces() {
        let first = EventLoop::new_unregistered();
        let second = EventLoop::new_unregistered();
        register(&first);
        register(&second);
        let found = lookup(current_thread_id()).unwrap();
        assert!(found.same_loop(&second));
        assert!(!found.same_loop(&first));
        unregister();
    }

    #[test]
    fn test_unregister_if_same_spares_replacement() {
        let first = EventLoop::new_unregistered();
        let second = EventLoop::new_unregistered();
        let id = current_thread_id();
        register(&first);
        register(&second);
        unregister_if_same(id, &first);
        assert!(lookup(id).is_some());
        unregister_if_same(id, &second);
        assert!(lookup(id).is_none());
    }

    #[test]
    fn test_lookup_from_other_thread() {
        let lp = EventLoop::new_unregistered();
        register(&lp);
        let id = current_thread_id();
        let found = std::thread::spawn(move || lookup(id).is_some())
            .join()
            .unwrap();
        assert!(found);
        unregister();
    }
}
