//! Typed multicast signals with thread-routed delivery.
//!
//! A [`Signal<Args>`] holds an insertion-ordered set of handlers, at most
//! one per receiver [`Address`]. Emission walks the set under a shared lock
//! and dispatches each handler according to its [`ConnectionKind`]: inline,
//! posted to the receiver thread's event loop, or posted-and-awaited.
//!
//! `Args` is the tuple of argument types — `()` for a parameterless signal,
//! `(i32,)` for one argument, `(i32, char, String)` for three. Queued
//! deliveries clone the tuple at emit time, decoupling the handler from the
//! emitter's stack.
//!
//! Object-to-object subscriptions go through [`connect`](crate::connect::connect);
//! receiver-less free functions and closures attach directly with
//! [`connect_fn`](Signal::connect_fn).
//!
//! A slot must not synchronously mutate the subscription set of the signal
//! currently being emitted (connect/disconnect/`disconnect_all` from inside
//! a `Direct` slot of the same signal); doing so is undefined and with the
//! reader-writer lock used here will deadlock.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::address::{Address, SignalId};
use crate::event_loop::CompletionWaiter;
use crate::handler::{FreeSlot, Invoker};
use crate::registry::{self, current_thread_id, ThreadId};

/// How a connected slot is invoked relative to the emitting thread.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Invoke synchronously on the emitting thread, regardless of the
    /// receiver's affinity.
    Direct,

    /// Post onto the receiver thread's event loop. Skipped silently when
    /// that thread has no loop.
    Queued,

    /// Same thread: `Direct`; different thread: `Queued`.
    #[default]
    Auto,

    /// Like `Queued`, but the emitter blocks until the slot has run.
    /// Collapses to `Direct` when emitter and receiver share a thread, so a
    /// self-call cannot deadlock.
    BlockingQueued,
}

/// One entry in a signal's handler set.
pub(crate) struct Handler<Args> {
    /// Receiver home thread, recorded at connect time.
    pub(crate) thread: ThreadId,
    pub(crate) kind: ConnectionKind,
    pub(crate) invoke: Invoker<Args>,
}

pub(crate) struct HandlerEntry<Args> {
    pub(crate) address: Address,
    pub(crate) handler: Handler<Args>,
}

pub(crate) type HandlerSet<Args> = RwLock<Vec<HandlerEntry<Args>>>;

/// A typed multicast emission point. See the [module docs](self).
pub struct Signal<Args> {
    id: SignalId,
    handlers: Arc<HandlerSet<Args>>,
}

impl<Args> Signal<Args> {
    /// Create a signal with no handlers.
    pub fn new() -> Self {
        Self {
            id: SignalId::next(),
            handlers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub(crate) fn signal_id(&self) -> SignalId {
        self.id
    }

    pub(crate) fn handlers_weak(&self) -> Weak<HandlerSet<Args>> {
        Arc::downgrade(&self.handlers)
    }

    /// Insert a handler keyed by `address` unless one is already present.
    /// Returns whether the handler was inserted.
    pub(crate) fn add_handler(&self, address: Address, handler: Handler<Args>) -> bool {
        let mut handlers = self.handlers.write();
        if handlers.iter().any(|entry| entry.address == address) {
            return false;
        }
        handlers.push(HandlerEntry { address, handler });
        true
    }

    /// Remove the handler keyed by `address`, if present. Idempotent.
    pub(crate) fn remove_handler(&self, address: &Address) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|entry| entry.address != *address);
        handlers.len() != before
    }

    pub(crate) fn remove_from(handlers: &HandlerSet<Args>, address: &Address) {
        handlers.write().retain(|entry| entry.address != *address);
    }

    /// The number of connected handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Connect a free function or closure with no receiver object.
    ///
    /// The slot runs with `Direct` kind, on whichever thread emits. No
    /// lifetime bookkeeping is attached; the caller owns the connection and
    /// can remove it with [`disconnect_fn`](Self::disconnect_fn). Connecting
    /// the same function item twice is a no-op.
    pub fn connect_fn<F, M>(&self, slot: F) -> Address
    where
        F: FreeSlot<Args, M>,
    {
        let address = Address::free_slot(<F as FreeSlot<Args, M>>::slot_id());
        self.add_handler(
            address,
            Handler {
                thread: current_thread_id(),
                kind: ConnectionKind::Direct,
                invoke: slot.erase(),
            },
        );
        address
    }

    /// Remove a connection made with [`connect_fn`](Self::connect_fn),
    /// identified by the same function item. Idempotent.
    pub fn disconnect_fn<F, M>(&self, _slot: F) -> bool
    where
        F: FreeSlot<Args, M>,
    {
        self.remove_handler(&Address::free_slot(<F as FreeSlot<Args, M>>::slot_id()))
    }

    /// Invoke every handler with `args`, each according to its kind.
    ///
    /// Handlers run in insertion order per kind: `Direct` (and collapsed
    /// `Auto`/`BlockingQueued`) handlers inline before `emit` returns, queued
    /// handlers as posts issued in insertion order. Queued handlers whose
    /// thread has no registered loop are skipped. Blocking handlers are
    /// awaited after every handler has been dispatched.
    #[tracing::instrument(skip_all, target = "crosswire::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        let current = current_thread_id();
        let handlers = self.handlers.read();
        tracing::trace!(
            target: "crosswire::signal",
            id = ?self.id,
            handler_count = handlers.len(),
            "emitting",
        );

        let mut blocking = Vec::new();
        for entry in handlers.iter() {
            let handler = &entry.handler;
            match handler.kind {
                ConnectionKind::Direct => (handler.invoke)(&args),
                ConnectionKind::Auto => {
                    if handler.thread == current {
                        (handler.invoke)(&args);
                    } else {
                        self.queue(handler, &args);
                    }
                }
                ConnectionKind::Queued => self.queue(handler, &args),
                ConnectionKind::BlockingQueued => {
                    if handler.thread == current {
                        (handler.invoke)(&args);
                    } else if let Some(waiter) = self.queue_blocking(handler, &args) {
                        blocking.push(waiter);
                    }
                }
            }
        }
        drop(handlers);

        for waiter in blocking {
            if !waiter.wait() {
                tracing::warn!(
                    target: "crosswire::signal",
                    "blocking handler abandoned: receiver loop quit",
                );
            }
        }
    }

    fn queue(&self, handler: &Handler<Args>, args: &Args) {
        let Some(event_loop) = registry::lookup(handler.thread) else {
            tracing::trace!(
                target: "crosswire::signal",
                thread = ?handler.thread,
                "no loop for receiver thread, handler skipped",
            );
            return;
        };
        let invoke = handler.invoke.clone();
        let args = args.clone();
        event_loop.post(move || invoke(&args));
    }

    fn queue_blocking(&self, handler: &Handler<Args>, args: &Args) -> Option<CompletionWaiter> {
        let Some(event_loop) = registry::lookup(handler.thread) else {
            tracing::trace!(
                target: "crosswire::signal",
                thread = ?handler.thread,
                "no loop for receiver thread, handler skipped",
            );
            return None;
        };
        let invoke = handler.invoke.clone();
        let args = args.clone();
        match event_loop.send_deferred(move || invoke(&args)) {
            Ok(waiter) => Some(waiter),
            Err(err) => {
                tracing::warn!(target: "crosswire::signal", %err, "blocking handler skipped");
                None
            }
        }
    }
}

impl<Args> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_connect_fn_and_emit() {
        let signal = Signal::<(i32,)>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        signal.connect_fn(move |value: i32| seen2.lock().push(value));
        signal.emit((42,));
        signal.emit((100,));
        assert_eq!(*seen.lock(), vec![42, 100]);
    }

    #[test]
    fn test_emit_in_insertion_order() {
        let signal = Signal::<()>::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            signal.connect_fn(move || order.lock().push(i));
        }
        signal.emit(());
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_free_function_dedupes_and_disconnects() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        fn bump() {
            CALLS.fetch_add(1, Ordering::SeqCst);
        }

        let signal = Signal::<()>::new();
        signal.connect_fn(bump);
        signal.connect_fn(bump); // duplicate: no-op
        assert_eq!(signal.handler_count(), 1);

        signal.emit(());
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);

        assert!(signal.disconnect_fn(bump));
        assert!(!signal.disconnect_fn(bump)); // idempotent
        signal.emit(());
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_prefix_arity_free_slot() {
        let signal = Signal::<(i32, char, String)>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        signal.connect_fn(move |value: i32| seen2.lock().push(value));
        signal.emit((5, 'x', "hi".to_string()));
        assert_eq!(*seen.lock(), vec![5]);
    }

    #[test]
    fn test_parameterless_slot_on_parameterful_signal() {
        let signal = Signal::<(i32, char, String)>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        signal.connect_fn(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        signal.emit((1, 'a', "hello".to_string()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_emit_from_multiple_threads() {
        let signal = Arc::new(Signal::<(usize,)>::new());
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        signal.connect_fn(move |value: usize| {
            count2.fetch_add(value, Ordering::SeqCst);
        });

        let mut handles = Vec::new();
        for _ in 0..8 {
            let signal = signal.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    signal.emit((1,));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 800);
    }

    #[test]
    fn test_distinct_closures_coexist() {
        let signal = Signal::<()>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        let c2 = count.clone();
        signal.connect_fn(move || {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        signal.connect_fn(move || {
            c2.fetch_add(10, Ordering::SeqCst);
        });
        assert_eq!(signal.handler_count(), 2);
        signal.emit(());
        assert_eq!(count.load(Ordering::SeqCst), 11);
    }
}
