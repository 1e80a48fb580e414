//! The object model: thread affinity and connection bookkeeping.
//!
//! Types that participate in object-to-object connections embed an
//! [`ObjectCore`] and implement [`Object`]. The core carries the home thread
//! id and the two inverse connection indices:
//!
//! - `senders`: connections in which this object is the *receiver*, keyed by
//!   the sender's signal address, then by the slot's function code;
//! - `receivers`: connections in which this object is the *sender*, keyed by
//!   the receiver's slot address.
//!
//! Each entry holds the cleanup closure installed at connect time, whose job
//! is to remove the matching handler and the complementary inverse entry on
//! the other side. Dropping the core runs [`disconnect_all`], so no new
//! emission can reach a destroyed object.
//!
//! Participating objects live in `Arc`; handlers hold them only weakly.
//!
//! [`disconnect_all`]: ObjectCore::disconnect_all

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::address::{Address, FunctionCode, ObjectId};
use crate::event_loop::EventLoop;
use crate::registry::{self, current_thread_id, ThreadId};
use crate::signal::ConnectionKind;

pub(crate) type Cleanup = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct TablesInner {
    senders: HashMap<Address, HashMap<FunctionCode, Cleanup>>,
    receivers: HashMap<Address, Cleanup>,
}

/// The connection indices of one object, shared so cleanup closures can hold
/// them weakly. The `Arc`'s liveness doubles as the object's lifetime flag.
pub(crate) struct ConnectionTables {
    inner: RwLock<TablesInner>,
}

impl ConnectionTables {
    fn new() -> Self {
        Self {
            inner: RwLock::new(TablesInner::default()),
        }
    }

    pub(crate) fn add_sender(&self, sender: Address, slot: FunctionCode, cleanup: Cleanup) {
        self.inner
            .write()
            .senders
            .entry(sender)
            .or_default()
            .entry(slot)
            .or_insert(cleanup);
    }

    pub(crate) fn add_receiver(&self, receiver: Address, cleanup: Cleanup) {
        self.inner.write().receivers.insert(receiver, cleanup);
    }

    pub(crate) fn remove_sender(&self, sender: &Address, slot: &FunctionCode) {
        let mut inner = self.inner.write();
        if let Some(slots) = inner.senders.get_mut(sender) {
            slots.remove(slot);
            if slots.is_empty() {
                inner.senders.remove(sender);
            }
        }
    }

    pub(crate) fn remove_receiver(&self, receiver: &Address) {
        self.inner.write().receivers.remove(receiver);
    }

    pub(crate) fn contains_sender(&self, sender: &Address, slot: &FunctionCode) -> bool {
        self.inner
            .read()
            .senders
            .get(sender)
            .is_some_and(|slots| slots.contains_key(slot))
    }

    pub(crate) fn contains_receiver(&self, receiver: &Address) -> bool {
        self.inner.read().receivers.contains_key(receiver)
    }

    fn drain(&self) -> (Vec<Cleanup>, Vec<Cleanup>) {
        let mut inner = self.inner.write();
        let senders = std::mem::take(&mut inner.senders)
            .into_values()
            .flat_map(|slots| slots.into_values())
            .collect();
        let receivers = std::mem::take(&mut inner.receivers).into_values().collect();
        (senders, receivers)
    }
}

/// Thread affinity and connection bookkeeping for one object.
///
/// Embed this by value and hand it out through [`Object::object_core`]:
///
/// ```
/// use crosswire::{Object, ObjectCore, Signal};
///
/// struct Button {
///     core: ObjectCore,
///     clicked: Signal<(i32,)>,
/// }
///
/// impl Object for Button {
///     fn object_core(&self) -> &ObjectCore {
///         &self.core
///     }
/// }
/// ```
pub struct ObjectCore {
    id: ObjectId,
    thread: AtomicU64,
    tables: Arc<ConnectionTables>,
}

impl ObjectCore {
    /// Create a core homed on the calling thread.
    pub fn new() -> Self {
        Self {
            id: ObjectId::next(),
            thread: AtomicU64::new(current_thread_id().as_u64()),
            tables: Arc::new(ConnectionTables::new()),
        }
    }

    /// This object's identity.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The home thread id.
    pub fn thread_id(&self) -> ThreadId {
        ThreadId::from_u64(self.thread.load(Ordering::SeqCst))
    }

    pub(crate) fn set_thread(&self, id: ThreadId) {
        self.thread.store(id.as_u64(), Ordering::SeqCst);
    }

    pub(crate) fn weak_flag(&self) -> Weak<ConnectionTables> {
        Arc::downgrade(&self.tables)
    }

    pub(crate) fn tables(&self) -> &ConnectionTables {
        &self.tables
    }

    /// Invoke every registered cleanup closure, revoking all handlers that
    /// target this object and all handlers it installed on others.
    ///
    /// Both indices are drained first and the closures run without any lock
    /// held, so cleanups may freely take the other side's locks. Draining
    /// makes the call idempotent.
    pub fn disconnect_all(&self) {
        let (senders, receivers) = self.tables.drain();
        if !senders.is_empty() || !receivers.is_empty() {
            tracing::trace!(
                target: "crosswire::object",
                id = ?self.id,
                incoming = senders.len(),
                outgoing = receivers.len(),
                "disconnecting all",
            );
        }
        for cleanup in senders {
            cleanup();
        }
        for cleanup in receivers {
            cleanup();
        }
    }
}

impl Default for ObjectCore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ObjectCore {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

/// An entity with thread affinity that can take part in object-to-object
/// connections.
///
/// Implementors only supply [`object_core`](Self::object_core); everything
/// else is provided. Objects are used behind `Arc` so handlers can hold them
/// weakly.
pub trait Object: Send + Sync + 'static {
    /// The embedded core.
    fn object_core(&self) -> &ObjectCore;

    /// The home thread id. Slots connected with `Auto` or `Queued` kinds run
    /// on this thread.
    fn thread_id(&self) -> ThreadId {
        self.object_core().thread_id()
    }

    /// Re-home the object onto `target` (a [`ThreadId`] or a
    /// [`&Thread`](crate::thread::Thread)).
    ///
    /// The store is atomic, but callers must ensure no emission toward this
    /// object is in flight; existing handlers keep the thread recorded when
    /// they were connected.
    fn move_to_thread<T: Into<ThreadId>>(&self, target: T)
    where
        Self: Sized,
    {
        self.object_core().set_thread(target.into());
    }

    /// The event loop of the home thread, if one is registered.
    fn event_loop(&self) -> Option<EventLoop> {
        registry::lookup(self.thread_id())
    }

    /// Run `task` on the object's home thread according to `kind`.
    ///
    /// `Auto` runs inline when already on the home thread and posts
    /// otherwise; `Direct` always runs inline; `Queued` always posts;
    /// `BlockingQueued` sends and waits. Queued variants are silently
    /// skipped when the home thread has no loop.
    fn invoke_method<F>(&self, task: F, kind: ConnectionKind)
    where
        F: FnOnce() + Send + 'static,
        Self: Sized,
    {
        match kind {
            ConnectionKind::Direct => task(),
            ConnectionKind::Auto => {
                if self.thread_id() == current_thread_id() {
                    task();
                } else if let Some(event_loop) = self.event_loop() {
                    event_loop.post(task);
                } else {
                    tracing::trace!(target: "crosswire::object", "invoke_method: no loop, skipped");
                }
            }
            ConnectionKind::Queued => {
                if let Some(event_loop) = self.event_loop() {
                    event_loop.post(task);
                } else {
                    tracing::trace!(target: "crosswire::object", "invoke_method: no loop, skipped");
                }
            }
            ConnectionKind::BlockingQueued => {
                if let Some(event_loop) = self.event_loop() {
                    if let Err(err) = event_loop.send(task) {
                        tracing::warn!(target: "crosswire::object", %err, "invoke_method: send failed");
                    }
                } else {
                    tracing::trace!(target: "crosswire::object", "invoke_method: no loop, skipped");
                }
            }
        }
    }

    /// Revoke every connection this object takes part in, on both sides.
    fn disconnect_all(&self) {
        self.object_core().disconnect_all();
    }

    /// Disconnect everything, then release this handle on the object's home
    /// loop (or inline when the home thread has no loop).
    ///
    /// The object is destroyed when this was the last strong handle.
    fn delete_later(self: Arc<Self>)
    where
        Self: Sized,
    {
        self.object_core().disconnect_all();
        match registry::lookup(self.thread_id()) {
            Some(event_loop) => event_loop.post(move || drop(self)),
            None => drop(self),
        }
    }
}
