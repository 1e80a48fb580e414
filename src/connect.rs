//! Object-to-object subscription plumbing.
//!
//! [`connect`] installs a handler in the sender's signal and cross-registers
//! a cleanup closure in each object's connection index, so that destroying
//! either endpoint (or calling
//! [`disconnect_all`](crate::object::Object::disconnect_all)) revokes the
//! handler and the complementary index entry. The cleanups hold the other
//! side weakly; a side that is already gone is simply skipped.
//!
//! Both endpoints must implement [`Object`]. Endpoints without object
//! bookkeeping attach directly to the signal with
//! [`Signal::connect_fn`](crate::signal::Signal::connect_fn); there is no way
//! to mix the two in one connection.

use std::sync::Arc;

use crate::address::Address;
use crate::handler::ObjectSlot;
use crate::object::Object;
use crate::signal::{ConnectionKind, Handler, Signal};

/// Subscribe `receiver`'s `slot` to a signal of `sender`, with the default
/// `Auto` kind.
///
/// `signal` selects the signal field: `|s| &s.clicked`. `slot` is either a
/// method of the receiver (`Receiver::on_clicked`) or a closure; its
/// parameters must be a strict prefix of the signal's argument tuple.
///
/// Returns the receiver-side [`Address`] identifying the connection.
/// Reconnecting the same `(receiver, slot)` pair is a no-op.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use crosswire::{connect, Object, ObjectCore, Signal};
///
/// struct Sender {
///     core: ObjectCore,
///     changed: Signal<(i32,)>,
/// }
/// # impl Object for Sender {
/// #     fn object_core(&self) -> &ObjectCore { &self.core }
/// # }
/// struct Receiver {
///     core: ObjectCore,
/// }
/// # impl Object for Receiver {
/// #     fn object_core(&self) -> &ObjectCore { &self.core }
/// # }
///
/// impl Receiver {
///     fn on_changed(&self, value: i32) {
///         println!("changed to {value}");
///     }
/// }
///
/// let sender = Arc::new(Sender { core: ObjectCore::new(), changed: Signal::new() });
/// let receiver = Arc::new(Receiver { core: ObjectCore::new() });
/// connect(&sender, |s| &s.changed, &receiver, Receiver::on_changed);
/// sender.changed.emit((7,));
/// ```
pub fn connect<S, R, Args, F, M>(
    sender: &Arc<S>,
    signal: impl Fn(&S) -> &Signal<Args>,
    receiver: &Arc<R>,
    slot: F,
) -> Address
where
    S: Object,
    R: Object,
    Args: Clone + Send + 'static,
    F: ObjectSlot<R, Args, M>,
{
    connect_with_kind(sender, signal, receiver, slot, ConnectionKind::Auto)
}

/// Like [`connect`], with an explicit [`ConnectionKind`].
pub fn connect_with_kind<S, R, Args, F, M>(
    sender: &Arc<S>,
    signal: impl Fn(&S) -> &Signal<Args>,
    receiver: &Arc<R>,
    slot: F,
    kind: ConnectionKind,
) -> Address
where
    S: Object,
    R: Object,
    Args: Clone + Send + 'static,
    F: ObjectSlot<R, Args, M>,
{
    let sig = signal(sender.as_ref());
    let sender_address = Address::signal(sender.object_core().id(), sig.signal_id());
    let receiver_address = Address::slot(
        receiver.object_core().id(),
        <F as ObjectSlot<R, Args, M>>::slot_id(),
    );

    let installed = sig.add_handler(
        receiver_address,
        Handler {
            thread: receiver.thread_id(),
            kind,
            invoke: slot.bind(receiver),
        },
    );
    if !installed {
        // Duplicate connect: the handler and both index entries already
        // exist together.
        return receiver_address;
    }

    // Sender-side cleanup: when the sender goes away, drop the receiver's
    // record of this connection.
    let receiver_tables = receiver.object_core().weak_flag();
    sender.object_core().tables().add_receiver(
        receiver_address,
        Box::new(move || {
            if let Some(tables) = receiver_tables.upgrade() {
                tables.remove_sender(&sender_address, &receiver_address.slot_code());
            }
        }),
    );

    // Receiver-side cleanup: when the receiver goes away, pull the handler
    // out of the signal and drop the sender's record.
    let handlers = sig.handlers_weak();
    let sender_tables = sender.object_core().weak_flag();
    receiver.object_core().tables().add_sender(
        sender_address,
        receiver_address.slot_code(),
        Box::new(move || {
            if let Some(handlers) = handlers.upgrade() {
                Signal::remove_from(&handlers, &receiver_address);
            }
            if let Some(tables) = sender_tables.upgrade() {
                tables.remove_receiver(&receiver_address);
            }
        }),
    );

    tracing::trace!(
        target: "crosswire::connect",
        sender = ?sender_address,
        receiver = ?receiver_address,
        ?kind,
        "connected",
    );
    receiver_address
}

/// Remove the subscription of `receiver`'s `slot` to a signal of `sender`.
/// Idempotent; a connection that was never made (or already removed) leaves
/// everything unchanged.
pub fn disconnect<S, R, Args, F, M>(
    sender: &Arc<S>,
    signal: impl Fn(&S) -> &Signal<Args>,
    receiver: &Arc<R>,
    _slot: F,
) where
    S: Object,
    R: Object,
    Args: Clone + Send + 'static,
    F: ObjectSlot<R, Args, M>,
{
    let receiver_address = Address::slot(
        receiver.object_core().id(),
        <F as ObjectSlot<R, Args, M>>::slot_id(),
    );
    disconnect_by_address(sender, signal, receiver, receiver_address);
}

/// [`disconnect`] keyed by the [`Address`] a connect call returned. This is
/// the only way to remove a single closure connection, since a closure
/// cannot be named a second time.
pub fn disconnect_by_address<S, R, Args>(
    sender: &Arc<S>,
    signal: impl Fn(&S) -> &Signal<Args>,
    receiver: &Arc<R>,
    address: Address,
) where
    S: Object,
    R: Object,
{
    let sig = signal(sender.as_ref());
    sig.remove_handler(&address);

    let sender_address = Address::signal(sender.object_core().id(), sig.signal_id());
    let sender_tables = sender.object_core().tables();
    let receiver_tables = receiver.object_core().tables();
    if sender_tables.contains_receiver(&address)
        && receiver_tables.contains_sender(&sender_address, &address.slot_code())
    {
        sender_tables.remove_receiver(&address);
        receiver_tables.remove_sender(&sender_address, &address.slot_code());
    }
}
