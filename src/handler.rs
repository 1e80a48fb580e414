//! Type-erased slot invokers and parameter-arity adaptation.
//!
//! A slot may declare a strict prefix of its signal's parameter tuple: a
//! `Signal<(i32, char, String)>` accepts slots taking `()`, `(i32)`,
//! `(i32, char)` or all three. [`FromArgs`] is the structural check — it is
//! implemented only for strict prefixes (up to five elements), so anything
//! else fails to compile.
//!
//! Two families of callables plug into this:
//!
//! - [`ObjectSlot`]: a method (`Fn(&R, prefix…)`) or closure (`Fn(prefix…)`)
//!   bound to an [`Object`] receiver. Binding erases the callable into an
//!   `Arc<dyn Fn(&Args)>` that holds the receiver weakly and skips the call
//!   once the receiver is gone.
//! - [`FreeSlot`]: a free function or closure with no receiver, used by
//!   [`Signal::connect_fn`](crate::signal::Signal::connect_fn).
//!
//! The `Marker` parameters exist only to keep the per-arity impls coherent;
//! they are always inferred.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::address::SlotId;
use crate::object::Object;

/// A tuple that is a strict prefix of the signal argument tuple `Args`.
///
/// `select` clones the leading arguments out of an emitted tuple.
pub trait FromArgs<Args>: Sized {
    /// Clone the first `k` arguments, where `k` is this tuple's arity.
    fn select(args: &Args) -> Self;
}

macro_rules! from_args_impl {
    ([$($full:ident),*] [$(($pre:ident, $idx:tt)),*]) => {
        impl<$($full),*> FromArgs<($($full,)*)> for ($($pre,)*)
        where
            $($pre: Clone,)*
        {
            #[allow(unused_variables)]
            fn select(args: &($($full,)*)) -> Self {
                ($(args.$idx.clone(),)*)
            }
        }
    };
}

from_args_impl!([] []);
from_args_impl!([A] []);
from_args_impl!([A] [(A, 0)]);
from_args_impl!([A, B] []);
from_args_impl!([A, B] [(A, 0)]);
from_args_impl!([A, B] [(A, 0), (B, 1)]);
from_args_impl!([A, B, C] []);
from_args_impl!([A, B, C] [(A, 0)]);
from_args_impl!([A, B, C] [(A, 0), (B, 1)]);
from_args_impl!([A, B, C] [(A, 0), (B, 1), (C, 2)]);
from_args_impl!([A, B, C, D] []);
from_args_impl!([A, B, C, D] [(A, 0)]);
from_args_impl!([A, B, C, D] [(A, 0), (B, 1)]);
from_args_impl!([A, B, C, D] [(A, 0), (B, 1), (C, 2)]);
from_args_impl!([A, B, C, D] [(A, 0), (B, 1), (C, 2), (D, 3)]);
from_args_impl!([A, B, C, D, E] []);
from_args_impl!([A, B, C, D, E] [(A, 0)]);
from_args_impl!([A, B, C, D, E] [(A, 0), (B, 1)]);
from_args_impl!([A, B, C, D, E] [(A, 0), (B, 1), (C, 2)]);
from_args_impl!([A, B, C, D, E] [(A, 0), (B, 1), (C, 2), (D, 3)]);
from_args_impl!([A, B, C, D, E] [(A, 0), (B, 1), (C, 2), (D, 3), (E, 4)]);

/// The erased invoker stored in a signal's handler set.
pub type Invoker<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// Marker distinguishing closure-shaped object slots. Inferred, never named.
#[doc(hidden)]
pub struct ClosureMarker<T>(PhantomData<T>);

/// Marker distinguishing method-shaped object slots. Inferred, never named.
#[doc(hidden)]
pub struct MethodMarker<T>(PhantomData<T>);

/// A callable connectable to a signal with an [`Object`] receiver.
///
/// Implemented for methods taking `&R` plus a strict prefix of the signal
/// arguments, and for closures taking a strict prefix alone. The callable's
/// type is its identity: connecting the same method twice is a no-op, and
/// `disconnect` with the same method finds the connection again.
pub trait ObjectSlot<R, Args, Marker>: Send + Sync + 'static {
    /// Stable identity of this callable.
    fn slot_id() -> SlotId
    where
        Self: Sized,
    {
        SlotId::of::<Self>()
    }

    /// Erase into an invoker holding `receiver` weakly.
    fn bind(self, receiver: &Arc<R>) -> Invoker<Args>;
}

macro_rules! method_slot_impl {
    ($($p:ident),*) => {
        impl<R, Args, F, $($p),*> ObjectSlot<R, Args, MethodMarker<fn(&R, $($p),*)>> for F
        where
            R: Object,
            Args: 'static,
            F: Fn(&R, $($p),*) + Send + Sync + 'static,
            ($($p,)*): FromArgs<Args>,
        {
            fn bind(self, receiver: &Arc<R>) -> Invoker<Args> {
                let receiver = Arc::downgrade(receiver);
                Arc::new(move |args: &Args| {
                    let Some(receiver) = receiver.upgrade() else {
                        tracing::trace!(target: "crosswire::signal", "receiver gone, slot skipped");
                        return;
                    };
                    #[allow(non_snake_case)]
                    let ($($p,)*) = <($($p,)*)>::select(args);
                    (self)(&*receiver, $($p),*)
                })
            }
        }
    };
}

method_slot_impl!();
method_slot_impl!(A);
method_slot_impl!(A, B);
method_slot_impl!(A, B, C);
method_slot_impl!(A, B, C, D);
method_slot_impl!(A, B, C, D, E);

macro_rules! closure_slot_impl {
    ($($p:ident),*) => {
        impl<R, Args, F, $($p),*> ObjectSlot<R, Args, ClosureMarker<fn($($p),*)>> for F
        where
            R: Object,
            Args: 'static,
            F: Fn($($p),*) + Send + Sync + 'static,
            ($($p,)*): FromArgs<Args>,
        {
            fn bind(self, receiver: &Arc<R>) -> Invoker<Args> {
                // The closure never touches the receiver, but its lifetime
                // still gates invocation.
                let alive = receiver.object_core().weak_flag();
                Arc::new(move |args: &Args| {
                    if alive.upgrade().is_none() {
                        tracing::trace!(target: "crosswire::signal", "receiver gone, slot skipped");
                        return;
                    }
                    #[allow(non_snake_case)]
                    let ($($p,)*) = <($($p,)*)>::select(args);
                    (self)($($p),*)
                })
            }
        }
    };
}

closure_slot_impl!();
closure_slot_impl!(A);
closure_slot_impl!(A, B);
closure_slot_impl!(A, B, C);
closure_slot_impl!(A, B, C, D);
closure_slot_impl!(A, B, C, D, E);

/// A free function or closure connectable without a receiver.
pub trait FreeSlot<Args, Marker>: Send + Sync + 'static {
    /// Stable identity of this callable.
    fn slot_id() -> SlotId
    where
        Self: Sized,
    {
        SlotId::of::<Self>()
    }

    /// Erase into an invoker.
    fn erase(self) -> Invoker<Args>;
}

macro_rules! free_slot_impl {
    ($($p:ident),*) => {
        impl<Args, F, $($p),*> FreeSlot<Args, fn($($p),*)> for F
        where
            Args: 'static,
            F: Fn($($p),*) + Send + Sync + 'static,
            ($($p,)*): FromArgs<Args>,
        {
            fn erase(self) -> Invoker<Args> {
                Arc::new(move |args: &Args| {
                    #[allow(non_snake_case)]
                    let ($($p,)*) = <($($p,)*)>::select(args);
                    (self)($($p),*)
                })
            }
        }
    };
}

free_slot_impl!();
free_slot_impl!(A);
free_slot_impl!(A, B);
free_slot_impl!(A, B, C);
free_slot_impl!(A, B, C, D);
free_slot_impl!(A, B, C, D, E);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectCore;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_select_full_tuple() {
        let args = (5i32, 'x', "hi".to_string());
        let picked = <(i32, char, String)>::select(&args);
        assert_eq!(picked, (5, 'x', "hi".to_string()));
    }

    #[test]
    fn test_select_prefixes() {
        let args = (5i32, 'x', "hi".to_string());
        assert_eq!(<(i32,)>::select(&args), (5,));
        assert_eq!(<(i32, char)>::select(&args), (5, 'x'));
        <()>::select(&args);
    }

    struct Receiver {
        core: ObjectCore,
        seen: Mutex<Vec<i32>>,
    }

    impl Receiver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                core: ObjectCore::new(),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn record(&self, value: i32) {
            self.seen.lock().push(value);
        }
    }

    impl Object for Receiver {
        fn object_core(&self) -> &ObjectCore {
            &self.core
        }
    }

    #[test]
    fn test_method_binding_adapts_arity() {
        let receiver = Receiver::new();
        let invoker: Invoker<(i32, char)> = Receiver::record.bind(&receiver);
        invoker(&(7, 'q'));
        assert_eq!(*receiver.seen.lock(), vec![7]);
    }

    #[test]
    fn test_method_binding_skips_dead_receiver() {
        let receiver = Receiver::new();
        let invoker: Invoker<(i32,)> = Receiver::record.bind(&receiver);
        drop(receiver);
        invoker(&(7,)); // must not panic, must not call
    }

    #[test]
    fn test_closure_binding_gates_on_receiver_liveness() {
        let receiver = Receiver::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let invoker: Invoker<(i32,)> = (move |value: i32| {
            count2.fetch_add(value as usize, Ordering::SeqCst);
        })
        .bind(&receiver);
        invoker(&(2,));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        drop(receiver);
        invoker(&(2,));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_free_slot_erase() {
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let invoker: Invoker<(i32, char)> =
            (move |value: i32| {
                count2.fetch_add(value as usize, Ordering::SeqCst);
            })
            .erase();
        invoker(&(3, 'z'));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_slot_ids_stable_for_methods() {
        fn id_of<F, R, Args, M>(_: &F) -> SlotId
        where
            F: ObjectSlot<R, Args, M>,
        {
            F::slot_id()
        }
        let a = id_of::<_, Receiver, (i32,), _>(&Receiver::record);
        let b = id_of::<_, Receiver, (i32,), _>(&Receiver::record);
        assert_eq!(a, b);
    }
}
