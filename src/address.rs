//! Stable identity for connection endpoints.
//!
//! A connection is keyed on both sides by an [`Address`]: the pairing of an
//! object identity with a function code. Member-function pointers cannot be
//! turned into hashable bit patterns in Rust, so identity here is built from
//! opaque tokens instead:
//!
//! - every [`ObjectCore`](crate::object::ObjectCore) draws an [`ObjectId`]
//!   from a process-wide counter;
//! - every [`Signal`](crate::signal::Signal) instance draws a [`SignalId`];
//! - slots are keyed by the [`TypeId`] of their callable. Method items and
//!   free functions are unique zero-sized types, so the same method always
//!   produces the same [`SlotId`]; each closure expression is likewise its
//!   own type.
//!
//! Note that plain `fn` *pointers* of one signature share a `TypeId`; pass
//! function items (`my_fn`, `MyType::my_method`) rather than values already
//! coerced to `fn(..)` if you need distinct identities.

use std::any::TypeId;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_SIGNAL_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a participating object, assigned at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    pub(crate) fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of a signal instance, assigned at construction.
///
/// Two signals of the same argument type owned by the same object still get
/// distinct ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SignalId(u64);

impl SignalId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SIGNAL_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of a slot callable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotId(TypeId);

impl SlotId {
    /// The slot id of a callable type.
    pub fn of<F: 'static>() -> Self {
        Self(TypeId::of::<F>())
    }
}

/// The function half of an [`Address`]: either a signal or a slot endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    /// A signal emission point.
    Signal(SignalId),
    /// A slot callable.
    Slot(SlotId),
}

/// The stable identity of a connection endpoint.
///
/// `object` is `None` for non-object endpoints (free functions and closures
/// connected through [`Signal::connect_fn`](crate::signal::Signal::connect_fn)).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    /// The owning object, if any.
    pub object: Option<ObjectId>,
    /// The signal or slot token.
    pub code: FunctionCode,
}

impl Address {
    /// Address of a signal owned by an object.
    pub(crate) fn signal(object: ObjectId, signal: SignalId) -> Self {
        Self {
            object: Some(object),
            code: FunctionCode::Signal(signal),
        }
    }

    /// Address of a slot on an object receiver.
    pub(crate) fn slot(object: ObjectId, slot: SlotId) -> Self {
        Self {
            object: Some(object),
            code: FunctionCode::Slot(slot),
        }
    }

    /// Address of a free-standing slot (no receiver object).
    pub(crate) fn free_slot(slot: SlotId) -> Self {
        Self {
            object: None,
            code: FunctionCode::Slot(slot),
        }
    }

    pub(crate) fn slot_code(&self) -> FunctionCode {
        self.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_fn_a() {}
    fn free_fn_b() {}

    #[test]
    fn test_object_ids_unique() {
        let a = ObjectId::next();
        let b = ObjectId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_signal_ids_unique() {
        let a = SignalId::next();
        let b = SignalId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn test_slot_id_stable_per_item() {
        // The same function item always yields the same id; different items
        // differ.
        fn id_of_a() -> SlotId {
            // Function items are zero-sized unique types.
            fn helper<F: 'static>(_: F) -> SlotId {
                SlotId::of::<F>()
            }
            helper(free_fn_a)
        }
        assert_eq!(id_of_a(), id_of_a());

        fn helper<F: 'static>(_: F) -> SlotId {
            SlotId::of::<F>()
        }
        assert_ne!(helper(free_fn_a), helper(free_fn_b));
    }

    #[test]
    fn test_closures_have_distinct_ids() {
        fn helper<F: 'static>(_: F) -> SlotId {
            SlotId::of::<F>()
        }
        let a = helper(|| {});
        let b = helper(|| {});
        assert_ne!(a, b);
    }

    #[test]
    fn test_address_equality() {
        let obj = ObjectId::next();
        let sig = SignalId::next();
        assert_eq!(Address::signal(obj, sig), Address::signal(obj, sig));
        assert_ne!(
            Address::signal(obj, sig),
            Address::signal(obj, SignalId::next())
        );
    }
}
