//! Thread-affinitized signal/slot dispatch with per-thread event loops.
//!
//! crosswire lets an object publish typed events (*signals*) to which any
//! number of receivers subscribe (*slots*), delivering each slot on its
//! owner's home thread:
//!
//! - **Signals** ([`Signal`]) are typed multicast emission points. Slots may
//!   declare a strict prefix of the signal's parameters.
//! - **Event loops** ([`EventLoop`]) are per-thread FIFO executors with
//!   single-shot and repeating timers, woken through a condvar.
//! - **Objects** ([`Object`] + [`ObjectCore`]) carry a home thread id and
//!   the bookkeeping that automatically revokes connections on destruction.
//! - **Connection kinds** ([`ConnectionKind`]) choose where a slot runs:
//!   inline (`Direct`), on the receiver's loop (`Queued`), awaited
//!   (`BlockingQueued`), or resolved per emit (`Auto`, the default).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use crosswire::{connect, Object, ObjectCore, Signal};
//!
//! struct Window {
//!     core: ObjectCore,
//!     clicked: Signal<(i32, char)>,
//! }
//!
//! impl Object for Window {
//!     fn object_core(&self) -> &ObjectCore {
//!         &self.core
//!     }
//! }
//!
//! struct Label {
//!     core: ObjectCore,
//! }
//!
//! impl Label {
//!     // Slots may take a prefix of the signal's parameters.
//!     fn on_clicked(&self, button: i32) {
//!         println!("button {button}");
//!     }
//! }
//!
//! impl Object for Label {
//!     fn object_core(&self) -> &ObjectCore {
//!         &self.core
//!     }
//! }
//!
//! let window = Arc::new(Window { core: ObjectCore::new(), clicked: Signal::new() });
//! let label = Arc::new(Label { core: ObjectCore::new() });
//!
//! connect(&window, |w| &w.clicked, &label, Label::on_clicked);
//! window.clicked.emit((1, 'a'));
//! ```
//!
//! # Cross-thread delivery
//!
//! Move a receiver to a worker and emissions route to that worker's loop:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use crosswire::{connect, Object, ObjectCore, Signal, Thread};
//! # struct Window { core: ObjectCore, clicked: Signal<(i32, char)> }
//! # impl Object for Window { fn object_core(&self) -> &ObjectCore { &self.core } }
//! # struct Label { core: ObjectCore }
//! # impl Label { fn on_clicked(&self, button: i32) {} }
//! # impl Object for Label { fn object_core(&self) -> &ObjectCore { &self.core } }
//! # let window = Arc::new(Window { core: ObjectCore::new(), clicked: Signal::new() });
//! # let label = Arc::new(Label { core: ObjectCore::new() });
//! let worker = Thread::new();
//! label.move_to_thread(&worker);
//! connect(&window, |w| &w.clicked, &label, Label::on_clicked);
//! window.clicked.emit((2, 'b')); // on_clicked runs on the worker
//! ```
//!
//! Destroying either endpoint revokes the connection; use
//! [`Object::delete_later`] to destroy an object from off its home thread.

#![warn(missing_docs)]

mod address;
mod connect;
mod error;
mod event_loop;
mod handler;
mod object;
pub mod registry;
mod signal;
mod thread;
mod timer;

pub use address::{Address, FunctionCode, ObjectId, SignalId, SlotId};
pub use connect::{connect, connect_with_kind, disconnect, disconnect_by_address};
pub use error::{CrosswireError, LoopError, Result, TimerError};
pub use event_loop::{EventLoop, TimerId};
pub use handler::{FreeSlot, FromArgs, Invoker, ObjectSlot};
pub use object::{Object, ObjectCore};
pub use registry::{current_thread_id, ThreadId};
pub use signal::{ConnectionKind, Signal};
pub use thread::Thread;
pub use timer::Timer;
