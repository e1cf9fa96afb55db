//! Core primitives for event-driven, multithreaded applications built out
//! of loosely coupled components.
//!
//! This crate provides four interlocking pieces:
//!
//! - **Event Loop**: a single-threaded cooperative queue that serializes
//!   work posted from any thread onto one owner thread, plus timers
//! - **Object Model**: identity and lifetime for participants, each bound
//!   to exactly one event loop, with two-phase construction
//! - **Signal/Slot System**: typed many-to-many notification with direct,
//!   queued, and blocking delivery and automatic expiry of connections
//!   whose receiver has been dropped
//! - **Property System**: reactive values with automatic dependency
//!   capture and glitch-free, cycle-checked propagation
//!
//! # Signal/Slot Example
//!
//! ```
//! use strand_core::Signal;
//!
//! // Create a signal that carries an i32.
//! let value_changed = Signal::<i32>::new();
//!
//! // Connect a slot to handle the signal.
//! let conn_id = value_changed.connect(|value| {
//!     println!("Value changed to: {value}");
//! });
//!
//! // Emit the signal.
//! value_changed.emit(42).unwrap();
//!
//! // Disconnect when done.
//! value_changed.disconnect(conn_id);
//! ```
//!
//! # Property Example
//!
//! ```
//! use strand_core::Property;
//!
//! let width = Property::new(2.0_f64);
//! let height = Property::new(4.0_f64);
//!
//! // `area` recomputes whenever an input changes, exactly once per
//! // change, in dependency order.
//! let area = Property::bound({
//!     let (width, height) = (width.watch(), height.watch());
//!     move || width.get() * height.get()
//! });
//! assert_eq!(area.get(), 8.0);
//!
//! width.assign(3.0);
//! assert_eq!(area.get(), 12.0);
//! ```
//!
//! # Event Loop Example
//!
//! ```
//! use strand_core::{Event, EventLoop};
//!
//! let event_loop = EventLoop::new();
//! let handle = EventLoop::launch_in_thread(event_loop.clone());
//!
//! // Runs on the loop's thread, in posting order.
//! event_loop.post_event(Event::slot(|| println!("hello from the loop")));
//!
//! EventLoop::remove_from_thread(&event_loop, handle, true);
//! ```

#![warn(missing_docs)]
// The signal/slot layer trades in boxed callables and weak trait objects.
#![allow(clippy::type_complexity)]

mod error;
mod event;
mod event_loop;
mod id;
pub mod invocation;
pub mod logging;
pub mod object;
pub mod property;
pub mod reactor;
pub mod signal;
mod task;
mod timer;

pub use error::{CoreError, EventLoopError, Result};
pub use event::{Event, SlotFn};
pub use event_loop::EventLoop;
pub use id::{ConnectionId, EventLoopId, Id, ObjectId};
pub use invocation::{completion_pair, CompletionHandle, CompletionWaiter};
pub use object::{make_object, ConnectionContext, ConstructionKey, Object, ObjectCore};
pub use property::{Property, PropertyRef, ReadOnlyProperty};
pub use reactor::{QueueReactor, Reactor, WaitTimer};
pub use signal::{ConnectionType, DummySignalLock, LocalSignal, Signal};
pub use task::{Task, WaitStatus};
pub use timer::Timer;
