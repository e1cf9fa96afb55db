//! Events dispatched through an [`EventLoop`](crate::EventLoop).

use std::fmt;
use std::sync::Weak;
use std::time::Duration;

use crate::id::ObjectId;
use crate::invocation::CompletionHandle;
use crate::timer::Timer;

/// An owned nullary callable carried by a slot event.
pub type SlotFn = Box<dyn FnOnce() + Send>;

/// A message posted into an event loop.
///
/// `Slot` and `BlockingSlot` events are queued and executed in FIFO order on
/// the loop's owner thread. The timer variants are *not* queued: the loop
/// handles them inline on the posting thread so a slow event in front of
/// them cannot skew the timer's start time (see
/// [`EventLoop::post_event`](crate::EventLoop::post_event)).
pub enum Event {
    /// Invoke a callable on the loop's owner thread.
    Slot(SlotFn),
    /// Invoke a callable, then wake the emitter blocked on the completion
    /// handle's waiter.
    BlockingSlot(SlotFn, CompletionHandle),
    /// Arm (or re-arm) the wait timer for a [`Timer`] object.
    StartTimer {
        /// Id of the timer object.
        id: ObjectId,
        /// The timer itself; the loop must not extend its lifetime.
        timer: Weak<Timer>,
        /// Delay until the timeout fires.
        interval: Duration,
        /// Whether the timer re-arms itself after each timeout.
        repeating: bool,
    },
    /// Cancel the wait timer for a [`Timer`] object. Unknown ids are
    /// ignored.
    StopTimer {
        /// Id of the timer object.
        id: ObjectId,
    },
}

impl Event {
    /// Create a `Slot` event from a closure.
    pub fn slot<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::Slot(Box::new(f))
    }

    /// Create a `BlockingSlot` event from a closure and a completion handle.
    pub fn blocking_slot<F>(f: F, done: CompletionHandle) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::BlockingSlot(Box::new(f), done)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slot(_) => f.write_str("Event::Slot"),
            Self::BlockingSlot(..) => f.write_str("Event::BlockingSlot"),
            Self::StartTimer {
                id,
                interval,
                repeating,
                ..
            } => f
                .debug_struct("Event::StartTimer")
                .field("id", id)
                .field("interval", interval)
                .field("repeating", repeating)
                .finish(),
            Self::StopTimer { id } => {
                f.debug_struct("Event::StopTimer").field("id", id).finish()
            }
        }
    }
}
