//! One-shot and repeating timers driven by an event loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::event::Event;
use crate::event_loop::EventLoop;
use crate::object::{make_object, Object, ObjectCore};
use crate::signal::Signal;

/// A timer object whose [`timeout`](Timer::timeout) signal is emitted by
/// its event loop.
///
/// Starting a timer posts a start event that the loop handles inline (not
/// queued behind other events), so the interval is measured from the
/// `start` call. Repeating timers re-arm with the same interval measured
/// from each fire; there is no drift correction. A non-repeating timer
/// becomes inactive after its single fire.
///
/// `active` may be read from any thread, including concurrently with the
/// timeout callback.
pub struct Timer {
    core: ObjectCore,
    weak_self: Mutex<Weak<Timer>>,
    interval: Mutex<Duration>,
    repeating: AtomicBool,
    active: AtomicBool,
    /// Emitted on the owner thread of the timer's event loop each time the
    /// interval elapses.
    pub timeout: Signal<()>,
}

impl Timer {
    /// Create a timer bound to the given event loop.
    pub fn create(event_loop: Arc<EventLoop>) -> Arc<Timer> {
        make_object(|key| Timer {
            core: ObjectCore::new(key, event_loop),
            weak_self: Mutex::new(Weak::new()),
            interval: Mutex::new(Duration::ZERO),
            repeating: AtomicBool::new(false),
            active: AtomicBool::new(false),
            timeout: Signal::new(),
        })
    }

    /// Arm the timer. A previous pending interval for this timer is
    /// cancelled and replaced.
    pub fn start(&self, interval: Duration, repeating: bool) {
        *self.interval.lock() = interval;
        self.repeating.store(repeating, Ordering::SeqCst);

        self.core.event_loop().post_event(Event::StartTimer {
            id: self.core.id(),
            timer: self.weak_self.lock().clone(),
            interval,
            repeating,
        });
    }

    /// Cancel the timer. A no-op if it is not armed.
    pub fn stop(&self) {
        self.core.event_loop().post_event(Event::StopTimer {
            id: self.core.id(),
        });
    }

    /// The interval passed to the most recent [`start`](Self::start).
    pub fn interval(&self) -> Duration {
        *self.interval.lock()
    }

    /// Whether the most recent [`start`](Self::start) was repeating.
    pub fn repeating(&self) -> bool {
        self.repeating.load(Ordering::SeqCst)
    }

    /// Whether the timer is armed. Cleared when a non-repeating timer
    /// fires and by [`stop`](Self::stop).
    pub fn active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

impl Object for Timer {
    fn core(&self) -> &ObjectCore {
        &self.core
    }

    fn init(self: Arc<Self>) {
        *self.weak_self.lock() = Arc::downgrade(&self);
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}
