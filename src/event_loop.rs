//! The event loop: a single-threaded cooperative queue with timers.
//!
//! An [`EventLoop`] serializes work posted from any thread onto one "owner"
//! thread. The owner is whichever thread called [`start`](EventLoop::start);
//! only that thread may drive the loop with [`run`](EventLoop::run) or
//! [`process_events`](EventLoop::process_events). Posting is thread-safe
//! and FIFO per posting thread.
//!
//! # Lifecycle
//!
//! A loop is constructed inert. `start` marks it started and records the
//! owner thread; `run` blocks draining events until [`stop`](EventLoop::stop)
//! is observed; `process_events` drains what is currently queued and
//! returns. `stop` may be called from any thread and is idempotent.
//! Events posted while the loop is stopped are retained and execute after
//! the next `start`.
//!
//! # Timers
//!
//! Timer start/stop events are deliberately *not* queued: they execute on
//! the posting thread, under the loop's lock, so a slow event at the front
//! of the queue cannot delay a timer's epoch. See
//! [`Timer`](crate::Timer).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::{EventLoopError, Result};
use crate::event::Event;
use crate::id::{EventLoopId, ObjectId};
use crate::reactor::{QueueReactor, Reactor, WaitTimer};
use crate::task::Task;
use crate::timer::Timer;

/// A timer armed on this loop.
///
/// There is at most one record per timer id; re-arming cancels and replaces
/// the previous record. The `canceled` flag turns any in-flight timeout
/// into a no-op.
struct TimerRecord {
    timer: Weak<Timer>,
    interval: Duration,
    repeating: bool,
    canceled: AtomicBool,
    wait: Mutex<Box<dyn WaitTimer>>,
}

struct LoopState {
    started: bool,
    running: bool,
    thread: Option<ThreadId>,
    timers: HashMap<ObjectId, Arc<TimerRecord>>,
}

/// A single-threaded cooperative event queue with timer scheduling.
///
/// # Example
///
/// ```
/// use strand_core::{Event, EventLoop};
///
/// let event_loop = EventLoop::new();
/// let handle = EventLoop::launch_in_thread(event_loop.clone());
///
/// event_loop.post_event(Event::slot(|| println!("runs on the loop thread")));
///
/// EventLoop::remove_from_thread(&event_loop, handle, true);
/// ```
pub struct EventLoop {
    id: EventLoopId,
    weak_self: Weak<EventLoop>,
    reactor: Arc<dyn Reactor>,
    state: Mutex<LoopState>,
    started_cv: Condvar,
    running_cv: Condvar,
    stopped_cv: Condvar,
}

impl EventLoop {
    /// Create a new, inert event loop backed by the default
    /// [`QueueReactor`](crate::reactor::QueueReactor).
    pub fn new() -> Arc<EventLoop> {
        Self::with_reactor(QueueReactor::new())
    }

    /// Create a new event loop driving the given reactor.
    pub fn with_reactor(reactor: Arc<dyn Reactor>) -> Arc<EventLoop> {
        Arc::new_cyclic(|weak_self| EventLoop {
            id: EventLoopId::next(),
            weak_self: weak_self.clone(),
            reactor,
            state: Mutex::new(LoopState {
                started: false,
                running: false,
                thread: None,
                timers: HashMap::new(),
            }),
            started_cv: Condvar::new(),
            running_cv: Condvar::new(),
            stopped_cv: Condvar::new(),
        })
    }

    /// Get this loop's unique id.
    pub fn id(&self) -> EventLoopId {
        self.id
    }

    /// The owner thread, or `None` when the loop is stopped.
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.state.lock().thread
    }

    /// Whether `start` has been called without a subsequent `stop`.
    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// Whether a `run` call is currently draining events.
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Snapshot `(owner thread, started, running)` atomically.
    pub fn state(&self) -> (Option<ThreadId>, bool, bool) {
        let state = self.state.lock();
        (state.thread, state.started, state.running)
    }

    /// Mark the loop started and record the calling thread as its owner.
    ///
    /// Installs a keepalive so `run` keeps waiting while idle. A second
    /// call while started is a no-op.
    pub fn start(&self) {
        let mut state = self.state.lock();
        if state.started {
            return;
        }

        self.reactor.restart();
        self.reactor.add_keepalive();
        state.thread = Some(thread::current().id());
        state.started = true;
        tracing::debug!(target: "strand_core::event_loop", id = self.id.as_u64(), "started");

        self.started_cv.notify_all();
    }

    /// Drain events, blocking while idle, until `stop` is observed.
    ///
    /// # Errors
    ///
    /// [`EventLoopError::Inactive`] if the loop has not been started, and
    /// [`EventLoopError::WrongThread`] if the caller is not the thread that
    /// called `start`.
    pub fn run(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            self.check_active(&state)?;
            state.running = true;
            self.running_cv.notify_all();
        }

        self.reactor.run(); // blocks

        self.state.lock().running = false;
        Ok(())
    }

    /// Drain currently queued events without blocking, then return.
    ///
    /// # Errors
    ///
    /// Same preconditions as [`run`](Self::run).
    pub fn process_events(&self) -> Result<()> {
        {
            let state = self.state.lock();
            self.check_active(&state)?;
        }
        self.reactor.poll();
        Ok(())
    }

    fn check_active(&self, state: &LoopState) -> Result<()> {
        if !state.started {
            tracing::warn!(
                target: "strand_core::event_loop",
                id = self.id.as_u64(),
                "run/process_events called but the event loop has not been started"
            );
            return Err(EventLoopError::Inactive.into());
        }
        if state.thread != Some(thread::current().id()) {
            tracing::error!(
                target: "strand_core::event_loop",
                id = self.id.as_u64(),
                "run/process_events should only be called from the thread that called start"
            );
            return Err(EventLoopError::WrongThread.into());
        }
        Ok(())
    }

    /// Stop the loop: clear the started flag and owner thread, release the
    /// keepalive, and ask the reactor to return from `run`.
    ///
    /// Safe to call from any thread; idempotent. Queued events survive a
    /// stop and execute after the next `start`.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        self.reactor.remove_keepalive();
        self.reactor.stop();
        state.thread = None;
        state.started = false;
        tracing::debug!(target: "strand_core::event_loop", id = self.id.as_u64(), "stopped");
        self.stopped_cv.notify_all();
    }

    /// Block until the loop has stopped. A no-op if it never started.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while state.started {
            self.stopped_cv.wait(&mut state);
        }
    }

    /// Post an event. Thread-safe.
    ///
    /// Timer events are handled inline on the calling thread (see the
    /// module docs); everything else is enqueued FIFO.
    pub fn post_event(&self, event: Event) {
        match event {
            Event::StartTimer {
                id,
                timer,
                interval,
                repeating,
            } => self.start_timer(id, timer, interval, repeating),
            Event::StopTimer { id } => self.stop_timer(id),
            Event::Slot(slot) => self.reactor.post(slot),
            Event::BlockingSlot(slot, done) => self.reactor.post(Box::new(move || {
                slot();
                done.signal_done();
            })),
        }
    }

    /// Enqueue a `stop` so it executes in order after previously posted
    /// events.
    pub fn post_stop_event(&self) {
        let weak = self.weak_self.clone();
        self.reactor.post(Box::new(move || {
            if let Some(event_loop) = weak.upgrade() {
                event_loop.stop();
            }
        }));
    }

    /// Run a task on this loop.
    ///
    /// If the calling thread is the owner the task is invoked immediately;
    /// otherwise it is enqueued. Either way the task's own
    /// [`wait`](crate::Task::wait) reports completion.
    pub fn post_task(&self, task: Arc<Task>) {
        let owner = self.state.lock().thread;
        if owner == Some(thread::current().id()) {
            task.invoke();
        } else {
            self.reactor.post(Box::new(move || task.invoke()));
        }
    }

    /// Start a helper thread that calls `start` then `run`, returning its
    /// handle once the loop is observed running.
    pub fn launch_in_thread(event_loop: Arc<EventLoop>) -> JoinHandle<()> {
        let in_thread = event_loop.clone();
        let handle = thread::spawn(move || {
            in_thread.start();
            let _ = in_thread.run();
        });

        event_loop.wait_until_running();
        handle
    }

    /// Stop a loop launched with [`launch_in_thread`](Self::launch_in_thread)
    /// and join its thread.
    ///
    /// With `post_stop` the stop is queued behind pending events; otherwise
    /// it takes effect immediately.
    pub fn remove_from_thread(event_loop: &Arc<EventLoop>, handle: JoinHandle<()>, post_stop: bool) {
        if post_stop {
            event_loop.post_stop_event();
        } else {
            event_loop.stop();
        }

        let _ = handle.join();
    }

    fn wait_until_running(&self) {
        let mut state = self.state.lock();
        while !state.running {
            self.running_cv.wait(&mut state);
        }
    }

    // -------------------------------------------------------------------------
    // Timer handling
    // -------------------------------------------------------------------------

    fn start_timer(&self, id: ObjectId, timer: Weak<Timer>, interval: Duration, repeating: bool) {
        let mut state = self.state.lock();

        let Some(strong) = timer.upgrade() else {
            // The timer object was destroyed.
            return;
        };

        if let Some(previous) = state.timers.remove(&id) {
            previous.canceled.store(true, Ordering::SeqCst);
            previous.wait.lock().cancel();
        }

        let record = Arc::new(TimerRecord {
            timer,
            interval,
            repeating,
            canceled: AtomicBool::new(false),
            wait: Mutex::new(self.reactor.clone().make_wait_timer()),
        });

        strong.set_active(true);
        state.timers.insert(id, record.clone());
        tracing::trace!(
            target: "strand_core::timer",
            timer = id.as_u64(),
            ?interval,
            repeating,
            "timer armed"
        );
        Self::arm_timer(&record);
    }

    fn stop_timer(&self, id: ObjectId) {
        let mut state = self.state.lock();

        let Some(record) = state.timers.remove(&id) else {
            return;
        };

        if let Some(timer) = record.timer.upgrade() {
            timer.set_active(false);
        }

        record.canceled.store(true, Ordering::SeqCst);
        record.wait.lock().cancel();
        tracing::trace!(target: "strand_core::timer", timer = id.as_u64(), "timer stopped");
    }

    fn arm_timer(record: &Arc<TimerRecord>) {
        let rearm = record.clone();
        let interval = record.interval;
        record
            .wait
            .lock()
            .schedule(interval, Box::new(move || Self::handle_timeout(rearm)));
    }

    fn handle_timeout(record: Arc<TimerRecord>) {
        if record.canceled.load(Ordering::SeqCst) {
            return;
        }

        let Some(timer) = record.timer.upgrade() else {
            // The timer object has been destroyed.
            return;
        };

        if let Err(err) = timer.timeout.emit(()) {
            tracing::warn!(target: "strand_core::timer", %err, "timeout emission failed");
        }

        if record.repeating {
            // The next deadline is measured from now; no drift correction.
            Self::arm_timer(&record);
        } else {
            timer.set_active(false);
        }
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use std::sync::atomic::AtomicUsize;

    fn counting_event(count: &Arc<AtomicUsize>) -> Event {
        let count = count.clone();
        Event::slot(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_events_queued_before_start_survive() {
        let event_loop = EventLoop::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            event_loop.post_event(counting_event(&count));
        }
        assert_eq!(count.load(Ordering::SeqCst), 0);

        event_loop.start();
        event_loop.process_events().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_start_is_idempotent() {
        let event_loop = EventLoop::new();
        let count = Arc::new(AtomicUsize::new(0));

        event_loop.start();
        event_loop.process_events().unwrap();

        event_loop.post_event(counting_event(&count));
        event_loop.post_event(counting_event(&count));
        // A second start must not disturb queued events.
        event_loop.start();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        event_loop.process_events().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_run_and_process_events_require_start() {
        let event_loop = EventLoop::new();

        assert_eq!(
            event_loop.run(),
            Err(CoreError::EventLoop(EventLoopError::Inactive))
        );
        assert_eq!(
            event_loop.process_events(),
            Err(CoreError::EventLoop(EventLoopError::Inactive))
        );
    }

    #[test]
    fn test_process_events_from_wrong_thread_fails() {
        let event_loop = EventLoop::new();
        event_loop.start();
        event_loop.process_events().unwrap();

        let other = event_loop.clone();
        let result = std::thread::spawn(move || other.process_events())
            .join()
            .unwrap();
        assert_eq!(result, Err(CoreError::EventLoop(EventLoopError::WrongThread)));

        event_loop.stop();
    }

    #[test]
    fn test_stop_and_wait_on_unstarted_loop() {
        let event_loop = EventLoop::new();
        event_loop.stop();
        event_loop.wait(); // must not block
        assert!(!event_loop.is_started());
    }

    #[test]
    fn test_restart_processes_new_events() {
        let event_loop = EventLoop::new();
        let count = Arc::new(AtomicUsize::new(0));

        event_loop.start();
        event_loop.post_event(counting_event(&count));
        event_loop.process_events().unwrap();
        event_loop.stop();
        event_loop.wait();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        event_loop.start();
        event_loop.post_event(counting_event(&count));
        event_loop.post_event(counting_event(&count));
        event_loop.process_events().unwrap();
        event_loop.stop();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_thread_id_tracks_started_state() {
        let event_loop = EventLoop::new();
        assert!(event_loop.thread_id().is_none());

        event_loop.start();
        assert_eq!(event_loop.thread_id(), Some(thread::current().id()));
        assert!(event_loop.is_started());

        event_loop.stop();
        assert!(event_loop.thread_id().is_none());
        assert!(!event_loop.is_started());
    }

    #[test]
    fn test_post_stop_event_executes_in_order() {
        let event_loop = EventLoop::new();
        let count = Arc::new(AtomicUsize::new(0));

        let handle = EventLoop::launch_in_thread(event_loop.clone());

        event_loop.post_event(counting_event(&count));
        event_loop.post_event(counting_event(&count));
        event_loop.post_stop_event();
        event_loop.post_event(counting_event(&count));
        event_loop.post_event(counting_event(&count));

        event_loop.wait();
        handle.join().unwrap();

        // The stop executed after the first two events; the last two stay
        // queued for a future start.
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_launch_and_remove_from_thread() {
        let event_loop = EventLoop::new();
        let count = Arc::new(AtomicUsize::new(0));

        let handle = EventLoop::launch_in_thread(event_loop.clone());
        assert!(event_loop.is_running());

        event_loop.post_event(counting_event(&count));
        EventLoop::remove_from_thread(&event_loop, handle, true);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!event_loop.is_started());
    }
}
