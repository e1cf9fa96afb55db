//! The reactor: a task queue plus one-shot wait timers.
//!
//! An [`EventLoop`](crate::EventLoop) does not run tasks itself; it drives a
//! reactor. The [`Reactor`] trait is the small surface the loop needs:
//! post a task from any thread, drain tasks on the owner thread (blocking
//! or polling), stop, and create one-shot [`WaitTimer`]s whose callbacks
//! fire on the draining thread.
//!
//! [`QueueReactor`] is the default implementation: a FIFO task queue and a
//! min-heap of timer deadlines behind one mutex, with a condition variable
//! for wakeups. Cancelled deadlines are skipped lazily when they reach the
//! front of the heap.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A task executed by the reactor.
pub type ReactorTask = Box<dyn FnOnce() + Send>;

/// The queue-and-timers facility behind an event loop.
///
/// Implementations must be safe to post into from any thread. `run` and
/// `poll` are only ever called from the loop's owner thread.
pub trait Reactor: Send + Sync {
    /// Enqueue a task for execution on the draining thread.
    fn post(&self, task: ReactorTask);

    /// Drain tasks and fire due timers, blocking while idle.
    ///
    /// Returns when [`stop`](Self::stop) is observed, or when there is no
    /// keepalive, no queued task, and no pending timer.
    fn run(&self);

    /// Execute all currently-ready work without blocking, then return.
    fn poll(&self);

    /// Request `run` to return. Queued tasks are retained.
    fn stop(&self);

    /// Clear the stopped flag so the reactor can be driven again.
    fn restart(&self);

    /// Keep `run` from returning while idle.
    fn add_keepalive(&self);

    /// Release a keepalive taken with [`add_keepalive`](Self::add_keepalive).
    fn remove_keepalive(&self);

    /// Create a one-shot wait timer bound to this reactor.
    fn make_wait_timer(self: Arc<Self>) -> Box<dyn WaitTimer>;
}

/// A one-shot timer whose callback runs on the reactor's draining thread.
pub trait WaitTimer: Send {
    /// Schedule the callback to fire once after `delay`.
    ///
    /// Rescheduling before the previous deadline fires supersedes it; the
    /// older callback will not run.
    fn schedule(&mut self, delay: Duration, callback: ReactorTask);

    /// Cancel any pending deadline. In-flight deadlines become no-ops.
    fn cancel(&mut self);
}

/// An entry in the deadline heap (min-heap by due time).
struct DeadlineEntry {
    due: Instant,
    slot: u64,
    generation: u64,
}

impl PartialEq for DeadlineEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due
    }
}

impl Eq for DeadlineEntry {}

impl PartialOrd for DeadlineEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeadlineEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse order for min-heap (BinaryHeap is a max-heap by default).
        other.due.cmp(&self.due)
    }
}

/// Per-wait-timer state. The generation counter invalidates heap entries
/// from superseded or cancelled schedules.
struct WaitSlot {
    generation: u64,
    callback: Option<ReactorTask>,
}

struct ReactorState {
    queue: VecDeque<ReactorTask>,
    deadlines: BinaryHeap<DeadlineEntry>,
    slots: HashMap<u64, WaitSlot>,
    keepalive: usize,
    stopped: bool,
}

impl ReactorState {
    /// Pop the callback of a due, still-valid deadline, if any.
    fn take_due_timer(&mut self, now: Instant) -> Option<ReactorTask> {
        while let Some(head) = self.deadlines.peek() {
            let valid = self
                .slots
                .get(&head.slot)
                .is_some_and(|slot| slot.generation == head.generation && slot.callback.is_some());

            if !valid {
                // Superseded or cancelled; discard lazily.
                self.deadlines.pop();
                continue;
            }

            if head.due > now {
                return None;
            }

            let entry = self.deadlines.pop().expect("peeked entry");
            let slot = self.slots.get_mut(&entry.slot).expect("validated slot");
            return slot.callback.take();
        }
        None
    }

    /// Time of the next valid deadline, discarding stale heap heads.
    fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(head) = self.deadlines.peek() {
            let valid = self
                .slots
                .get(&head.slot)
                .is_some_and(|slot| slot.generation == head.generation && slot.callback.is_some());

            if valid {
                return Some(head.due);
            }
            self.deadlines.pop();
        }
        None
    }

    fn out_of_work(&self) -> bool {
        self.keepalive == 0 && self.queue.is_empty() && self.deadlines.is_empty()
    }
}

/// The default [`Reactor`]: a mutex-guarded FIFO queue and deadline heap
/// with condition-variable wakeups.
pub struct QueueReactor {
    state: Mutex<ReactorState>,
    condvar: Condvar,
    next_slot: AtomicU64,
}

impl QueueReactor {
    /// Create a new reactor with an empty queue and no timers.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ReactorState {
                queue: VecDeque::new(),
                deadlines: BinaryHeap::new(),
                slots: HashMap::new(),
                keepalive: 0,
                stopped: false,
            }),
            condvar: Condvar::new(),
            next_slot: AtomicU64::new(1),
        })
    }
}

impl Reactor for QueueReactor {
    fn post(&self, task: ReactorTask) {
        self.state.lock().queue.push_back(task);
        self.condvar.notify_all();
    }

    fn run(&self) {
        loop {
            let work = {
                let mut state = self.state.lock();
                loop {
                    if state.stopped {
                        return;
                    }
                    let now = Instant::now();
                    if let Some(timer) = state.take_due_timer(now) {
                        break timer;
                    }
                    if let Some(task) = state.queue.pop_front() {
                        break task;
                    }
                    if state.out_of_work() {
                        return;
                    }
                    match state.next_deadline() {
                        Some(due) => {
                            let _ = self.condvar.wait_until(&mut state, due);
                        }
                        None => self.condvar.wait(&mut state),
                    }
                }
            };

            // Run outside the lock so tasks may post or stop freely.
            work();
        }
    }

    fn poll(&self) {
        loop {
            let work = {
                let mut state = self.state.lock();
                if state.stopped {
                    return;
                }
                let now = Instant::now();
                state
                    .take_due_timer(now)
                    .or_else(|| state.queue.pop_front())
            };

            match work {
                Some(task) => task(),
                None => return,
            }
        }
    }

    fn stop(&self) {
        self.state.lock().stopped = true;
        self.condvar.notify_all();
    }

    fn restart(&self) {
        self.state.lock().stopped = false;
    }

    fn add_keepalive(&self) {
        self.state.lock().keepalive += 1;
    }

    fn remove_keepalive(&self) {
        let mut state = self.state.lock();
        state.keepalive = state.keepalive.saturating_sub(1);
        drop(state);
        self.condvar.notify_all();
    }

    fn make_wait_timer(self: Arc<Self>) -> Box<dyn WaitTimer> {
        let slot = self.next_slot.fetch_add(1, Ordering::Relaxed);
        Box::new(QueueWaitTimer {
            reactor: self,
            slot,
        })
    }
}

/// Wait timer handle for [`QueueReactor`].
struct QueueWaitTimer {
    reactor: Arc<QueueReactor>,
    slot: u64,
}

impl WaitTimer for QueueWaitTimer {
    fn schedule(&mut self, delay: Duration, callback: ReactorTask) {
        let due = Instant::now() + delay;
        {
            let mut state = self.reactor.state.lock();
            let slot = state.slots.entry(self.slot).or_insert(WaitSlot {
                generation: 0,
                callback: None,
            });
            slot.generation += 1;
            slot.callback = Some(callback);
            let generation = slot.generation;
            state.deadlines.push(DeadlineEntry {
                due,
                slot: self.slot,
                generation,
            });
        }
        self.reactor.condvar.notify_all();
    }

    fn cancel(&mut self) {
        let mut state = self.reactor.state.lock();
        if let Some(slot) = state.slots.get_mut(&self.slot) {
            slot.generation += 1;
            slot.callback = None;
        }
    }
}

impl Drop for QueueWaitTimer {
    fn drop(&mut self) {
        self.reactor.state.lock().slots.remove(&self.slot);
    }
}
