//! One-shot tasks with completion waiting.
//!
//! A [`Task`] packages a closure together with a completion latch. Posted
//! to an [`EventLoop`](crate::EventLoop) via
//! [`post_task`](crate::EventLoop::post_task), it runs either inline (when
//! posted from the loop's owner thread) or on the loop; the poster can
//! block on [`wait`](Task::wait) or [`wait_for`](Task::wait_for) either
//! way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Outcome of waiting on a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The task had already completed before the wait began.
    Finished,
    /// The task completed during the wait.
    Ready,
    /// The timeout elapsed before the task completed.
    Timeout,
}

/// A one-shot closure with a waitable completion latch.
pub struct Task {
    task: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    done: Mutex<bool>,
    condvar: Condvar,
    complete: AtomicBool,
    thread_id: ThreadId,
}

impl Task {
    /// Wrap a closure in a task. Records the creating thread's id.
    pub fn new<F>(task: F) -> Arc<Task>
    where
        F: FnOnce() + Send + 'static,
    {
        Arc::new(Task {
            task: Mutex::new(Some(Box::new(task))),
            done: Mutex::new(false),
            condvar: Condvar::new(),
            complete: AtomicBool::new(false),
            thread_id: std::thread::current().id(),
        })
    }

    /// Run the closure and release all waiters. Subsequent calls are
    /// no-ops.
    pub fn invoke(&self) {
        let Some(task) = self.task.lock().take() else {
            return;
        };

        task();
        self.complete.store(true, Ordering::SeqCst);

        let mut done = self.done.lock();
        *done = true;
        self.condvar.notify_all();
    }

    /// Block until the task has completed.
    pub fn wait(&self) -> WaitStatus {
        if self.complete.load(Ordering::SeqCst) {
            return WaitStatus::Finished;
        }

        let mut done = self.done.lock();
        while !*done {
            self.condvar.wait(&mut done);
        }
        WaitStatus::Ready
    }

    /// Block until the task completes or `timeout` elapses.
    pub fn wait_for(&self, timeout: Duration) -> WaitStatus {
        if self.complete.load(Ordering::SeqCst) {
            return WaitStatus::Finished;
        }

        let deadline = Instant::now() + timeout;
        let mut done = self.done.lock();
        while !*done {
            if self.condvar.wait_until(&mut done, deadline).timed_out() {
                break;
            }
        }

        if *done {
            WaitStatus::Ready
        } else {
            WaitStatus::Timeout
        }
    }

    /// The id of the thread that created this task.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_invoke_runs_closure_once() {
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = count.clone();
        let task = Task::new(move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        task.invoke();
        task.invoke();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wait_after_completion_is_finished() {
        let task = Task::new(|| {});
        task.invoke();
        assert_eq!(task.wait(), WaitStatus::Finished);
        assert_eq!(task.wait_for(Duration::from_millis(1)), WaitStatus::Finished);
    }

    #[test]
    fn test_wait_blocks_until_invoked() {
        let task = Task::new(|| {});

        let waiter = task.clone();
        let handle = std::thread::spawn(move || waiter.wait());

        std::thread::sleep(Duration::from_millis(10));
        task.invoke();
        assert_eq!(handle.join().unwrap(), WaitStatus::Ready);
    }

    #[test]
    fn test_wait_for_times_out() {
        let task = Task::new(|| {});
        assert_eq!(
            task.wait_for(Duration::from_millis(10)),
            WaitStatus::Timeout
        );
    }

    #[test]
    fn test_thread_id_records_creator() {
        let task = Task::new(|| {});
        assert_eq!(task.thread_id(), std::thread::current().id());
    }
}
