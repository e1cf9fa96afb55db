//! Completion signalling for blocking slot delivery.
//!
//! A blocking signal emission posts its slot to the receiver's event loop
//! and must then park the emitting thread until the slot has run. The
//! [`completion_pair`] function creates the two halves of that handshake:
//! the [`CompletionHandle`] travels with the posted event and is signalled
//! by the receiving loop, while the [`CompletionWaiter`] stays with the
//! emitter and blocks on a condition variable.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct CompletionState {
    done: Mutex<bool>,
    condvar: Condvar,
}

/// The sender half of a completion pair.
///
/// Signalled exactly once, after the slot bound to a blocking event has
/// finished executing on the receiving loop.
pub struct CompletionHandle {
    inner: Arc<CompletionState>,
}

impl CompletionHandle {
    /// Mark the invocation complete and wake any waiting threads.
    pub fn signal_done(self) {
        let mut done = self.inner.done.lock();
        *done = true;
        self.inner.condvar.notify_all();
    }
}

/// The receiver half of a completion pair.
pub struct CompletionWaiter {
    inner: Arc<CompletionState>,
}

impl CompletionWaiter {
    /// Block the current thread until the invocation completes.
    ///
    /// # Warning
    ///
    /// Waiting on the thread that is supposed to execute the invocation
    /// deadlocks. Callers are expected to have ruled that case out before
    /// posting (see the blocking path in [`Signal::emit`](crate::Signal::emit)).
    pub fn wait(self) {
        let mut done = self.inner.done.lock();
        while !*done {
            self.inner.condvar.wait(&mut done);
        }
    }

    /// Wait for the invocation to complete with a timeout.
    ///
    /// Returns `true` if the invocation completed, `false` if the timeout
    /// elapsed first.
    pub fn wait_timeout(self, timeout: std::time::Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut done = self.inner.done.lock();
        while !*done {
            if self.inner.condvar.wait_until(&mut done, deadline).timed_out() {
                break;
            }
        }
        *done
    }
}

/// Create a completion handle/waiter pair.
pub fn completion_pair() -> (CompletionHandle, CompletionWaiter) {
    let state = Arc::new(CompletionState {
        done: Mutex::new(false),
        condvar: Condvar::new(),
    });

    (
        CompletionHandle {
            inner: state.clone(),
        },
        CompletionWaiter { inner: state },
    )
}
