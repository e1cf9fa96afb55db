//! Error types for strand-core.

use std::fmt;

/// The main error type for strand-core operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Event-loop related error.
    EventLoop(EventLoopError),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventLoop(err) => write!(f, "Event loop error: {err}"),
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::EventLoop(err) => Some(err),
        }
    }
}

/// Event-loop specific errors.
///
/// These are precondition violations: calling into a loop that is in the
/// wrong state, or from the wrong thread. They are returned to the caller
/// rather than panicking so that misuse is a catchable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLoopError {
    /// The event loop has not been started.
    ///
    /// Returned by `run`/`process_events` on an unstarted loop, and by a
    /// blocking signal emission whose receiver's loop is inactive (which
    /// would otherwise deadlock the emitter).
    Inactive,
    /// `run` or `process_events` was called from a thread other than the
    /// one that called `start`.
    WrongThread,
}

impl fmt::Display for EventLoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "the event loop has not been started"),
            Self::WrongThread => {
                write!(
                    f,
                    "run/process_events may only be called from the thread that called start"
                )
            }
        }
    }
}

impl std::error::Error for EventLoopError {}

impl From<EventLoopError> for CoreError {
    fn from(err: EventLoopError) -> Self {
        Self::EventLoop(err)
    }
}

/// A specialized Result type for strand-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
