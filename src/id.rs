//! Unique identifier generation.
//!
//! Every object, event loop, and signal connection gets a 64-bit id drawn
//! from a monotonic atomic counter. Ids are never recycled and each kind has
//! its own counter space, so an `ObjectId` and an `EventLoopId` with the same
//! numeric value are unrelated.

use std::sync::atomic::{AtomicU64, Ordering};

/// The raw id type used throughout the crate.
pub type Id = u64;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_EVENT_LOOP_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A unique identifier for an [`Object`](crate::Object).
///
/// Ids are monotonically increasing and never reused, which makes them
/// suitable as map keys that outlive the object itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(Id);

impl ObjectId {
    pub(crate) fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u64 value of this id.
    pub fn as_u64(self) -> Id {
        self.0
    }
}

/// A unique identifier for an [`EventLoop`](crate::EventLoop).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventLoopId(Id);

impl EventLoopId {
    pub(crate) fn next() -> Self {
        Self(NEXT_EVENT_LOOP_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u64 value of this id.
    pub fn as_u64(self) -> Id {
        self.0
    }
}

/// A unique identifier for a signal-slot connection.
///
/// Connection ids are unique across all [`Signal`](crate::Signal) instances
/// in the process, so an id can never be mistakenly accepted by a signal it
/// did not come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Id);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw u64 value of this id.
    pub fn as_u64(self) -> Id {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_ids_are_monotonic() {
        let a = ObjectId::next();
        let b = ObjectId::next();
        let c = ObjectId::next();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_counter_spaces_are_independent() {
        // Drawing from one kind must not advance the others.
        let loop_a = EventLoopId::next();
        for _ in 0..10 {
            let _ = ObjectId::next();
        }
        let loop_b = EventLoopId::next();
        assert_eq!(loop_b.as_u64(), loop_a.as_u64() + 1);
    }

    #[test]
    fn test_ids_unique_under_contention() {
        let seen = Arc::new(Mutex::new(HashSet::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seen = seen.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let id = ConnectionId::next();
                        assert!(seen.lock().unwrap().insert(id));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(seen.lock().unwrap().len(), 8000);
    }
}
