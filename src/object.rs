//! The object model: identity, loop affinity, and two-phase construction.
//!
//! An [`Object`] is a participant in the signal/slot system: it has a unique
//! id and is bound to exactly one [`EventLoop`], which is where queued and
//! blocking deliveries addressed to it execute. Signals hold only weak
//! references to objects, so object lifetime bounds connection lifetime.
//!
//! # Two-phase construction
//!
//! Objects are only ever handled through `Arc`. Construction happens in two
//! phases: the constructor builds the value (and may not reference the
//! shared handle, which does not exist yet), then [`make_object`] wraps it
//! in an `Arc` and calls [`Object::init`] on that handle. `init` is the
//! place to stash a `Weak` self-reference or make connections that need
//! one. A [`ConstructionKey`] is threaded through constructors so objects
//! cannot be built outside `make_object`:
//!
//! ```
//! use std::sync::Arc;
//! use strand_core::{make_object, EventLoop, Object, ObjectCore};
//!
//! struct Counter {
//!     core: ObjectCore,
//! }
//!
//! impl Counter {
//!     fn create(event_loop: Arc<EventLoop>) -> Arc<Counter> {
//!         make_object(|key| Counter {
//!             core: ObjectCore::new(key, event_loop),
//!         })
//!     }
//! }
//!
//! impl Object for Counter {
//!     fn core(&self) -> &ObjectCore {
//!         &self.core
//!     }
//! }
//!
//! let counter = Counter::create(EventLoop::new());
//! let _ = counter.id();
//! ```
//!
//! Composed objects preserve base-before-derived initialization by having
//! the outer `init` delegate to the inner part's setup first.

use std::sync::Arc;

use crate::event_loop::EventLoop;
use crate::id::ObjectId;

/// Construction token proving that an object is being built by
/// [`make_object`].
///
/// The only way to obtain one is inside the closure passed to
/// `make_object`, so a constructor that demands a `&ConstructionKey`
/// cannot be called directly.
pub struct ConstructionKey(());

/// The identity and loop affinity every object carries.
///
/// Both fields are immutable after construction, so the getters are
/// lock-free and safe from any thread.
pub struct ObjectCore {
    id: ObjectId,
    event_loop: Arc<EventLoop>,
}

impl ObjectCore {
    /// Build the core for a new object. Requires the construction token,
    /// which ties all object creation to [`make_object`].
    pub fn new(_key: &ConstructionKey, event_loop: Arc<EventLoop>) -> Self {
        let id = ObjectId::next();
        tracing::trace!(
            target: "strand_core::object",
            id = id.as_u64(),
            event_loop = event_loop.id().as_u64(),
            "object created"
        );
        Self { id, event_loop }
    }

    /// The object's unique id.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The event loop this object is bound to.
    pub fn event_loop(&self) -> &Arc<EventLoop> {
        &self.event_loop
    }
}

/// A participant in the signal/slot system.
///
/// Implementors embed an [`ObjectCore`] and return it from
/// [`core`](Object::core). The trait is object-safe; signals store
/// receivers as `Weak<dyn Object>`.
pub trait Object: Send + Sync + 'static {
    /// The object's identity/loop core.
    fn core(&self) -> &ObjectCore;

    /// Second construction phase, called by [`make_object`] once the
    /// shared handle exists.
    ///
    /// The default does nothing. Implementations that need a weak
    /// self-reference downgrade the received `Arc` here.
    fn init(self: Arc<Self>)
    where
        Self: Sized,
    {
    }

    /// The object's unique id.
    fn id(&self) -> ObjectId {
        self.core().id()
    }

    /// The event loop this object is bound to.
    fn event_loop(&self) -> &Arc<EventLoop> {
        self.core().event_loop()
    }
}

/// Build an object in two phases: construct, wrap in `Arc`, then `init`.
pub fn make_object<T, F>(build: F) -> Arc<T>
where
    T: Object,
    F: FnOnce(&ConstructionKey) -> T,
{
    let key = ConstructionKey(());
    let object = Arc::new(build(&key));
    Arc::clone(&object).init();
    object
}

/// A minimal object usable as a signal connection context.
///
/// Managed connections use the context's event loop for queued and
/// blocking delivery and expire when the context is dropped; when no
/// richer receiver exists, a `ConnectionContext` supplies the loop
/// affinity and lifetime scope.
pub struct ConnectionContext {
    core: ObjectCore,
}

impl ConnectionContext {
    /// Create a connection context bound to the given loop.
    pub fn create(event_loop: Arc<EventLoop>) -> Arc<Self> {
        make_object(|key| Self {
            core: ObjectCore::new(key, event_loop),
        })
    }
}

impl Object for ConnectionContext {
    fn core(&self) -> &ObjectCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Weak;

    struct Probe {
        core: ObjectCore,
        log: Mutex<String>,
        weak_self: Mutex<Weak<Probe>>,
    }

    impl Probe {
        fn create(event_loop: Arc<EventLoop>) -> Arc<Probe> {
            make_object(|key| Probe {
                core: ObjectCore::new(key, event_loop),
                log: Mutex::new(String::from("construct")),
                weak_self: Mutex::new(Weak::new()),
            })
        }
    }

    impl Object for Probe {
        fn core(&self) -> &ObjectCore {
            &self.core
        }

        fn init(self: Arc<Self>) {
            self.log.lock().push_str(",init");
            *self.weak_self.lock() = Arc::downgrade(&self);
        }
    }

    // A composed object: its init delegates to the inner part first, so
    // setup ordering stays inner-before-outer.
    struct Composite {
        core: ObjectCore,
        log: Mutex<String>,
    }

    impl Composite {
        fn create(event_loop: Arc<EventLoop>) -> Arc<Composite> {
            make_object(|key| Composite {
                core: ObjectCore::new(key, event_loop),
                log: Mutex::new(String::from("construct")),
            })
        }

        fn init_inner(&self) {
            self.log.lock().push_str(",inner-init");
        }
    }

    impl Object for Composite {
        fn core(&self) -> &ObjectCore {
            &self.core
        }

        fn init(self: Arc<Self>) {
            self.init_inner();
            self.log.lock().push_str(",outer-init");
        }
    }

    #[test]
    fn test_construct_then_init_order() {
        let probe = Probe::create(EventLoop::new());
        assert_eq!(*probe.log.lock(), "construct,init");
    }

    #[test]
    fn test_init_sees_shared_handle() {
        let probe = Probe::create(EventLoop::new());
        let resolved = probe.weak_self.lock().upgrade().unwrap();
        assert_eq!(resolved.id(), probe.id());
    }

    #[test]
    fn test_composite_init_runs_inner_first() {
        let composite = Composite::create(EventLoop::new());
        assert_eq!(*composite.log.lock(), "construct,inner-init,outer-init");
    }

    #[test]
    fn test_ids_are_unique_and_loop_is_shared() {
        let event_loop = EventLoop::new();
        let a = ConnectionContext::create(event_loop.clone());
        let b = ConnectionContext::create(event_loop.clone());

        assert_ne!(a.id(), b.id());
        assert_eq!(a.event_loop().id(), event_loop.id());
        assert_eq!(b.event_loop().id(), event_loop.id());
    }
}
