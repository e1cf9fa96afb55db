//! Typed signal/slot connections with three delivery modes.
//!
//! A [`Signal<Args>`] is a many-to-many notification source. Slots connect
//! to it and are invoked on [`emit`](Signal::emit). `Args` is a single type
//! carrying the signal's payload; use `()` for no arguments or a tuple for
//! several.
//!
//! # Managed and unmanaged connections
//!
//! A connection made with a context [`Object`] is *managed*: it is
//! dispatched per its [`ConnectionType`] using the context's event loop,
//! and it expires automatically when the context is dropped (expired
//! entries are swept on the next emit). A connection without a context is
//! *unmanaged*: it is invoked directly on the emitting thread on every
//! emit until explicitly disconnected.
//!
//! # Delivery modes
//!
//! - [`Direct`](ConnectionType::Direct): invoked synchronously on the
//!   emitting thread, inside `emit`.
//! - [`Queued`](ConnectionType::Queued): a slot event is posted to the
//!   context's event loop; arguments are copied at emit time.
//! - [`Blocking`](ConnectionType::Blocking): like queued, but `emit` parks
//!   until the slot has run. If the context's loop is owned by the emitting
//!   thread the slot is invoked directly instead, since queuing would
//!   deadlock the loop against itself. Emitting to a context whose loop is
//!   not started fails with
//!   [`EventLoopError::Inactive`](crate::EventLoopError::Inactive) rather
//!   than deadlocking silently.
//!
//! The connection table lock is held for the whole of `emit`, so a
//! direct-mode slot that re-enters the same signal deadlocks. Queued and
//! blocking slots run on the receiving loop without the lock.
//!
//! # Example
//!
//! ```
//! use strand_core::Signal;
//!
//! let text_changed = Signal::<String>::new();
//!
//! let id = text_changed.connect(|text| {
//!     println!("text changed to {text}");
//! });
//!
//! text_changed.emit("hello".to_string()).unwrap();
//! text_changed.disconnect(id);
//! ```

use std::sync::{Arc, Weak};

use parking_lot::lock_api;

use crate::error::{EventLoopError, Result};
use crate::event::Event;
use crate::id::ConnectionId;
use crate::invocation::completion_pair;
use crate::object::Object;

/// How a managed slot is invoked when its signal is emitted.
///
/// Unmanaged connections have no mode; they are always invoked directly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionType {
    /// Invoke on the emitting thread, synchronously, inside `emit`.
    Direct,
    /// Post a slot event to the context's event loop and return.
    #[default]
    Queued,
    /// Post to the context's event loop and block until the slot has run,
    /// or invoke directly when the emitter already owns that loop.
    Blocking,
}

/// The shared slot type: connections may be dispatched to other threads,
/// and queued deliveries clone the callable into the posted event.
type SlotFn<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

struct ManagedConnection<Args> {
    id: ConnectionId,
    mode: ConnectionType,
    context: Weak<dyn Object>,
    slot: SlotFn<Args>,
}

struct UnmanagedConnection<Args> {
    id: ConnectionId,
    slot: SlotFn<Args>,
}

struct Tables<Args> {
    managed: Vec<ManagedConnection<Args>>,
    unmanaged: Vec<UnmanagedConnection<Args>>,
}

impl<Args> Tables<Args> {
    const fn new() -> Self {
        Self {
            managed: Vec::new(),
            unmanaged: Vec::new(),
        }
    }
}

/// A no-op table lock for signals confined to a single thread.
///
/// Skips the real mutex when the caller can guarantee connect, emit, and
/// disconnect all happen on one thread. See [`LocalSignal`].
pub struct DummySignalLock(());

unsafe impl lock_api::RawMutex for DummySignalLock {
    const INIT: DummySignalLock = DummySignalLock(());
    type GuardMarker = lock_api::GuardSend;

    fn lock(&self) {}

    fn try_lock(&self) -> bool {
        true
    }

    unsafe fn unlock(&self) {}
}

/// A [`Signal`] whose connection table is not locked. Single-thread use
/// only.
pub type LocalSignal<Args> = Signal<Args, DummySignalLock>;

/// A typed signal with managed and unmanaged connections.
///
/// The second type parameter selects the connection-table lock; the
/// default is a real mutex and [`LocalSignal`] substitutes a no-op for
/// known single-thread uses.
pub struct Signal<Args, Lock = parking_lot::RawMutex> {
    tables: lock_api::Mutex<Lock, Tables<Args>>,
}

impl<Args, Lock> Signal<Args, Lock>
where
    Args: Clone + Send + 'static,
    Lock: lock_api::RawMutex,
{
    /// Create a signal with no connections.
    pub fn new() -> Self {
        Self {
            tables: lock_api::Mutex::new(Tables::new()),
        }
    }

    /// Connect an unmanaged slot.
    ///
    /// It is invoked directly on the emitting thread on every emit and
    /// lives until [`disconnect`](Self::disconnect).
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let id = ConnectionId::next();
        self.tables.lock().unmanaged.push(UnmanagedConnection {
            id,
            slot: Arc::new(slot),
        });
        id
    }

    /// Connect a managed slot scoped to `context`.
    ///
    /// The slot is dispatched per `mode` using the context's event loop
    /// and expires when the context is dropped.
    pub fn connect_with_context<F, C>(
        &self,
        slot: F,
        context: &Arc<C>,
        mode: ConnectionType,
    ) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
        C: Object,
    {
        let context: Arc<dyn Object> = context.clone();
        let context: Weak<dyn Object> = Arc::downgrade(&context);
        // Re-check liveness at invocation time; a queued delivery may
        // outlive the context it was scheduled for.
        let liveness = context.clone();
        let wrapped = move |args: &Args| {
            if liveness.upgrade().is_some() {
                slot(args);
            }
        };
        self.insert_managed(Arc::new(wrapped), context, mode)
    }

    /// Connect a receiver method. The receiver is also the connection's
    /// context, so the connection expires with it.
    pub fn connect_to<T, F>(&self, receiver: &Arc<T>, slot: F, mode: ConnectionType) -> ConnectionId
    where
        T: Object,
        F: Fn(&T, &Args) + Send + Sync + 'static,
    {
        let weak_receiver = Arc::downgrade(receiver);
        let context_arc: Arc<dyn Object> = receiver.clone();
        let context: Weak<dyn Object> = Arc::downgrade(&context_arc);
        let wrapped = move |args: &Args| {
            if let Some(receiver) = weak_receiver.upgrade() {
                slot(&receiver, args);
            }
        };
        self.insert_managed(Arc::new(wrapped), context, mode)
    }

    fn insert_managed(
        &self,
        slot: SlotFn<Args>,
        context: Weak<dyn Object>,
        mode: ConnectionType,
    ) -> ConnectionId {
        let id = ConnectionId::next();
        self.tables.lock().managed.push(ManagedConnection {
            id,
            mode,
            context,
            slot,
        });
        id
    }

    /// Remove a connection by id. Returns whether anything was removed.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let mut tables = self.tables.lock();

        if let Some(pos) = tables.managed.iter().position(|c| c.id == id) {
            tables.managed.remove(pos);
            return true;
        }
        if let Some(pos) = tables.unmanaged.iter().position(|c| c.id == id) {
            tables.unmanaged.remove(pos);
            return true;
        }
        false
    }

    /// Whether the given connection id is still present in the tables.
    ///
    /// An expired managed connection stays "valid" until the sweep on the
    /// next emit removes it.
    pub fn connection_valid(&self, id: ConnectionId) -> bool {
        let tables = self.tables.lock();
        tables.managed.iter().any(|c| c.id == id)
            || tables.unmanaged.iter().any(|c| c.id == id)
    }

    /// The number of connections, managed and unmanaged.
    pub fn connection_count(&self) -> usize {
        let tables = self.tables.lock();
        tables.managed.len() + tables.unmanaged.len()
    }

    /// Emit the signal, invoking every connected slot.
    ///
    /// Unmanaged slots run first, then managed slots, each table in
    /// insertion order. Arguments are cloned into queued and blocking
    /// deliveries at emit time. Managed connections whose context has been
    /// dropped are counted and swept before returning.
    ///
    /// # Errors
    ///
    /// [`EventLoopError::Inactive`](crate::EventLoopError::Inactive) when a
    /// blocking connection's context lives on a loop that has not been
    /// started (waiting on it would never complete).
    #[tracing::instrument(skip_all, target = "strand_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) -> Result<()> {
        let mut tables = self.tables.lock();

        for connection in &tables.unmanaged {
            (connection.slot)(&args);
        }

        let mut expired = 0usize;
        for connection in &tables.managed {
            let Some(context) = connection.context.upgrade() else {
                expired += 1;
                continue;
            };

            match connection.mode {
                ConnectionType::Direct => (connection.slot)(&args),
                ConnectionType::Queued => {
                    let slot = connection.slot.clone();
                    let args = args.clone();
                    context
                        .event_loop()
                        .post_event(Event::Slot(Box::new(move || slot(&args))));
                }
                ConnectionType::Blocking => {
                    let (thread, started, _running) = context.event_loop().state();

                    if !started {
                        tracing::warn!(
                            target: "strand_core::signal",
                            "blocking emission to a receiver with an inactive event loop"
                        );
                        return Err(EventLoopError::Inactive.into());
                    }

                    if thread == Some(std::thread::current().id()) {
                        // Queuing to our own loop would deadlock; invoke
                        // the slot directly. Pending events are left in
                        // place (draining them here could re-enter this
                        // emit).
                        (connection.slot)(&args);
                    } else {
                        let slot = connection.slot.clone();
                        let args = args.clone();
                        let (handle, waiter) = completion_pair();
                        context.event_loop().post_event(Event::BlockingSlot(
                            Box::new(move || slot(&args)),
                            handle,
                        ));
                        waiter.wait();
                    }
                }
            }
        }

        if expired > 0 {
            tracing::trace!(
                target: "strand_core::signal",
                expired,
                "sweeping expired connections"
            );
            tables
                .managed
                .retain(|connection| connection.context.upgrade().is_some());
        }

        Ok(())
    }
}

impl<Args, Lock> Default for Signal<Args, Lock>
where
    Args: Clone + Send + 'static,
    Lock: lock_api::RawMutex,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::EventLoop;
    use crate::object::ConnectionContext;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_connect_and_emit() {
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        signal.connect(move |&value| {
            received_clone.lock().push(value);
        });

        signal.emit(42).unwrap();
        signal.emit(100).unwrap();

        assert_eq!(*received.lock(), vec![42, 100]);
    }

    #[test]
    fn test_unmanaged_forms() {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);

        fn increment(_: &()) {
            COUNTER.fetch_add(1, Ordering::SeqCst);
        }

        let signal = Signal::<()>::new();
        signal.connect(|_| {
            COUNTER.fetch_add(1, Ordering::SeqCst);
        });
        signal.connect(increment);

        signal.emit(()).unwrap();
        assert_eq!(COUNTER.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_disconnect() {
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        let id = signal.connect(move |&value| {
            received_clone.lock().push(value);
        });

        signal.emit(1).unwrap();
        assert!(signal.disconnect(id));
        signal.emit(2).unwrap();

        assert_eq!(*received.lock(), vec![1]);

        // Repeat disconnects and unknown ids fail benignly.
        assert!(!signal.disconnect(id));
        assert!(!signal.disconnect(ConnectionId::next()));
    }

    #[test]
    fn test_connection_count() {
        let event_loop = EventLoop::new();
        let context = ConnectionContext::create(event_loop);

        let signal = Signal::<()>::new();
        signal.connect(|_| {});
        signal.connect_with_context(|_| {}, &context, ConnectionType::Direct);

        assert_eq!(signal.connection_count(), 2);
    }

    #[test]
    fn test_direct_connection_runs_on_emitting_thread() {
        let event_loop = EventLoop::new();
        let context = ConnectionContext::create(event_loop);

        let signal = Arc::new(Signal::<()>::new());
        let slot_thread = Arc::new(Mutex::new(None));

        let slot_thread_clone = slot_thread.clone();
        signal.connect_with_context(
            move |_| {
                *slot_thread_clone.lock() = Some(std::thread::current().id());
            },
            &context,
            ConnectionType::Direct,
        );

        let signal_clone = signal.clone();
        let emitter = std::thread::spawn(move || {
            signal_clone.emit(()).unwrap();
            std::thread::current().id()
        });
        let emitter_id = emitter.join().unwrap();

        assert_eq!(*slot_thread.lock(), Some(emitter_id));
    }

    #[test]
    fn test_expired_connections_swept_on_emit() {
        let event_loop = EventLoop::new();
        let signal = Signal::<()>::new();
        let count = Arc::new(AtomicUsize::new(0));

        let id = {
            let context = ConnectionContext::create(event_loop);
            let count = count.clone();
            signal.connect_with_context(
                move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                },
                &context,
                ConnectionType::Direct,
            )
        };

        // The context is gone but the entry has not been swept yet.
        assert!(signal.connection_valid(id));

        signal.emit(()).unwrap();
        assert!(!signal.connection_valid(id));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_blocking_to_inactive_loop_fails() {
        let event_loop = EventLoop::new(); // never started
        let context = ConnectionContext::create(event_loop);

        let signal = Signal::<()>::new();
        signal.connect_with_context(|_| {}, &context, ConnectionType::Blocking);

        assert_eq!(
            signal.emit(()),
            Err(EventLoopError::Inactive.into())
        );
    }

    #[test]
    fn test_local_signal() {
        let signal = LocalSignal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        signal.connect(move |&value| {
            received_clone.lock().push(value);
        });

        signal.emit(7).unwrap();
        assert_eq!(*received.lock(), vec![7]);
    }

    #[test]
    fn test_emit_from_multiple_threads() {
        let signal = Arc::new(Signal::<usize>::new());
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = counter.clone();
        signal.connect(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let signal = signal.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        signal.emit(i).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.load(Ordering::SeqCst), 800);
    }

    #[test]
    fn test_tuple_arguments() {
        let signal = Signal::<(String, i32)>::new();
        let received = Arc::new(Mutex::new(None));

        let received_clone = received.clone();
        signal.connect(move |args| {
            *received_clone.lock() = Some(args.clone());
        });

        signal.emit(("hello".to_string(), 42)).unwrap();
        assert_eq!(*received.lock(), Some(("hello".to_string(), 42)));
    }
}
