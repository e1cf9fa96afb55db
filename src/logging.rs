//! Logging facilities for strand-core.
//!
//! The crate instruments itself with the `tracing` crate. To see logs,
//! install a subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! Diagnostics worth knowing about:
//!
//! - `strand_core::property` warns on binding loops and dependency cycles
//!   (the offending binding is discarded).
//! - `strand_core::event_loop` warns when `run`/`process_events` is called
//!   on an unstarted loop and errors on wrong-thread calls.
//! - `strand_core::signal` warns when a blocking emission targets an
//!   inactive loop.

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem, e.g.
/// `RUST_LOG=strand_core::signal=trace`.
pub mod targets {
    /// Whole-crate target prefix.
    pub const CORE: &str = "strand_core";
    /// Event loop lifecycle and dispatch.
    pub const EVENT_LOOP: &str = "strand_core::event_loop";
    /// Signal emission and connection management.
    pub const SIGNAL: &str = "strand_core::signal";
    /// Property capture, propagation, and cycle detection.
    pub const PROPERTY: &str = "strand_core::property";
    /// Timer arm/fire/cancel.
    pub const TIMER: &str = "strand_core::timer";
    /// Object construction.
    pub const OBJECT: &str = "strand_core::object";
}
