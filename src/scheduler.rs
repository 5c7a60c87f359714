//! Cooperative timer scheduling and wall-clock access.
//!
//! The whole crate runs on one event-loop thread; timers are the only
//! way work gets deferred. The loop integration supplies a [`Scheduler`]
//! implementation (a GLib main loop, a hand-rolled poll loop, ...) and a
//! [`Clock`]; the download session drives its own state transitions from
//! the callbacks.

use std::time::Duration;

/// Source of wall-clock time, in seconds since the Unix epoch.
///
/// The devices speak epoch seconds as `f64`, so that is the unit used
/// throughout rather than `Instant`.
pub trait Clock {
    /// Current wall-clock time.
    fn now(&self) -> f64;
}

/// [`Clock`] backed by the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        let now = chrono::Utc::now();
        now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6
    }
}

/// Deferred execution on the event loop.
///
/// Callbacks run interleaved with bus I/O on the loop thread; nothing
/// preempts anything mid-execution.
pub trait Scheduler {
    /// Run `callback` once, roughly `delay` from now.
    fn schedule_once(&self, delay: Duration, callback: Box<dyn FnOnce()>);

    /// Run `callback` every `interval` until it returns `false`.
    fn schedule_repeating(&self, interval: Duration, callback: Box<dyn FnMut() -> bool>);
}
