//! Timer capability used by the session to arm debounce timers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Identifies an armed timer so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Runs a callback once after a delay unless cancelled first.
///
/// A cancelled timer must never invoke its callback, even when cancellation
/// races with expiry.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;

    /// Cancelling an expired or unknown handle is a no-op.
    fn cancel(&self, handle: TimerHandle);
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        (**self).schedule(delay, callback)
    }

    fn cancel(&self, handle: TimerHandle) {
        (**self).cancel(handle)
    }
}
