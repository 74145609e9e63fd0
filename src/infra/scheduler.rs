//! Tokio-backed [`Scheduler`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::trace;

use crate::preview::{Scheduler, TimerCallback, TimerHandle};

/// Each timer is a spawned sleep task. Whoever removes the timer's entry
/// from `timers` first (expiry or cancel) decides whether the callback runs.
pub struct TokioScheduler {
    runtime: Handle,
    timers: Arc<DashMap<u64, AbortHandle>>,
    next_id: AtomicU64,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            timers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Scheduler on the runtime of the calling task.
    ///
    /// Panics when called outside a tokio runtime, like [`Handle::current`].
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Timers armed and neither fired nor cancelled.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let timers = Arc::clone(&self.timers);
        let (armed_tx, armed_rx) = oneshot::channel::<()>();

        let task = self.runtime.spawn(async move {
            // The entry must exist before expiry can claim it.
            if armed_rx.await.is_err() {
                return;
            }
            tokio::time::sleep(delay).await;
            if timers.remove(&id).is_some() {
                trace!(timer = id, "Timer fired");
                callback();
            }
        });

        self.timers.insert(id, task.abort_handle());
        let _ = armed_tx.send(());
        TimerHandle(id)
    }

    fn cancel(&self, handle: TimerHandle) {
        if let Some((_, task)) = self.timers.remove(&handle.0) {
            task.abort();
            trace!(timer = handle.0, "Timer cancelled");
        }
    }
}
