// ── Timer abstraction ──
//
// Durations come in as calendar-aware `chrono` quantities because some of
// them (login refresh) legitimately exceed what a single timer can
// represent; waits are chained in capped slices. Every slot is keyed by
// purpose and replaced clear-then-set, so re-scheduling while a previous
// timer is still pending is always safe.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use chrono::TimeDelta;
use tokio::task::JoinHandle;

/// Handle to a pending timer. Clearing aborts the backing task.
pub struct TimerHandle {
    handle: JoinHandle<()>,
}

impl TimerHandle {
    pub fn clear(&self) {
        self.handle.abort();
    }
}

/// The longest wait a single sleep is allowed to represent.
pub fn max_timer_slice() -> TimeDelta {
    TimeDelta::milliseconds(i64::from(i32::MAX))
}

/// Sleep for an arbitrary calendar duration, chaining capped slices.
pub async fn sleep_for(total: TimeDelta) {
    let mut remaining = total;
    while remaining > TimeDelta::zero() {
        let slice = remaining.min(max_timer_slice());
        tokio::time::sleep(slice.to_std().unwrap_or_default()).await;
        remaining -= slice;
    }
}

/// A purpose-keyed set of timers owned by one component.
///
/// Dropping the set does NOT abort pending timers; owners call
/// [`clear_all`](Self::clear_all) on removal so nothing fires afterwards.
#[derive(Default)]
pub struct Timers {
    slots: Mutex<HashMap<&'static str, TimerHandle>>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once after `after`. Replaces any pending timer with the
    /// same purpose.
    pub fn set_timeout<F, Fut>(&self, purpose: &'static str, after: TimeDelta, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            sleep_for(after).await;
            task().await;
        });
        self.replace(purpose, TimerHandle { handle });
    }

    /// Run `task` repeatedly, every `every`, starting one period from now.
    /// Replaces any pending timer with the same purpose.
    pub fn set_interval<F, Fut>(&self, purpose: &'static str, every: TimeDelta, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            loop {
                sleep_for(every).await;
                task().await;
            }
        });
        self.replace(purpose, TimerHandle { handle });
    }

    /// Abort the pending timer with this purpose, if any.
    pub fn clear(&self, purpose: &'static str) {
        if let Some(old) = self.slots.lock().expect("timer lock poisoned").remove(purpose) {
            old.clear();
        }
    }

    /// Abort every pending timer.
    pub fn clear_all(&self) {
        let mut slots = self.slots.lock().expect("timer lock poisoned");
        for (_, handle) in slots.drain() {
            handle.clear();
        }
    }

    fn replace(&self, purpose: &'static str, handle: TimerHandle) {
        let mut slots = self.slots.lock().expect("timer lock poisoned");
        if let Some(old) = slots.insert(purpose, handle) {
            old.clear();
        }
    }
}
