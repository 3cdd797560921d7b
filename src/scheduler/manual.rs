use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::ScheduledTask;
use super::Scheduler;
use crate::Subscription;

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    pending: BTreeMap<(Duration, u64), ScheduledTask>,
}

/// Virtual-time scheduler driven by [`advance_by`](Self::advance_by).
///
/// Tasks run on the thread that advances the clock, in due-time order and,
/// for equal due times, in scheduling order.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Moves the clock forward, running every task that falls due.
    ///
    /// Tasks scheduled by a running task are picked up when they fall within
    /// the same window.
    pub fn advance_by(
        &self,
        delta: Duration,
    ) {
        let target = self.now() + delta;
        loop {
            let due = {
                let mut state = self.state.lock();
                match state.pending.keys().next().copied() {
                    Some(slot) if slot.0 <= target => {
                        state.now = slot.0;
                        state.pending.remove(&slot)
                    }
                    _ => {
                        state.now = target;
                        None
                    }
                }
            };
            match due {
                Some(task) => task(),
                None => break,
            }
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_after(
        &self,
        delay: Duration,
        task: ScheduledTask,
    ) -> Subscription {
        let slot = {
            let mut state = self.state.lock();
            let slot = (state.now + delay, state.next_id);
            state.next_id += 1;
            state.pending.insert(slot, task);
            slot
        };

        let state = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = state.upgrade() {
                let cancelled = state.lock().pending.remove(&slot);
                drop(cancelled);
            }
        })
    }
}
