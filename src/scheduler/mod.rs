//! "Run after a delay" collaborator used by time-based operators.
//!
//! Dropping the [`Subscription`] returned by [`Scheduler::schedule_after`]
//! cancels the task if it has not run yet.

mod manual;
mod tokio_scheduler;

pub use manual::*;
pub use tokio_scheduler::*;


use std::sync::Arc;
use std::time::Duration;

use crate::Subscription;

pub type ScheduledTask = Box<dyn FnOnce() + Send>;

pub trait Scheduler: Send + Sync {
    fn schedule_after(
        &self,
        delay: Duration,
        task: ScheduledTask,
    ) -> Subscription;
}

pub type SchedulerRef = Arc<dyn Scheduler>;
