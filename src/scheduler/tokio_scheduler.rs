use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::sleep;
use tracing::trace;

use super::ScheduledTask;
use super::Scheduler;
use crate::Error;
use crate::Result;
use crate::Subscription;

/// Runs scheduled tasks on a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Binds to the runtime the caller is running on
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::Scheduler(format!("no tokio runtime available: {e}")))?;
        Ok(Self { handle })
    }

    pub fn from_handle(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_after(
        &self,
        delay: Duration,
        task: ScheduledTask,
    ) -> Subscription {
        let join = self.handle.spawn(async move {
            sleep(delay).await;
            task();
        });
        Subscription::new(move || {
            trace!("scheduled task cancelled");
            join.abort();
        })
    }
}
