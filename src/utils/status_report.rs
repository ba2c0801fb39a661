// status_report is mod for task lifecycle reporting
// if open feature status-report, then compile that mod .
use crate::prelude::*;
use crate::task::TaskId;

use once_cell::sync::Lazy;

// Events past this many unread ones are dropped.
const STATUS_REPORT_CAPACITY: usize = 4096;

pub(crate) static GLOBAL_STATUS_REPORTER: Lazy<(
    AsyncSender<PublicEvent>,
    AsyncReceiver<PublicEvent>,
)> = Lazy::new(|| bounded(STATUS_REPORT_CAPACITY));

/// Lifecycle events published by every task.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PublicEvent {
    Started(TaskId),
    CancelRequested(TaskId),
    /// The task completed; `true` if it succeeded.
    Completed(TaskId, bool),
}

/// Reader of the global lifecycle event channel.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    inner: AsyncReceiver<PublicEvent>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        StatusReporter::new()
    }
}

impl StatusReporter {
    pub fn new() -> Self {
        Self {
            inner: GLOBAL_STATUS_REPORTER.1.clone(),
        }
    }

    pub fn get_public_event(&self) -> AnyResult<PublicEvent> {
        let event = self.inner.try_recv()?;
        Ok(event)
    }

    pub async fn next_public_event(&self) -> AnyResult<PublicEvent> {
        let event = self.inner.recv().await?;
        Ok(event)
    }
}

pub(crate) fn report(event: PublicEvent) {
    if let Err(e) = GLOBAL_STATUS_REPORTER.0.try_send(event) {
        trace!("status report dropped: {}", e);
    }
}
