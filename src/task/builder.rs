use super::async_task::{AsyncTask, CompletionCallback, TaskBody, TaskRef};
use crate::scheduler::{default_scheduler, SchedulerRef};

use std::borrow::Cow;
use std::fmt;

/// Builds a task with custom configuration values.
///
/// # Examples
///
/// ```
/// use async_operation::prelude::*;
///
/// let task = TaskBuilder::default()
///     .set_name("load-shard")
///     .set_skip_complete_on_cancel(true)
///     .spawn(functions::task_body(|task: &TaskRef| {
///         task.try_complete(Ok(()));
///     }));
///
/// task.start(None);
/// assert_eq!(task.wait(), Ok(()));
/// ```
#[derive(Default)]
pub struct TaskBuilder {
    scheduler: Option<SchedulerRef>,
    name: Option<Cow<'static, str>>,
    skip_complete_on_cancel: bool,
    callback: Option<CompletionCallback>,
}

impl TaskBuilder {
    /// Scheduler used for deferred cancellation and by timed/retryable bodies.
    ///
    /// Defaults to a process-wide tokio scheduler.
    pub fn set_scheduler(&mut self, scheduler: SchedulerRef) -> &mut Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Name used in logs and spans.
    pub fn set_name(&mut self, name: impl Into<Cow<'static, str>>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Only signal `on_cancel` on a non-forced cancel, leaving completion to the body.
    pub fn set_skip_complete_on_cancel(&mut self, skip_complete_on_cancel: bool) -> &mut Self {
        self.skip_complete_on_cancel = skip_complete_on_cancel;
        self
    }

    /// Completion callback, invoked once after `on_completed`.
    pub fn set_callback<F>(&mut self, callback: F) -> &mut Self
    where
        F: FnOnce(&TaskRef) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Create a task in the `Created` status around `body`.
    ///
    /// The callback is moved into the task; the rest of the configuration can
    /// be reused for the next spawn.
    pub fn spawn<B: TaskBody>(&mut self, body: B) -> TaskRef {
        let scheduler = self.scheduler.clone().unwrap_or_else(default_scheduler);
        let name = self.name.clone().unwrap_or(Cow::Borrowed("anonymous"));

        AsyncTask::new(
            name,
            scheduler,
            self.skip_complete_on_cancel,
            self.callback.take(),
            Box::new(body),
        )
    }
}

impl fmt::Debug for TaskBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskBuilder")
            .field("name", &self.name)
            .field("skip_complete_on_cancel", &self.skip_complete_on_cancel)
            .field("has_scheduler", &self.scheduler.is_some())
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
