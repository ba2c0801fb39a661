//! Deadline-bounded tasks.
//!
//! # TimedTask
//!
//! Wraps a `TimedBody` and arms a one-shot deadline timer when the task
//! starts. If the deadline passes before completion began, `on_timeout` runs
//! and the task is cancelled through the ordinary (non-forced) path. The timer
//! is cancelled as soon as the task completes or is cancelled, which also
//! releases the task reference the timer callback holds.

use super::async_task::{TaskBody, TaskRef};
use crate::prelude::*;
use crate::scheduler::{SchedulerExt, TimerRef};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use once_cell::sync::OnceCell;

/// Deadline bookkeeping handed to a timed body when it starts.
#[derive(Debug, Copy, Clone)]
pub struct TimeoutHelper {
    started_at: Instant,
    timeout: Duration,
}

impl TimeoutHelper {
    pub fn new(timeout: Duration) -> Self {
        TimeoutHelper {
            started_at: Instant::now(),
            timeout,
        }
    }

    /// Time left until the deadline, zero once it passed.
    pub fn remaining_time(&self) -> Duration {
        self.timeout.saturating_sub(self.started_at.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.started_at.elapsed() >= self.timeout
    }

    pub fn original_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// The hook set of a deadline-bounded task.
pub trait TimedBody: Send + Sync + 'static {
    /// Begin the work; sub-calls should be bounded by `timeout.remaining_time()`.
    fn on_start(&self, task: &TaskRef, timeout: &TimeoutHelper);

    /// The deadline passed before completion began.
    ///
    /// Runs right before the task is cancelled; completing the task here with
    /// `TaskError::Timeout` replaces the cancellation error.
    fn on_timeout(&self, _task: &TaskRef) {}

    fn on_cancel(&self, _task: &TaskRef) {}

    fn on_completed(&self, _task: &TaskRef) {}
}

/// A task body that cancels itself when its deadline passes.
pub struct TimedTask<B> {
    timeout: Duration,
    helper: OnceCell<TimeoutHelper>,
    deadline: Mutex<Option<TimerRef>>,
    inner: B,
}

impl<B: TimedBody> TimedTask<B> {
    pub fn new(timeout: Duration, inner: B) -> Self {
        TimedTask {
            timeout,
            helper: OnceCell::new(),
            deadline: Mutex::new(None),
            inner,
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn original_timeout(&self) -> Duration {
        self.timeout
    }

    /// Deadline bookkeeping, available once the task started.
    pub fn timeout_helper(&self) -> Option<&TimeoutHelper> {
        self.helper.get()
    }

    /// Whether the deadline timer is still pending.
    pub fn is_deadline_armed(&self) -> bool {
        self.lock_deadline()
            .as_ref()
            .map_or(false, |timer| timer.is_armed())
    }

    fn arm_deadline(&self, task: &TaskRef) {
        let target = task.clone();
        let timer = task.scheduler().create_timer(Arc::new(move || {
            if target.snapshot().is_completing_or_completed() {
                return;
            }

            debug!("task {} timed out", target.id());
            if let Some(timed) = target.body::<TimedTask<B>>() {
                timed.inner.on_timeout(&target);
            }
            target.cancel(false);
        }));

        {
            let mut deadline = self.lock_deadline();
            if task.snapshot().is_completing_or_completed() {
                drop(deadline);
                timer.cancel();
                return;
            }
            *deadline = Some(timer.clone());
        }

        // A no-op if the deadline got cancelled in between.
        timer.arm(self.timeout);
    }

    fn cancel_deadline(&self) {
        let timer = self.lock_deadline().take();
        if let Some(timer) = timer {
            timer.cancel();
        }
    }

    fn lock_deadline(&self) -> MutexGuard<'_, Option<TimerRef>> {
        self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<B: TimedBody> TaskBody for TimedTask<B> {
    fn on_start(&self, task: &TaskRef) {
        let helper = *self.helper.get_or_init(|| TimeoutHelper::new(self.timeout));
        self.arm_deadline(task);
        self.inner.on_start(task, &helper);
    }

    fn on_cancel(&self, task: &TaskRef) {
        self.cancel_deadline();
        self.inner.on_cancel(task);
    }

    fn on_completed(&self, task: &TaskRef) {
        self.cancel_deadline();
        self.inner.on_completed(task);
    }
}
