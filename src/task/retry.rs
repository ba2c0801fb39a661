//! Repeat-until-done operations.
//!
//! # RetryableOperation
//!
//! Wraps a unit of `RetryableWork` as a task body:
//!
//! 1. Every attempt reports through `RetryAttempt::complete`.
//! 2. Success and terminal failures complete the task right away.
//! 3. A retryable failure arms a retry timer with the delay the `RetryPolicy`
//!    picks, unless cancellation was requested or the policy gives up; the
//!    task then completes with that failure.
//! 4. The retry timer slot is guarded by its own lock and a timer is only
//!    stored while completion has not begun. Completing or cancelling the task
//!    disarms it, which also releases the references its callback holds.

use super::async_task::{TaskBody, TaskRef};
use crate::prelude::*;
use crate::scheduler::{SchedulerExt, TimerRef};

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Decides how long to back off before the next attempt.
#[cfg_attr(test, mockall::automock)]
pub trait RetryPolicy: Send + Sync {
    /// Delay before the next attempt after `failures` retryable failures,
    /// `None` to give up.
    fn next_delay(&self, failures: u32) -> Option<Duration>;
}

/// The repeatable unit of work behind a `RetryableOperation`.
pub trait RetryableWork: Send + Sync + 'static {
    /// Run one attempt. Must eventually call `attempt.complete` exactly once.
    fn attempt(&self, attempt: RetryAttempt<Self>)
    where
        Self: Sized;

    /// Whether a failed attempt may be repeated.
    fn classify(&self, _error: &TaskError) -> Retryability {
        Retryability::Retryable
    }

    /// Abort the in-flight attempt, if there is one.
    fn on_cancel(&self, _task: &TaskRef) {}

    fn on_completed(&self, _task: &TaskRef) {}
}

/// A task body that repeats its work until it succeeds, fails for good, or is cancelled.
pub struct RetryableOperation<W> {
    core: Arc<RetryCore<W>>,
}

struct RetryCore<W> {
    work: W,
    policy: Box<dyn RetryPolicy>,
    // Round number of the retry the stored timer belongs to.
    retry_timer: Mutex<Option<(u32, TimerRef)>>,
    failures: AtomicU32,
    attempts: AtomicU32,
}

/// Completion handle of a single attempt.
pub struct RetryAttempt<W> {
    task: TaskRef,
    core: Arc<RetryCore<W>>,
    number: u32,
}

impl<W: RetryableWork> RetryableOperation<W> {
    pub fn new(work: W, policy: impl RetryPolicy + 'static) -> Self {
        RetryableOperation {
            core: Arc::new(RetryCore {
                work,
                policy: Box::new(policy),
                retry_timer: Mutex::new(None),
                failures: AtomicU32::new(0),
                attempts: AtomicU32::new(0),
            }),
        }
    }

    pub fn work(&self) -> &W {
        &self.core.work
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.core.attempts.load(Ordering::Acquire)
    }

    /// Retryable failures seen so far.
    pub fn failures(&self) -> u32 {
        self.core.failures.load(Ordering::Acquire)
    }

    /// Whether a retry timer is waiting to start the next attempt.
    pub fn has_pending_retry(&self) -> bool {
        self.core.lock_retry().is_some()
    }
}

impl<W> fmt::Debug for RetryableOperation<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryableOperation")
            .field("attempts", &self.core.attempts.load(Ordering::Acquire))
            .field("failures", &self.core.failures.load(Ordering::Acquire))
            .finish()
    }
}

impl<W: RetryableWork> TaskBody for RetryableOperation<W> {
    fn on_start(&self, task: &TaskRef) {
        self.core.run_attempt(task);
    }

    fn on_cancel(&self, task: &TaskRef) {
        let had_pending = self.core.cancel_retry_timer();

        // Advisory cancel while backing off: nothing else would complete the task.
        if had_pending && !task.snapshot().is_completing_or_completed() {
            task.try_complete(Err(TaskError::OperationCanceled));
        }

        self.core.work.on_cancel(task);
    }

    fn on_completed(&self, task: &TaskRef) {
        self.core.cancel_retry_timer();
        self.core.work.on_completed(task);
    }
}

impl<W: RetryableWork> RetryCore<W> {
    fn run_attempt(self: &Arc<Self>, task: &TaskRef) {
        let number = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        trace!("task {} attempt {}", task.id(), number);

        self.work.attempt(RetryAttempt {
            task: task.clone(),
            core: self.clone(),
            number,
        });
    }

    fn on_work_complete(self: &Arc<Self>, task: &TaskRef, result: TaskResult) {
        let error = match result {
            Ok(()) => {
                task.try_complete(Ok(()));
                return;
            }
            Err(error) => error,
        };

        let retryability = self.work.classify(&error);
        if retryability == Retryability::Terminal {
            debug!("task {} failed with {} error: {}", task.id(), retryability, error);
            task.try_complete(Err(error));
            return;
        }

        // Advisory cancel: report the attempt's own failure.
        if task.is_cancel_requested() {
            task.try_complete(Err(error));
            return;
        }

        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        let delay = match self.policy.next_delay(failures) {
            Some(delay) => delay,
            None => {
                debug!("task {} gives up after {} failures: {}", task.id(), failures, error);
                task.try_complete(Err(error));
                return;
            }
        };

        debug!(
            "task {} retrying in {:?} after failure {}: {}",
            task.id(),
            delay,
            failures,
            error
        );
        self.schedule_retry(task, failures, delay, error);
    }

    fn schedule_retry(self: &Arc<Self>, task: &TaskRef, round: u32, delay: Duration, error: TaskError) {
        let core = self.clone();
        let target = task.clone();
        let timer = task
            .scheduler()
            .create_timer(Arc::new(move || core.on_retry_timer(&target, round)));

        let stale = {
            let mut slot = self.lock_retry();
            let snapshot = task.snapshot();
            if snapshot.is_completing_or_completed() || snapshot.is_cancel_requested() {
                drop(slot);
                timer.cancel();
                // The cancellation raced with this failure.
                if !snapshot.is_completing_or_completed() {
                    task.try_complete(Err(error));
                }
                return;
            }
            slot.replace((round, timer.clone()))
        };

        if let Some((_, stale)) = stale {
            stale.cancel();
        }

        // A no-op if the timer got cancelled in between.
        timer.arm(delay);
    }

    fn on_retry_timer(self: &Arc<Self>, task: &TaskRef, round: u32) {
        let timer = {
            let mut slot = self.lock_retry();
            let is_current = matches!(slot.as_ref(), Some((current, _)) if *current == round);
            if is_current {
                slot.take()
            } else {
                None
            }
        };

        let timer = match timer {
            Some((_, timer)) => timer,
            None => return,
        };
        timer.cancel();

        let snapshot = task.snapshot();
        if snapshot.is_completing_or_completed() {
            return;
        }
        if snapshot.is_cancel_requested() {
            task.try_complete(Err(TaskError::OperationCanceled));
            return;
        }

        self.run_attempt(task);
    }

    // Returns whether a retry was pending.
    fn cancel_retry_timer(&self) -> bool {
        let pending = self.lock_retry().take();
        match pending {
            Some((_, timer)) => {
                timer.cancel();
                true
            }
            None => false,
        }
    }

    fn lock_retry(&self) -> MutexGuard<'_, Option<(u32, TimerRef)>> {
        self.retry_timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: RetryableWork> RetryAttempt<W> {
    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    /// One-based number of this attempt.
    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn work(&self) -> &W {
        &self.core.work
    }

    /// Report the outcome of this attempt.
    pub fn complete(self, result: TaskResult) {
        self.core.on_work_complete(&self.task, result);
    }
}

impl<W> fmt::Debug for RetryAttempt<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAttempt")
            .field("task", &self.task.id())
            .field("number", &self.number)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskBuilder;
    use crate::utils::manual::ManualScheduler;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    const BACKOFF: Duration = Duration::from_millis(10);

    // Completes each attempt with the next scripted outcome, or parks it when the script runs dry.
    #[derive(Default)]
    struct ScriptedWork {
        outcomes: Mutex<VecDeque<TaskResult>>,
        parked: Mutex<Option<RetryAttempt<ScriptedWork>>>,
        terminal_code: Option<i32>,
    }

    impl ScriptedWork {
        fn new(outcomes: Vec<TaskResult>) -> Self {
            ScriptedWork {
                outcomes: Mutex::new(outcomes.into()),
                ..ScriptedWork::default()
            }
        }

        fn finish_parked(&self, result: TaskResult) {
            let attempt = self.parked.lock().unwrap().take().expect("no parked attempt");
            attempt.complete(result);
        }
    }

    impl RetryableWork for ScriptedWork {
        fn attempt(&self, attempt: RetryAttempt<Self>) {
            let next = self.outcomes.lock().unwrap().pop_front();
            match next {
                Some(result) => attempt.complete(result),
                None => *self.parked.lock().unwrap() = Some(attempt),
            }
        }

        fn classify(&self, error: &TaskError) -> Retryability {
            match (error, self.terminal_code) {
                (TaskError::Code(code), Some(terminal)) if *code == terminal => {
                    Retryability::Terminal
                }
                _ => Retryability::Retryable,
            }
        }
    }

    fn spawn(
        manual: &ManualScheduler,
        work: ScriptedWork,
        policy: MockRetryPolicy,
        skip_complete_on_cancel: bool,
    ) -> TaskRef {
        TaskBuilder::default()
            .set_scheduler(manual.scheduler_ref())
            .set_skip_complete_on_cancel(skip_complete_on_cancel)
            .spawn(RetryableOperation::new(work, policy))
    }

    fn operation(task: &TaskRef) -> &RetryableOperation<ScriptedWork> {
        task.body::<RetryableOperation<ScriptedWork>>().unwrap()
    }

    #[test]
    fn succeeds_after_retries() {
        let manual = ManualScheduler::new();
        let mut policy = MockRetryPolicy::new();
        policy
            .expect_next_delay()
            .times(2)
            .returning(|_| Some(BACKOFF));

        let work = ScriptedWork::new(vec![Err(TaskError::Code(1)), Err(TaskError::Code(1)), Ok(())]);
        let task = spawn(&manual, work, policy, false);
        task.start(None);

        assert_eq!(operation(&task).attempts(), 1);
        assert!(operation(&task).has_pending_retry());

        manual.advance(BACKOFF);
        assert_eq!(operation(&task).attempts(), 2);
        assert!(!task.is_completed());

        manual.advance(BACKOFF);
        assert_eq!(task.outcome(), Some(&Ok(())));
        assert_eq!(operation(&task).attempts(), 3);
        assert_eq!(operation(&task).failures(), 2);
        assert_eq!(manual.pending_alarms(), 0);
    }

    #[test]
    fn terminal_failure_is_not_retried() {
        let manual = ManualScheduler::new();
        let mut policy = MockRetryPolicy::new();
        policy.expect_next_delay().times(0);

        let mut work = ScriptedWork::new(vec![Err(TaskError::Code(9))]);
        work.terminal_code = Some(9);
        let task = spawn(&manual, work, policy, false);
        task.start(None);

        assert_eq!(task.error(), Some(&TaskError::Code(9)));
        assert!(task.completed_synchronously());
        assert_eq!(manual.pending_alarms(), 0);
    }

    #[test]
    fn policy_gives_up_with_last_error() {
        let manual = ManualScheduler::new();
        let mut policy = MockRetryPolicy::new();
        policy
            .expect_next_delay()
            .with(eq(1))
            .times(1)
            .returning(|_| Some(BACKOFF));
        policy
            .expect_next_delay()
            .with(eq(2))
            .times(1)
            .returning(|_| None);

        let work = ScriptedWork::new(vec![Err(TaskError::Code(1)), Err(TaskError::Code(2))]);
        let task = spawn(&manual, work, policy, false);
        task.start(None);
        manual.advance(BACKOFF);

        assert_eq!(task.error(), Some(&TaskError::Code(2)));
        assert_eq!(operation(&task).attempts(), 2);
    }

    #[test]
    fn cancel_during_backoff_disarms_timer() {
        let manual = ManualScheduler::new();
        let mut policy = MockRetryPolicy::new();
        policy.expect_next_delay().returning(|_| Some(BACKOFF));

        let work = ScriptedWork::new(vec![Err(TaskError::Code(1)), Ok(())]);
        let task = spawn(&manual, work, policy, false);
        task.start(None);
        assert_eq!(manual.pending_alarms(), 1);

        task.cancel(false);
        assert_eq!(task.error(), Some(&TaskError::OperationCanceled));
        assert!(!operation(&task).has_pending_retry());
        assert_eq!(manual.pending_alarms(), 0);

        manual.advance(Duration::from_secs(1));
        assert_eq!(operation(&task).attempts(), 1);
        // Neither the timer nor the retry closure keep the task alive.
        assert_eq!(Arc::strong_count(&task), 1);
    }

    #[test]
    fn advisory_cancel_during_backoff_completes() {
        let manual = ManualScheduler::new();
        let mut policy = MockRetryPolicy::new();
        policy.expect_next_delay().returning(|_| Some(BACKOFF));

        let work = ScriptedWork::new(vec![Err(TaskError::Code(1))]);
        let task = spawn(&manual, work, policy, true);
        task.start(None);

        task.cancel(false);
        assert_eq!(task.error(), Some(&TaskError::OperationCanceled));
        assert_eq!(manual.pending_alarms(), 0);
    }

    #[test]
    fn advisory_cancel_reports_in_flight_failure() {
        let manual = ManualScheduler::new();
        let mut policy = MockRetryPolicy::new();
        policy.expect_next_delay().times(0);

        let task = spawn(&manual, ScriptedWork::new(vec![]), policy, true);
        task.start(None);

        task.cancel(false);
        assert!(task.is_cancel_requested());
        assert!(!task.is_completed());

        operation(&task).work().finish_parked(Err(TaskError::Code(5)));
        assert_eq!(task.error(), Some(&TaskError::Code(5)));
        assert_eq!(manual.pending_alarms(), 0);
    }
}
