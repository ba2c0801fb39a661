//! The cancellable, hierarchical, exactly-once-completing task.
//!
//! # AsyncTask
//!
//! A task is created by `TaskBuilder`, started once, and completed exactly once:
//!
//! 1. `try_start_complete` is the single gate; whoever wins it runs
//!    `on_completed`, the completion callback and the cleanup.
//! 2. A task holds its parent strongly and its children weakly; cancelling a
//!    parent fans out to every child that is still alive.
//! 3. No framework lock is ever held while a hook, a callback, or a child's
//!    `cancel` runs. Locked state is drained into an owned snapshot first.
//! 4. A child that fails to attach to its parent is cancelled through the
//!    scheduler, never inline on the thread calling `start`.

use super::children::Children;
use super::state::{StateSnapshot, TaskState, TaskStatus};
use crate::prelude::*;
use crate::scheduler::SchedulerRef;

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use event_listener::Event;
use once_cell::sync::{Lazy, OnceCell};
use snowflake::SnowflakeIdGenerator;

/// Shared task handle.
pub type TaskRef = Arc<AsyncTask>;

/// Unique id of a task.
pub type TaskId = i64;

/// One-shot closure notified when a task completes.
pub type CompletionCallback = Box<dyn FnOnce(&TaskRef) + Send + 'static>;

static ID_GENERATOR: Lazy<Mutex<SnowflakeIdGenerator>> =
    Lazy::new(|| Mutex::new(SnowflakeIdGenerator::new(1, 1)));

pub(crate) fn next_task_id() -> TaskId {
    ID_GENERATOR
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .generate()
}

/// Upcast helper so task bodies can be recovered by concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The hook set a concrete task implements.
///
/// `on_start` begins the real work and must eventually lead to exactly one
/// `try_complete`, directly or through a callback chain, unless the task is
/// left to its timeout or to cancellation.
pub trait TaskBody: AsAny + Send + Sync + 'static {
    /// Begin the work.
    fn on_start(&self, task: &TaskRef);

    /// React to a cancellation request, e.g. abort an in-flight sub-call.
    fn on_cancel(&self, _task: &TaskRef) {}

    /// Bookkeeping that must happen after the status is `Completed`
    /// but before the completion callback fires.
    fn on_completed(&self, _task: &TaskRef) {}
}

/// A cancellable, hierarchical, exactly-once-completing asynchronous task.
pub struct AsyncTask {
    id: TaskId,
    name: Cow<'static, str>,
    state: TaskState,
    outcome: OnceCell<TaskResult>,
    callback: Mutex<Option<CompletionCallback>>,
    parent: Mutex<Option<TaskRef>>,
    // The children lock. Also decides attach-vs-cancel races.
    children: Mutex<Children>,
    skip_complete_on_cancel: bool,
    scheduler: SchedulerRef,
    finished: AtomicBool,
    finish_event: Event,
    body: Box<dyn TaskBody>,
}

impl AsyncTask {
    pub(crate) fn new(
        name: Cow<'static, str>,
        scheduler: SchedulerRef,
        skip_complete_on_cancel: bool,
        callback: Option<CompletionCallback>,
        body: Box<dyn TaskBody>,
    ) -> TaskRef {
        Arc::new(AsyncTask {
            id: next_task_id(),
            name,
            state: TaskState::new(),
            outcome: OnceCell::new(),
            callback: Mutex::new(callback),
            parent: Mutex::new(None),
            children: Mutex::new(Children::default()),
            skip_complete_on_cancel,
            scheduler,
            finished: AtomicBool::new(false),
            finish_event: Event::new(),
            body,
        })
    }

    /// Start the task, optionally as a child of `parent`.
    ///
    /// # Panics
    ///
    /// Starting a task twice is a programming error.
    pub fn start(self: &Arc<Self>, parent: Option<&TaskRef>) {
        let previous = match self.state.try_start() {
            Ok(previous) => previous,
            Err(current) => panic!(
                "task {} ({}) started twice, status {:?}",
                self.id,
                self.name,
                current.status()
            ),
        };

        let span = trace_span!("task_start", id = self.id, name = %self.name);
        let _enter = span.enter();

        let attached = match parent {
            Some(parent) => {
                *self.lock_parent() = Some(parent.clone());
                let attached = parent.attach_child(self);
                if attached && self.state.snapshot().is_completing_or_completed() {
                    // Cleanup may have run before the parent was stored.
                    self.lock_parent().take();
                    parent.detach_child(self);
                } else if !attached {
                    debug!(
                        "task {} could not attach to parent {}, deferring cancellation",
                        self.id,
                        parent.id()
                    );
                }
                attached
            }
            None => true,
        };

        #[cfg(feature = "status-report")]
        report(PublicEvent::Started(self.id));

        // Runs even when the task is about to be force-cancelled.
        self.body.on_start(self);

        if !attached || previous.is_cancel_requested() {
            // The caller may hold a lock the cancellation path needs.
            let task = self.clone();
            self.scheduler.post(Box::new(move || task.force_cancel()));
        }

        self.state.mark_start_returned();
    }

    /// Request cancellation, fanning out to live children.
    ///
    /// Only the first request has side effects. Unless `force_complete` is set,
    /// a task built with `skip_complete_on_cancel` is only signalled through
    /// `on_cancel` and keeps its natural completion path.
    pub fn cancel(self: &Arc<Self>, force_complete: bool) {
        let previous = self.state.request_cancel();
        if previous.is_cancel_requested() {
            return;
        }

        match previous.status() {
            TaskStatus::Created => {
                debug!("task {} cancelled before start", self.id);
                return;
            }
            TaskStatus::Completing | TaskStatus::Completed => return,
            TaskStatus::Started => {}
        }

        #[cfg(feature = "status-report")]
        report(PublicEvent::CancelRequested(self.id));

        self.cancel_internal(force_complete);
    }

    /// Attempt to complete the task with `result`.
    ///
    /// Returns `false` if somebody else already completed or cancelled it; the
    /// given result is then discarded.
    pub fn try_complete(self: &Arc<Self>, result: TaskResult) -> bool {
        if self.state.try_start_complete() {
            self.finish_complete(result);
            return true;
        }

        self.discard(result);
        false
    }

    /// Win the right to complete the task, `Started -> Completing`.
    ///
    /// The winner must follow up with `finish_complete`.
    pub fn try_start_complete(&self) -> bool {
        self.state.try_start_complete()
    }

    /// Store the result, then run `on_completed`, the callback and the cleanup.
    ///
    /// Only valid after winning `try_start_complete`; any other call is logged
    /// and its result discarded.
    pub fn finish_complete(self: &Arc<Self>, result: TaskResult) {
        if self.state.snapshot().status() != TaskStatus::Completing {
            error!(
                "task {} finish_complete without winning completion, status {:?}",
                self.id,
                self.status()
            );
            self.discard(result);
            return;
        }

        if let Err(result) = self.outcome.set(result) {
            error!("task {} finish_complete called twice", self.id);
            self.discard(result);
            return;
        }

        self.state.set_completed();
        trace!("task {} completed: {:?}", self.id, self.outcome.get());

        self.body.on_completed(self);

        let callback = self.lock_callback().take();
        if let Some(callback) = callback {
            callback(self);
        }

        self.cleanup();

        #[cfg(feature = "status-report")]
        report(PublicEvent::Completed(self.id, self.error().is_none()));

        self.finished.store(true, Ordering::Release);
        self.finish_event.notify(usize::MAX);
    }

    /// Track `child` for cancellation fan-out.
    ///
    /// Fails once this task is completing, completed or cancel-requested.
    pub fn attach_child(&self, child: &TaskRef) -> bool {
        let mut children = self.lock_children();
        let snapshot = self.state.snapshot();
        if snapshot.is_cancel_requested() || snapshot.is_completing_or_completed() {
            return false;
        }

        children.push(child);
        true
    }

    /// Stop tracking `child`. Expired entries count as a match.
    pub fn detach_child(&self, child: &AsyncTask) -> bool {
        self.lock_children().remove(child)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> TaskStatus {
        self.state.snapshot().status()
    }

    pub fn is_completed(&self) -> bool {
        self.status() == TaskStatus::Completed
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.state.snapshot().is_cancel_requested()
    }

    /// Whether completion began before `start` returned to its caller.
    pub fn completed_synchronously(&self) -> bool {
        self.state.snapshot().is_completed_synchronously()
    }

    pub fn is_skip_complete_on_cancel(&self) -> bool {
        self.skip_complete_on_cancel
    }

    /// The stored result, available once the task has completed.
    pub fn outcome(&self) -> Option<&TaskResult> {
        self.outcome.get()
    }

    /// The stored error, if the task completed with one.
    pub fn error(&self) -> Option<&TaskError> {
        self.outcome().and_then(|result| result.as_ref().err())
    }

    pub fn parent(&self) -> Option<TaskRef> {
        self.lock_parent().clone()
    }

    /// Children that are attached and still alive.
    pub fn live_children(&self) -> Vec<TaskRef> {
        self.lock_children().live()
    }

    pub fn scheduler(&self) -> &SchedulerRef {
        &self.scheduler
    }

    /// The body of the task, if it is of type `T`.
    pub fn body<T: TaskBody>(&self) -> Option<&T> {
        AsAny::as_any(&*self.body).downcast_ref::<T>()
    }

    /// Block the current thread until the task has fully completed.
    ///
    /// Meant for callers outside the task graph; calling it from a hook of the
    /// same task never returns.
    pub fn wait(&self) -> TaskResult {
        loop {
            if let Some(result) = self.finished_outcome() {
                return result;
            }

            let listener = self.finish_event.listen();
            if let Some(result) = self.finished_outcome() {
                return result;
            }
            listener.wait();
        }
    }

    /// Block the current thread until the task completes or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<TaskResult, HandleTaskError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(result) = self.finished_outcome() {
                return Ok(result);
            }

            let listener = self.finish_event.listen();
            if let Some(result) = self.finished_outcome() {
                return Ok(result);
            }
            if !listener.wait_deadline(deadline) {
                return self
                    .finished_outcome()
                    .ok_or(HandleTaskError::WaitTimeout);
            }
        }
    }

    /// Async-await the completion of the task.
    pub async fn completion(&self) -> TaskResult {
        loop {
            if let Some(result) = self.finished_outcome() {
                return result;
            }

            let listener = self.finish_event.listen();
            if let Some(result) = self.finished_outcome() {
                return result;
            }
            listener.await;
        }
    }

    pub(crate) fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    pub(crate) fn children_len(&self) -> usize {
        self.lock_children().len()
    }

    // Forced cancellation posted by `start`; not gated by the cancel flag.
    fn force_cancel(self: &Arc<Self>) {
        if self.state.request_cancel().is_completing_or_completed() {
            return;
        }
        self.cancel_internal(true);
    }

    fn cancel_internal(self: &Arc<Self>, force_complete: bool) {
        let span = trace_span!("task_cancel", id = self.id, force_complete);
        let _enter = span.enter();

        let children = self.lock_children().drain_live();
        if !children.is_empty() {
            trace!("task {} cancelling {} children", self.id, children.len());
        }
        for child in children {
            child.cancel(false);
        }

        if !force_complete && self.skip_complete_on_cancel {
            self.body.on_cancel(self);
            return;
        }

        if self.state.try_start_complete() {
            self.body.on_cancel(self);
            self.finish_complete(Err(TaskError::OperationCanceled));
        }
    }

    // Idempotent: children are dropped without being cancelled.
    fn cleanup(&self) {
        self.lock_children().clear();

        let parent = self.lock_parent().take();
        if let Some(parent) = parent {
            parent.detach_child(self);
        }

        let callback = self.lock_callback().take();
        drop(callback);
    }

    fn discard(&self, result: TaskResult) {
        if let Err(error) = result {
            debug!(
                "task {} discarded error `{}`, the task was already completed",
                self.id, error
            );
        }
    }

    fn finished_outcome(&self) -> Option<TaskResult> {
        if self.finished.load(Ordering::Acquire) {
            return self.outcome.get().cloned();
        }
        None
    }

    fn lock_children(&self) -> MutexGuard<'_, Children> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_parent(&self) -> MutexGuard<'_, Option<TaskRef>> {
        self.parent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_callback(&self) -> MutexGuard<'_, Option<CompletionCallback>> {
        self.callback.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for AsyncTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTask")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .field("cancel_requested", &self.is_cancel_requested())
            .field("outcome", &self.outcome.get())
            .finish()
    }
}
