//! scheduler is the executor seam of the library: the task framework never
//! spawns threads or sleeps on its own, it only posts callbacks and asks for alarms.
//!
//! # Scheduler
//!
//! Anything that can run a deferred callback and fire one after a delay:
//!
//! 1. `TokioScheduler` runs on a tokio runtime (owned or shared).
//! 2. `SmolScheduler` runs on the smol global executor.
//! 3. `ManualScheduler` (in `utils`) is driven by hand, for deterministic tests.
//!
//! # Timer
//!
//! A one-shot, re-armable, cancellable timer built on any scheduler.

pub(crate) mod alarm;
pub mod runtime;
pub mod timer;

pub use alarm::AlarmHandle;
pub use runtime::{RuntimeKind, SchedulerBuilder, SmolScheduler, TokioScheduler};
pub use timer::{Timer, TimerCallback, TimerRef};

use crate::prelude::*;

use std::sync::Arc;

use once_cell::sync::Lazy;

/// A deferred unit of work.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Handle of a scheduled alarm; quitting it prevents the callback from running.
pub type AlarmGuard = Box<dyn AlarmHandle>;

/// Shared scheduler handle, as held by every task.
pub type SchedulerRef = Arc<dyn Scheduler>;

/// The executor/timer service consumed by the framework.
///
/// Implementations must never run `callback` inline on the calling thread:
/// the framework relies on `post` to escape the caller's stack and locks.
pub trait Scheduler: Send + Sync + 'static {
    /// Fire-and-forget deferred execution.
    fn post(&self, callback: Callback);

    /// Run `callback` once after `delay`, unless the returned guard is quit first.
    fn schedule_alarm(&self, delay: Duration, callback: Callback) -> AlarmGuard;
}

/// Timer creation on top of a shared scheduler.
pub trait SchedulerExt {
    /// Create a disarmed one-shot timer that runs `callback` when it fires.
    fn create_timer(&self, callback: TimerCallback) -> TimerRef;
}

impl SchedulerExt for SchedulerRef {
    fn create_timer(&self, callback: TimerCallback) -> TimerRef {
        Timer::new(self.clone(), callback)
    }
}

static DEFAULT_SCHEDULER: Lazy<SchedulerRef> = Lazy::new(|| {
    SchedulerBuilder::default().build().unwrap_or_else(|e| {
        error!("default tokio scheduler unavailable, falling back to smol: {}", e);
        Arc::new(SmolScheduler::default())
    })
});

/// The process-wide scheduler used by tasks built without one.
///
/// Backed by an internal tokio runtime that lives until the process exits.
pub fn default_scheduler() -> SchedulerRef {
    DEFAULT_SCHEDULER.clone()
}
