//! One-shot timer on top of a `Scheduler`.
//!
//! Every `arm` bumps a generation number; an alarm only runs the callback if its
//! generation is still the current one, so a superseded or cancelled alarm that
//! races past `quit` is harmless. A fired timer disarms itself, a cancelled timer
//! drops its callback and can never be armed again.

use super::{AlarmGuard, SchedulerRef};
use crate::prelude::*;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callback run by a timer when it fires.
pub type TimerCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Shared timer handle.
pub type TimerRef = Arc<Timer>;

/// A one-shot, re-armable, cancellable timer.
pub struct Timer {
    scheduler: SchedulerRef,
    inner: Mutex<TimerInner>,
}

struct TimerInner {
    // `None` once cancelled.
    callback: Option<TimerCallback>,
    alarm: Option<AlarmGuard>,
    generation: u64,
    armed: bool,
}

impl Timer {
    pub(crate) fn new(scheduler: SchedulerRef, callback: TimerCallback) -> TimerRef {
        Arc::new(Timer {
            scheduler,
            inner: Mutex::new(TimerInner {
                callback: Some(callback),
                alarm: None,
                generation: 0,
                armed: false,
            }),
        })
    }

    /// Arm (or re-arm) the timer to fire once after `delay`.
    ///
    /// Re-arming supersedes the pending alarm. Arming a cancelled timer is a no-op.
    pub fn arm(self: &Arc<Self>, delay: Duration) {
        let (generation, superseded) = {
            let mut inner = self.lock();
            if inner.callback.is_none() {
                trace!("timer arm ignored, timer is cancelled");
                return;
            }
            inner.generation += 1;
            inner.armed = true;
            (inner.generation, inner.alarm.take())
        };

        if let Some(alarm) = superseded {
            alarm.quit();
        }

        let timer = self.clone();
        let alarm = self
            .scheduler
            .schedule_alarm(delay, Box::new(move || timer.fire(generation)));

        let mut inner = self.lock();
        if inner.armed && inner.generation == generation {
            inner.alarm = Some(alarm);
            return;
        }

        // Already fired, or superseded/cancelled while the alarm was being scheduled.
        let fired = inner.generation == generation;
        drop(inner);
        if fired {
            alarm.release();
        } else {
            alarm.quit();
        }
    }

    /// Disarm the timer for good and release its callback.
    ///
    /// Cancelling an already fired or cancelled timer is a no-op.
    pub fn cancel(&self) {
        let (alarm, callback) = {
            let mut inner = self.lock();
            inner.armed = false;
            inner.generation += 1;
            (inner.alarm.take(), inner.callback.take())
        };

        if let Some(alarm) = alarm {
            alarm.quit();
        }
        drop(callback);
    }

    /// Whether an alarm is pending.
    pub fn is_armed(&self) -> bool {
        self.lock().armed
    }

    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.lock().callback.is_none()
    }

    fn fire(&self, generation: u64) {
        let (alarm, callback) = {
            let mut inner = self.lock();
            if !inner.armed || inner.generation != generation {
                return;
            }
            inner.armed = false;
            (inner.alarm.take(), inner.callback.clone())
        };

        if let Some(alarm) = alarm {
            alarm.release();
        }
        if let Some(callback) = callback {
            callback();
        }
    }

    fn lock(&self) -> MutexGuard<'_, TimerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Timer")
            .field("armed", &inner.armed)
            .field("generation", &inner.generation)
            .field("cancelled", &inner.callback.is_none())
            .finish()
    }
}
