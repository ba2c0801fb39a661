//! A scheduler driven by hand.
//!
//! Posted callbacks queue up until `run_posted` is called, alarms fire only when
//! virtual time is moved with `advance`. Nothing ever runs on another thread,
//! which makes the interleavings of cancellation, completion and timer firing
//! reproducible in tests.

use crate::prelude::*;
use crate::scheduler::{AlarmGuard, AlarmHandle, Callback, Scheduler, SchedulerRef};

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

// Alarms are ordered by due time, then by creation order.
type AlarmKey = (Duration, u64);

#[derive(Default)]
struct ManualInner {
    now: Duration,
    next_alarm_id: u64,
    posted: VecDeque<Callback>,
    alarms: BTreeMap<AlarmKey, Callback>,
}

/// Deterministic scheduler with a virtual clock.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    inner: Arc<Mutex<ManualInner>>,
}

struct ManualAlarm {
    key: AlarmKey,
    inner: Weak<Mutex<ManualInner>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        ManualScheduler::default()
    }

    /// A shared handle to hand to tasks; it drives the same queues as `self`.
    pub fn scheduler_ref(&self) -> SchedulerRef {
        Arc::new(self.clone())
    }

    /// Virtual time elapsed so far.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Number of posted callbacks waiting to run.
    pub fn posted_len(&self) -> usize {
        self.lock().posted.len()
    }

    /// Number of alarms that have neither fired nor been quit.
    pub fn pending_alarms(&self) -> usize {
        self.lock().alarms.len()
    }

    /// Run posted callbacks, including the ones they post, until the queue is empty.
    pub fn run_posted(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.lock().posted.pop_front();
            match next {
                Some(callback) => {
                    callback();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Move virtual time forward, firing every alarm that becomes due in order.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.lock().now + by;
        let mut fired = 0;
        loop {
            let due = {
                let mut inner = self.lock();
                let key = match inner.alarms.keys().next() {
                    Some(key) if key.0 <= target => *key,
                    _ => {
                        inner.now = target;
                        return fired;
                    }
                };
                inner.now = key.0;
                inner.alarms.remove(&key)
            };

            if let Some(callback) = due {
                callback();
                fired += 1;
            }
        }
    }

    /// Fire the earliest pending alarm regardless of its due time.
    pub fn fire_next(&self) -> bool {
        let due = {
            let mut inner = self.lock();
            let key = match inner.alarms.keys().next() {
                Some(key) => *key,
                None => return false,
            };
            if key.0 > inner.now {
                inner.now = key.0;
            }
            inner.alarms.remove(&key)
        };

        match due {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManualInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &inner.now)
            .field("posted", &inner.posted.len())
            .field("alarms", &inner.alarms.len())
            .finish()
    }
}

impl Scheduler for ManualScheduler {
    fn post(&self, callback: Callback) {
        self.lock().posted.push_back(callback);
    }

    fn schedule_alarm(&self, delay: Duration, callback: Callback) -> AlarmGuard {
        let mut inner = self.lock();
        inner.next_alarm_id += 1;
        let key = (inner.now + delay, inner.next_alarm_id);
        inner.alarms.insert(key, callback);

        Box::new(ManualAlarm {
            key,
            inner: Arc::downgrade(&self.inner),
        })
    }
}

impl AlarmHandle for ManualAlarm {
    fn quit(self: Box<Self>) {
        if let Some(inner) = self.inner.upgrade() {
            let removed = inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .alarms
                .remove(&self.key);
            // Dropped outside the lock: the callback may own the last task reference.
            drop(removed);
        }
    }

    fn release(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn posted_callbacks_wait_for_run() {
        let manual = ManualScheduler::new();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let ran = ran.clone();
            manual.post(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(manual.posted_len(), 3);
        assert_eq!(manual.run_posted(), 3);
        assert_eq!(ran.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn alarms_fire_in_due_order() {
        let manual = ManualScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (delay, tag) in [(30u64, "c"), (10, "a"), (20, "b")].iter() {
            let order = order.clone();
            let tag = *tag;
            let _guard = manual.schedule_alarm(
                Duration::from_millis(*delay),
                Box::new(move || order.lock().unwrap().push(tag)),
            );
        }

        assert_eq!(manual.advance(Duration::from_millis(25)), 2);
        assert_eq!(manual.now(), Duration::from_millis(25));
        assert!(manual.fire_next());
        assert!(!manual.fire_next());
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn quit_alarm_is_removed() {
        let manual = ManualScheduler::new();
        let guard = manual.schedule_alarm(Duration::from_millis(5), Box::new(|| {}));
        assert_eq!(manual.pending_alarms(), 1);

        guard.quit();
        assert_eq!(manual.pending_alarms(), 0);
        assert_eq!(manual.advance(Duration::from_secs(1)), 0);
    }
}
