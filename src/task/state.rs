//! Lifecycle state of a task, packed into a single atomic word.
//!
//! The low two bits hold the status, the remaining bits are orthogonal flags.
//! Every transition is a single atomic read-modify-write, so concurrent
//! `start`, `cancel` and completion attempts always observe a consistent word.

use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) mod flag {
    /// Mask of the status bits.
    pub(crate) const STATUS_MASK: usize = 0b11;

    pub(crate) const CREATED: usize = 0;
    pub(crate) const STARTED: usize = 1;
    pub(crate) const COMPLETING: usize = 2;
    pub(crate) const COMPLETED: usize = 3;

    /// Set once somebody asked for cancellation.
    pub(crate) const CANCEL_REQUESTED: usize = 1 << 2;

    /// Set when `start` has returned to its caller.
    pub(crate) const START_RETURNED: usize = 1 << 3;

    /// Set if completion began before `start` returned.
    pub(crate) const COMPLETED_SYNCHRONOUSLY: usize = 1 << 4;
}

/// Status of a task.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskStatus {
    /// Built but not started yet.
    Created,
    /// Started, work in progress.
    Started,
    /// Completion won, hooks and callback are running.
    Completing,
    /// Terminal.
    Completed,
}

/// A point-in-time view of the state word.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StateSnapshot(usize);

impl StateSnapshot {
    /// Status part of the snapshot.
    pub fn status(self) -> TaskStatus {
        match self.0 & flag::STATUS_MASK {
            flag::CREATED => TaskStatus::Created,
            flag::STARTED => TaskStatus::Started,
            flag::COMPLETING => TaskStatus::Completing,
            _ => TaskStatus::Completed,
        }
    }

    pub fn is_cancel_requested(self) -> bool {
        self.0 & flag::CANCEL_REQUESTED != 0
    }

    pub fn is_completing_or_completed(self) -> bool {
        self.0 & flag::STATUS_MASK >= flag::COMPLETING
    }

    pub fn is_completed_synchronously(self) -> bool {
        self.0 & flag::COMPLETED_SYNCHRONOUSLY != 0
    }
}

#[derive(Debug, Default)]
pub(crate) struct TaskState {
    inner: AtomicUsize,
}

impl TaskState {
    pub(crate) fn new() -> Self {
        TaskState {
            inner: AtomicUsize::new(flag::CREATED),
        }
    }

    pub(crate) fn snapshot(&self) -> StateSnapshot {
        StateSnapshot(self.inner.load(Ordering::Acquire))
    }

    /// `Created -> Started`. Returns the previous word on success.
    pub(crate) fn try_start(&self) -> Result<StateSnapshot, StateSnapshot> {
        self.inner
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                if s & flag::STATUS_MASK != flag::CREATED {
                    return None;
                }
                Some((s & !flag::STATUS_MASK) | flag::STARTED)
            })
            .map(StateSnapshot)
            .map_err(StateSnapshot)
    }

    /// `Started -> Completing`, at most once per instance.
    pub(crate) fn try_start_complete(&self) -> bool {
        self.inner
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                if s & flag::STATUS_MASK != flag::STARTED {
                    return None;
                }
                let mut next = (s & !flag::STATUS_MASK) | flag::COMPLETING;
                if s & flag::START_RETURNED == 0 {
                    next |= flag::COMPLETED_SYNCHRONOUSLY;
                }
                Some(next)
            })
            .is_ok()
    }

    /// `Completing -> Completed`. Only the completion winner calls this.
    pub(crate) fn set_completed(&self) {
        let result = self
            .inner
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                if s & flag::STATUS_MASK != flag::COMPLETING {
                    return None;
                }
                Some(s | flag::COMPLETED)
            });
        debug_assert!(result.is_ok(), "completed without winning completion");
    }

    /// Set the cancel flag, returning the word as it was before.
    ///
    /// The flag is left untouched once completion has begun.
    pub(crate) fn request_cancel(&self) -> StateSnapshot {
        let previous = self
            .inner
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                if s & flag::STATUS_MASK >= flag::COMPLETING {
                    return None;
                }
                Some(s | flag::CANCEL_REQUESTED)
            });
        match previous {
            Ok(s) | Err(s) => StateSnapshot(s),
        }
    }

    pub(crate) fn mark_start_returned(&self) {
        self.inner.fetch_or(flag::START_RETURNED, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn status_moves_forward_only() {
        let state = TaskState::new();
        assert_eq!(state.snapshot().status(), TaskStatus::Created);

        // Completion is not possible before start.
        assert!(!state.try_start_complete());

        assert!(state.try_start().is_ok());
        assert!(state.try_start().is_err());
        assert_eq!(state.snapshot().status(), TaskStatus::Started);

        assert!(state.try_start_complete());
        assert!(!state.try_start_complete());
        assert_eq!(state.snapshot().status(), TaskStatus::Completing);

        state.set_completed();
        assert_eq!(state.snapshot().status(), TaskStatus::Completed);
        assert!(state.snapshot().is_completing_or_completed());
    }

    #[test]
    fn cancel_flag_is_orthogonal() {
        let state = TaskState::new();
        let previous = state.request_cancel();
        assert!(!previous.is_cancel_requested());
        assert!(state.request_cancel().is_cancel_requested());

        let started = state.try_start().expect("created task starts");
        assert!(started.is_cancel_requested());
        assert_eq!(state.snapshot().status(), TaskStatus::Started);
    }

    #[test]
    fn cancel_flag_is_refused_after_completion_began() {
        let state = TaskState::new();
        state.try_start().ok();
        assert!(state.try_start_complete());

        let previous = state.request_cancel();
        assert_eq!(previous.status(), TaskStatus::Completing);
        assert!(!state.snapshot().is_cancel_requested());

        state.set_completed();
        state.request_cancel();
        assert!(!state.snapshot().is_cancel_requested());
    }

    #[test]
    fn synchronous_completion_is_recorded() {
        let state = TaskState::new();
        state.try_start().ok();
        assert!(state.try_start_complete());
        assert!(state.snapshot().is_completed_synchronously());

        let state = TaskState::new();
        state.try_start().ok();
        state.mark_start_returned();
        assert!(state.try_start_complete());
        assert!(!state.snapshot().is_completed_synchronously());
    }

    #[test]
    fn only_one_thread_starts_completion() {
        let state = Arc::new(TaskState::new());
        state.try_start().ok();
        let winners = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                let winners = winners.clone();
                thread::spawn(move || {
                    if state.try_start_complete() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().expect("worker panicked");
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
