//! Weak registry of running tasks, keyed by task id.
//!
//! The registry never keeps a task alive. It lets an owner cancel everything it
//! started (e.g. on shutdown) without holding strong references in between.

use super::async_task::{AsyncTask, TaskId, TaskRef};
use crate::prelude::*;

use std::sync::{Arc, Weak};

#[derive(Debug, Default)]
pub struct TaskTrace {
    inner: DashMap<TaskId, Weak<AsyncTask>>,
}

impl TaskTrace {
    pub fn new() -> Self {
        TaskTrace::default()
    }

    /// Track `task`; its entry is dropped on `remove` or once it is gone.
    pub fn insert(&self, task: &TaskRef) {
        self.inner.insert(task.id(), Arc::downgrade(task));
    }

    pub fn remove(&self, id: TaskId) -> Option<TaskRef> {
        self.inner.remove(&id).and_then(|(_, task)| task.upgrade())
    }

    pub fn get(&self, id: TaskId) -> Option<TaskRef> {
        self.inner.get(&id).and_then(|entry| entry.value().upgrade())
    }

    /// Drop entries of tasks that completed or went away; returns how many were dropped.
    pub fn prune(&self) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, task| {
            task.upgrade()
                .map_or(false, |task| !task.is_completed())
        });
        before.saturating_sub(self.inner.len())
    }

    /// Cancel every live task, forcing completion when `force_complete` is set.
    pub fn cancel_all(&self, force_complete: bool) -> usize {
        // Collected first: cancellation runs hooks that may touch the registry.
        let tasks: Vec<TaskRef> = self
            .inner
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect();

        debug!("cancelling {} traced tasks", tasks.len());
        for task in tasks.iter() {
            task.cancel(force_complete);
        }
        tasks.len()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
