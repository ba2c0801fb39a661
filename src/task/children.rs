//! Weak collection of the children a task has started.
//!
//! The parent never owns its children: an entry only answers "is this child
//! still alive right now" through `Weak::upgrade`, so a child's lifetime stays
//! with whoever started it and no reference cycle can form.

use super::async_task::AsyncTask;

use std::sync::{Arc, Weak};

#[derive(Debug, Default)]
pub(crate) struct Children {
    inner: Vec<Weak<AsyncTask>>,
}

impl Children {
    pub(crate) fn push(&mut self, child: &Arc<AsyncTask>) {
        // Reuse slots of children that already went away.
        self.inner.retain(|entry| entry.strong_count() > 0);
        self.inner.push(Arc::downgrade(child));
    }

    /// Remove `child` by identity; expired entries are removed along the way.
    pub(crate) fn remove(&mut self, child: &AsyncTask) -> bool {
        let before = self.inner.len();
        let target = child as *const AsyncTask;
        self.inner
            .retain(|entry| entry.strong_count() > 0 && !std::ptr::eq(entry.as_ptr(), target));
        before != self.inner.len()
    }

    /// Upgrade every live child into an owned list and empty the collection.
    pub(crate) fn drain_live(&mut self) -> Vec<Arc<AsyncTask>> {
        self.inner
            .drain(..)
            .filter_map(|entry| entry.upgrade())
            .collect()
    }

    pub(crate) fn live(&self) -> Vec<Arc<AsyncTask>> {
        self.inner.iter().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn clear(&mut self) {
        self.inner.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }
}
