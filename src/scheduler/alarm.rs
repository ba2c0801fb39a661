// The problem of storing different pending-job types behind one handle is solved
// through `dyn AlarmHandle`. An enumeration would not let crate users plug in
// their own executor, and a generic would pin a scheduler to a single job type.

use smol::Task as SmolTask;
use tokio::task::JoinHandle as TokioJoinHandle;

/// A pending alarm job owned by a `Timer`.
pub trait AlarmHandle: Send {
    /// Stop the job; its callback must not run afterwards.
    fn quit(self: Box<Self>);

    /// Let go of the job without stopping it (used once it has already fired).
    fn release(self: Box<Self>);
}

// When a tokio job is aborted, the pending sleep is dropped with it.
impl AlarmHandle for TokioJoinHandle<()> {
    fn quit(self: Box<Self>) {
        self.abort();
    }

    fn release(self: Box<Self>) {}
}

// When a SmolTask is dropped, the async job is cancelled.
impl AlarmHandle for SmolTask<()> {
    fn quit(self: Box<Self>) {
        drop(self);
    }

    fn release(self: Box<Self>) {
        (*self).detach();
    }
}
