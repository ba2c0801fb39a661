//! task is the core of the library: the task state machine and the idioms built on it.
//!
//! # AsyncTask
//!
//! A cancellable, hierarchical, exactly-once-completing unit of asynchronous work.
//! Concrete tasks supply a `TaskBody` with `on_start`/`on_cancel`/`on_completed` hooks.
//!
//! # TimedTask
//!
//! A body decorator that cancels the task when its deadline passes.
//!
//! # RetryableOperation
//!
//! A body that repeats its work with backoff until success, a terminal failure,
//! or cancellation.

pub mod async_task;
pub mod builder;
pub(crate) mod children;
pub mod retry;
pub mod state;
pub mod timed;
pub mod trace;

pub use async_task::{AsAny, AsyncTask, CompletionCallback, TaskBody, TaskId, TaskRef};
pub use builder::TaskBuilder;
pub use retry::{RetryAttempt, RetryPolicy, RetryableOperation, RetryableWork};
pub use state::{StateSnapshot, TaskStatus};
pub use timed::{TimedBody, TimedTask, TimeoutHelper};
pub use trace::TaskTrace;
