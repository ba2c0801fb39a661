//! async-operation provides cancellable, hierarchical, exactly-once-completing
//! asynchronous tasks, plus the deadline and retry idioms built on them.
//!
//! Tasks never spawn threads or sleep on their own: every deferred callback
//! and every alarm goes through a [`Scheduler`](scheduler::Scheduler), backed by
//! tokio, by smol, or driven by hand in tests.
//!
//! # Lifecycle
//!
//! 1. `TaskBuilder::spawn` creates a task in the `Created` status.
//! 2. `start` moves it to `Started` (optionally under a parent) and runs `on_start`.
//! 3. The first successful `try_complete`, or a cancellation, wins the single
//!    `Completing` transition; `on_completed` and the completion callback run
//!    once, then the task detaches from its parent and drops its children.
//!
//! Cancelling a task fans out to every live child. A task built with
//! `set_skip_complete_on_cancel(true)` is only signalled on a non-forced
//! cancel and keeps its natural completion path.
//!
//! # Examples
//!
//! ```
//! use async_operation::prelude::*;
//! use std::time::Duration;
//!
//! fn main() -> AnyResult<()> {
//!     let scheduler = SchedulerBuilder::default().worker_threads(2).build()?;
//!
//!     let parent = TaskBuilder::default()
//!         .set_scheduler(scheduler.clone())
//!         .set_name("parent")
//!         .spawn(functions::task_body(|_: &TaskRef| {}));
//!     parent.start(None);
//!
//!     let child = TaskBuilder::default()
//!         .set_scheduler(scheduler)
//!         .set_name("child")
//!         .spawn(functions::task_body(|_: &TaskRef| {}));
//!     child.start(Some(&parent));
//!
//!     parent.cancel(false);
//!
//!     assert_eq!(child.wait_timeout(Duration::from_secs(1))?, Err(TaskError::OperationCanceled));
//!     assert_eq!(parent.wait(), Err(TaskError::OperationCanceled));
//!     Ok(())
//! }
//! ```
//!
//! # Feature flags
//!
//! - `status-report`: publish task lifecycle events, read through `StatusReporter`.
//! - `full`: everything above.

#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
pub(crate) mod macros;

pub mod error;
pub mod prelude;
pub mod scheduler;
pub mod task;
pub mod utils;
