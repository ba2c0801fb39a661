//! A "prelude" for users of the `async-operation` crate.
//!
//! This prelude is similar to the standard library's prelude in that you'll
//! almost always want to import its entire contents, but unlike the standard
//! library's prelude you'll have to do so manually:
//!
//! ```
//! use async_operation::prelude::*;
//! ```
//!
//! The prelude may grow over time as additional items see ubiquitous use.

pub use crate::error::*;
pub use crate::scheduler::{
    default_scheduler, RuntimeKind, Scheduler, SchedulerBuilder, SchedulerExt, SchedulerRef,
    SmolScheduler, Timer, TimerRef, TokioScheduler,
};
pub use crate::task::{
    AsyncTask, RetryAttempt, RetryPolicy, RetryableOperation, RetryableWork, TaskBody,
    TaskBuilder, TaskId, TaskRef, TaskStatus, TaskTrace, TimedBody, TimedTask, TimeoutHelper,
};
pub use crate::utils::{functions, LinearBackoff, ManualScheduler};

pub use anyhow::{anyhow, Result as AnyResult};
pub use smol::channel;
pub use smol::spawn as async_spawn_by_smol;
pub use smol::Task as SmolJoinHandler;
pub use thiserror::Error;

pub(crate) use dashmap::DashMap;
pub(crate) use log::{debug, error, info, trace};
pub(crate) use smol::Timer as AsyncTimer;
pub(crate) use std::time::Duration;
pub(crate) use tracing::trace_span;

pub use tokio::task::{spawn as async_spawn_by_tokio, JoinHandle as TokioJoinHandle};
pub use tokio::time::sleep as sleep_by_tokio;

cfg_status_report!(
    pub use crate::utils::status_report::{PublicEvent, StatusReporter};
    pub(crate) use crate::utils::status_report::report;
    pub(crate) use smol::channel::{bounded, Receiver as AsyncReceiver, Sender as AsyncSender};
);
