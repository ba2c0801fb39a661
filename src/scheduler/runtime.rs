//! Runtime-backed schedulers and their builder.
//!
//! # SchedulerBuilder
//!
//! Picks the async runtime the framework posts callbacks and alarms to:
//!
//! 1. A tokio runtime built internally (the default).
//! 2. A user supplied tokio runtime, owned, shared or reached through a `Handle`.
//! 3. The smol global executor.

use super::{AlarmGuard, Callback, Scheduler, SchedulerRef};
use crate::prelude::*;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::runtime::{Builder as TokioBuilder, Handle, Runtime};

const DEFAULT_THREAD_NAME: &str = "async-operation";

/// Async-Runtime Kind
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RuntimeKind {
    /// Async-Runtime `smol` compatible with the async-std
    Smol,

    /// Async-Runtime `tokio`
    Tokio,
}

impl Default for RuntimeKind {
    fn default() -> Self {
        RuntimeKind::Tokio
    }
}

/// Where the tokio scheduler gets its runtime from.
#[derive(Debug)]
enum TokioSource {
    Custom(Runtime),
    Shared(Arc<Runtime>),
    Handle(Handle),
}

/// Builds a scheduler with custom configuration values.
///
/// Methods can be chained in order to set the configuration values. The
/// scheduler is constructed by calling `build`.
///
/// # Examples
///
/// ```
/// use async_operation::prelude::*;
///
/// let scheduler = SchedulerBuilder::default()
///     .worker_threads(2)
///     .thread_name("cluster-ops")
///     .build()
///     .expect("tokio runtime builds");
/// scheduler.post(Box::new(|| println!("deferred")));
/// ```
#[derive(Debug, Default)]
pub struct SchedulerBuilder {
    kind: RuntimeKind,
    tokio_source: Option<TokioSource>,
    worker_threads: Option<usize>,
    thread_name: Option<String>,
}

impl SchedulerBuilder {
    /// With this API, the scheduler uses the smol global executor.
    pub fn smol_runtime_by_default(mut self) -> Self {
        self.kind = RuntimeKind::Smol;
        self.tokio_source = None;
        self
    }

    /// With this API, a tokio runtime is generated internally.
    ///
    /// By default the internal runtime is `Tokio`, this API does not require a user-initiated call.
    pub fn tokio_runtime_by_default(mut self) -> Self {
        self.kind = RuntimeKind::Tokio;
        self.tokio_source = None;
        self
    }

    /// With this API, the scheduler takes ownership of the user's tokio runtime.
    pub fn tokio_runtime_by_custom(mut self, rt: Runtime) -> Self {
        self.kind = RuntimeKind::Tokio;
        self.tokio_source = Some(TokioSource::Custom(rt));
        self
    }

    /// With this API, the scheduler shares a tokio runtime with the user.
    pub fn tokio_runtime_shared_by_custom(mut self, rt: Arc<Runtime>) -> Self {
        self.kind = RuntimeKind::Tokio;
        self.tokio_source = Some(TokioSource::Shared(rt));
        self
    }

    /// With this API, the scheduler spawns onto an already running tokio runtime.
    pub fn tokio_runtime_by_handle(mut self, handle: Handle) -> Self {
        self.kind = RuntimeKind::Tokio;
        self.tokio_source = Some(TokioSource::Handle(handle));
        self
    }

    /// Worker threads of the internally built tokio runtime.
    pub fn worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = Some(worker_threads);
        self
    }

    /// Thread name prefix of the internally built tokio runtime.
    pub fn thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = Some(thread_name.into());
        self
    }

    /// Build the scheduler.
    pub fn build(self) -> Result<SchedulerRef, SchedulerError> {
        match self.kind {
            RuntimeKind::Smol => Ok(Arc::new(SmolScheduler::default())),
            RuntimeKind::Tokio => Ok(Arc::new(self.build_tokio()?)),
        }
    }

    fn build_tokio(self) -> Result<TokioScheduler, SchedulerError> {
        let scheduler = match self.tokio_source {
            Some(TokioSource::Custom(rt)) => TokioScheduler::from_owned(rt),
            Some(TokioSource::Shared(rt)) => TokioScheduler::from_shared(rt),
            Some(TokioSource::Handle(handle)) => TokioScheduler::from_handle(handle),
            None => {
                let thread_name = self
                    .thread_name
                    .unwrap_or_else(|| DEFAULT_THREAD_NAME.to_string());
                TokioScheduler::from_owned(tokio_support(self.worker_threads, thread_name)?)
            }
        };

        Ok(scheduler)
    }
}

fn tokio_support(worker_threads: Option<usize>, thread_name: String) -> std::io::Result<Runtime> {
    let thread_id = Arc::new(AtomicUsize::new(0));
    let mut builder = TokioBuilder::new_multi_thread();
    builder
        .enable_all()
        .thread_name_fn(move || {
            let id = thread_id.fetch_add(1, Ordering::SeqCst);
            format!("{}-{}", thread_name, id)
        })
        .on_thread_start(|| {
            info!("tokio-thread started");
        });

    if let Some(worker_threads) = worker_threads {
        builder.worker_threads(worker_threads);
    }

    builder.build()
}

// Keeps a runtime alive for as long as a scheduler refers to it.
//
// An owned runtime is shut down in the background: the last reference may be
// dropped from one of its own worker threads, where a blocking drop panics.
enum RuntimeInstance {
    Owned(Option<Runtime>),
    Shared(Arc<Runtime>),
}

impl Drop for RuntimeInstance {
    fn drop(&mut self) {
        if let RuntimeInstance::Owned(rt) = self {
            if let Some(rt) = rt.take() {
                debug!("shutting down internal tokio runtime");
                rt.shutdown_background();
            }
        }
    }
}

/// Scheduler running callbacks and alarms on a tokio runtime.
#[derive(Clone)]
pub struct TokioScheduler {
    handle: Handle,
    runtime: Option<Arc<RuntimeInstance>>,
}

impl TokioScheduler {
    /// Spawn onto the runtime behind `handle`; the caller keeps the runtime alive.
    pub fn from_handle(handle: Handle) -> Self {
        TokioScheduler {
            handle,
            runtime: None,
        }
    }

    fn from_owned(rt: Runtime) -> Self {
        TokioScheduler {
            handle: rt.handle().clone(),
            runtime: Some(Arc::new(RuntimeInstance::Owned(Some(rt)))),
        }
    }

    fn from_shared(rt: Arc<Runtime>) -> Self {
        TokioScheduler {
            handle: rt.handle().clone(),
            runtime: Some(Arc::new(RuntimeInstance::Shared(rt))),
        }
    }
}

impl fmt::Debug for TokioScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioScheduler")
            .field("handle", &self.handle)
            .field("owns_runtime", &self.runtime.is_some())
            .finish()
    }
}

impl Scheduler for TokioScheduler {
    fn post(&self, callback: Callback) {
        drop(self.handle.spawn(async move { callback() }));
    }

    fn schedule_alarm(&self, delay: Duration, callback: Callback) -> AlarmGuard {
        Box::new(self.handle.spawn(async move {
            sleep_by_tokio(delay).await;
            callback();
        }))
    }
}

/// Scheduler running callbacks and alarms on the smol global executor.
#[derive(Clone, Copy, Debug, Default)]
pub struct SmolScheduler;

impl Scheduler for SmolScheduler {
    fn post(&self, callback: Callback) {
        async_spawn_by_smol(async move { callback() }).detach();
    }

    fn schedule_alarm(&self, delay: Duration, callback: Callback) -> AlarmGuard {
        Box::new(async_spawn_by_smol(async move {
            AsyncTimer::after(delay).await;
            callback();
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    const WAIT: Duration = Duration::from_secs(5);

    fn roundtrip(scheduler: SchedulerRef) {
        let (sender, receiver) = channel();
        let posted = sender.clone();
        scheduler.post(Box::new(move || {
            posted.send("posted").ok();
        }));
        assert_eq!(receiver.recv_timeout(WAIT), Ok("posted"));

        let _alarm = scheduler.schedule_alarm(
            Duration::from_millis(20),
            Box::new(move || {
                sender.send("alarm").ok();
            }),
        );
        assert_eq!(receiver.recv_timeout(WAIT), Ok("alarm"));
    }

    fn quit_alarm_never_fires(scheduler: SchedulerRef) {
        let (sender, receiver) = channel::<()>();
        let alarm = scheduler.schedule_alarm(
            Duration::from_millis(50),
            Box::new(move || {
                sender.send(()).ok();
            }),
        );
        alarm.quit();
        assert!(receiver.recv_timeout(Duration::from_millis(300)).is_err());
    }

    #[test]
    fn tokio_scheduler_runs_posts_and_alarms() -> AnyResult<()> {
        let scheduler = SchedulerBuilder::default()
            .worker_threads(2)
            .thread_name("tokio-scheduler-test")
            .build()?;
        roundtrip(scheduler.clone());
        quit_alarm_never_fires(scheduler);
        Ok(())
    }

    #[test]
    fn smol_scheduler_runs_posts_and_alarms() -> AnyResult<()> {
        let scheduler = SchedulerBuilder::default()
            .smol_runtime_by_default()
            .build()?;
        roundtrip(scheduler.clone());
        quit_alarm_never_fires(scheduler);
        Ok(())
    }

    #[test]
    fn shared_runtime_outlives_scheduler() -> AnyResult<()> {
        let rt = Arc::new(Runtime::new()?);
        let scheduler = SchedulerBuilder::default()
            .tokio_runtime_shared_by_custom(rt.clone())
            .build()?;
        roundtrip(scheduler.clone());
        drop(scheduler);

        // Still usable by its owner.
        assert_eq!(rt.block_on(async { 7 }), 7);
        Ok(())
    }

    #[test]
    fn default_kind_is_tokio() {
        assert_eq!(RuntimeKind::default(), RuntimeKind::Tokio);
    }
}
