use anyhow::Result;
use async_operation::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

// Flaky replica probe: fails twice, then answers.
struct ReplicaProbe {
    attempts: AtomicUsize,
}

impl RetryableWork for ReplicaProbe {
    fn attempt(&self, attempt: RetryAttempt<Self>) {
        let number = self.attempts.fetch_add(1, Ordering::SeqCst);
        async_spawn_by_tokio(async move {
            sleep_by_tokio(Duration::from_millis(50)).await;
            if number < 2 {
                attempt.complete(Err(TaskError::Code(503)));
            } else {
                attempt.complete(Ok(()));
            }
        });
    }
}

// Never answers; the deadline cancels it.
struct StuckCopy;

impl TimedBody for StuckCopy {
    fn on_start(&self, task: &TaskRef, timeout: &TimeoutHelper) {
        info!(
            "task {} copying with {:?} left",
            task.id(),
            timeout.remaining_time()
        );
    }

    fn on_timeout(&self, task: &TaskRef) {
        task.try_complete(Err(TaskError::Timeout));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // a builder for `FmtSubscriber`.
    FmtSubscriber::builder()
        // all spans/events with a level higher than TRACE (e.g, debug, info, warn, etc.)
        // will be written to stdout.
        .with_max_level(Level::DEBUG)
        // completes the builder.
        .init();

    let scheduler = SchedulerBuilder::default()
        .tokio_runtime_by_handle(tokio::runtime::Handle::current())
        .build()?;
    let reporter = StatusReporter::new();

    let operation = TaskBuilder::default()
        .set_scheduler(scheduler.clone())
        .set_name("rebalance")
        .set_callback(|task: &TaskRef| info!("rebalance finished: {:?}", task.outcome()))
        .spawn(functions::task_body(|_: &TaskRef| {}));
    operation.start(None);

    let probe = TaskBuilder::default()
        .set_scheduler(scheduler.clone())
        .set_name("probe-replica")
        .spawn(RetryableOperation::new(
            ReplicaProbe {
                attempts: AtomicUsize::new(0),
            },
            LinearBackoff::new(Duration::from_millis(100), Duration::from_secs(1))
                .set_jitter(Duration::from_millis(20))
                .set_max_attempts(5),
        ));
    probe.start(Some(&operation));

    let copy = TaskBuilder::default()
        .set_scheduler(scheduler)
        .set_name("copy-chunk")
        .spawn(TimedTask::new(Duration::from_millis(300), StuckCopy));
    copy.start(Some(&operation));

    info!("probe: {:?}", probe.completion().await);
    info!("copy: {:?}", copy.completion().await);

    operation.cancel(false);
    info!("rebalance: {:?}", operation.completion().await);

    while let Ok(event) = reporter.get_public_event() {
        info!("public event: {:?}", event);
    }
    Ok(())
}
