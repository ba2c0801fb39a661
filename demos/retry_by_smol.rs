use anyhow::Result;
use async_operation::prelude::*;
use smol::Timer;
use std::time::Duration;

struct Fetch;

impl RetryableWork for Fetch {
    fn attempt(&self, attempt: RetryAttempt<Self>) {
        println!("attempt {}", attempt.number());
        async_spawn_by_smol(async move {
            Timer::after(Duration::from_millis(10)).await;
            let result = if attempt.number() < 3 {
                Err(TaskError::other(anyhow!("connection reset")))
            } else {
                Ok(())
            };
            attempt.complete(result);
        })
        .detach();
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let scheduler = SchedulerBuilder::default()
        .smol_runtime_by_default()
        .build()?;

    let task = TaskBuilder::default()
        .set_scheduler(scheduler)
        .set_name("fetch")
        .spawn(RetryableOperation::new(
            Fetch,
            LinearBackoff::new(Duration::from_millis(50), Duration::from_millis(200)),
        ));
    task.start(None);

    println!("fetch finished: {:?}", smol::block_on(task.completion()));
    Ok(())
}
