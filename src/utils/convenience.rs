use crate::prelude::*;
use crate::task::{TaskBody, TaskRef};

use std::sync::{Mutex, PoisonError};

/// A task body around a closure run by `on_start`.
pub struct FnBody<F> {
    on_start: F,
}

impl<F> TaskBody for FnBody<F>
where
    F: Fn(&TaskRef) + Send + Sync + 'static,
{
    fn on_start(&self, task: &TaskRef) {
        (self.on_start)(task)
    }
}

/// A body that completes with a preset result as soon as it starts.
pub struct ReadyBody {
    result: Mutex<Option<TaskResult>>,
}

impl TaskBody for ReadyBody {
    fn on_start(&self, task: &TaskRef) {
        let result = self
            .result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(result) = result {
            task.try_complete(result);
        }
    }
}

pub mod functions {

    use super::{FnBody, ReadyBody};
    use crate::prelude::*;
    use crate::scheduler::SchedulerRef;
    use crate::task::{TaskBuilder, TaskRef};

    use std::sync::Mutex;

    #[inline(always)]
    ///Convert a closure into a task body whose `on_start` runs it.
    pub fn task_body<F>(on_start: F) -> FnBody<F>
    where
        F: Fn(&TaskRef) + Send + Sync + 'static,
    {
        FnBody { on_start }
    }

    #[inline(always)]
    ///Convert a result into a task body that completes with it on start.
    pub fn ready_body(result: TaskResult) -> ReadyBody {
        ReadyBody {
            result: Mutex::new(Some(result)),
        }
    }

    ///Create a task that is already started and completed with `result`.
    pub fn create_completed_task(scheduler: SchedulerRef, result: TaskResult) -> TaskRef {
        let task = TaskBuilder::default()
            .set_scheduler(scheduler)
            .set_name("completed")
            .spawn(ready_body(result));
        task.start(None);
        task
    }
}

#[cfg(test)]
mod tests {
    use super::functions::*;
    use crate::prelude::*;
    use crate::task::TaskBuilder;
    use crate::utils::manual::ManualScheduler;
    use pretty_assertions::assert_eq;

    #[test]
    fn completed_task_is_done_on_return() {
        let manual = ManualScheduler::new();
        let task = create_completed_task(manual.scheduler_ref(), Err(TaskError::Code(3)));

        assert!(task.is_completed());
        assert!(task.completed_synchronously());
        assert_eq!(task.error(), Some(&TaskError::Code(3)));
        assert_eq!(manual.posted_len(), 0);
    }

    #[test]
    fn closure_body_receives_task() {
        let manual = ManualScheduler::new();
        let task = TaskBuilder::default()
            .set_scheduler(manual.scheduler_ref())
            .set_name("closure")
            .spawn(task_body(|task: &TaskRef| {
                assert_eq!(task.name(), "closure");
            }));

        task.start(None);
        assert_eq!(task.status(), TaskStatus::Started);
    }
}
