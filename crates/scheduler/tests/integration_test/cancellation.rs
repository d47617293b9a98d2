use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use taskline_scheduler::{Priority, SubmitError, Task, TaskError, TaskId};

use super::helpers::{eventually, held_task, scheduler, WAIT};

#[test]
fn test_cancel_all_during_long_running_task() {
    let s = scheduler("cancel-all");
    let (long, release) = held_task("long", Priority::DEFAULT);
    s.submit(long.clone()).unwrap();
    assert!(eventually(|| long.is_running()));

    let runs = Arc::new(AtomicUsize::new(0));
    let waiting: Vec<Task> = (0..5)
        .map(|_| {
            let counter = Arc::clone(&runs);
            Task::new(Priority::HIGH, move |t| {
                counter.fetch_add(1, Ordering::SeqCst);
                t.finish_ok();
            })
        })
        .collect();
    assert_eq!(s.submit_all(waiting.clone()), 5);

    s.cancel_all();
    s.cancel_all();

    let remaining = s.all_tasks();
    assert_eq!(remaining.len(), 1, "only the executing task remains");
    assert_eq!(remaining[0].id().as_str(), "long");
    assert!(long.is_running(), "executing task is unaffected");
    assert!(long.is_cancel_requested());
    assert!(waiting.iter().all(|t| t.is_canceled()));

    release.send(()).unwrap();
    assert!(s.wait_until_idle(WAIT));
    assert!(long.is_finished());
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert_eq!(s.metrics().tasks_withdrawn, 5);
}

#[test]
fn test_task_cancelled_while_ready_never_runs() {
    let s = scheduler("cancel-ready");
    s.suspend();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let task = Task::new(Priority::DEFAULT, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    s.submit(task.clone()).unwrap();
    assert!(task.is_ready());

    assert!(task.cancel(Some(TaskError::Canceled("no longer needed".into()))));
    s.resume();
    assert!(s.wait_until_idle(WAIT));

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(task.is_canceled());
    assert!(!task.finish_ok());
}

#[test]
fn test_duplicate_identifier_rejected() {
    let s = scheduler("dupes");
    s.suspend();
    s.submit(Task::builder(|_| {}).id("job-1").build()).unwrap();
    s.submit(Task::builder(|_| {}).id("job-2").build()).unwrap();

    let before = s.all_tasks().len();
    let result = s.submit(Task::builder(|_| {}).id("job-1").build());
    assert_eq!(result, Err(SubmitError::Duplicate(TaskId::from("job-1"))));
    assert_eq!(s.all_tasks().len(), before);
}

#[test]
fn test_teardown_cancels_pending_tasks() {
    let s = scheduler("teardown");
    s.suspend();
    let pending: Vec<Task> = (0..3).map(|_| Task::new(Priority::DEFAULT, |_| {})).collect();
    s.submit_all(pending.clone());

    drop(s);

    for task in &pending {
        assert!(task.is_canceled());
        assert_eq!(task.error(), Some(TaskError::Shutdown));
    }
}
