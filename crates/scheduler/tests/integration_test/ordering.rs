use taskline_scheduler::{Priority, StateChange, Task, TaskState};

use super::helpers::{entries, new_log, recording_task, scheduler, WAIT};

#[test]
fn test_high_then_default_then_low() {
    let s = scheduler("order");
    let log = new_log();

    // Hold the worker so all three are pending before selection starts.
    let (blocker, release) = super::helpers::held_task("blocker", Priority::MAX);
    s.submit(blocker).unwrap();

    s.submit(recording_task("A", Priority::LOW, &log)).unwrap();
    s.submit(recording_task("B", Priority::HIGH, &log)).unwrap();
    s.submit(recording_task("C", Priority::DEFAULT, &log)).unwrap();
    release.send(()).unwrap();

    assert!(s.wait_until_idle(WAIT));
    assert_eq!(entries(&log), ["B", "C", "A"]);
}

#[test]
fn test_bulk_submission_preserves_input_order_for_ties() {
    let s = scheduler("bulk");
    let log = new_log();
    s.suspend();

    let tasks: Vec<Task> = (0..20)
        .map(|i| {
            let priority = if i % 2 == 0 { Priority::HIGH } else { Priority::LOW };
            recording_task(&format!("t{i:02}"), priority, &log)
        })
        .collect();
    assert_eq!(s.submit_all(tasks), 20);

    // Pending queue is non-increasing in priority at every point.
    let snapshot = s.all_tasks();
    assert!(snapshot
        .windows(2)
        .all(|w| w[0].priority() >= w[1].priority()));

    s.resume();
    assert!(s.wait_until_idle(WAIT));

    let expected: Vec<String> = (0..20)
        .step_by(2)
        .chain((1..20).step_by(2))
        .map(|i| format!("t{i:02}"))
        .collect();
    assert_eq!(entries(&log), expected);
}

#[test]
fn test_hundred_immediate_tasks_drain() {
    let s = scheduler("drain");
    let tasks: Vec<Task> = (0..100)
        .map(|i| {
            Task::new(Priority::new(i * 10), |t| {
                t.finish_ok();
            })
        })
        .collect();
    assert_eq!(s.submit_all(tasks.clone()), 100);

    assert!(s.wait_until_idle(WAIT));
    assert!(s.all_tasks().is_empty());
    assert!(tasks.iter().all(|t| t.is_finished()));
    assert_eq!(s.metrics().tasks_finished, 100);
}

#[test]
fn test_listener_sees_full_lifecycle() {
    let s = scheduler("lifecycle");
    let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&seen);
    let task = Task::builder(|t| {
        std::thread::spawn(move || t.finish_ok());
    })
    .listener(move |change: &StateChange| sink.lock().unwrap().push(change.state))
    .build();

    s.submit(task.clone()).unwrap();
    assert!(task.wait(WAIT));
    assert_eq!(
        *seen.lock().unwrap(),
        [TaskState::Ready, TaskState::Running, TaskState::Finished]
    );
}
