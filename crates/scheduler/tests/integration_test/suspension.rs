use std::thread;
use std::time::Duration;

use taskline_scheduler::{Priority, Task};

use super::helpers::{entries, eventually, held_task, new_log, recording_task, scheduler, WAIT};

#[test]
fn test_suspend_submit_resume() {
    let s = scheduler("suspend");
    s.suspend();
    assert!(s.is_suspended());

    let (task, release) = held_task("held", Priority::DEFAULT);
    s.submit(task.clone()).unwrap();

    thread::sleep(Duration::from_millis(100));
    assert!(task.is_ready(), "task must not start while suspended");

    s.resume();
    assert!(eventually(|| task.is_running()));
    release.send(()).unwrap();
    assert!(task.wait(WAIT));
    assert!(task.is_finished());
}

#[test]
fn test_running_task_completes_while_suspended() {
    let s = scheduler("suspend-running");
    let log = new_log();
    let (running, release) = held_task("running", Priority::DEFAULT);
    s.submit(running.clone()).unwrap();
    assert!(eventually(|| running.is_running()));

    s.suspend();
    s.submit(recording_task("later", Priority::HIGH, &log)).unwrap();
    release.send(()).unwrap();
    assert!(running.wait(WAIT));
    assert!(running.is_finished());

    thread::sleep(Duration::from_millis(50));
    assert!(entries(&log).is_empty(), "no promotion while suspended");

    s.resume();
    assert!(s.wait_until_idle(WAIT));
    assert_eq!(entries(&log), ["later"]);
}

#[test]
fn test_resume_picks_highest_priority() {
    let s = scheduler("resume-priority");
    let log = new_log();
    s.suspend();
    s.submit_all([
        recording_task("bg", Priority::BACKGROUND, &log),
        recording_task("ui", Priority::USER_INTERACTIVE, &log),
        Task::builder(|t| {
            t.finish_ok();
        })
        .id("mid")
        .build(),
    ]);
    s.resume();
    assert!(s.wait_until_idle(WAIT));
    assert_eq!(entries(&log), ["ui", "bg"]);
}
