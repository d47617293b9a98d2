use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use taskline_scheduler::{Priority, Task};

use super::helpers::{scheduler, WAIT};

#[test]
fn test_at_most_one_running_under_concurrent_submission() {
    let s = Arc::new(scheduler("concurrent"));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..4)
        .map(|worker| {
            let s = Arc::clone(&s);
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                for i in 0..25 {
                    let running = Arc::clone(&running);
                    let peak = Arc::clone(&peak);
                    let done = Arc::clone(&done);
                    let task = Task::new(Priority::new((worker * 25 + i) % 1000), move |t| {
                        // Half the tasks finish on a helper thread.
                        let body = move || {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            thread::sleep(Duration::from_micros(200));
                            running.fetch_sub(1, Ordering::SeqCst);
                            done.fetch_add(1, Ordering::SeqCst);
                            t.finish_ok();
                        };
                        if i % 2 == 0 {
                            thread::spawn(body);
                        } else {
                            body();
                        }
                    });
                    s.submit(task).unwrap();
                }
            })
        })
        .collect();
    for handle in submitters {
        handle.join().unwrap();
    }

    assert!(s.wait_until_idle(WAIT));
    assert_eq!(done.load(Ordering::SeqCst), 100);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(s.metrics().tasks_started, 100);
}

#[test]
fn test_concurrent_suspend_resume_and_cancel() {
    let s = Arc::new(scheduler("chaos"));
    let toggler = {
        let s = Arc::clone(&s);
        thread::spawn(move || {
            for _ in 0..50 {
                s.suspend();
                thread::yield_now();
                s.resume();
            }
        })
    };
    let tasks: Vec<Task> = (0..50)
        .map(|i| {
            Task::new(Priority::new(i), |t| {
                t.finish_ok();
            })
        })
        .collect();
    for (i, task) in tasks.iter().enumerate() {
        s.submit(task.clone()).unwrap();
        if i % 10 == 9 {
            s.cancel(task.id());
        }
    }
    toggler.join().unwrap();
    s.resume();

    assert!(s.wait_until_idle(WAIT));
    assert!(tasks.iter().all(|t| t.is_terminal()));
}
