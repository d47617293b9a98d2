use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use taskline_scheduler::{Priority, Scheduler, SchedulerConfig, Task};

pub const WAIT: Duration = Duration::from_secs(10);

/// Scheduler with a fixed identifier and diagnostics on.
pub fn scheduler(name: &str) -> Scheduler {
    let config = SchedulerConfig {
        identifier: Some(name.to_string()),
        thread_name: format!("{name}-worker"),
        diagnostics: true,
        ..SchedulerConfig::default()
    };
    Scheduler::new(config).unwrap()
}

/// Shared execution log.
pub type Log = Arc<Mutex<Vec<String>>>;

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

/// Task that appends its id to `log` and finishes synchronously.
pub fn recording_task(id: &str, priority: Priority, log: &Log) -> Task {
    let log = Arc::clone(log);
    let name = id.to_string();
    Task::builder(move |t| {
        log.lock().unwrap().push(name);
        t.finish_ok();
    })
    .id(id)
    .priority(priority)
    .build()
}

/// Task that stays `Running` until the returned sender fires, then finishes
/// from a helper thread.
pub fn held_task(id: &str, priority: Priority) -> (Task, mpsc::Sender<()>) {
    let (tx, rx) = mpsc::channel::<()>();
    let task = Task::builder(move |t| {
        thread::spawn(move || {
            let _ = rx.recv();
            t.finish_ok();
        });
    })
    .id(id)
    .priority(priority)
    .build();
    (task, tx)
}

/// Poll `cond` until it holds or `WAIT` elapses.
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}
