use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use taskline_core::{load_dotenv, Priority, SchedulerConfig, SequentialIdGenerator};
use taskline_scheduler::{Scheduler, StateChange, Task, TaskError};

/// Run a batch of demo tasks through a taskline scheduler.
///
/// Submits a mix of synchronous tasks and tasks that complete on a helper
/// thread, with varied priorities, then prints metrics and the final status.
#[derive(Parser, Debug)]
#[command(name = "taskline-demo", about = "Exercise a serial priority scheduler")]
struct Cli {
    /// Path to a TOML config file (fields or a `[scheduler]` table)
    #[arg(long, env = "TASKLINE_CONFIG")]
    config: Option<String>,

    /// Number of tasks to submit
    #[arg(long, default_value = "12")]
    tasks: usize,

    /// Submit while suspended, then resume after this many milliseconds
    #[arg(long)]
    suspend_ms: Option<u64>,

    /// Give up waiting for the scheduler to drain after this many seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Simulated work per task in milliseconds
    #[arg(long, default_value = "20")]
    work_ms: u64,

    /// Cancel helper-thread tasks still running after this many milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,
}

fn main() -> Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = match cli.config.as_deref() {
        Some(path) => SchedulerConfig::from_file(path).unwrap_or_else(|e| {
            warn!("Failed to load config from {}: {} (using defaults)", path, e);
            SchedulerConfig::default()
        }),
        None => SchedulerConfig::from_env().unwrap_or_else(|e| {
            warn!("Invalid environment config: {} (using defaults)", e);
            SchedulerConfig::default()
        }),
    };
    config.log_summary();
    let config_summary = config.summary();

    let scheduler = Scheduler::new(config).context("failed to start scheduler")?;
    scheduler.on_task_complete(|change: &StateChange| match &change.error {
        Some(err) => warn!("{} ended as {}: {}", change.task_id, change.state, err),
        None => info!("{} ended as {}", change.task_id, change.state),
    });

    if cli.suspend_ms.is_some() {
        scheduler.suspend();
    }

    let ids = SequentialIdGenerator::new("demo");
    let work = Duration::from_millis(cli.work_ms);
    let deadline = cli.deadline_ms.map(Duration::from_millis);
    let tasks: Vec<Task> = (0..cli.tasks)
        .map(|i| demo_task(i, work, deadline, &ids))
        .collect();
    let accepted = scheduler.submit_all(tasks);
    info!("Submitted {}/{} tasks", accepted, cli.tasks);

    if let Some(ms) = cli.suspend_ms {
        info!("Suspended; status before resume:\n{}", scheduler);
        thread::sleep(Duration::from_millis(ms));
        scheduler.resume();
    }

    if !scheduler.wait_until_idle(Duration::from_secs(cli.timeout_secs)) {
        warn!("Scheduler did not drain in time:\n{}", scheduler);
        scheduler.cancel_all();
        bail!("timed out after {}s waiting for tasks", cli.timeout_secs);
    }

    let report = serde_json::json!({
        "config": config_summary,
        "metrics": scheduler.metrics(),
        "status": scheduler.status(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    scheduler.shutdown();
    Ok(())
}

/// Build the `i`th demo task. Every third task finishes on a helper thread,
/// every fifth one fails. With a `deadline`, a watchdog cancels helper-thread
/// tasks that are still running when it expires.
fn demo_task(
    i: usize,
    work: Duration,
    deadline: Option<Duration>,
    ids: &SequentialIdGenerator,
) -> Task {
    let priority = match i % 4 {
        0 => Priority::LOW,
        1 => Priority::HIGH,
        2 => Priority::DEFAULT,
        _ => Priority::USER_INTERACTIVE,
    };
    let fails = i % 5 == 4;
    let detached = i % 3 == 0;

    let body = move |task: Task| {
        thread::sleep(work);
        if fails {
            task.fail(TaskError::failed(format!("simulated failure in job {i}")));
        } else {
            task.finish_ok();
        }
    };

    Task::builder(move |task| {
        if detached {
            if let Some(limit) = deadline {
                let watched = task.clone();
                thread::spawn(move || {
                    thread::sleep(limit);
                    if watched.cancel(Some(TaskError::TimedOut(limit))) {
                        warn!("{} exceeded its {:?} deadline", watched.id(), limit);
                    }
                });
            }
            thread::spawn(move || body(task));
        } else {
            body(task);
        }
    })
    .priority(priority)
    .build_with(ids)
}
