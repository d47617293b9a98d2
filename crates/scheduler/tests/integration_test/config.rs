use std::io::Write;

use taskline_scheduler::{Scheduler, SchedulerConfig};

#[test]
fn test_scheduler_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[scheduler]\nidentifier = \"from-file\"\nthread_name = \"file-worker\"\ndiagnostics = true"
    )
    .unwrap();

    let config = SchedulerConfig::from_file(file.path()).unwrap();
    let s = Scheduler::new(config).unwrap();
    assert_eq!(s.identifier(), "from-file");
    assert!(s.config().diagnostics);
    assert_eq!(s.status().identifier, "from-file");
}

#[test]
fn test_invalid_stack_size_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "stack_size = 1").unwrap();
    assert!(SchedulerConfig::from_file(file.path()).is_err());
}
