use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TasklineError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    profiled_lookup(profile, key, env_opt)
}

fn profiled_lookup(
    profile: &str,
    key: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = lookup(&prefixed) {
            return Some(v);
        }
    }
    lookup(key)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ── Scheduler config ──────────────────────────────────────────

/// Configuration for one scheduler instance.
///
/// Parsed from TOML (`[scheduler]` table or a bare table) with environment
/// variable overrides applied on top. Every field has a default, so an empty
/// document yields a usable config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fixed scheduler identifier. `None` generates a fresh UUID per instance.
    #[serde(default)]
    pub identifier: Option<String>,

    /// Name given to the dedicated worker thread.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// Worker thread stack size in bytes. `None` uses the platform default.
    #[serde(default)]
    pub stack_size: Option<usize>,

    /// Emit per-task diagnostic events (admission, selection, transitions).
    #[serde(default)]
    pub diagnostics: bool,
}

fn default_thread_name() -> String {
    "taskline-worker".into()
}

/// Smallest accepted worker stack size.
pub const MIN_STACK_SIZE: usize = 16 * 1024;

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            identifier: None,
            thread_name: default_thread_name(),
            stack_size: None,
            diagnostics: false,
        }
    }
}

#[derive(Deserialize)]
struct ConfigDocument {
    scheduler: Option<SchedulerConfig>,
}

impl SchedulerConfig {
    /// Parse config from a TOML string, then apply env overrides and validate.
    ///
    /// Accepts either a `[scheduler]` table or the fields at the top level.
    pub fn from_toml(toml_str: &str) -> Result<Self, TasklineError> {
        let document: ConfigDocument = toml::from_str(toml_str)?;
        let mut config = match document.scheduler {
            Some(section) => section,
            None => toml::from_str(toml_str)?,
        };
        config.apply_env_overrides(&active_profile());
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TasklineError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Build config from environment variables only (call `load_dotenv()` first).
    ///
    /// Profile is read from `TASKLINE_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, TasklineError> {
        let mut config = Self::default();
        config.apply_env_overrides(&active_profile());
        config.validate()?;
        Ok(config)
    }

    /// Overlay `TASKLINE_*` environment variables onto this config.
    pub fn apply_env_overrides(&mut self, profile: &str) {
        self.apply_overrides(|key| profiled_env_opt(profile, key));
    }

    /// Overlay values from `lookup`, keyed by the unprofiled variable name.
    /// Unparseable numbers and booleans are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("TASKLINE_IDENTIFIER") {
            self.identifier = Some(v);
        }
        if let Some(v) = lookup("TASKLINE_THREAD_NAME") {
            self.thread_name = v;
        }
        if let Some(v) = lookup("TASKLINE_STACK_SIZE").and_then(|v| v.parse().ok()) {
            self.stack_size = Some(v);
        }
        if let Some(v) = lookup("TASKLINE_DIAGNOSTICS").and_then(|v| parse_bool(&v)) {
            self.diagnostics = v;
        }
    }

    /// Reject configs the worker thread could not be spawned with.
    pub fn validate(&self) -> Result<(), TasklineError> {
        if self.thread_name.trim().is_empty() {
            return Err(TasklineError::Config("thread_name must not be empty".into()));
        }
        if self.thread_name.contains('\0') {
            return Err(TasklineError::Config(
                "thread_name must not contain NUL bytes".into(),
            ));
        }
        if let Some(size) = self.stack_size {
            if size < MIN_STACK_SIZE {
                return Err(TasklineError::Config(format!(
                    "stack_size {size} is below the minimum of {MIN_STACK_SIZE} bytes"
                )));
            }
        }
        if matches!(self.identifier.as_deref(), Some(id) if id.trim().is_empty()) {
            return Err(TasklineError::Config("identifier must not be blank".into()));
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Scheduler config loaded:");
        tracing::info!(
            "  identifier:  {}",
            self.identifier.as_deref().unwrap_or("(generated)")
        );
        tracing::info!("  thread:      {}", self.thread_name);
        tracing::info!(
            "  stack_size:  {}",
            self.stack_size
                .map(|s| s.to_string())
                .unwrap_or_else(|| "(default)".into())
        );
        tracing::info!("  diagnostics: {}", self.diagnostics);
    }

    /// Return a JSON view of the config for status output.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "identifier": self.identifier,
            "thread_name": self.thread_name,
            "stack_size": self.stack_size,
            "diagnostics": self.diagnostics,
        })
    }
}

/// Active profile name, upper-cased (empty = default).
pub fn active_profile() -> String {
    env_or("TASKLINE_PROFILE", "").to_uppercase()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = SchedulerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.thread_name, "taskline-worker");
        assert!(cfg.identifier.is_none());
        assert!(!cfg.diagnostics);
    }

    #[test]
    fn parse_scheduler_table() {
        let toml = r#"
[scheduler]
identifier = "main-queue"
thread_name = "io-worker"
stack_size = 262144
diagnostics = true
"#;
        let cfg = SchedulerConfig::from_toml(toml).unwrap();
        assert_eq!(cfg.identifier.as_deref(), Some("main-queue"));
        assert_eq!(cfg.thread_name, "io-worker");
        assert_eq!(cfg.stack_size, Some(262144));
        assert!(cfg.diagnostics);
    }

    #[test]
    fn parse_bare_table_uses_defaults() {
        let cfg = SchedulerConfig::from_toml("diagnostics = true\n").unwrap();
        assert!(cfg.diagnostics);
        assert_eq!(cfg.thread_name, "taskline-worker");
        assert_eq!(cfg.stack_size, None);
    }

    #[test]
    fn reject_tiny_stack() {
        let err = SchedulerConfig::from_toml("[scheduler]\nstack_size = 1024\n").unwrap_err();
        assert!(matches!(err, TasklineError::Config(_)));
    }

    #[test]
    fn reject_empty_thread_name() {
        let cfg = SchedulerConfig {
            thread_name: "  ".into(),
            ..SchedulerConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = SchedulerConfig::from_toml("[scheduler\nthread_name = ").unwrap_err();
        assert!(matches!(err, TasklineError::ConfigParse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scheduler]\nthread_name = \"from-file\"").unwrap();
        let cfg = SchedulerConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.thread_name, "from-file");
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SchedulerConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, TasklineError::Io(_)));
    }

    #[test]
    fn profiled_overrides_fall_back_to_plain_keys() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PROD_TASKLINE_THREAD_NAME", "prod-worker"),
            ("TASKLINE_THREAD_NAME", "plain-worker"),
            ("TASKLINE_IDENTIFIER", "shared-queue"),
            ("TASKLINE_DIAGNOSTICS", "yes"),
            ("PROD_TASKLINE_STACK_SIZE", "not-a-number"),
            ("TASKLINE_STACK_SIZE", "65536"),
        ]);
        let lookup = |key: &str| vars.get(key).map(|v| v.to_string());

        let mut prod = SchedulerConfig::default();
        prod.apply_overrides(|key| profiled_lookup("PROD", key, lookup));
        assert_eq!(prod.thread_name, "prod-worker");
        assert_eq!(prod.identifier.as_deref(), Some("shared-queue"));
        assert!(prod.diagnostics);
        // A profiled value wins even when it does not parse.
        assert_eq!(prod.stack_size, None);

        let mut plain = SchedulerConfig::default();
        plain.apply_overrides(|key| profiled_lookup("", key, lookup));
        assert_eq!(plain.thread_name, "plain-worker");
        assert_eq!(plain.stack_size, Some(65536));
    }

    #[test]
    fn env_overrides_read_profiled_process_variables() {
        // Only profiled names, so configs loaded by other tests are unaffected.
        std::env::set_var("ENVTEST_TASKLINE_THREAD_NAME", "env-worker");
        std::env::set_var("ENVTEST_TASKLINE_DIAGNOSTICS", "on");
        let mut cfg = SchedulerConfig::default();
        cfg.apply_env_overrides("ENVTEST");
        std::env::remove_var("ENVTEST_TASKLINE_THREAD_NAME");
        std::env::remove_var("ENVTEST_TASKLINE_DIAGNOSTICS");

        assert_eq!(cfg.thread_name, "env-worker");
        assert!(cfg.diagnostics);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn summary_reports_every_field() {
        let cfg = SchedulerConfig {
            identifier: Some("q".into()),
            stack_size: Some(MIN_STACK_SIZE),
            ..SchedulerConfig::default()
        };
        let summary = cfg.summary();
        assert_eq!(summary["identifier"], "q");
        assert_eq!(summary["thread_name"], "taskline-worker");
        assert_eq!(summary["stack_size"], MIN_STACK_SIZE);
        assert_eq!(summary["diagnostics"], false);
    }

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("ON"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
