use crate::errors::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const MIN_POLL_INTERVAL_MS: u64 = 250;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_QUIESCENCE_MS: u64 = 5_000;
const DEFAULT_MAX_CONCURRENT_READS: usize = 4;
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;

pub const RECOGNIZED_KEYS: &[&str] = &[
    "worktree_root",
    "branch_prefix",
    "poll_interval_ms",
    "notifications",
    "sandbox",
    "quiescence_ms",
    "max_concurrent_reads",
    "shutdown_grace_ms",
];

fn default_true() -> bool {
    true
}

fn default_worktree_root() -> PathBuf {
    PathBuf::from(".switchyard").join("worktrees")
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_quiescence_ms() -> u64 {
    DEFAULT_QUIESCENCE_MS
}

fn default_max_concurrent_reads() -> usize {
    DEFAULT_MAX_CONCURRENT_READS
}

fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}

/// Process-wide orchestrator configuration. Never edited in place once
/// shared; see `ConfigHandle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_worktree_root")]
    pub worktree_root: PathBuf,
    #[serde(default)]
    pub branch_prefix: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default = "default_true")]
    pub sandbox_enabled: bool,
    #[serde(default = "default_quiescence_ms")]
    pub quiescence_ms: u64,
    #[serde(default = "default_max_concurrent_reads")]
    pub max_concurrent_reads: usize,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worktree_root: default_worktree_root(),
            branch_prefix: String::new(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            notifications_enabled: true,
            sandbox_enabled: true,
            quiescence_ms: DEFAULT_QUIESCENCE_MS,
            max_concurrent_reads: DEFAULT_MAX_CONCURRENT_READS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
        }
    }
}

impl Config {
    /// Build a config from loosely typed key/value pairs. Unknown keys are
    /// skipped with a warning; malformed values for known keys are rejected.
    pub fn from_entries<I, K, V>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Config::default();
        for (key, value) in entries {
            config.apply_entry(key.as_ref(), value.as_ref())?;
        }
        Ok(config)
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        let table: toml::Table = input
            .parse()
            .map_err(|e| OrchestratorError::invalid("config", format!("invalid TOML: {e}")))?;

        let mut entries = Vec::with_capacity(table.len());
        for (key, value) in table {
            let rendered = match value {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Float(f) => f.to_string(),
                other => {
                    if RECOGNIZED_KEYS.contains(&key.as_str()) {
                        return Err(OrchestratorError::invalid(
                            &key,
                            format!("unsupported value type: {}", other.type_str()),
                        ));
                    }
                    log::warn!("Ignoring unrecognized config key '{key}'");
                    continue;
                }
            };
            entries.push((key, rendered));
        }
        Self::from_entries(entries)
    }

    fn apply_entry(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "worktree_root" => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(OrchestratorError::invalid(key, "path cannot be empty"));
                }
                self.worktree_root = PathBuf::from(trimmed);
            }
            "branch_prefix" => {
                self.branch_prefix = value.trim().trim_matches('/').to_string();
            }
            "poll_interval_ms" => self.poll_interval_ms = parse_u64(key, value)?,
            "notifications" => self.notifications_enabled = parse_bool(key, value)?,
            "sandbox" => self.sandbox_enabled = parse_bool(key, value)?,
            "quiescence_ms" => self.quiescence_ms = parse_u64(key, value)?,
            "max_concurrent_reads" => {
                let parsed = parse_u64(key, value)?;
                self.max_concurrent_reads = usize::try_from(parsed)
                    .map_err(|_| OrchestratorError::invalid(key, "value is too large"))?;
            }
            "shutdown_grace_ms" => self.shutdown_grace_ms = parse_u64(key, value)?,
            other => log::warn!("Ignoring unrecognized config key '{other}'"),
        }
        Ok(())
    }

    /// Poll interval with the sub-second floor applied.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    /// Per-read deadline, always strictly shorter than the poll interval.
    pub fn reader_timeout(&self) -> Duration {
        let interval = self.poll_interval();
        interval.mul_f64(0.8).min(interval - Duration::from_millis(1))
    }

    pub fn quiescence_threshold(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }

    pub fn max_concurrent_reads(&self) -> usize {
        self.max_concurrent_reads.max(1)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn resolve_worktree_root(&self, project_path: &Path) -> PathBuf {
        if self.worktree_root.is_absolute() {
            self.worktree_root.clone()
        } else {
            project_path.join(&self.worktree_root)
        }
    }

    /// Branch used for a session when the caller gives none.
    pub fn branch_for_session(&self, slug: &str) -> String {
        if self.branch_prefix.is_empty() {
            slug.to_string()
        } else {
            format!("{}/{slug}", self.branch_prefix)
        }
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| OrchestratorError::invalid(key, format!("expected a non-negative integer, got '{value}'")))
}

pub(crate) fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(OrchestratorError::invalid(
            key,
            format!("expected a boolean, got '{value}'"),
        )),
    }
}
