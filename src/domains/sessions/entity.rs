use crate::domains::git::WorktreeStatus;
use crate::domains::handoff::WebSession;
use crate::domains::resources::ResourceSample;
use crate::domains::sandbox::SandboxOverride;
use crate::domains::settings::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Waiting,
    Error,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Waiting => "waiting",
            SessionStatus::Error => "error",
        }
    }

    pub fn has_live_process(&self) -> bool {
        matches!(self, SessionStatus::Running | SessionStatus::Waiting)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub worktree_path: PathBuf,
    pub branch: String,
    pub status: SessionStatus,
    #[serde(default)]
    pub terminal_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,

    #[serde(default)]
    pub uncommitted_count: usize,
    #[serde(default)]
    pub staged_count: usize,
    #[serde(default)]
    pub ahead: usize,
    #[serde(default)]
    pub behind: usize,
    #[serde(default = "default_clean")]
    pub clean: bool,

    #[serde(default)]
    pub cpu_percent: f32,
    #[serde(default)]
    pub memory_mb: f64,
    #[serde(default)]
    pub process_id: Option<u32>,

    #[serde(default)]
    pub sandbox_override: Option<SandboxOverride>,
    /// The web surface, not the local terminal, is the surface of record.
    #[serde(default)]
    pub surface_delegated: bool,
    /// Set once the worktree vanished underneath the session; git reads stop.
    #[serde(default)]
    pub git_retired: bool,
    #[serde(default)]
    pub last_warning: Option<String>,
}

fn default_clean() -> bool {
    true
}

impl Session {
    pub fn new(name: &str, branch: &str, worktree_path: PathBuf) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            worktree_path,
            branch: branch.to_string(),
            status: SessionStatus::Idle,
            terminal_id: None,
            created_at: now,
            last_activity_at: now,
            uncommitted_count: 0,
            staged_count: 0,
            ahead: 0,
            behind: 0,
            clean: true,
            cpu_percent: 0.0,
            memory_mb: 0.0,
            process_id: None,
            sandbox_override: None,
            surface_delegated: false,
            git_retired: false,
            last_warning: None,
        }
    }

    pub fn apply_git_status(&mut self, status: &WorktreeStatus) {
        self.uncommitted_count = status.uncommitted_count();
        self.staged_count = status.staged_count();
        self.ahead = status.ahead;
        self.behind = status.behind;
        self.clean = status.clean;
    }

    pub fn apply_resource_sample(&mut self, sample: &ResourceSample) {
        self.process_id = Some(sample.pid);
        self.cpu_percent = sample.cpu_percent;
        self.memory_mb = sample.memory_mb;
    }
}

/// Aggregate of all sessions for one project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub project_path: PathBuf,
    #[serde(default)]
    pub sessions: Vec<Session>,
    #[serde(default)]
    pub focused_session_id: Option<String>,
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub last_poll_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub web_sessions: Vec<WebSession>,
}

impl ProjectState {
    pub fn new(project_path: PathBuf, config: Config) -> Self {
        Self {
            project_path,
            sessions: Vec::new(),
            focused_session_id: None,
            config,
            last_poll_at: None,
            web_sessions: Vec::new(),
        }
    }

    pub fn session(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }
}
