use crate::domains::sessions::entity::ProjectState;
use crate::errors::{OrchestratorError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Persistence collaborator. `save_project_state` returning `Ok` is the
/// acknowledgement dependent operations wait for.
#[async_trait]
pub trait StatePersistence: Send + Sync {
    async fn load_project_state(&self, project_path: &Path) -> Result<Option<ProjectState>>;
    async fn save_project_state(&self, state: &ProjectState) -> Result<()>;
}

/// One JSON document per project, named by the SHA-256 of the project path.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    state_dir: PathBuf,
}

impl JsonStateStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    /// `<data_local_dir>/switchyard/state`
    pub fn default_location() -> Self {
        let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join("switchyard").join("state"))
    }

    pub fn state_file(&self, project_path: &Path) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(project_path.to_string_lossy().as_bytes());
        let digest = hasher.finalize();
        self.state_dir.join(format!("{digest:x}.json"))
    }
}

fn persistence_error(context: &str, error: impl std::fmt::Display) -> OrchestratorError {
    OrchestratorError::Persistence(format!("{context}: {error}"))
}

#[async_trait]
impl StatePersistence for JsonStateStore {
    async fn load_project_state(&self, project_path: &Path) -> Result<Option<ProjectState>> {
        let file = self.state_file(project_path);
        tokio::task::spawn_blocking(move || -> Result<Option<ProjectState>> {
            if !file.exists() {
                return Ok(None);
            }
            let contents = fs::read_to_string(&file)
                .map_err(|e| persistence_error(&format!("read {}", file.display()), e))?;
            let state = serde_json::from_str(&contents)
                .map_err(|e| persistence_error(&format!("parse {}", file.display()), e))?;
            Ok(Some(state))
        })
        .await
        .map_err(|e| persistence_error("load task", e))?
    }

    async fn save_project_state(&self, state: &ProjectState) -> Result<()> {
        let file = self.state_file(&state.project_path);
        let dir = self.state_dir.clone();
        let json = serde_json::to_vec_pretty(state).map_err(|e| persistence_error("serialize", e))?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            fs::create_dir_all(&dir)
                .map_err(|e| persistence_error(&format!("create {}", dir.display()), e))?;
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)
                .map_err(|e| persistence_error("create temp file", e))?;
            tmp.write_all(&json)
                .and_then(|_| tmp.as_file().sync_all())
                .map_err(|e| persistence_error("write temp file", e))?;
            tmp.persist(&file)
                .map_err(|e| persistence_error(&format!("replace {}", file.display()), e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| persistence_error("save task", e))?
    }
}

/// In-process store for embedders that persist elsewhere, and for tests.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: DashMap<PathBuf, ProjectState>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, project_path: &Path) -> Option<ProjectState> {
        self.states.get(project_path).map(|s| s.value().clone())
    }

    pub fn insert(&self, state: ProjectState) {
        self.states.insert(state.project_path.clone(), state);
    }
}

#[async_trait]
impl StatePersistence for MemoryStateStore {
    async fn load_project_state(&self, project_path: &Path) -> Result<Option<ProjectState>> {
        Ok(self.get(project_path))
    }

    async fn save_project_state(&self, state: &ProjectState) -> Result<()> {
        self.insert(state.clone());
        Ok(())
    }
}
