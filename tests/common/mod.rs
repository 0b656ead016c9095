#![allow(dead_code)]

use async_trait::async_trait;
use git2::{IndexAddOption, Repository, RepositoryInitOptions, Signature};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use switchyard::domains::resources::{ResourceSample, ResourceSampler};
use switchyard::infrastructure::events::{EventEmitter, OrchestratorEvent};
use switchyard::shared::{
    PublishRequest, RemoteChannel, RemoteSession, SurfaceRequest, TerminalSurface,
};
use switchyard::{Collaborators, OrchestratorError, Result, SessionManager};
use tempfile::TempDir;

pub struct TestProject {
    _temp_dir: TempDir,
    path: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let temp_dir = TempDir::with_prefix("switchyard-it-").unwrap();
        let path = temp_dir.path().canonicalize().unwrap().join("proj");
        fs::create_dir_all(&path).unwrap();

        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(&path, &opts).unwrap();
        fs::write(path.join("README.md"), "hello").unwrap();

        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Test User", "test@example.com").unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
            .unwrap();

        Self {
            _temp_dir: temp_dir,
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Terminal host double driven by the test: pids, output timestamps and
/// the awaiting-input heuristic are all set by hand.
#[derive(Default)]
pub struct ScriptedTerminal {
    pids: Mutex<HashMap<String, u32>>,
    last_output: Mutex<HashMap<String, Instant>>,
    sent: Mutex<Vec<(String, String)>>,
}

impl ScriptedTerminal {
    pub fn spawn_process(&self, session_id: &str, pid: u32) {
        self.pids.lock().insert(session_id.to_string(), pid);
    }

    pub fn output(&self, session_id: &str) {
        self.last_output
            .lock()
            .insert(session_id.to_string(), Instant::now());
    }

    pub fn sent_to(&self, session_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(id, _)| id == session_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl TerminalSurface for ScriptedTerminal {
    async fn attach_surface(&self, _request: &SurfaceRequest) -> Result<()> {
        Ok(())
    }

    async fn is_awaiting_input(&self, _session_id: &str) -> bool {
        false
    }

    async fn process_id(&self, session_id: &str) -> Option<u32> {
        self.pids.lock().get(session_id).copied()
    }

    async fn send_directive(&self, session_id: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .push((session_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn last_output_at(&self, session_id: &str) -> Option<Instant> {
        self.last_output.lock().get(session_id).copied()
    }

    async fn terminate(&self, session_id: &str) -> Result<()> {
        self.pids.lock().remove(session_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct ScriptedRemote {
    completed: Mutex<Vec<String>>,
}

impl ScriptedRemote {
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().clone()
    }
}

#[async_trait]
impl RemoteChannel for ScriptedRemote {
    async fn publish_session(&self, request: &PublishRequest) -> Result<RemoteSession> {
        Ok(RemoteSession {
            remote_id: format!("remote-{}", request.session_id),
            url: format!("https://web.example.test/s/{}", request.branch),
        })
    }

    async fn complete_session(&self, remote_id: &str) -> Result<()> {
        self.completed.lock().push(remote_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct ScriptedSampler {
    live: Mutex<HashMap<u32, (f32, f64)>>,
}

impl ScriptedSampler {
    pub fn running(&self, pid: u32, cpu_percent: f32, memory_mb: f64) {
        self.live.lock().insert(pid, (cpu_percent, memory_mb));
    }

    pub fn exit(&self, pid: u32) {
        self.live.lock().remove(&pid);
    }
}

#[async_trait]
impl ResourceSampler for ScriptedSampler {
    async fn sample(&self, pid: u32) -> Result<ResourceSample> {
        let (cpu_percent, memory_mb) = self
            .live
            .lock()
            .get(&pid)
            .copied()
            .ok_or(OrchestratorError::ProcessGone { pid })?;
        Ok(ResourceSample {
            pid,
            cpu_percent,
            memory_mb,
        })
    }
}

#[derive(Default)]
pub struct CollectingEmitter {
    events: Mutex<Vec<(OrchestratorEvent, serde_json::Value)>>,
}

impl CollectingEmitter {
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|(e, _)| e.as_str()).collect()
    }
}

impl EventEmitter for CollectingEmitter {
    fn emit(&self, event: OrchestratorEvent, payload: serde_json::Value) -> anyhow::Result<()> {
        self.events.lock().push((event, payload));
        Ok(())
    }
}

pub struct World {
    pub project: TestProject,
    pub manager: Arc<SessionManager>,
    pub terminal: Arc<ScriptedTerminal>,
    pub remote: Arc<ScriptedRemote>,
    pub sampler: Arc<ScriptedSampler>,
    pub emitter: Arc<CollectingEmitter>,
}

pub fn world() -> World {
    let terminal = Arc::new(ScriptedTerminal::default());
    let remote = Arc::new(ScriptedRemote::default());
    let sampler = Arc::new(ScriptedSampler::default());
    let emitter = Arc::new(CollectingEmitter::default());
    let deps = Collaborators::new(terminal.clone(), remote.clone())
        .with_sampler(sampler.clone())
        .with_emitter(emitter.clone());
    World {
        project: TestProject::new(),
        manager: Arc::new(SessionManager::new(deps)),
        terminal,
        remote,
        sampler,
        emitter,
    }
}
