use crate::domains::resources::{ResourceSample, ResourceSampler};
use crate::errors::{OrchestratorError, Result};
use crate::shared::{PublishRequest, RemoteChannel, RemoteSession, SurfaceRequest, TerminalSurface};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

#[derive(Default)]
pub struct FakeTerminal {
    attached: Mutex<Vec<SurfaceRequest>>,
    directives: Mutex<HashMap<String, Vec<String>>>,
    terminated: Mutex<Vec<String>>,
    pids: Mutex<HashMap<String, u32>>,
    last_output: Mutex<HashMap<String, Instant>>,
    awaiting: Mutex<HashSet<String>>,
}

impl FakeTerminal {
    pub fn directives(&self, session_id: &str) -> Vec<String> {
        self.directives
            .lock()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn terminated(&self) -> Vec<String> {
        self.terminated.lock().clone()
    }

    pub fn attach_count(&self) -> usize {
        self.attached.lock().len()
    }

    pub fn set_pid(&self, session_id: &str, pid: Option<u32>) {
        let mut pids = self.pids.lock();
        match pid {
            Some(pid) => pids.insert(session_id.to_string(), pid),
            None => pids.remove(session_id),
        };
    }

    pub fn emit_output(&self, session_id: &str, at: Instant) {
        self.last_output.lock().insert(session_id.to_string(), at);
    }

    pub fn set_awaiting(&self, session_id: &str, awaiting: bool) {
        let mut set = self.awaiting.lock();
        if awaiting {
            set.insert(session_id.to_string());
        } else {
            set.remove(session_id);
        }
    }
}

#[async_trait]
impl TerminalSurface for FakeTerminal {
    async fn attach_surface(&self, request: &SurfaceRequest) -> Result<()> {
        self.attached.lock().push(request.clone());
        Ok(())
    }

    async fn is_awaiting_input(&self, session_id: &str) -> bool {
        self.awaiting.lock().contains(session_id)
    }

    async fn process_id(&self, session_id: &str) -> Option<u32> {
        self.pids.lock().get(session_id).copied()
    }

    async fn send_directive(&self, session_id: &str, text: &str) -> Result<()> {
        self.directives
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .push(text.to_string());
        Ok(())
    }

    async fn last_output_at(&self, session_id: &str) -> Option<Instant> {
        self.last_output.lock().get(session_id).copied()
    }

    async fn terminate(&self, session_id: &str) -> Result<()> {
        self.terminated.lock().push(session_id.to_string());
        self.pids.lock().remove(session_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRemote {
    published: AtomicUsize,
    completed: Mutex<Vec<String>>,
    pub fail_publish: AtomicBool,
}

impl FakeRemote {
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().clone()
    }
}

#[async_trait]
impl RemoteChannel for FakeRemote {
    async fn publish_session(&self, request: &PublishRequest) -> Result<RemoteSession> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(OrchestratorError::Io(std::io::Error::other("remote unavailable")));
        }
        let n = self.published.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RemoteSession {
            remote_id: format!("remote-{n}"),
            url: format!("https://web.example.test/{}/{n}", request.branch),
        })
    }

    async fn complete_session(&self, remote_id: &str) -> Result<()> {
        self.completed.lock().push(remote_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSampler {
    samples: Mutex<HashMap<u32, ResourceSample>>,
}

impl FakeSampler {
    pub fn set(&self, pid: u32, cpu_percent: f32, memory_mb: f64) {
        self.samples.lock().insert(
            pid,
            ResourceSample {
                pid,
                cpu_percent,
                memory_mb,
            },
        );
    }

    pub fn kill(&self, pid: u32) {
        self.samples.lock().remove(&pid);
    }
}

#[async_trait]
impl ResourceSampler for FakeSampler {
    async fn sample(&self, pid: u32) -> Result<ResourceSample> {
        self.samples
            .lock()
            .get(&pid)
            .copied()
            .ok_or(OrchestratorError::ProcessGone { pid })
    }
}
