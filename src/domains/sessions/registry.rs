use super::entity::{ProjectState, Session};
use crate::domains::handoff::ownership::{OwnershipToken, SurfaceOwner};
use crate::domains::handoff::WebSession;
use crate::domains::settings::Config;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One live session plus its ownership token. All field updates go through
/// `update`, which holds the per-session lock for the whole commit.
#[derive(Debug)]
pub struct SessionCell {
    id: String,
    session: Mutex<Session>,
    ownership: OwnershipToken,
    removed: AtomicBool,
}

impl SessionCell {
    pub fn new(session: Session, owner: SurfaceOwner) -> Self {
        Self {
            id: session.id.clone(),
            session: Mutex::new(session),
            ownership: OwnershipToken::new(owner),
            removed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn snapshot(&self) -> Session {
        self.session.lock().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&Session) -> R) -> R {
        f(&self.session.lock())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        f(&mut self.session.lock())
    }

    pub fn ownership(&self) -> &OwnershipToken {
        &self.ownership
    }

    pub fn mark_removed(&self, removed: bool) {
        self.removed.store(removed, Ordering::Release);
    }

    /// A poll tick that snapshotted this cell before it was destroyed must
    /// not commit into it.
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }
}

/// In-memory state of one open project.
#[derive(Debug)]
pub struct ProjectRegistry {
    project_path: PathBuf,
    sessions: RwLock<Vec<Arc<SessionCell>>>,
    focused: Mutex<Option<String>>,
    web_sessions: Mutex<Vec<WebSession>>,
    last_poll_at: Mutex<Option<DateTime<Utc>>>,
    /// Serializes create/destroy/handoff bookkeeping for the project.
    pub(crate) op_lock: tokio::sync::Mutex<()>,
    /// Orders snapshot-and-save so an older snapshot never overwrites a newer one.
    pub(crate) save_lock: tokio::sync::Mutex<()>,
}

impl ProjectRegistry {
    pub fn new(project_path: PathBuf) -> Self {
        Self {
            project_path,
            sessions: RwLock::new(Vec::new()),
            focused: Mutex::new(None),
            web_sessions: Mutex::new(Vec::new()),
            last_poll_at: Mutex::new(None),
            op_lock: tokio::sync::Mutex::new(()),
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_state(state: ProjectState) -> Self {
        let registry = Self::new(state.project_path);
        {
            let mut sessions = registry.sessions.write();
            for session in state.sessions {
                let owner = if session.surface_delegated {
                    SurfaceOwner::Web
                } else {
                    SurfaceOwner::Unowned
                };
                sessions.push(Arc::new(SessionCell::new(session, owner)));
            }
        }
        let focus_is_live = state
            .focused_session_id
            .as_deref()
            .is_some_and(|id| registry.find(id).is_some());
        if focus_is_live {
            *registry.focused.lock() = state.focused_session_id;
        }
        *registry.web_sessions.lock() = state.web_sessions;
        *registry.last_poll_at.lock() = state.last_poll_at;
        registry
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    /// Copy-on-read snapshot of the live sessions, in creation order.
    pub fn live_sessions(&self) -> Vec<Arc<SessionCell>> {
        self.sessions.read().clone()
    }

    pub fn find(&self, session_id: &str) -> Option<Arc<SessionCell>> {
        self.sessions
            .read()
            .iter()
            .find(|cell| cell.id() == session_id)
            .cloned()
    }

    pub fn find_by_branch(&self, branch: &str) -> Option<Arc<SessionCell>> {
        self.sessions
            .read()
            .iter()
            .find(|cell| cell.read(|s| s.branch == branch))
            .cloned()
    }

    pub fn find_by_worktree(&self, worktree_path: &Path) -> Option<Arc<SessionCell>> {
        self.sessions
            .read()
            .iter()
            .find(|cell| cell.read(|s| s.worktree_path == worktree_path))
            .cloned()
    }

    pub fn insert(&self, cell: Arc<SessionCell>) {
        cell.mark_removed(false);
        self.sessions.write().push(cell);
    }

    /// Remove a session, clearing focus if it pointed at it. Returns the
    /// former position so a failed destroy can put it back.
    pub fn remove(&self, session_id: &str) -> Option<(usize, Arc<SessionCell>)> {
        let removed = {
            let mut sessions = self.sessions.write();
            let index = sessions.iter().position(|cell| cell.id() == session_id)?;
            let cell = sessions.remove(index);
            cell.mark_removed(true);
            (index, cell)
        };
        let mut focused = self.focused.lock();
        if focused.as_deref() == Some(session_id) {
            *focused = None;
        }
        Some(removed)
    }

    pub fn restore(&self, index: usize, cell: Arc<SessionCell>) {
        cell.mark_removed(false);
        let mut sessions = self.sessions.write();
        let index = index.min(sessions.len());
        sessions.insert(index, cell);
    }

    pub fn focused(&self) -> Option<String> {
        self.focused.lock().clone()
    }

    /// Returns false when `session_id` is not live in this project.
    pub fn set_focus(&self, session_id: Option<&str>) -> bool {
        if let Some(id) = session_id {
            if self.find(id).is_none() {
                return false;
            }
        }
        *self.focused.lock() = session_id.map(str::to_string);
        true
    }

    pub fn web_sessions(&self) -> Vec<WebSession> {
        self.web_sessions.lock().clone()
    }

    pub fn find_web_session(&self, web_session_id: &str) -> Option<WebSession> {
        self.web_sessions
            .lock()
            .iter()
            .find(|w| w.id == web_session_id)
            .cloned()
    }

    pub fn push_web_session(&self, web: WebSession) {
        self.web_sessions.lock().push(web);
    }

    pub fn remove_web_session(&self, web_session_id: &str) -> Option<WebSession> {
        let mut web_sessions = self.web_sessions.lock();
        let index = web_sessions.iter().position(|w| w.id == web_session_id)?;
        Some(web_sessions.remove(index))
    }

    pub fn update_web_session<R>(
        &self,
        web_session_id: &str,
        f: impl FnOnce(&mut WebSession) -> R,
    ) -> Option<R> {
        self.web_sessions
            .lock()
            .iter_mut()
            .find(|w| w.id == web_session_id)
            .map(f)
    }

    pub fn mark_polled(&self, at: DateTime<Utc>) {
        *self.last_poll_at.lock() = Some(at);
    }

    pub fn to_state(&self, config: &Config) -> ProjectState {
        let sessions = self
            .live_sessions()
            .iter()
            .map(|cell| cell.snapshot())
            .collect();
        ProjectState {
            project_path: self.project_path.clone(),
            sessions,
            focused_session_id: self.focused(),
            config: config.clone(),
            last_poll_at: *self.last_poll_at.lock(),
            web_sessions: self.web_sessions(),
        }
    }
}
