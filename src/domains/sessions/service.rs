use super::entity::{ProjectState, Session, SessionStatus};
use super::registry::{ProjectRegistry, SessionCell};
use super::state_machine::{apply_signal, SessionSignal, Transition};
use crate::domains::git::operations::{
    branch_slug, has_uncommitted_changes, is_valid_branch_name, is_valid_session_name,
};
use crate::domains::git::repository::repository_has_commits;
use crate::domains::git::worktrees::{canonical, list_worktrees, WorktreeManager};
use crate::domains::git::{Git2StatusReader, StatusReader};
use crate::domains::handoff::ownership::SurfaceOwner;
use crate::domains::handoff::WebSession;
use crate::domains::resources::{ProcessSampler, ResourceSampler};
use crate::domains::sandbox::{effective_sandbox, follows_global, sandbox_directive, SandboxOverride};
use crate::domains::settings::{Config, ConfigHandle, SettingsStore};
use crate::errors::{OrchestratorError, Result};
use crate::infrastructure::events::{emit_event, EventEmitter, LogEmitter, OrchestratorEvent};
use crate::infrastructure::persistence::{MemoryStateStore, StatePersistence};
use crate::shared::{terminal_id_for_session, RemoteChannel, SurfaceRequest, TerminalSurface};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

/// Everything the orchestrator talks to, injected at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub config: Arc<ConfigHandle>,
    pub terminal: Arc<dyn TerminalSurface>,
    pub remote: Arc<dyn RemoteChannel>,
    pub status_reader: Arc<dyn StatusReader>,
    pub sampler: Arc<dyn ResourceSampler>,
    pub persistence: Arc<dyn StatePersistence>,
    pub emitter: Arc<dyn EventEmitter>,
}

impl Collaborators {
    /// Git2 status reads, `ps` sampling, in-memory persistence, log events.
    pub fn new(terminal: Arc<dyn TerminalSurface>, remote: Arc<dyn RemoteChannel>) -> Self {
        Self {
            config: Arc::new(ConfigHandle::default()),
            terminal,
            remote,
            status_reader: Arc::new(Git2StatusReader),
            sampler: Arc::new(ProcessSampler),
            persistence: Arc::new(MemoryStateStore::new()),
            emitter: Arc::new(LogEmitter),
        }
    }

    pub fn with_config(mut self, config: Arc<ConfigHandle>) -> Self {
        self.config = config;
        self
    }

    pub fn with_status_reader(mut self, reader: Arc<dyn StatusReader>) -> Self {
        self.status_reader = reader;
        self
    }

    pub fn with_sampler(mut self, sampler: Arc<dyn ResourceSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn StatePersistence>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatusChanged {
    pub session_id: String,
    pub session_name: String,
    pub from: SessionStatus,
    pub to: SessionStatus,
    /// Set for `waiting`/`error` when notifications are enabled.
    pub notify: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionWarning {
    pub project_path: PathBuf,
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionRemoved {
    pub session_id: String,
    pub session_name: String,
    pub branch: String,
    pub branch_deleted: bool,
}

pub struct SessionManager {
    pub(crate) deps: Collaborators,
    pub(crate) worktrees: Arc<WorktreeManager>,
    projects: Arc<DashMap<PathBuf, Arc<ProjectRegistry>>>,
    open_lock: tokio::sync::Mutex<()>,
    pub(crate) sandbox_sync: Arc<SandboxSync>,
}

fn warn_via(
    emitter: &dyn EventEmitter,
    registry: &ProjectRegistry,
    session_id: Option<&str>,
    message: String,
) {
    log::warn!("{message}");
    emit_event(
        emitter,
        OrchestratorEvent::SessionWarning,
        &SessionWarning {
            project_path: registry.project_path().to_path_buf(),
            session_id: session_id.map(str::to_string),
            message,
        },
    );
}

async fn send_sandbox_directive(
    terminal: &dyn TerminalSurface,
    emitter: &dyn EventEmitter,
    registry: &ProjectRegistry,
    cell: &SessionCell,
    enabled: bool,
) -> bool {
    let attached = cell.read(|s| s.terminal_id.is_some() && !s.surface_delegated);
    if !attached || !cell.ownership().is_held_by(SurfaceOwner::Local) {
        log::debug!("Sandbox directive for '{}' deferred: no local surface", cell.id());
        return false;
    }
    match terminal
        .send_directive(cell.id(), sandbox_directive(enabled))
        .await
    {
        Ok(()) => true,
        Err(e) => {
            warn_via(
                emitter,
                registry,
                Some(cell.id()),
                format!("Failed to apply sandbox directive: {e}"),
            );
            false
        }
    }
}

/// Keeps sessions that follow the global sandbox toggle in line with the
/// live config, however the config was replaced.
pub(crate) struct SandboxSync {
    config: Weak<ConfigHandle>,
    terminal: Arc<dyn TerminalSurface>,
    emitter: Arc<dyn EventEmitter>,
    projects: Arc<DashMap<PathBuf, Arc<ProjectRegistry>>>,
    /// Global value last pushed to followers; the lock serializes resyncs.
    applied: tokio::sync::Mutex<bool>,
}

impl SandboxSync {
    /// Push the current global value to followers if it moved since the
    /// last resync. Cheap when nothing changed.
    pub(crate) async fn resync(&self) {
        let Some(config) = self.config.upgrade() else {
            return;
        };
        let mut applied = self.applied.lock().await;
        let enabled = config.snapshot().sandbox_enabled;
        if *applied == enabled {
            return;
        }
        *applied = enabled;
        log::info!("Global sandbox now {enabled}; updating sessions that follow it");

        let registries: Vec<Arc<ProjectRegistry>> = self
            .projects
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for registry in &registries {
            for cell in registry.live_sessions() {
                if cell.read(|s| follows_global(s.sandbox_override)) {
                    send_sandbox_directive(
                        self.terminal.as_ref(),
                        self.emitter.as_ref(),
                        registry,
                        &cell,
                        enabled,
                    )
                    .await;
                }
            }
        }
    }
}

pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        OrchestratorError::Io(std::io::Error::other(format!("blocking task failed: {e}")))
    })?
}

impl SessionManager {
    pub fn new(deps: Collaborators) -> Self {
        let projects = Arc::new(DashMap::new());
        let sandbox_sync = Arc::new(SandboxSync {
            config: Arc::downgrade(&deps.config),
            terminal: Arc::clone(&deps.terminal),
            emitter: Arc::clone(&deps.emitter),
            projects: Arc::clone(&projects),
            applied: tokio::sync::Mutex::new(deps.config.snapshot().sandbox_enabled),
        });

        let emitter = Arc::clone(&deps.emitter);
        let listener_sync = Arc::clone(&sandbox_sync);
        deps.config.on_config_change(Arc::new(move |config| {
            emit_event(emitter.as_ref(), OrchestratorEvent::ConfigChanged, config.as_ref());
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let sync = Arc::clone(&listener_sync);
                    runtime.spawn(async move { sync.resync().await });
                }
                // picked up by the next poll tick
                Err(_) => log::debug!("Config replaced outside a runtime; sandbox resync deferred"),
            }
        }));

        Self {
            deps,
            worktrees: Arc::new(WorktreeManager::new()),
            projects,
            open_lock: tokio::sync::Mutex::new(()),
            sandbox_sync,
        }
    }

    pub fn config(&self) -> Arc<Config> {
        self.deps.config.snapshot()
    }

    pub(crate) fn emit<T: Serialize>(&self, event: OrchestratorEvent, payload: &T) {
        emit_event(self.deps.emitter.as_ref(), event, payload);
    }

    pub(crate) fn warn_session(&self, registry: &ProjectRegistry, session_id: Option<&str>, message: String) {
        warn_via(self.deps.emitter.as_ref(), registry, session_id, message);
    }

    pub(crate) fn emit_transition(&self, session: &Session, transition: Transition) {
        let notify = self.deps.config.snapshot().notifications_enabled
            && matches!(transition.to, SessionStatus::Waiting | SessionStatus::Error);
        self.emit(
            OrchestratorEvent::SessionStatus,
            &SessionStatusChanged {
                session_id: session.id.clone(),
                session_name: session.name.clone(),
                from: transition.from,
                to: transition.to,
                notify,
            },
        );
    }

    pub(crate) fn registries(&self) -> Vec<Arc<ProjectRegistry>> {
        self.projects.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub(crate) fn find_session(
        &self,
        session_id: &str,
    ) -> Result<(Arc<ProjectRegistry>, Arc<SessionCell>)> {
        self.registries()
            .into_iter()
            .find_map(|registry| registry.find(session_id).map(|cell| (registry, cell)))
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))
    }

    pub(crate) fn find_web_session(
        &self,
        web_session_id: &str,
    ) -> Result<(Arc<ProjectRegistry>, WebSession)> {
        self.registries()
            .into_iter()
            .find_map(|registry| {
                registry
                    .find_web_session(web_session_id)
                    .map(|web| (registry, web))
            })
            .ok_or_else(|| OrchestratorError::WebSessionNotFound(web_session_id.to_string()))
    }

    /// Snapshot and persist. Callers must not start a dependent operation
    /// until this returns `Ok`.
    pub(crate) async fn save(&self, registry: &ProjectRegistry) -> Result<()> {
        let _guard = registry.save_lock.lock().await;
        let state = registry.to_state(&self.deps.config.snapshot());
        self.deps.persistence.save_project_state(&state).await
    }

    fn canonical_project(project_path: &Path) -> Result<PathBuf> {
        project_path.canonicalize().map_err(|e| {
            OrchestratorError::invalid(
                "project_path",
                format!("{} is not accessible: {e}", project_path.display()),
            )
        })
    }

    pub(crate) async fn ensure_project(&self, project_path: &Path) -> Result<Arc<ProjectRegistry>> {
        let key = Self::canonical_project(project_path)?;
        if let Some(registry) = self.projects.get(&key) {
            return Ok(Arc::clone(registry.value()));
        }

        let _guard = self.open_lock.lock().await;
        if let Some(registry) = self.projects.get(&key) {
            return Ok(Arc::clone(registry.value()));
        }

        let repo_path = key.clone();
        let has_commits = run_blocking(move || {
            repository_has_commits(&repo_path).map_err(|e| {
                OrchestratorError::invalid(
                    "project_path",
                    format!("{} is not a git repository: {e}", repo_path.display()),
                )
            })
        })
        .await?;
        if !has_commits {
            return Err(OrchestratorError::invalid(
                "project_path",
                "repository has no commits to branch from",
            ));
        }

        let loaded = self.deps.persistence.load_project_state(&key).await?;
        let (registry, needs_save) = match loaded {
            Some(state) => self.reconcile(&key, state).await?,
            None => (Arc::new(ProjectRegistry::new(key.clone())), false),
        };
        self.projects.insert(key.clone(), Arc::clone(&registry));
        log::info!(
            "Opened project {} with {} session(s)",
            key.display(),
            registry.live_sessions().len()
        );

        if needs_save {
            self.save(&registry).await?;
        }
        Ok(registry)
    }

    /// Match persisted sessions against the worktrees git actually knows
    /// about. Sessions without a worktree are retired; worktrees without a
    /// session are only reported.
    async fn reconcile(
        &self,
        key: &Path,
        mut state: ProjectState,
    ) -> Result<(Arc<ProjectRegistry>, bool)> {
        let project = key.to_path_buf();
        let listed = run_blocking(move || {
            list_worktrees(&project).map_err(|e| OrchestratorError::git("worktree list", e))
        })
        .await?;
        let known: HashSet<PathBuf> = listed
            .iter()
            .filter(|w| !w.is_main)
            .map(|w| canonical(&w.path))
            .collect();

        state.project_path = key.to_path_buf();
        let mut retired = Vec::new();
        state.sessions.retain(|session| {
            let present =
                session.worktree_path.exists() && known.contains(&canonical(&session.worktree_path));
            if !present {
                retired.push((session.id.clone(), session.name.clone(), session.worktree_path.clone()));
            }
            present
        });
        for session in &mut state.sessions {
            // terminal surfaces do not survive a restart
            session.terminal_id = None;
            session.process_id = None;
            if session.status.has_live_process() {
                apply_signal(session, SessionSignal::Stopped);
            }
        }

        let worktree_root = canonical(&self.deps.config.snapshot().resolve_worktree_root(key));
        let owned: HashSet<PathBuf> = state
            .sessions
            .iter()
            .map(|s| canonical(&s.worktree_path))
            .collect();
        let orphans: Vec<PathBuf> = known
            .iter()
            .filter(|path| {
                path.starts_with(&worktree_root) && !owned.contains(*path) && path.exists()
            })
            .cloned()
            .collect();

        let registry = Arc::new(ProjectRegistry::from_state(state));
        for (id, name, path) in &retired {
            self.warn_session(
                &registry,
                Some(id),
                format!(
                    "Retired session '{name}': worktree {} no longer exists",
                    path.display()
                ),
            );
        }
        for orphan in &orphans {
            self.warn_session(
                &registry,
                None,
                format!(
                    "Found orphaned worktree with no session: {} (left in place)",
                    orphan.display()
                ),
            );
        }

        Ok((registry, !retired.is_empty()))
    }

    pub async fn open_project(&self, project_path: &Path) -> Result<ProjectState> {
        let registry = self.ensure_project(project_path).await?;
        Ok(registry.to_state(&self.deps.config.snapshot()))
    }

    pub async fn get_project_state(&self, project_path: &Path) -> Result<ProjectState> {
        self.open_project(project_path).await
    }

    pub async fn create_session(
        &self,
        project_path: &Path,
        name: &str,
        branch: Option<&str>,
    ) -> Result<Session> {
        if !is_valid_session_name(name) {
            return Err(OrchestratorError::invalid(
                "name",
                "session name must be 1-100 printable characters",
            ));
        }
        let registry = self.ensure_project(project_path).await?;
        let config = self.deps.config.snapshot();

        let branch = match branch.map(str::trim) {
            Some(branch) if !branch.is_empty() => branch.to_string(),
            Some(_) => {
                return Err(OrchestratorError::invalid("branch", "branch name cannot be empty"))
            }
            None => config.branch_for_session(&branch_slug(name)),
        };
        if !is_valid_branch_name(&branch) {
            return Err(OrchestratorError::invalid(
                "branch",
                format!("'{branch}' is not a valid branch name"),
            ));
        }

        let _op = registry.op_lock.lock().await;
        self.create_session_locked(&registry, &config, name, &branch).await
    }

    /// Provision the worktree and record the session. Caller holds `op_lock`.
    pub(crate) async fn create_session_locked(
        &self,
        registry: &Arc<ProjectRegistry>,
        config: &Config,
        name: &str,
        branch: &str,
    ) -> Result<Session> {
        if registry.find_by_branch(branch).is_some() {
            return Err(OrchestratorError::BranchInUse {
                branch: branch.to_string(),
            });
        }

        let project = registry.project_path().to_path_buf();
        let worktree_root = config.resolve_worktree_root(&project);
        let info = {
            let worktrees = Arc::clone(&self.worktrees);
            let project = project.clone();
            let branch = branch.to_string();
            run_blocking(move || worktrees.create_worktree(&project, &worktree_root, &branch))
                .await?
        };

        let session = Session::new(name, branch, info.path.clone());
        registry.insert(Arc::new(SessionCell::new(session.clone(), SurfaceOwner::Unowned)));

        if let Err(e) = self.save(registry).await {
            log::error!("Failed to persist new session '{name}', rolling back: {e}");
            registry.remove(&session.id);
            let worktrees = Arc::clone(&self.worktrees);
            let path = info.path.clone();
            if let Err(cleanup) =
                run_blocking(move || worktrees.remove_worktree(&project, &path, true)).await
            {
                log::warn!("Rollback could not remove worktree: {cleanup}");
            }
            return Err(e);
        }

        log::info!(
            "Created session '{}' on branch '{branch}' at {}",
            session.name,
            session.worktree_path.display()
        );
        self.emit(OrchestratorEvent::SessionAdded, &session);
        Ok(session)
    }

    /// Remove the session record and its worktree together. The record is
    /// dropped and persisted first; if the worktree then cannot be removed
    /// the record is restored.
    pub async fn destroy_session(&self, session_id: &str, force: bool) -> Result<()> {
        let (registry, _) = self.find_session(session_id)?;
        let _op = registry.op_lock.lock().await;
        let cell = registry
            .find(session_id)
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;
        let session = cell.snapshot();
        let project = registry.project_path().to_path_buf();

        if !force && session.worktree_path.exists() {
            let path = session.worktree_path.clone();
            let dirty = run_blocking(move || {
                has_uncommitted_changes(&path).map_err(|e| OrchestratorError::git("status", e))
            })
            .await?;
            if dirty {
                return Err(OrchestratorError::DirtyWorktree {
                    path: session.worktree_path.clone(),
                });
            }
        }

        let (index, cell) = registry
            .remove(session_id)
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;
        let previous_owner = cell.ownership().current();
        cell.ownership().force(SurfaceOwner::Unowned);

        if let Err(e) = self.save(&registry).await {
            registry.restore(index, cell);
            return Err(e);
        }

        let removal = {
            let worktrees = Arc::clone(&self.worktrees);
            let path = session.worktree_path.clone();
            let project = project.clone();
            run_blocking(move || worktrees.remove_worktree(&project, &path, force)).await
        };
        let branch_deleted = match removal {
            Ok(removal) => removal.branch_deleted,
            Err(OrchestratorError::WorktreeMissing { path }) => {
                log::warn!("Worktree {} was already gone", path.display());
                false
            }
            Err(e) => {
                log::error!("Failed to remove worktree for '{}': {e}", session.name);
                cell.ownership().force(previous_owner);
                registry.restore(index, cell);
                if let Err(save_err) = self.save(&registry).await {
                    log::error!("Failed to persist restored session '{}': {save_err}", session.name);
                }
                return Err(e);
            }
        };

        if session.terminal_id.is_some() {
            if let Err(e) = self.deps.terminal.terminate(session_id).await {
                log::warn!("Failed to terminate process for '{}': {e}", session.name);
            }
        }

        log::info!("Destroyed session '{}'", session.name);
        self.emit(
            OrchestratorEvent::SessionRemoved,
            &SessionRemoved {
                session_id: session.id.clone(),
                session_name: session.name.clone(),
                branch: session.branch.clone(),
                branch_deleted,
            },
        );
        Ok(())
    }

    pub async fn set_sandbox_override(
        &self,
        session_id: &str,
        sandbox_override: SandboxOverride,
    ) -> Result<()> {
        let (registry, cell) = self.find_session(session_id)?;
        let global = self.deps.config.global_sandbox_enabled();
        let enabled = cell.update(|session| {
            session.sandbox_override = Some(sandbox_override);
            effective_sandbox(global, session.sandbox_override)
        });
        self.save(&registry).await?;
        self.apply_sandbox(&registry, &cell, enabled).await;
        Ok(())
    }

    pub fn effective_sandbox_for(&self, session_id: &str) -> Result<bool> {
        let (_, cell) = self.find_session(session_id)?;
        let global = self.deps.config.global_sandbox_enabled();
        Ok(cell.read(|session| effective_sandbox(global, session.sandbox_override)))
    }

    /// Send the sandbox directive to the local process. Deferred (returns
    /// false) while no local surface owns the session.
    pub(crate) async fn apply_sandbox(
        &self,
        registry: &ProjectRegistry,
        cell: &SessionCell,
        enabled: bool,
    ) -> bool {
        send_sandbox_directive(
            self.deps.terminal.as_ref(),
            self.deps.emitter.as_ref(),
            registry,
            cell,
            enabled,
        )
        .await
    }

    pub async fn attach_terminal(&self, session_id: &str) -> Result<Session> {
        let (registry, cell) = self.find_session(session_id)?;
        let holder = cell.ownership().current();
        if matches!(holder, SurfaceOwner::Web | SurfaceOwner::InTransit) {
            return Err(OrchestratorError::OwnershipHeld {
                session_id: session_id.to_string(),
                holder: holder.to_string(),
            });
        }

        let (name, cwd) = cell.read(|s| (s.name.clone(), s.worktree_path.clone()));
        let terminal_id = terminal_id_for_session(&name, session_id);
        self.deps
            .terminal
            .attach_surface(&SurfaceRequest {
                session_id: session_id.to_string(),
                terminal_id: terminal_id.clone(),
                cwd,
            })
            .await?;

        match cell
            .ownership()
            .transfer(SurfaceOwner::Unowned, SurfaceOwner::Local)
        {
            Ok(()) | Err(SurfaceOwner::Local) => {}
            Err(holder) => {
                return Err(OrchestratorError::OwnershipHeld {
                    session_id: session_id.to_string(),
                    holder: holder.to_string(),
                })
            }
        }

        let global = self.deps.config.global_sandbox_enabled();
        let (session, enabled) = cell.update(|s| {
            s.terminal_id = Some(terminal_id);
            s.surface_delegated = false;
            (s.clone(), effective_sandbox(global, s.sandbox_override))
        });
        self.apply_sandbox(&registry, &cell, enabled).await;
        self.save(&registry).await?;
        Ok(session)
    }

    /// The only route for user input to reach the local process.
    pub async fn send_input(&self, session_id: &str, text: &str) -> Result<()> {
        let (_, cell) = self.find_session(session_id)?;
        let holder = cell.ownership().current();
        if holder != SurfaceOwner::Local {
            return Err(OrchestratorError::OwnershipHeld {
                session_id: session_id.to_string(),
                holder: holder.to_string(),
            });
        }
        if cell.read(|s| s.terminal_id.is_none()) {
            return Err(OrchestratorError::SurfaceNotAttached(session_id.to_string()));
        }
        self.deps.terminal.send_directive(session_id, text).await
    }

    pub async fn stop_session(&self, session_id: &str) -> Result<Session> {
        let (registry, cell) = self.find_session(session_id)?;
        if cell.ownership().is_held_by(SurfaceOwner::InTransit) {
            return Err(OrchestratorError::OwnershipHeld {
                session_id: session_id.to_string(),
                holder: SurfaceOwner::InTransit.to_string(),
            });
        }

        if cell.read(|s| s.terminal_id.is_some()) {
            self.deps.terminal.terminate(session_id).await?;
        }

        let (session, transition) = cell.update(|s| {
            let transition = apply_signal(s, SessionSignal::Stopped);
            s.terminal_id = None;
            s.process_id = None;
            s.cpu_percent = 0.0;
            s.memory_mb = 0.0;
            (s.clone(), transition)
        });
        let _ = cell
            .ownership()
            .transfer(SurfaceOwner::Local, SurfaceOwner::Unowned);

        self.save(&registry).await?;
        if let Some(transition) = transition {
            self.emit_transition(&session, transition);
        }
        Ok(session)
    }

    pub async fn reset_session(&self, session_id: &str) -> Result<Session> {
        let (registry, cell) = self.find_session(session_id)?;
        let (session, transition) = cell.update(|s| {
            let transition = apply_signal(s, SessionSignal::Reset);
            if transition.is_some() {
                s.last_warning = None;
                if s.git_retired && s.worktree_path.exists() {
                    s.git_retired = false;
                }
            }
            (s.clone(), transition)
        });

        if let Some(transition) = transition {
            self.save(&registry).await?;
            self.emit_transition(&session, transition);
        }
        Ok(session)
    }

    pub async fn rename_session(&self, session_id: &str, display_name: &str) -> Result<Session> {
        if !is_valid_session_name(display_name) {
            return Err(OrchestratorError::invalid(
                "name",
                "session name must be 1-100 printable characters",
            ));
        }
        let (registry, cell) = self.find_session(session_id)?;
        let session = cell.update(|s| {
            s.name = display_name.trim().to_string();
            s.clone()
        });
        self.save(&registry).await?;
        Ok(session)
    }

    pub async fn focus_session(&self, project_path: &Path, session_id: Option<&str>) -> Result<()> {
        let registry = self.ensure_project(project_path).await?;
        if !registry.set_focus(session_id) {
            return Err(OrchestratorError::SessionNotFound(
                session_id.unwrap_or_default().to_string(),
            ));
        }
        self.save(&registry).await
    }

    /// Swap the whole config. Sessions still following the global sandbox
    /// toggle are re-resolved and re-applied when it flips.
    pub async fn update_config(&self, config: Config) -> Result<()> {
        self.deps.config.replace(config);
        // the change listener also schedules this; whichever runs first does the work
        self.sandbox_sync.resync().await;

        for registry in &self.registries() {
            self.save(registry).await?;
        }
        Ok(())
    }

    pub async fn list_web_sessions(&self, project_path: &Path) -> Result<Vec<WebSession>> {
        let registry = self.ensure_project(project_path).await?;
        Ok(registry.web_sessions())
    }

    pub async fn create_manual_web_session(
        &self,
        project_path: &Path,
        description: &str,
        url: &str,
    ) -> Result<WebSession> {
        let description = description.trim();
        let url = url.trim();
        if description.is_empty() {
            return Err(OrchestratorError::invalid("description", "cannot be empty"));
        }
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(OrchestratorError::invalid(
                "url",
                format!("'{url}' is not an http(s) URL"),
            ));
        }

        let registry = self.ensure_project(project_path).await?;
        let web = WebSession::manual(description.to_string(), url.to_string());
        registry.push_web_session(web.clone());
        if let Err(e) = self.save(&registry).await {
            registry.remove_web_session(&web.id);
            return Err(e);
        }
        self.emit(OrchestratorEvent::WebSessionUpdated, &web);
        Ok(web)
    }
}
