use super::entity::{WebSession, WebSessionOrigin, WebSessionStatus};
use super::ownership::SurfaceOwner;
use crate::domains::sandbox::effective_sandbox;
use crate::domains::sessions::registry::{ProjectRegistry, SessionCell};
use crate::domains::sessions::state_machine::{apply_signal, SessionSignal};
use crate::domains::sessions::{Session, SessionManager};
use crate::domains::settings::SettingsStore;
use crate::errors::{OrchestratorError, Result};
use crate::infrastructure::events::OrchestratorEvent;
use crate::shared::{terminal_id_for_session, PublishRequest, SurfaceRequest};
use std::sync::Arc;

impl SessionManager {
    /// Delegate a locally attached session to the web surface. The local
    /// record stays; only the surface of record moves.
    pub async fn handoff_to_web(&self, session_id: &str) -> Result<WebSession> {
        let (registry, _) = self.find_session(session_id)?;
        let _op = registry.op_lock.lock().await;
        let cell = registry
            .find(session_id)
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))?;

        let session = cell.snapshot();
        if session.terminal_id.is_none() || session.surface_delegated {
            return Err(OrchestratorError::SurfaceNotAttached(session_id.to_string()));
        }

        cell.ownership()
            .transfer(SurfaceOwner::Local, SurfaceOwner::InTransit)
            .map_err(|holder| OrchestratorError::OwnershipHeld {
                session_id: session_id.to_string(),
                holder: holder.to_string(),
            })?;

        let request = PublishRequest {
            session_id: session.id.clone(),
            session_name: session.name.clone(),
            branch: session.branch.clone(),
            project_path: registry.project_path().to_path_buf(),
            description: format!("{} ({})", session.name, session.branch),
        };
        let remote = match self.deps.remote.publish_session(&request).await {
            Ok(remote) => remote,
            Err(e) => {
                log::warn!("Handoff of '{}' failed to publish: {e}", session.name);
                cell.ownership().force(SurfaceOwner::Local);
                return Err(e);
            }
        };

        if !self.local_process_alive(session_id).await {
            return Err(self.interrupt_handoff(&registry, &cell, &remote.remote_id).await);
        }

        let web = WebSession::handoff(
            &session.id,
            &session.branch,
            registry.project_path().to_path_buf(),
            request.description,
            remote.url,
            remote.remote_id.clone(),
        );
        cell.update(|s| s.surface_delegated = true);
        registry.push_web_session(web.clone());

        if let Err(e) = self.save(&registry).await {
            log::error!("Failed to persist handoff of '{}', rolling back: {e}", session.name);
            registry.remove_web_session(&web.id);
            cell.update(|s| s.surface_delegated = false);
            cell.ownership().force(SurfaceOwner::Local);
            self.complete_remote(&remote.remote_id).await;
            return Err(e);
        }

        cell.ownership().force(SurfaceOwner::Web);
        log::info!("Handed off session '{}' to {}", session.name, web.url);
        self.emit(OrchestratorEvent::WebSessionUpdated, &web);
        Ok(web)
    }

    /// Resume local control of a handed-off unit of work. Reuses the live
    /// session on the originating branch, or provisions a new one.
    pub async fn teleport_from_web(&self, web_session_id: &str) -> Result<Session> {
        let (registry, _) = self.find_web_session(web_session_id)?;
        let _op = registry.op_lock.lock().await;
        let web = registry
            .find_web_session(web_session_id)
            .ok_or_else(|| OrchestratorError::WebSessionNotFound(web_session_id.to_string()))?;

        if web.origin == WebSessionOrigin::Manual {
            return Err(OrchestratorError::invalid(
                "web_session_id",
                "manually created web sessions have no local origin to teleport to",
            ));
        }
        if web.status == WebSessionStatus::Completed {
            return Err(OrchestratorError::invalid(
                "web_session_id",
                "web session was already completed",
            ));
        }
        let branch = web.origin_branch.clone().ok_or_else(|| {
            OrchestratorError::invalid("web_session_id", "web session has no originating branch")
        })?;

        let session = match registry.find_by_branch(&branch) {
            Some(cell) => self.reclaim_surface(&registry, &cell).await?,
            None => {
                log::info!("No live session on '{branch}', provisioning one for teleport");
                let config = self.config();
                let created = self
                    .create_session_locked(&registry, &config, &branch, &branch)
                    .await?;
                self.attach_terminal(&created.id).await?
            }
        };

        let completed = registry.update_web_session(web_session_id, |w| {
            w.status = WebSessionStatus::Completed;
            w.clone()
        });
        if let Some(remote_id) = web.remote_id.as_deref() {
            self.complete_remote(remote_id).await;
        }
        self.save(&registry).await?;

        if let Some(completed) = completed {
            self.emit(OrchestratorEvent::WebSessionUpdated, &completed);
        }
        log::info!(
            "Teleported web session {} back to '{}'",
            web_session_id,
            session.name
        );
        Ok(session)
    }

    async fn reclaim_surface(
        &self,
        registry: &ProjectRegistry,
        cell: &SessionCell,
    ) -> Result<Session> {
        let token = cell.ownership();
        let prior = [SurfaceOwner::Web, SurfaceOwner::Unowned]
            .into_iter()
            .find(|from| token.transfer(*from, SurfaceOwner::InTransit).is_ok())
            .ok_or_else(|| OrchestratorError::OwnershipHeld {
                session_id: cell.id().to_string(),
                holder: token.current().to_string(),
            })?;

        let (name, cwd) = cell.read(|s| (s.name.clone(), s.worktree_path.clone()));
        let terminal_id = terminal_id_for_session(&name, cell.id());
        let attached = self
            .deps
            .terminal
            .attach_surface(&SurfaceRequest {
                session_id: cell.id().to_string(),
                terminal_id: terminal_id.clone(),
                cwd,
            })
            .await;
        if let Err(e) = attached {
            token.force(prior);
            return Err(e);
        }

        let global = self.deps.config.global_sandbox_enabled();
        let (session, enabled) = cell.update(|s| {
            s.terminal_id = Some(terminal_id);
            s.surface_delegated = false;
            (s.clone(), effective_sandbox(global, s.sandbox_override))
        });
        token.force(SurfaceOwner::Local);
        self.apply_sandbox(registry, cell, enabled).await;
        Ok(session)
    }

    async fn local_process_alive(&self, session_id: &str) -> bool {
        match self.deps.terminal.process_id(session_id).await {
            Some(pid) => !matches!(
                self.deps.sampler.sample(pid).await,
                Err(OrchestratorError::ProcessGone { .. })
            ),
            None => false,
        }
    }

    /// The local process exited while the token was in transit. Neither
    /// surface keeps it; the caller has to retry from a fresh attach.
    async fn interrupt_handoff(
        &self,
        registry: &Arc<ProjectRegistry>,
        cell: &SessionCell,
        remote_id: &str,
    ) -> OrchestratorError {
        cell.ownership().force(SurfaceOwner::Unowned);
        let (session, transition) = cell.update(|s| {
            let transition = apply_signal(s, SessionSignal::ProcessGone);
            s.terminal_id = None;
            s.process_id = None;
            (s.clone(), transition)
        });
        self.complete_remote(remote_id).await;

        if let Err(e) = self.save(registry).await {
            log::error!("Failed to persist interrupted handoff of '{}': {e}", session.name);
        }
        if let Some(transition) = transition {
            self.emit_transition(&session, transition);
        }
        self.warn_session(
            registry,
            Some(&session.id),
            format!(
                "Handoff of '{}' interrupted: local process exited mid-transfer",
                session.name
            ),
        );
        OrchestratorError::HandoffInterrupted(session.id)
    }

    async fn complete_remote(&self, remote_id: &str) {
        if let Err(e) = self.deps.remote.complete_session(remote_id).await {
            log::warn!("Failed to complete remote session {remote_id}: {e}");
        }
    }
}
