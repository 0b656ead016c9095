use super::entity::{Session, SessionStatus};
use super::registry::{ProjectRegistry, SessionCell};
use super::service::{run_blocking, SessionManager};
use super::state_machine::{apply_signal, derive_signal, Observation, Transition};
use crate::domains::git::WorktreeStatus;
use crate::domains::resources::ResourceSample;
use crate::domains::settings::Config;
use crate::errors::{OrchestratorError, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Outcome of one poll tick.
#[derive(Debug, Clone, Default)]
pub struct PollReport {
    pub polled: usize,
    pub skipped_delegated: usize,
    pub transitions: Vec<(String, Transition)>,
    pub warnings: Vec<(String, String)>,
}

struct PollTarget {
    registry: Arc<ProjectRegistry>,
    cell: Arc<SessionCell>,
    session: Session,
}

struct Reading {
    git: Option<Result<WorktreeStatus>>,
    resources: Option<Result<ResourceSample>>,
    observation: Observation,
    /// Set when the session's reads as a whole overran the deadline.
    stalled: Option<OrchestratorError>,
}

impl Reading {
    fn stalled(after: Duration) -> Self {
        Self {
            git: None,
            resources: None,
            observation: Observation::default(),
            stalled: Some(OrchestratorError::Timeout {
                operation: "session read".to_string(),
                after,
            }),
        }
    }
}

async fn with_deadline<T>(
    operation: &str,
    deadline: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(OrchestratorError::Timeout {
            operation: operation.to_string(),
            after: deadline,
        }),
    }
}

impl SessionManager {
    /// Run one tick across every live, locally owned session.
    pub async fn poll_once(&self) -> PollReport {
        self.sandbox_sync.resync().await;
        let config = self.deps.config.snapshot();
        let mut report = PollReport::default();

        let registries = self.registries();
        let mut targets = Vec::new();
        for registry in &registries {
            for cell in registry.live_sessions() {
                let session = cell.snapshot();
                if session.surface_delegated {
                    report.skipped_delegated += 1;
                    continue;
                }
                targets.push(PollTarget {
                    registry: Arc::clone(registry),
                    cell,
                    session,
                });
            }
        }
        report.polled = targets.len();

        let reads: Vec<_> = targets
            .into_iter()
            .map(|target| {
                let config = Arc::clone(&config);
                async move {
                    // one budget for every read of a session, not one per read
                    let deadline = config.reader_timeout();
                    let reading = tokio::time::timeout(
                        deadline,
                        self.read_session(&target.session, &config),
                    )
                    .await
                    .unwrap_or_else(|_| Reading::stalled(deadline));
                    (target, reading)
                }
            })
            .collect();
        let readings: Vec<(PollTarget, Reading)> = stream::iter(reads)
            .buffer_unordered(config.max_concurrent_reads())
            .collect()
            .await;

        let mut changed: Vec<Arc<ProjectRegistry>> = Vec::new();
        for (target, reading) in readings {
            if self.commit(&target, reading, &config, &mut report)
                && !changed.iter().any(|r| Arc::ptr_eq(r, &target.registry))
            {
                changed.push(Arc::clone(&target.registry));
            }
        }

        let now = Utc::now();
        for registry in &registries {
            registry.mark_polled(now);
        }
        for registry in changed {
            if let Err(e) = self.save(&registry).await {
                log::warn!(
                    "Failed to persist poll results for {}: {e}",
                    registry.project_path().display()
                );
            }
        }

        report
    }

    async fn read_session(&self, session: &Session, config: &Config) -> Reading {
        let deadline = config.reader_timeout();
        let attached = session.terminal_id.is_some();

        let git = if session.git_retired {
            None
        } else {
            let reader = Arc::clone(&self.deps.status_reader);
            let path: PathBuf = session.worktree_path.clone();
            Some(
                with_deadline(
                    "git status",
                    deadline,
                    run_blocking(move || reader.read_status(&path)),
                )
                .await,
            )
        };

        if !attached {
            return Reading {
                git,
                resources: None,
                observation: Observation::default(),
                stalled: None,
            };
        }

        let terminal = &self.deps.terminal;
        let id = session.id.as_str();
        let pid = tokio::time::timeout(deadline, terminal.process_id(id))
            .await
            .unwrap_or_else(|_| {
                log::debug!("process_id lookup timed out for '{id}'");
                None
            });

        let resources = match pid {
            Some(pid) => Some(
                with_deadline("resource sample", deadline, self.deps.sampler.sample(pid)).await,
            ),
            None => None,
        };

        let process_gone = match (&resources, pid) {
            (Some(Err(OrchestratorError::ProcessGone { .. })), _) => true,
            (_, None) => session.status.has_live_process(),
            _ => false,
        };

        let last_output = tokio::time::timeout(deadline, terminal.last_output_at(id))
            .await
            .unwrap_or(None);
        let recent_activity =
            last_output.is_some_and(|at| at.elapsed() <= config.poll_interval());
        let quiet_for = match last_output {
            Some(at) => Some(at.elapsed()),
            None => (Utc::now() - session.last_activity_at).to_std().ok(),
        };
        let awaiting_input = tokio::time::timeout(deadline, terminal.is_awaiting_input(id))
            .await
            .unwrap_or(false);

        Reading {
            git,
            resources,
            observation: Observation {
                process_gone,
                recent_activity,
                quiet_for,
                awaiting_input,
            },
            stalled: None,
        }
    }

    /// Apply one session's reading as a single commit under its lock.
    /// Returns true when the status changed.
    fn commit(
        &self,
        target: &PollTarget,
        reading: Reading,
        config: &Config,
        report: &mut PollReport,
    ) -> bool {
        if target.cell.is_removed() {
            return false;
        }

        let mut warnings: Vec<String> = Vec::new();
        if let Some(e) = &reading.stalled {
            warnings.push(format!("status reads abandoned: {e}"));
        }
        let outcome = target.cell.update(|session| {
            // a handoff may have landed while the reads were in flight
            if session.surface_delegated {
                return None;
            }

            let transition = derive_signal(&reading.observation, config.quiescence_threshold())
                .and_then(|signal| apply_signal(session, signal));

            // error keeps its last-known snapshot until reset
            if session.status != SessionStatus::Error {
                match reading.git {
                    Some(Ok(status)) => session.apply_git_status(&status),
                    Some(Err(OrchestratorError::WorktreeMissing { path })) => {
                        session.git_retired = true;
                        warnings.push(format!(
                            "Worktree {} disappeared; git status no longer tracked",
                            path.display()
                        ));
                    }
                    Some(Err(e)) => warnings.push(format!("git status read failed: {e}")),
                    None => {}
                }
                match reading.resources {
                    Some(Ok(sample)) => session.apply_resource_sample(&sample),
                    Some(Err(OrchestratorError::ProcessGone { .. })) | None => {}
                    Some(Err(e)) => warnings.push(format!("resource sample failed: {e}")),
                }
            }

            if let Some(last) = warnings.last() {
                session.last_warning = Some(last.clone());
            }
            Some((session.clone(), transition))
        });

        let Some((session, transition)) = outcome else {
            return false;
        };

        for warning in warnings {
            self.warn_session(
                &target.registry,
                Some(&session.id),
                format!("Session '{}': {warning}", session.name),
            );
            report.warnings.push((session.id.clone(), warning));
        }

        match transition {
            Some(transition) => {
                self.emit_transition(&session, transition);
                report.transitions.push((session.id.clone(), transition));
                true
            }
            None => false,
        }
    }

    /// Start the background loop. The first tick runs after one interval.
    pub fn start_poller(self: &Arc<Self>) -> PollerHandle {
        let manager = Arc::clone(self);
        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            log::info!("Status poller started");
            loop {
                let interval = manager.config().poll_interval();
                tokio::select! {
                    () = loop_cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
                let report = manager.poll_once().await;
                log::debug!(
                    "Poll tick: {} polled, {} delegated, {} transition(s), {} warning(s)",
                    report.polled,
                    report.skipped_delegated,
                    report.transitions.len(),
                    report.warnings.len()
                );
            }
            log::info!("Status poller stopped");
        });

        PollerHandle {
            cancel,
            task: Some(task),
            grace: self.config().shutdown_grace(),
        }
    }
}

pub struct PollerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    grace: Duration,
}

impl PollerHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Signal the loop and wait up to the grace period for an in-flight tick.
    /// Returns false when the tick had to be abandoned.
    pub async fn stop(mut self) -> bool {
        self.cancel.cancel();
        let Some(mut task) = self.task.take() else {
            return true;
        };
        match tokio::time::timeout(self.grace, &mut task).await {
            Ok(_) => true,
            Err(_) => {
                log::warn!(
                    "Status poller did not stop within {}ms; abandoning in-flight reads",
                    self.grace.as_millis()
                );
                task.abort();
                false
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::git::test_support::TestRepo;
    use crate::domains::git::StatusReader;
    use crate::domains::sessions::service::Collaborators;
    use crate::domains::sessions::test_fakes::{FakeRemote, FakeSampler, FakeTerminal};
    use crate::domains::settings::ConfigHandle;
    use crate::shared::{SurfaceRequest, TerminalSurface};
    use async_trait::async_trait;
    use std::fs;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Instant;

    struct Rig {
        repo: TestRepo,
        manager: Arc<SessionManager>,
        terminal: Arc<FakeTerminal>,
        sampler: Arc<FakeSampler>,
    }

    fn rig_with(config: Config, reader: Option<Arc<dyn StatusReader>>) -> Rig {
        let repo = TestRepo::new();
        let terminal = Arc::new(FakeTerminal::default());
        let sampler = Arc::new(FakeSampler::default());
        let mut deps = Collaborators::new(terminal.clone(), Arc::new(FakeRemote::default()))
            .with_config(Arc::new(ConfigHandle::new(config)))
            .with_sampler(sampler.clone());
        if let Some(reader) = reader {
            deps = deps.with_status_reader(reader);
        }
        Rig {
            repo,
            manager: Arc::new(SessionManager::new(deps)),
            terminal,
            sampler,
        }
    }

    fn rig() -> Rig {
        rig_with(Config::default(), None)
    }

    fn ago(secs: u64) -> Instant {
        Instant::now()
            .checked_sub(Duration::from_secs(secs))
            .unwrap_or_else(Instant::now)
    }

    #[tokio::test]
    async fn activity_then_exit_moves_running_then_error_with_frozen_metrics() {
        let rig = rig();
        let session = rig
            .manager
            .create_session(rig.repo.path(), "feature-x", None)
            .await
            .unwrap();
        rig.manager.attach_terminal(&session.id).await.unwrap();
        rig.terminal.set_pid(&session.id, Some(4242));
        rig.sampler.set(4242, 12.5, 256.0);
        rig.terminal.emit_output(&session.id, Instant::now());

        let report = rig.manager.poll_once().await;
        assert_eq!(report.transitions.len(), 1);
        let (_, cell) = rig.manager.find_session(&session.id).unwrap();
        let running = cell.snapshot();
        assert_eq!(running.status, SessionStatus::Running);
        assert_eq!(running.process_id, Some(4242));

        rig.sampler.kill(4242);
        fs::write(session.worktree_path.join("late.txt"), "x").unwrap();
        rig.manager.poll_once().await;

        let errored = cell.snapshot();
        assert_eq!(errored.status, SessionStatus::Error);
        assert!((errored.cpu_percent - 12.5).abs() < f32::EPSILON);
        assert!((errored.memory_mb - 256.0).abs() < f64::EPSILON);
        assert!(errored.clean, "git snapshot is frozen once in error");

        rig.terminal.emit_output(&session.id, Instant::now());
        rig.manager.poll_once().await;
        assert_eq!(cell.snapshot().status, SessionStatus::Error);
    }

    #[tokio::test]
    async fn quiet_and_awaiting_input_moves_to_waiting_then_back() {
        let rig = rig_with(
            Config {
                quiescence_ms: 1_000,
                ..Config::default()
            },
            None,
        );
        let session = rig
            .manager
            .create_session(rig.repo.path(), "feature-x", None)
            .await
            .unwrap();
        rig.manager.attach_terminal(&session.id).await.unwrap();
        rig.terminal.set_pid(&session.id, Some(7));
        rig.sampler.set(7, 1.0, 10.0);
        rig.terminal.emit_output(&session.id, Instant::now());
        rig.manager.poll_once().await;

        rig.terminal.emit_output(&session.id, ago(30));
        rig.terminal.set_awaiting(&session.id, true);
        rig.manager.poll_once().await;
        let (_, cell) = rig.manager.find_session(&session.id).unwrap();
        assert_eq!(cell.snapshot().status, SessionStatus::Waiting);

        rig.terminal.set_awaiting(&session.id, false);
        rig.terminal.emit_output(&session.id, Instant::now());
        rig.manager.poll_once().await;
        assert_eq!(cell.snapshot().status, SessionStatus::Running);
    }

    #[tokio::test]
    async fn git_counters_follow_worktree() {
        let rig = rig();
        let session = rig
            .manager
            .create_session(rig.repo.path(), "feature-x", None)
            .await
            .unwrap();
        fs::write(session.worktree_path.join("new.txt"), "x").unwrap();

        rig.manager.poll_once().await;
        let (_, cell) = rig.manager.find_session(&session.id).unwrap();
        let polled = cell.snapshot();
        assert_eq!(polled.status, SessionStatus::Idle);
        assert_eq!(polled.uncommitted_count, 1);
        assert!(!polled.clean);
    }

    #[tokio::test]
    async fn missing_worktree_retires_git_facet_without_failing_tick() {
        let rig = rig();
        let doomed = rig
            .manager
            .create_session(rig.repo.path(), "doomed", None)
            .await
            .unwrap();
        let healthy = rig
            .manager
            .create_session(rig.repo.path(), "healthy", None)
            .await
            .unwrap();
        fs::remove_dir_all(&doomed.worktree_path).unwrap();
        fs::write(healthy.worktree_path.join("x.txt"), "x").unwrap();

        let report = rig.manager.poll_once().await;
        assert_eq!(report.polled, 2);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].0, doomed.id);

        let (_, doomed_cell) = rig.manager.find_session(&doomed.id).unwrap();
        assert!(doomed_cell.snapshot().git_retired);
        let (_, healthy_cell) = rig.manager.find_session(&healthy.id).unwrap();
        assert_eq!(healthy_cell.snapshot().uncommitted_count, 1);

        let report = rig.manager.poll_once().await;
        assert!(report.warnings.is_empty(), "retired facet is not read again");
    }

    struct SlowReader;

    impl StatusReader for SlowReader {
        fn read_status(&self, worktree_path: &Path) -> Result<WorktreeStatus> {
            if worktree_path.ends_with("slow") {
                std::thread::sleep(Duration::from_millis(800));
            }
            Ok(WorktreeStatus {
                clean: true,
                ..WorktreeStatus::default()
            })
        }
    }

    #[tokio::test]
    async fn hung_reader_times_out_for_that_session_only() {
        let reader = Arc::new(SlowReader);
        let rig = rig_with(
            Config {
                poll_interval_ms: 250,
                ..Config::default()
            },
            Some(reader),
        );
        let slow = rig
            .manager
            .create_session(rig.repo.path(), "slow", None)
            .await
            .unwrap();
        let fast = rig
            .manager
            .create_session(rig.repo.path(), "fast", None)
            .await
            .unwrap();

        let report = rig.manager.poll_once().await;
        let warned: Vec<&str> = report.warnings.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(warned, vec![slow.id.as_str()]);
        assert!(report.warnings[0].1.contains("timed out"));
        assert!(!warned.contains(&fast.id.as_str()));
    }

    /// Every surface query answers just inside the per-call deadline.
    #[derive(Default)]
    struct SluggishTerminal {
        inner: FakeTerminal,
    }

    const SLUGGISH: Duration = Duration::from_millis(150);

    #[async_trait]
    impl TerminalSurface for SluggishTerminal {
        async fn attach_surface(&self, request: &SurfaceRequest) -> Result<()> {
            self.inner.attach_surface(request).await
        }

        async fn is_awaiting_input(&self, session_id: &str) -> bool {
            tokio::time::sleep(SLUGGISH).await;
            self.inner.is_awaiting_input(session_id).await
        }

        async fn process_id(&self, session_id: &str) -> Option<u32> {
            tokio::time::sleep(SLUGGISH).await;
            self.inner.process_id(session_id).await
        }

        async fn send_directive(&self, session_id: &str, text: &str) -> Result<()> {
            self.inner.send_directive(session_id, text).await
        }

        async fn last_output_at(&self, session_id: &str) -> Option<Instant> {
            tokio::time::sleep(SLUGGISH).await;
            self.inner.last_output_at(session_id).await
        }

        async fn terminate(&self, session_id: &str) -> Result<()> {
            self.inner.terminate(session_id).await
        }
    }

    #[tokio::test]
    async fn session_reads_share_one_deadline() {
        let config = Config {
            poll_interval_ms: 250,
            ..Config::default()
        };
        let budget = config.reader_timeout();
        let repo = TestRepo::new();
        let deps = Collaborators::new(
            Arc::new(SluggishTerminal::default()),
            Arc::new(FakeRemote::default()),
        )
        .with_config(Arc::new(ConfigHandle::new(config)))
        .with_sampler(Arc::new(FakeSampler::default()));
        let manager = SessionManager::new(deps);
        let session = manager
            .create_session(repo.path(), "feature-x", None)
            .await
            .unwrap();
        manager.attach_terminal(&session.id).await.unwrap();

        let started = Instant::now();
        let report = manager.poll_once().await;
        let elapsed = started.elapsed();

        // three sequential queries would need 450ms
        assert!(
            elapsed < budget + Duration::from_millis(150),
            "tick took {elapsed:?}"
        );
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].1.contains("session read timed out"));
        let (_, cell) = manager.find_session(&session.id).unwrap();
        let polled = cell.snapshot();
        assert_eq!(polled.status, SessionStatus::Idle);
        assert!(polled.last_warning.is_some());
    }

    #[tokio::test]
    async fn delegated_sessions_are_skipped() {
        let rig = rig();
        let session = rig
            .manager
            .create_session(rig.repo.path(), "feature-x", None)
            .await
            .unwrap();
        let (_, cell) = rig.manager.find_session(&session.id).unwrap();
        cell.update(|s| s.surface_delegated = true);

        let report = rig.manager.poll_once().await;
        assert_eq!(report.polled, 0);
        assert_eq!(report.skipped_delegated, 1);
    }

    #[tokio::test]
    async fn poller_stops_within_grace() {
        let rig = rig_with(
            Config {
                poll_interval_ms: 250,
                shutdown_grace_ms: 1_000,
                ..Config::default()
            },
            None,
        );
        rig.manager
            .create_session(rig.repo.path(), "feature-x", None)
            .await
            .unwrap();

        let handle = rig.manager.start_poller();
        assert!(handle.is_running());
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(handle.stop().await);

        let state = rig.manager.get_project_state(rig.repo.path()).await.unwrap();
        assert!(state.last_poll_at.is_some());
    }

    struct HangingReader {
        entered: AtomicBool,
    }

    impl StatusReader for HangingReader {
        fn read_status(&self, _worktree_path: &Path) -> Result<WorktreeStatus> {
            self.entered.store(true, Ordering::SeqCst);
            std::thread::sleep(Duration::from_secs(2));
            Ok(WorktreeStatus::default())
        }
    }

    #[tokio::test]
    async fn stop_abandons_tick_that_outlives_grace() {
        let reader = Arc::new(HangingReader {
            entered: AtomicBool::new(false),
        });
        let rig = rig_with(
            Config {
                poll_interval_ms: 1_000,
                shutdown_grace_ms: 100,
                ..Config::default()
            },
            Some(reader.clone()),
        );
        rig.manager
            .create_session(rig.repo.path(), "feature-x", None)
            .await
            .unwrap();

        let handle = rig.manager.start_poller();
        for _ in 0..300 {
            if reader.entered.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(reader.entered.load(Ordering::SeqCst), "tick never started");

        // the in-flight read still has ~800ms on its deadline
        let started = Instant::now();
        assert!(!handle.stop().await);
        assert!(started.elapsed() < Duration::from_millis(500));
    }
}
