use super::branches::{branch_exists, delete_branch, is_branch_checked_out, unmerged_commit_count};
use super::operations::{branch_slug, has_uncommitted_changes, is_valid_branch_name};
use super::repository::{current_branch_of, get_default_branch};
use crate::errors::{OrchestratorError, Result};
use dashmap::DashMap;
use git2::{BranchType, Repository, WorktreeAddOptions, WorktreePruneOptions};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read-only snapshot of one checkout registered with a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: Option<String>,
    pub head: Option<String>,
    pub is_main: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeRemoval {
    pub branch: Option<String>,
    pub branch_deleted: bool,
}

/// Creates, enumerates and retires worktrees. Mutating operations on the
/// same project are serialized through a per-project lock.
#[derive(Default)]
pub struct WorktreeManager {
    project_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl WorktreeManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn project_lock(&self, project_path: &Path) -> Arc<Mutex<()>> {
        let key = canonical(project_path);
        self.project_locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    pub fn worktree_path_for(worktree_root: &Path, branch_name: &str) -> PathBuf {
        worktree_root.join(branch_slug(branch_name))
    }

    pub fn create_worktree(
        &self,
        project_path: &Path,
        worktree_root: &Path,
        branch_name: &str,
    ) -> Result<WorktreeInfo> {
        if branch_name.trim().is_empty() {
            return Err(OrchestratorError::invalid("branch", "branch name cannot be empty"));
        }
        if !is_valid_branch_name(branch_name) {
            return Err(OrchestratorError::invalid(
                "branch",
                format!("'{branch_name}' is not a valid branch name"),
            ));
        }

        let lock = self.project_lock(project_path);
        let _guard = lock.lock();

        let worktree_path = Self::worktree_path_for(worktree_root, branch_name);
        if worktree_path.exists() {
            let non_empty = fs::read_dir(&worktree_path)?.next().is_some();
            if non_empty {
                return Err(OrchestratorError::WorktreeExists {
                    path: worktree_path,
                });
            }
            // git refuses to add into an existing directory, even an empty one
            fs::remove_dir(&worktree_path)?;
        }

        prune_worktrees(project_path).map_err(|e| OrchestratorError::git("worktree prune", e))?;

        let checked_out = is_branch_checked_out(project_path, branch_name)
            .map_err(|e| OrchestratorError::git("worktree list", e))?;
        if checked_out {
            return Err(OrchestratorError::BranchInUse {
                branch: branch_name.to_string(),
            });
        }

        if let Some(parent) = worktree_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let repo =
            Repository::open(project_path).map_err(|e| OrchestratorError::git("open", e))?;

        let exists = branch_exists(project_path, branch_name)
            .map_err(|e| OrchestratorError::git("branch", e))?;
        let branch = if exists {
            log::info!("Reusing existing branch '{branch_name}' for new worktree");
            repo.find_branch(branch_name, BranchType::Local)
                .map_err(|e| OrchestratorError::git("branch", e))?
        } else {
            let base = get_default_branch(project_path)
                .map_err(|e| OrchestratorError::git("rev-parse", e))?;
            let base_commit = repo
                .revparse_single(&base)
                .and_then(|obj| obj.peel_to_commit())
                .map_err(|e| {
                    OrchestratorError::git(
                        "rev-parse",
                        format!("base branch '{base}' does not resolve to a commit: {e}"),
                    )
                })?;
            log::info!(
                "Creating branch '{branch_name}' from {} ({base})",
                base_commit.id()
            );
            repo.branch(branch_name, &base_commit, false)
                .map_err(|e| OrchestratorError::git("branch", e))?
        };

        let branch_ref = branch.into_reference();
        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(&branch_ref));

        let wt_name = branch_slug(branch_name);
        repo.worktree(&wt_name, &worktree_path, Some(&opts))
            .map_err(|e| OrchestratorError::git("worktree add", e))?;

        let head = branch_ref.target().map(|oid| oid.to_string());
        log::info!(
            "Successfully created worktree for '{branch_name}' at: {}",
            worktree_path.display()
        );

        Ok(WorktreeInfo {
            path: worktree_path,
            branch: Some(branch_name.to_string()),
            head,
            is_main: false,
        })
    }

    /// Remove a worktree checkout. Dirty worktrees are refused unless `force`
    /// is set. The branch is deleted only when it has no commits ahead of its
    /// upstream (or of the default branch when no upstream exists).
    pub fn remove_worktree(
        &self,
        project_path: &Path,
        worktree_path: &Path,
        force: bool,
    ) -> Result<WorktreeRemoval> {
        let lock = self.project_lock(project_path);
        let _guard = lock.lock();

        if !worktree_path.exists() {
            if let Err(e) = prune_worktrees(project_path) {
                log::warn!("Failed to prune stale worktree registrations: {e}");
            }
            return Err(OrchestratorError::WorktreeMissing {
                path: worktree_path.to_path_buf(),
            });
        }

        let branch = Repository::open(worktree_path)
            .ok()
            .and_then(|r| current_branch_of(&r).ok());

        let dirty = has_uncommitted_changes(worktree_path)
            .map_err(|e| OrchestratorError::git("status", e))?;
        if dirty && !force {
            return Err(OrchestratorError::DirtyWorktree {
                path: worktree_path.to_path_buf(),
            });
        }
        if dirty {
            log::warn!(
                "Force removing worktree with uncommitted changes: {}",
                worktree_path.display()
            );
        }

        let repo =
            Repository::open(project_path).map_err(|e| OrchestratorError::git("open", e))?;
        let target = canonical(worktree_path);
        let mut registered = None;
        let worktrees = repo
            .worktrees()
            .map_err(|e| OrchestratorError::git("worktree list", e))?;
        for wt_name in worktrees.iter().flatten() {
            if let Ok(wt) = repo.find_worktree(wt_name) {
                if canonical(wt.path()) == target {
                    registered = Some(wt);
                    break;
                }
            }
        }

        // Removing the directory first makes the registration invalid so prune accepts it
        fs::remove_dir_all(worktree_path)?;
        match registered {
            Some(wt) => {
                if let Err(e) = wt.prune(Some(&mut WorktreePruneOptions::new())) {
                    log::warn!("Failed to prune worktree from git registry: {e}");
                }
            }
            None => log::warn!(
                "Removed directory that was not a registered worktree: {}",
                worktree_path.display()
            ),
        }

        let mut branch_deleted = false;
        if let Some(branch_name) = branch.as_deref() {
            match unmerged_commit_count(project_path, branch_name) {
                Ok(Some(0)) => match delete_branch(project_path, branch_name) {
                    Ok(()) => {
                        log::info!("Pruned fully merged branch '{branch_name}'");
                        branch_deleted = true;
                    }
                    Err(e) => log::warn!("Failed to prune branch '{branch_name}': {e}"),
                },
                Ok(Some(ahead)) => log::info!(
                    "Keeping branch '{branch_name}': {ahead} commit(s) not merged upstream"
                ),
                Ok(None) => log::info!(
                    "Keeping branch '{branch_name}': no upstream or base to compare against"
                ),
                Err(e) => log::warn!("Keeping branch '{branch_name}': {e}"),
            }
        }

        Ok(WorktreeRemoval {
            branch,
            branch_deleted,
        })
    }

    pub fn list_worktrees(&self, project_path: &Path) -> Result<Vec<WorktreeInfo>> {
        list_worktrees(project_path).map_err(|e| OrchestratorError::git("worktree list", e))
    }
}

pub fn list_worktrees(project_path: &Path) -> anyhow::Result<Vec<WorktreeInfo>> {
    let repo = Repository::open(project_path)?;
    let mut infos = Vec::new();

    if let Some(workdir) = repo.workdir() {
        infos.push(WorktreeInfo {
            path: strip_trailing_separator(workdir),
            branch: current_branch_of(&repo).ok(),
            head: repo
                .head()
                .ok()
                .and_then(|h| h.target())
                .map(|o| o.to_string()),
            is_main: true,
        });
    }

    let worktrees = repo.worktrees()?;
    for wt_name in worktrees.iter().flatten() {
        let Ok(wt) = repo.find_worktree(wt_name) else {
            continue;
        };
        let path = strip_trailing_separator(wt.path());
        let (branch, head) = match Repository::open_from_worktree(&wt) {
            Ok(wt_repo) => (
                current_branch_of(&wt_repo).ok(),
                wt_repo
                    .head()
                    .ok()
                    .and_then(|h| h.target())
                    .map(|o| o.to_string()),
            ),
            Err(_) => (None, None),
        };
        infos.push(WorktreeInfo {
            path,
            branch,
            head,
            is_main: false,
        });
    }

    Ok(infos)
}

pub fn prune_worktrees(repo_path: &Path) -> anyhow::Result<()> {
    let repo = Repository::open(repo_path)?;
    let worktrees = repo.worktrees()?;

    for wt_name in worktrees.iter().flatten() {
        if let Ok(wt) = repo.find_worktree(wt_name) {
            if wt.validate().is_err() {
                log::debug!("Pruning stale worktree registration '{wt_name}'");
                wt.prune(Some(&mut WorktreePruneOptions::new()))?;
            }
        }
    }

    Ok(())
}

pub(crate) fn canonical(path: &Path) -> PathBuf {
    path.canonicalize()
        .unwrap_or_else(|_| strip_trailing_separator(path))
}

fn strip_trailing_separator(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    let trimmed = s.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        path.to_path_buf()
    } else {
        PathBuf::from(trimmed)
    }
}
