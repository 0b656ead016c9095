use super::operations::is_internal_tooling_path;
use crate::errors::{OrchestratorError, Result};
use git2::{Repository, Status, StatusOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

const STAGED_FLAGS: Status = Status::INDEX_NEW
    .union(Status::INDEX_MODIFIED)
    .union(Status::INDEX_DELETED)
    .union(Status::INDEX_RENAMED)
    .union(Status::INDEX_TYPECHANGE);

const UNCOMMITTED_FLAGS: Status = Status::WT_NEW
    .union(Status::WT_MODIFIED)
    .union(Status::WT_DELETED)
    .union(Status::WT_RENAMED)
    .union(Status::WT_TYPECHANGE)
    .union(Status::CONFLICTED);

/// Git facet of one worktree, replaced wholesale on every poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeStatus {
    pub staged: Vec<String>,
    pub uncommitted: Vec<String>,
    pub ahead: usize,
    pub behind: usize,
    pub clean: bool,
}

impl WorktreeStatus {
    pub fn staged_count(&self) -> usize {
        self.staged.len()
    }

    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted.len()
    }
}

pub trait StatusReader: Send + Sync {
    fn read_status(&self, worktree_path: &Path) -> Result<WorktreeStatus>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Git2StatusReader;

impl StatusReader for Git2StatusReader {
    fn read_status(&self, worktree_path: &Path) -> Result<WorktreeStatus> {
        read_status(worktree_path)
    }
}

pub fn read_status(worktree_path: &Path) -> Result<WorktreeStatus> {
    if !worktree_path.exists() {
        return Err(OrchestratorError::WorktreeMissing {
            path: worktree_path.to_path_buf(),
        });
    }

    let repo = Repository::open(worktree_path).map_err(|e| {
        // the directory can vanish between the exists() check and the open
        if worktree_path.exists() {
            OrchestratorError::git("open", e)
        } else {
            OrchestratorError::WorktreeMissing {
                path: worktree_path.to_path_buf(),
            }
        }
    })?;

    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false)
        .renames_head_to_index(true);
    let statuses = repo
        .statuses(Some(&mut opts))
        .map_err(|e| OrchestratorError::git("status", e))?;

    let mut staged = Vec::new();
    let mut uncommitted = Vec::new();
    for entry in statuses.iter() {
        let Some(path) = entry.path() else {
            continue;
        };
        if is_internal_tooling_path(path) {
            continue;
        }
        let flags = entry.status();
        if flags.intersects(STAGED_FLAGS) {
            staged.push(path.to_string());
        }
        if flags.intersects(UNCOMMITTED_FLAGS) {
            uncommitted.push(path.to_string());
        }
    }

    let (ahead, behind) = upstream_divergence(&repo).unwrap_or((0, 0));
    let clean = staged.is_empty() && uncommitted.is_empty();

    Ok(WorktreeStatus {
        staged,
        uncommitted,
        ahead,
        behind,
        clean,
    })
}

fn upstream_divergence(repo: &Repository) -> Option<(usize, usize)> {
    let head = repo.head().ok()?;
    if !head.is_branch() {
        return None;
    }
    let local_oid = head.target()?;
    let name = head.shorthand()?;
    let branch = repo.find_branch(name, git2::BranchType::Local).ok()?;
    let upstream = branch.upstream().ok()?;
    let upstream_oid = upstream.get().target()?;
    repo.graph_ahead_behind(local_oid, upstream_oid).ok()
}
