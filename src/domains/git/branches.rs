use super::repository::{current_branch_of, get_default_branch};
use anyhow::{anyhow, Result};
use git2::{BranchType, Repository};
use std::path::Path;

pub fn branch_exists(repo_path: &Path, branch_name: &str) -> Result<bool> {
    let repo = Repository::open(repo_path)?;

    let found = match repo.find_branch(branch_name, BranchType::Local) {
        Ok(_) => Ok(true),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(false),
        // Treat corrupted branches as non-existent
        Err(e)
            if e.code() == git2::ErrorCode::InvalidSpec
                || e.code() == git2::ErrorCode::GenericError =>
        {
            Ok(false)
        }
        Err(e) => Err(anyhow!("Error checking branch existence: {e}")),
    };
    found
}

pub fn delete_branch(repo_path: &Path, branch_name: &str) -> Result<()> {
    let repo = Repository::open(repo_path)?;

    let mut branch = repo
        .find_branch(branch_name, BranchType::Local)
        .map_err(|e| anyhow!("Failed to delete branch {branch_name}: {e}"))?;

    branch
        .delete()
        .map_err(|e| anyhow!("Failed to delete branch {branch_name}: {e}"))?;

    Ok(())
}

/// True if `branch_name` is HEAD of the main checkout or of any registered
/// worktree whose directory still exists.
pub fn is_branch_checked_out(repo_path: &Path, branch_name: &str) -> Result<bool> {
    let repo = Repository::open(repo_path)?;

    if current_branch_of(&repo).ok().as_deref() == Some(branch_name) {
        return Ok(true);
    }

    let worktrees = repo.worktrees()?;
    for wt_name in worktrees.iter().flatten() {
        let Ok(wt) = repo.find_worktree(wt_name) else {
            continue;
        };
        if !wt.path().exists() {
            continue;
        }
        let Ok(wt_repo) = Repository::open_from_worktree(&wt) else {
            continue;
        };
        if current_branch_of(&wt_repo).ok().as_deref() == Some(branch_name) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Number of commits on `branch_name` that are not reachable from its
/// upstream, or from the project's default branch when no upstream is set.
/// `None` means no comparison point could be resolved.
pub fn unmerged_commit_count(repo_path: &Path, branch_name: &str) -> Result<Option<usize>> {
    let repo = Repository::open(repo_path)?;
    let branch = repo
        .find_branch(branch_name, BranchType::Local)
        .map_err(|e| anyhow!("Failed to find branch {branch_name}: {e}"))?;
    let local_oid = branch
        .get()
        .target()
        .ok_or_else(|| anyhow!("Branch {branch_name} has no target"))?;

    let compare_oid = match branch.upstream() {
        Ok(upstream) => upstream.get().target(),
        Err(_) => {
            let base = get_default_branch(repo_path)?;
            if base == branch_name {
                return Ok(None);
            }
            repo.revparse_single(&base)
                .and_then(|obj| obj.peel_to_commit())
                .map(|c| c.id())
                .ok()
        }
    };

    let Some(compare_oid) = compare_oid else {
        return Ok(None);
    };
    let (ahead, _behind) = repo.graph_ahead_behind(local_oid, compare_oid)?;
    Ok(Some(ahead))
}
