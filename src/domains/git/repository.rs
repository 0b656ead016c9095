use anyhow::{anyhow, Result};
use git2::{BranchType, Repository};
use std::path::Path;

const FALLBACK_BASE_BRANCHES: &[&str] = &["main", "master", "trunk", "develop"];

pub fn get_current_branch(repo_path: &Path) -> Result<String> {
    let repo = Repository::open(repo_path)?;
    current_branch_of(&repo)
}

pub(crate) fn current_branch_of(repo: &Repository) -> Result<String> {
    match repo.head() {
        Ok(head) if head.is_branch() => head
            .shorthand()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("HEAD branch name is not valid UTF-8")),
        Ok(_) => Err(anyhow!("HEAD is detached")),
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => unborn_head_branch(repo),
        Err(e) => Err(anyhow!("Failed to read HEAD: {e}")),
    }
}

fn unborn_head_branch(repo: &Repository) -> Result<String> {
    let head = repo.find_reference("HEAD")?;
    let target = head
        .symbolic_target()
        .ok_or_else(|| anyhow!("HEAD is not a symbolic reference"))?;
    target
        .strip_prefix("refs/heads/")
        .map(str::to_string)
        .ok_or_else(|| anyhow!("HEAD symbolic ref is not a branch: {target}"))
}

pub fn repository_has_commits(repo_path: &Path) -> Result<bool> {
    let repo = Repository::open(repo_path)?;
    let has_commits = match repo.head() {
        Ok(head) => head.target().is_some(),
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch => false,
        Err(e) => return Err(anyhow!("Failed to read HEAD: {e}")),
    };
    Ok(has_commits)
}

/// Resolve the branch new session branches are cut from.
///
/// Order: `origin/HEAD`, the project's checked-out branch, a conventional
/// trunk name, then the first local branch.
pub fn get_default_branch(repo_path: &Path) -> Result<String> {
    let repo = Repository::open(repo_path)?;

    if let Ok(origin_head) = repo.find_reference("refs/remotes/origin/HEAD") {
        if let Some(branch) = origin_head
            .symbolic_target()
            .and_then(|t| t.strip_prefix("refs/remotes/origin/"))
        {
            log::debug!("Using default branch from remote: {branch}");
            return Ok(branch.to_string());
        }
    }

    if let Ok(current) = current_branch_of(&repo) {
        if repo.find_branch(&current, BranchType::Local).is_ok() {
            log::debug!("Using current branch as default: {current}");
            return Ok(current);
        }
    }

    for candidate in FALLBACK_BASE_BRANCHES {
        if repo.find_branch(candidate, BranchType::Local).is_ok() {
            return Ok((*candidate).to_string());
        }
    }

    let mut branches = repo.branches(Some(BranchType::Local))?;
    if let Some((branch, _)) = branches.next().transpose()? {
        if let Some(name) = branch.name()? {
            return Ok(name.to_string());
        }
    }

    Err(anyhow!(
        "No branches found in repository: {}",
        repo_path.display()
    ))
}

pub fn get_commit_hash(repo_path: &Path, branch_or_ref: &str) -> Result<String> {
    let repo = Repository::open(repo_path)?;
    let commit = repo
        .revparse_single(branch_or_ref)
        .and_then(|obj| obj.peel_to_commit())
        .map_err(|e| anyhow!("Failed to get commit hash for '{branch_or_ref}': {e}"))?;
    Ok(commit.id().to_string())
}
