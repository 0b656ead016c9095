use anyhow::Result;
use git2::{Repository, StatusOptions};
use std::path::Path;

pub const INTERNAL_TOOLING_DIR: &str = ".switchyard";

#[inline]
pub(crate) fn is_internal_tooling_path(path: &str) -> bool {
    path == INTERNAL_TOOLING_DIR || path.starts_with(".switchyard/")
}

/// True when the worktree has anything git would report besides our own
/// tooling directory.
pub fn has_uncommitted_changes(worktree_path: &Path) -> Result<bool> {
    let repo = Repository::open(worktree_path)?;
    let mut opts = StatusOptions::new();
    opts.include_untracked(true).recurse_untracked_dirs(true);
    let statuses = repo.statuses(Some(&mut opts))?;

    let first_change = statuses
        .iter()
        .find(|entry| !entry.path().is_some_and(is_internal_tooling_path))
        .map(|entry| entry.path().unwrap_or("<non-utf8 path>").to_string());
    if let Some(path) = &first_change {
        log::debug!(
            "{} is dirty ({} status entries, first: {path})",
            worktree_path.display(),
            statuses.len()
        );
    }
    Ok(first_change.is_some())
}

const MAX_SESSION_NAME_LEN: usize = 100;
const MAX_BRANCH_NAME_LEN: usize = 255;

pub fn is_valid_session_name(name: &str) -> bool {
    let name = name.trim();
    (1..=MAX_SESSION_NAME_LEN).contains(&name.len()) && !name.chars().any(char::is_control)
}

/// Conservative subset of git's ref-name rules: ASCII-safe components
/// separated by single slashes, no `..`, no `.lock` suffix.
pub fn is_valid_branch_name(branch: &str) -> bool {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.');
    let component_ok =
        |part: &str| !part.is_empty() && !part.starts_with('.') && !part.ends_with('.');

    (1..=MAX_BRANCH_NAME_LEN).contains(&branch.len())
        && branch.chars().all(allowed)
        && !branch.contains("..")
        && !branch.ends_with(".lock")
        && branch.split('/').all(component_ok)
}

/// Directory name for a branch's worktree: path separators and anything git
/// would reject in a worktree name collapse to `-`.
pub fn branch_slug(branch: &str) -> String {
    let mut slug = String::with_capacity(branch.len());
    let mut last_dash = false;
    for c in branch.chars() {
        let mapped = if c.is_ascii_alphanumeric() || c == '_' || c == '.' {
            c
        } else {
            '-'
        };
        if mapped == '-' {
            if last_dash {
                continue;
            }
            last_dash = true;
        } else {
            last_dash = false;
        }
        slug.push(mapped);
    }
    slug.trim_matches(|c| c == '-' || c == '.').to_string()
}
