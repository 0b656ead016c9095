pub mod branches;
pub mod operations;
pub mod repository;
pub mod status;
pub mod worktrees;

#[cfg(test)]
pub(crate) mod test_support;

pub use operations::{branch_slug, is_valid_branch_name, is_valid_session_name};
pub use repository::{get_current_branch, get_default_branch};
pub use status::{Git2StatusReader, StatusReader, WorktreeStatus};
pub use worktrees::{WorktreeInfo, WorktreeManager, WorktreeRemoval};
