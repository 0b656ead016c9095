use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification used by callers to decide between retrying,
/// surfacing, or driving a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    TransientIo,
    ResourceGone,
    Conflict,
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid {field}: {message}")]
    InvalidInput { field: String, message: String },
    #[error("worktree directory is not empty: {}", .path.display())]
    WorktreeExists { path: PathBuf },
    #[error("branch '{branch}' is already in use")]
    BranchInUse { branch: String },
    #[error("git {operation} failed: {stderr}")]
    GitCommandFailed { operation: String, stderr: String },
    #[error("worktree has uncommitted changes: {}", .path.display())]
    DirtyWorktree { path: PathBuf },
    #[error("worktree is missing: {}", .path.display())]
    WorktreeMissing { path: PathBuf },
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("web session not found: {0}")]
    WebSessionNotFound(String),
    #[error("session '{0}' has no live local terminal surface")]
    SurfaceNotAttached(String),
    #[error("interactive surface of session '{session_id}' is held by the {holder} surface")]
    OwnershipHeld { session_id: String, holder: String },
    #[error("handoff of session '{0}' was interrupted because the local process exited")]
    HandoffInterrupted(String),
    #[error("process {pid} no longer exists")]
    ProcessGone { pid: u32 },
    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout { operation: String, after: Duration },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl OrchestratorError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        OrchestratorError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn git(operation: &str, error: impl ToString) -> Self {
        OrchestratorError::GitCommandFailed {
            operation: operation.to_string(),
            stderr: error.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::InvalidInput { .. } => ErrorKind::Validation,
            OrchestratorError::SessionNotFound(_) | OrchestratorError::WebSessionNotFound(_) => {
                ErrorKind::NotFound
            }
            OrchestratorError::WorktreeMissing { .. } | OrchestratorError::ProcessGone { .. } => {
                ErrorKind::ResourceGone
            }
            OrchestratorError::WorktreeExists { .. }
            | OrchestratorError::BranchInUse { .. }
            | OrchestratorError::DirtyWorktree { .. }
            | OrchestratorError::SurfaceNotAttached(_)
            | OrchestratorError::OwnershipHeld { .. }
            | OrchestratorError::HandoffInterrupted(_) => ErrorKind::Conflict,
            OrchestratorError::GitCommandFailed { .. }
            | OrchestratorError::Timeout { .. }
            | OrchestratorError::Io(_)
            | OrchestratorError::Persistence(_) => ErrorKind::TransientIo,
        }
    }

    /// Only status reads are retried, and only by the next poll tick.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientIo
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
