//! Orchestrates concurrent coding-agent sessions, each bound to its own git
//! worktree and terminal process, with a background status poller and a
//! local/web surface handoff.

pub mod domains;
pub mod errors;
pub mod infrastructure;
pub mod shared;

pub use domains::handoff::{SurfaceOwner, WebSession, WebSessionOrigin, WebSessionStatus};
pub use domains::sandbox::SandboxOverride;
pub use domains::sessions::{
    Collaborators, PollReport, PollerHandle, ProjectState, Session, SessionManager, SessionStatus,
};
pub use domains::settings::{Config, ConfigHandle};
pub use errors::{ErrorKind, OrchestratorError, Result};
