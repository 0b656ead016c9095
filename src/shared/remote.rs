use crate::errors::Result;
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub session_id: String,
    pub session_name: String,
    pub branch: String,
    pub project_path: PathBuf,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSession {
    pub remote_id: String,
    pub url: String,
}

/// Channel to the remote web surface. The transport itself is owned elsewhere.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    async fn publish_session(&self, request: &PublishRequest) -> Result<RemoteSession>;
    async fn complete_session(&self, remote_id: &str) -> Result<()>;
}
