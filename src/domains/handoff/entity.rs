use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebSessionOrigin {
    Handoff,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebSessionStatus {
    Active,
    Completed,
    #[default]
    #[serde(other)]
    Unknown,
}

/// A session living on, or originating from, the remote web surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSession {
    pub id: String,
    #[serde(default)]
    pub remote_id: Option<String>,
    pub description: String,
    pub url: String,
    pub origin: WebSessionOrigin,
    #[serde(default)]
    pub origin_branch: Option<String>,
    #[serde(default)]
    pub origin_project: Option<PathBuf>,
    /// Local session handed off, kept after that session is destroyed.
    #[serde(default)]
    pub origin_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: WebSessionStatus,
}

impl WebSession {
    pub fn handoff(
        session_id: &str,
        branch: &str,
        project: PathBuf,
        description: String,
        url: String,
        remote_id: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            remote_id: Some(remote_id),
            description,
            url,
            origin: WebSessionOrigin::Handoff,
            origin_branch: Some(branch.to_string()),
            origin_project: Some(project),
            origin_session_id: Some(session_id.to_string()),
            created_at: Utc::now(),
            status: WebSessionStatus::Active,
        }
    }

    pub fn manual(description: String, url: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            remote_id: None,
            description,
            url,
            origin: WebSessionOrigin::Manual,
            origin_branch: None,
            origin_project: None,
            origin_session_id: None,
            created_at: Utc::now(),
            status: WebSessionStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == WebSessionStatus::Active
    }
}
