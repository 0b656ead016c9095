use crate::errors::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Instant;

const FNV_OFFSET_BASIS: u32 = 0x811c9dc5;
const FNV_PRIME: u32 = 0x0100_0193;
const HASH_SLICE: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceRequest {
    pub session_id: String,
    pub terminal_id: String,
    pub cwd: PathBuf,
}

/// Terminal/process collaborator that hosts a session's agent process.
/// How output is rendered and how "awaiting input" is judged stay behind
/// this seam.
#[async_trait]
pub trait TerminalSurface: Send + Sync {
    async fn attach_surface(&self, request: &SurfaceRequest) -> Result<()>;
    async fn is_awaiting_input(&self, session_id: &str) -> bool;
    async fn process_id(&self, session_id: &str) -> Option<u32>;
    async fn send_directive(&self, session_id: &str, text: &str) -> Result<()>;
    /// Instant of the most recent output or input seen on the surface.
    async fn last_output_at(&self, session_id: &str) -> Option<Instant>;
    async fn terminate(&self, session_id: &str) -> Result<()>;
}

fn sanitize_session_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}

fn fnv1a(input: &str) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in input.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Stable surface reference for a session: readable name prefix plus a short
/// hash of the session id, so sessions sharing a display name stay distinct.
pub fn terminal_id_for_session(name: &str, session_id: &str) -> String {
    let hash_hex = format!("{:08x}", fnv1a(session_id));
    format!(
        "session-{}~{}",
        sanitize_session_name(name),
        &hash_hex[..HASH_SLICE]
    )
}
