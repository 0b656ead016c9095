use crate::errors::{OrchestratorError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// Process-derived metrics for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub pid: u32,
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[async_trait]
pub trait ResourceSampler: Send + Sync {
    /// Fails with `ProcessGone` when `pid` no longer exists.
    async fn sample(&self, pid: u32) -> Result<ResourceSample>;
}

/// Samples CPU and resident memory through `ps`, using `kill(pid, 0)` as the
/// authoritative liveness check.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSampler;

#[async_trait]
impl ResourceSampler for ProcessSampler {
    async fn sample(&self, pid: u32) -> Result<ResourceSample> {
        if !process_alive(pid) {
            return Err(OrchestratorError::ProcessGone { pid });
        }

        let output = Command::new("ps")
            .args(["-o", "pcpu=,rss=", "-p", &pid.to_string()])
            .output()
            .await?;

        // ps exits non-zero when the pid vanished between the liveness check and the query
        if !output.status.success() {
            if !process_alive(pid) {
                return Err(OrchestratorError::ProcessGone { pid });
            }
            return Err(OrchestratorError::Io(std::io::Error::other(format!(
                "ps exited with {} for pid {pid}",
                output.status
            ))));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_ps_line(pid, &stdout).ok_or_else(|| {
            OrchestratorError::Io(std::io::Error::other(format!(
                "unexpected ps output for pid {pid}: {}",
                stdout.trim()
            )))
        })
    }
}

fn parse_ps_line(pid: u32, stdout: &str) -> Option<ResourceSample> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut fields = line.split_whitespace();
    let cpu_percent = fields.next()?.replace(',', ".").parse::<f32>().ok()?;
    let rss_kb = fields.next()?.parse::<u64>().ok()?;
    Some(ResourceSample {
        pid,
        cpu_percent,
        memory_mb: rss_kb as f64 / 1024.0,
    })
}

#[cfg(target_family = "unix")]
pub fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    unsafe {
        if libc::kill(pid, 0) == 0 {
            true
        } else {
            matches!(
                std::io::Error::last_os_error().raw_os_error(),
                Some(libc::EPERM)
            )
        }
    }
}

#[cfg(not(target_family = "unix"))]
pub fn process_alive(_pid: u32) -> bool {
    true
}
