use crate::errors::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Per-session sandbox setting. Stored apart from the resolved boolean so a
/// session left on `Global` follows later changes to the global toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxOverride {
    #[default]
    Global,
    Enabled,
    Disabled,
}

impl SandboxOverride {
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxOverride::Global => "global",
            SandboxOverride::Enabled => "enabled",
            SandboxOverride::Disabled => "disabled",
        }
    }
}

impl fmt::Display for SandboxOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SandboxOverride {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" | "" => Ok(SandboxOverride::Global),
            "enabled" | "on" | "true" => Ok(SandboxOverride::Enabled),
            "disabled" | "off" | "false" => Ok(SandboxOverride::Disabled),
            other => Err(OrchestratorError::invalid(
                "sandbox override",
                format!("unknown value '{other}' (expected global, enabled or disabled)"),
            )),
        }
    }
}

pub fn effective_sandbox(global_enabled: bool, override_: Option<SandboxOverride>) -> bool {
    match override_.unwrap_or_default() {
        SandboxOverride::Enabled => true,
        SandboxOverride::Disabled => false,
        SandboxOverride::Global => global_enabled,
    }
}

/// Text sent to the session's process to switch sandboxing.
pub fn sandbox_directive(enabled: bool) -> &'static str {
    if enabled {
        "/sandbox enable\n"
    } else {
        "/sandbox disable\n"
    }
}

/// Sessions whose resolved value changes when the global toggle flips.
pub fn follows_global(override_: Option<SandboxOverride>) -> bool {
    matches!(override_.unwrap_or_default(), SandboxOverride::Global)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_sandbox_is_total() {
        assert!(effective_sandbox(true, Some(SandboxOverride::Global)));
        assert!(!effective_sandbox(false, Some(SandboxOverride::Global)));
        assert!(effective_sandbox(true, None));
        assert!(!effective_sandbox(false, None));
        for global in [true, false] {
            assert!(effective_sandbox(global, Some(SandboxOverride::Enabled)));
            assert!(!effective_sandbox(global, Some(SandboxOverride::Disabled)));
        }
    }

    #[test]
    fn parses_override_words() {
        assert_eq!(
            "Disabled".parse::<SandboxOverride>().unwrap(),
            SandboxOverride::Disabled
        );
        assert_eq!("on".parse::<SandboxOverride>().unwrap(), SandboxOverride::Enabled);
        assert_eq!("".parse::<SandboxOverride>().unwrap(), SandboxOverride::Global);
        assert!("sometimes".parse::<SandboxOverride>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&SandboxOverride::Disabled).unwrap();
        assert_eq!(json, "\"disabled\"");
        let parsed: SandboxOverride = serde_json::from_str("\"global\"").unwrap();
        assert_eq!(parsed, SandboxOverride::Global);
    }

    #[test]
    fn directive_matches_resolution() {
        assert_eq!(sandbox_directive(true), "/sandbox enable\n");
        assert_eq!(sandbox_directive(false), "/sandbox disable\n");
        assert!(follows_global(None));
        assert!(!follows_global(Some(SandboxOverride::Enabled)));
    }
}
