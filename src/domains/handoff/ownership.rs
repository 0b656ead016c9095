use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Which surface may currently send input for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SurfaceOwner {
    Unowned = 0,
    Local = 1,
    Web = 2,
    InTransit = 3,
}

impl SurfaceOwner {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SurfaceOwner::Local,
            2 => SurfaceOwner::Web,
            3 => SurfaceOwner::InTransit,
            _ => SurfaceOwner::Unowned,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceOwner::Unowned => "unowned",
            SurfaceOwner::Local => "local",
            SurfaceOwner::Web => "web",
            SurfaceOwner::InTransit => "in-transit",
        }
    }
}

impl fmt::Display for SurfaceOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-writer ownership token. Acquisition is compare-and-swap and never
/// blocks; a failed exchange reports who holds the token.
#[derive(Debug)]
pub struct OwnershipToken(AtomicU8);

impl OwnershipToken {
    pub fn new(owner: SurfaceOwner) -> Self {
        Self(AtomicU8::new(owner as u8))
    }

    pub fn current(&self) -> SurfaceOwner {
        SurfaceOwner::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn transfer(&self, from: SurfaceOwner, to: SurfaceOwner) -> Result<(), SurfaceOwner> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(SurfaceOwner::from_u8)
    }

    pub fn is_held_by(&self, owner: SurfaceOwner) -> bool {
        self.current() == owner
    }

    /// Unconditional store, for rollback and teardown paths only.
    pub fn force(&self, owner: SurfaceOwner) {
        self.0.store(owner as u8, Ordering::Release);
    }
}

impl Default for OwnershipToken {
    fn default() -> Self {
        Self::new(SurfaceOwner::Unowned)
    }
}
