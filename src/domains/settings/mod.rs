pub mod service;
pub mod types;

pub use service::{ConfigHandle, ConfigListener, SettingsStore};
pub use types::*;
