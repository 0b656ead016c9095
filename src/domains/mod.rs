pub mod git;
pub mod handoff;
pub mod resources;
pub mod sandbox;
pub mod sessions;
pub mod settings;
