pub mod entity;
pub mod poller;
pub mod registry;
pub mod service;
pub mod state_machine;

#[cfg(test)]
pub(crate) mod test_fakes;

pub use entity::{ProjectState, Session, SessionStatus};
pub use poller::{PollReport, PollerHandle};
pub use service::{Collaborators, SessionManager};
pub use state_machine::{SessionSignal, Transition};
