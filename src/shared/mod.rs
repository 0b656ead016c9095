pub mod remote;
pub mod terminal;

pub use remote::{PublishRequest, RemoteChannel, RemoteSession};
pub use terminal::{terminal_id_for_session, SurfaceRequest, TerminalSurface};
