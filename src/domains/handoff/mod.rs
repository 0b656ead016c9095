pub mod bridge;
pub mod entity;
pub mod ownership;

pub use entity::{WebSession, WebSessionOrigin, WebSessionStatus};
pub use ownership::{OwnershipToken, SurfaceOwner};
