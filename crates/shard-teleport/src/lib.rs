//! Entity relocation over both scheduling regimes.
//!
//! A [`TeleportRequest`] names a subject, a destination and completion
//! behavior; a [`Teleporter`] dispatches it according to its host's regime,
//! using a [`MoveBackend`] as the native move primitive. Completion is
//! reported through the request's callback exactly once, with the moved
//! entity or the loss sentinel, never as an error.

mod capability;
mod dispatch;
mod request;

pub use capability::{MoveBackend, MoveCapabilities, WorldBackend};
pub use dispatch::{TeleportError, Teleporter};
pub use request::{TeleportCause, TeleportFlags, TeleportRequest};
