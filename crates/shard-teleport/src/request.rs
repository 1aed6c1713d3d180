//! Relocation requests.

use bitflags::bitflags;
use shard_world::{Entity, Pose, RealmId, Vec3};

/// Why a relocation was requested. Forwarded to the move primitive for
/// logging and downstream policy; never changes dispatch behavior here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeleportCause {
    Plugin,
    Command,
    Portal,
    Spectate,
    Unknown,
}

bitflags! {
    /// Behavior bits forwarded to the move primitive.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct TeleportFlags: u64 {
        /// Keep the subject's velocity through the move.
        const RETAIN_VELOCITY = 1 << 0;
        /// Bring passengers along instead of ejecting them.
        const RETAIN_PASSENGERS = 1 << 1;
        /// Dismount the subject from its vehicle first.
        const DISMOUNT = 1 << 2;
    }
}

/// One relocation request, consumed by a single dispatch call.
///
/// The completion callback receives `Some(entity)` on success and `None`
/// when the subject was lost before the move could happen. It fires exactly
/// once for every accepted request.
pub struct TeleportRequest {
    pub(crate) subject: Entity,
    pub(crate) destination: RealmId,
    pub(crate) pose: Pose,
    pub(crate) velocity: Option<Vec3>,
    pub(crate) cause: Option<TeleportCause>,
    pub(crate) flags: TeleportFlags,
    pub(crate) reset_camera: bool,
    pub(crate) on_complete: Option<Box<dyn FnOnce(Option<Entity>) + Send>>,
}

impl TeleportRequest {
    /// A request to move `subject` to `pose` in `destination`.
    #[must_use]
    pub fn new(subject: Entity, destination: RealmId, pose: Pose) -> Self {
        Self {
            subject,
            destination,
            pose,
            velocity: None,
            cause: None,
            flags: TeleportFlags::empty(),
            reset_camera: false,
            on_complete: None,
        }
    }

    /// Velocity to apply after the move. Without this, velocity is zeroed
    /// unless [`TeleportFlags::RETAIN_VELOCITY`] is set.
    #[must_use]
    pub fn velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = Some(velocity);
        self
    }

    #[must_use]
    pub fn cause(mut self, cause: TeleportCause) -> Self {
        self.cause = Some(cause);
        self
    }

    #[must_use]
    pub fn flags(mut self, flags: TeleportFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Return a player subject's camera to the self-view as part of the
    /// move, before the completion callback observes the result.
    #[must_use]
    pub fn reset_camera(mut self) -> Self {
        self.reset_camera = true;
        self
    }

    /// Completion callback. `None` is the entity-lost outcome, which is not
    /// an error.
    #[must_use]
    pub fn on_complete(mut self, f: impl FnOnce(Option<Entity>) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }
}
