//! The move primitive and its capability probe.
//!
//! Capabilities are resolved once per backend, the same way the regime is
//! resolved once per host. A runtime that cannot confirm basic relocation
//! support is unclassifiable; the dispatcher refuses it outright rather
//! than risking a partial move.

use bitflags::bitflags;
use shard_world::{Entity, EntityKind, Pose, RealmId, SharedWorld, Vec3};
use tracing::debug;

use crate::{TeleportCause, TeleportFlags};

bitflags! {
    /// What the underlying runtime's move primitive can do.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MoveCapabilities: u32 {
        /// Relocation itself is supported.
        const BASIC_MOVE = 1 << 0;
        /// The camera view of player subjects can be reprogrammed.
        const CAMERA_CONTROL = 1 << 1;
        /// The move primitive may be invoked off the owning thread.
        const OFF_THREAD_MOVE = 1 << 2;
    }
}

/// The native relocation primitive.
///
/// `move_entity` returns the moved entity, or `None` when the subject was
/// no longer live. Implementations must be callable from whichever thread
/// owns the subject; only backends advertising
/// [`MoveCapabilities::OFF_THREAD_MOVE`] may be called from detached
/// workers.
pub trait MoveBackend: Send + Sync {
    fn capabilities(&self) -> MoveCapabilities;

    /// The subject's current realm, or `None` if retired.
    fn realm_of(&self, entity: Entity) -> Option<RealmId>;

    /// Whether the subject is player-like, for camera handling.
    fn is_player(&self, entity: Entity) -> bool;

    /// Perform the move.
    fn move_entity(
        &self,
        subject: Entity,
        destination: RealmId,
        pose: Pose,
        velocity: Option<Vec3>,
        cause: Option<TeleportCause>,
        flags: TeleportFlags,
    ) -> Option<Entity>;

    /// Return a player's camera to the self-view. Returns `false` if the
    /// subject is stale or not a player.
    fn reset_camera(&self, entity: Entity) -> bool;
}

/// Move primitive over the in-process entity store.
pub struct WorldBackend {
    world: SharedWorld,
    capabilities: MoveCapabilities,
}

impl WorldBackend {
    /// Full-capability backend over `world`.
    #[must_use]
    pub fn new(world: SharedWorld) -> Self {
        Self::with_capabilities(world, MoveCapabilities::all())
    }

    /// Backend restricted to the given capability set.
    #[must_use]
    pub fn with_capabilities(world: SharedWorld, capabilities: MoveCapabilities) -> Self {
        Self {
            world,
            capabilities,
        }
    }
}

impl MoveBackend for WorldBackend {
    fn capabilities(&self) -> MoveCapabilities {
        self.capabilities
    }

    fn realm_of(&self, entity: Entity) -> Option<RealmId> {
        self.world.read().realm_of(entity)
    }

    fn is_player(&self, entity: Entity) -> bool {
        self.world.read().kind(entity) == Some(EntityKind::Player)
    }

    fn move_entity(
        &self,
        subject: Entity,
        destination: RealmId,
        pose: Pose,
        velocity: Option<Vec3>,
        cause: Option<TeleportCause>,
        flags: TeleportFlags,
    ) -> Option<Entity> {
        let mut world = self.world.write();
        if !world.set_pose(subject, destination, pose) {
            return None;
        }
        match velocity {
            Some(v) => {
                world.set_velocity(subject, v);
            }
            None if !flags.contains(TeleportFlags::RETAIN_VELOCITY) => {
                world.set_velocity(subject, Vec3::ZERO);
            }
            None => {}
        }
        debug!(%subject, %destination, ?cause, "moved");
        Some(subject)
    }

    fn reset_camera(&self, entity: Entity) -> bool {
        self.world.write().reset_camera(entity)
    }
}
