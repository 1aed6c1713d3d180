//! The live entity store.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::{Entity, EntityId, EntityKind, Generation, Pose, RealmId, Vec3};

/// State of one live entity.
struct Live {
    kind: EntityKind,
    realm: RealmId,
    pose: Pose,
    velocity: Vec3,
    /// `Some(target)` while a player's camera follows another entity.
    /// `None` is the normal self-view. Only meaningful for players.
    camera_target: Option<Entity>,
}

struct Slot {
    generation: Generation,
    live: Option<Live>,
}

/// Slot table of all live entities in the simulation.
///
/// Retirement bumps the slot generation so that stale [`Entity`] references
/// are rejected by every accessor.
#[derive(Default)]
pub struct World {
    slots: Vec<Slot>,
    free_list: Vec<EntityId>,
}

/// The store as shared between context threads.
pub type SharedWorld = Arc<RwLock<World>>;

/// Wrap a store for sharing.
#[must_use]
pub fn shared(world: World) -> SharedWorld {
    Arc::new(RwLock::new(world))
}

impl World {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn an entity into a realm at a pose.
    pub fn spawn(&mut self, kind: EntityKind, realm: RealmId, pose: Pose) -> Entity {
        let live = Live {
            kind,
            realm,
            pose,
            velocity: Vec3::ZERO,
            camera_target: None,
        };
        let entity = if let Some(id) = self.free_list.pop() {
            let slot = &mut self.slots[id as usize];
            slot.live = Some(live);
            Entity::new(id, slot.generation)
        } else {
            let id = self.slots.len() as EntityId;
            self.slots.push(Slot {
                generation: Generation::new(),
                live: Some(live),
            });
            Entity::new(id, Generation::new())
        };
        debug!(%entity, %realm, "spawned");
        entity
    }

    /// Remove an entity from the simulation.
    ///
    /// Returns `true` if the entity was alive. The slot generation is bumped
    /// so existing references to it go stale.
    pub fn retire(&mut self, entity: Entity) -> bool {
        match self.slot_mut(entity) {
            Some(slot) => {
                slot.live = None;
                slot.generation = slot.generation.next();
                self.free_list.push(entity.id());
                debug!(%entity, "retired");
                true
            }
            None => false,
        }
    }

    /// Whether the entity is currently alive.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.live(entity).is_some()
    }

    /// The entity's kind, if alive.
    #[must_use]
    pub fn kind(&self, entity: Entity) -> Option<EntityKind> {
        self.live(entity).map(|l| l.kind)
    }

    /// The entity's realm, if alive.
    #[must_use]
    pub fn realm_of(&self, entity: Entity) -> Option<RealmId> {
        self.live(entity).map(|l| l.realm)
    }

    /// The entity's pose, if alive.
    #[must_use]
    pub fn pose(&self, entity: Entity) -> Option<Pose> {
        self.live(entity).map(|l| l.pose)
    }

    /// The entity's velocity, if alive.
    #[must_use]
    pub fn velocity(&self, entity: Entity) -> Option<Vec3> {
        self.live(entity).map(|l| l.velocity)
    }

    /// Move an entity, possibly across realms. Returns `false` if stale.
    pub fn set_pose(&mut self, entity: Entity, realm: RealmId, pose: Pose) -> bool {
        match self.live_mut(entity) {
            Some(l) => {
                l.realm = realm;
                l.pose = pose;
                true
            }
            None => false,
        }
    }

    /// Set an entity's velocity. Returns `false` if stale.
    pub fn set_velocity(&mut self, entity: Entity, velocity: Vec3) -> bool {
        match self.live_mut(entity) {
            Some(l) => {
                l.velocity = velocity;
                true
            }
            None => false,
        }
    }

    /// A player's camera target (`None` is the normal self-view).
    #[must_use]
    pub fn camera_target(&self, entity: Entity) -> Option<Entity> {
        self.live(entity).and_then(|l| l.camera_target)
    }

    /// Point a player's camera at another entity.
    pub fn set_camera_target(&mut self, entity: Entity, target: Entity) -> bool {
        match self.live_mut(entity) {
            Some(l) if l.kind == EntityKind::Player => {
                l.camera_target = Some(target);
                true
            }
            _ => false,
        }
    }

    /// Return a player's camera to the self-view. Returns `false` if the
    /// entity is stale or not a player.
    pub fn reset_camera(&mut self, entity: Entity) -> bool {
        match self.live_mut(entity) {
            Some(l) if l.kind == EntityKind::Player => {
                l.camera_target = None;
                true
            }
            _ => false,
        }
    }

    fn slot_mut(&mut self, entity: Entity) -> Option<&mut Slot> {
        self.slots
            .get_mut(entity.id() as usize)
            .filter(|s| s.generation == entity.generation() && s.live.is_some())
    }

    fn live(&self, entity: Entity) -> Option<&Live> {
        self.slots
            .get(entity.id() as usize)
            .filter(|s| s.generation == entity.generation())
            .and_then(|s| s.live.as_ref())
    }

    fn live_mut(&mut self, entity: Entity) -> Option<&mut Live> {
        self.slot_mut(entity).and_then(|s| s.live.as_mut())
    }
}
