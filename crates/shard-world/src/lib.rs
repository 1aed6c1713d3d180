//! Shard World
//!
//! Entity identity, spatial types and the live entity store shared by the
//! scheduling and relocation layers.
//!
//! Entities use generational indices so that a retired entity's slot can be
//! reused while stale references remain detectable. The store itself is a
//! plain slot table behind a [`parking_lot::RwLock`]; every mutation is a
//! short critical section, which keeps it safe to share between the region
//! threads of a sharded server and the single thread of a cooperative one.

mod entity;
mod pose;
mod region;
mod store;

pub use entity::{Entity, EntityId, EntityKind, Generation};
pub use pose::{Pose, RealmId, Vec3};
pub use region::{REGION_SHIFT, RegionPos};
pub use store::{SharedWorld, World, shared};
