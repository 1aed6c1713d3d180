//! Region coordinates for sharded ownership.

use crate::Pose;

/// Power-of-two size of a region edge in blocks (`1 << REGION_SHIFT`).
///
/// 512-block regions: small enough that neighbouring activity lands on
/// different threads, large enough that entities do not migrate every tick.
pub const REGION_SHIFT: u32 = 9;

/// Grid coordinates of a region within one realm.
///
/// Under the region-sharded regime each region is owned by exactly one
/// thread at any instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    /// Region containing the given pose.
    #[must_use]
    pub fn of(pose: Pose) -> Self {
        Self {
            x: (pose.x.floor() as i64 >> REGION_SHIFT) as i32,
            z: (pose.z.floor() as i64 >> REGION_SHIFT) as i32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_of_pose() {
        assert_eq!(RegionPos::of(Pose::at(0.0, 64.0, 0.0)), RegionPos { x: 0, z: 0 });
        assert_eq!(RegionPos::of(Pose::at(511.9, 64.0, 0.0)), RegionPos { x: 0, z: 0 });
        assert_eq!(RegionPos::of(Pose::at(512.0, 64.0, 0.0)), RegionPos { x: 1, z: 0 });
    }

    #[test]
    fn test_negative_coordinates() {
        assert_eq!(
            RegionPos::of(Pose::at(-0.5, 64.0, -600.0)),
            RegionPos { x: -1, z: -2 }
        );
    }
}
