//! Region-obstacle facade.
//!
//! A [`Blocker`] fingerprints an axis-aligned region into an obstacle token
//! and applies that token to every voxel the region covers; removal replays
//! the cached token. Because the obstacle facade rejects duplicate tokens
//! per voxel, re-applying an active blocker is a no-op.

use crate::fixed_math::FixedVec3;
use crate::hashing::mix_hash;
use crate::manager::GlobalGridManager;
use crate::obstacle;
use crate::tracer::get_covered_voxels;

/// An axis-aligned obstacle region spanning any number of grids.
#[derive(Debug)]
pub struct Blocker {
    bounds_min: FixedVec3,
    bounds_max: FixedVec3,
    token: i32,
    applied: bool,
}

impl Blocker {
    /// Build a blocker over `[corner_a, corner_b]` (canonicalized). The
    /// token is a fingerprint of the region, so equal regions share a token.
    pub fn new(corner_a: FixedVec3, corner_b: FixedVec3) -> Self {
        let bounds_min = corner_a.min(corner_b);
        let bounds_max = corner_a.max(corner_b);
        Self {
            bounds_min,
            bounds_max,
            token: mix_hash(7, bounds_min.hash_value(), bounds_max.hash_value()),
            applied: false,
        }
    }

    pub fn bounds_min(&self) -> FixedVec3 {
        self.bounds_min
    }

    pub fn bounds_max(&self) -> FixedVec3 {
        self.bounds_max
    }

    pub fn token(&self) -> i32 {
        self.token
    }

    pub fn is_applied(&self) -> bool {
        self.applied
    }

    /// Apply the blocker's token to every covered voxel. Returns how many
    /// voxels newly accepted it.
    pub fn apply(&mut self, manager: &GlobalGridManager) -> usize {
        let mut blocked = 0;
        for group in get_covered_voxels(manager, self.bounds_min, self.bounds_max) {
            for voxel in &group.voxels {
                if obstacle::try_add_obstacle(&group.grid, voxel, self.token) {
                    blocked += 1;
                }
            }
        }
        self.applied = true;
        blocked
    }

    /// Clear the blocker's token from every covered voxel. Returns how many
    /// voxels released it.
    pub fn remove(&mut self, manager: &GlobalGridManager) -> usize {
        let mut released = 0;
        for group in get_covered_voxels(manager, self.bounds_min, self.bounds_max) {
            for voxel in &group.voxels {
                if obstacle::try_remove_obstacle(&group.grid, voxel, self.token) {
                    released += 1;
                }
            }
        }
        self.applied = false;
        released
    }
}
