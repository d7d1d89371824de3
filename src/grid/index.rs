use serde::{Deserialize, Serialize};

use crate::hashing::mix_hash;

/// Local integer coordinate of a voxel within one grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoxelIndex {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelIndex {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    pub fn hash_value(self) -> i32 {
        mix_hash(self.x, self.y, self.z)
    }
}

impl std::fmt::Display for VoxelIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Globally unique identity of a voxel.
///
/// `grid_token` pins the identity to one lifecycle of the owning grid: after
/// that grid is removed, lookups with the stale index resolve to `None`
/// instead of whatever later reuses the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalVoxelIndex {
    pub grid_index: u16,
    pub local: VoxelIndex,
    pub grid_token: i32,
}

impl GlobalVoxelIndex {
    pub const fn new(grid_index: u16, local: VoxelIndex, grid_token: i32) -> Self {
        Self {
            grid_index,
            local,
            grid_token,
        }
    }
}

impl std::fmt::Display for GlobalVoxelIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "grid {} voxel {}", self.grid_index, self.local)
    }
}
