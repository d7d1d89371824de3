use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::fixed_math::{Fix64, FixedVec3};
use crate::hashing::mix_hash;

/// Voxels per scan-cell edge when a config does not choose one.
pub const DEFAULT_SCAN_CELL_SIZE: i32 = 8;

/// Normalized bounds of one grid plus its scan-cell granularity.
///
/// The constructors canonicalize the two corners so `bounds_min` is
/// componentwise `<=` `bounds_max`; the identity hash is derived from the
/// canonicalized bounds and serves as the registry's duplicate-detection key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    pub bounds_min: FixedVec3,
    pub bounds_max: FixedVec3,
    pub center: FixedVec3,
    pub scan_cell_size: i32,
}

impl GridConfig {
    pub fn new(corner_a: FixedVec3, corner_b: FixedVec3) -> Self {
        Self::with_scan_cell_size(corner_a, corner_b, DEFAULT_SCAN_CELL_SIZE)
    }

    pub fn with_scan_cell_size(
        corner_a: FixedVec3,
        corner_b: FixedVec3,
        scan_cell_size: i32,
    ) -> Self {
        let bounds_min = corner_a.min(corner_b);
        let bounds_max = corner_a.max(corner_b);
        let scan_cell_size = if scan_cell_size < 1 {
            warn!(
                scan_cell_size,
                "scan cell size below 1; falling back to default"
            );
            DEFAULT_SCAN_CELL_SIZE
        } else {
            scan_cell_size
        };
        Self {
            bounds_min,
            bounds_max,
            center: (bounds_min + bounds_max) / Fix64::from_num(2),
            scan_cell_size,
        }
    }

    /// Identity hash of the canonicalized bounds. Two configs with the same
    /// bounds and scan-cell size are the same grid as far as the registry is
    /// concerned.
    pub fn hash_value(&self) -> i32 {
        mix_hash(
            self.bounds_min.hash_value(),
            self.bounds_max.hash_value(),
            self.scan_cell_size,
        )
    }

    /// False when the bounds are inverted on any axis. Cannot happen through
    /// the constructors, but configs are plain data and may be assembled
    /// directly.
    pub fn is_valid(&self) -> bool {
        self.bounds_min.all_le(self.bounds_max)
    }

    pub fn size(&self) -> FixedVec3 {
        self.bounds_max - self.bounds_min
    }
}
