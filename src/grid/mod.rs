//! Grid-local types: configs, indices, directions, voxels, scan cells, and
//! the [`VoxelGrid`] that owns them.
//!
//! Everything here is local to one grid. Cross-grid concerns (registration,
//! spatial hashing, adjacency discovery) live in [`crate::manager`].

pub mod config;
pub mod direction;
pub mod index;
pub mod partition;
pub mod scan_cell;
pub mod voxel;
pub mod voxel_grid;


pub use config::{GridConfig, DEFAULT_SCAN_CELL_SIZE};
pub use direction::{SpatialDirection, DIRECTION_OFFSETS};
pub use index::{GlobalVoxelIndex, VoxelIndex};
pub use partition::{PartitionProvider, VoxelPartition};
pub use scan_cell::ScanCell;
pub use voxel::{Voxel, MAX_OBSTACLE_COUNT, MAX_OCCUPANT_COUNT};
pub use voxel_grid::VoxelGrid;
