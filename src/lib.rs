//! Deterministic fixed-point 3D voxel grid management.
//!
//! The crate maintains any number of axis-aligned voxel grids that may
//! adjoin or overlap in world space: a process-wide registry resolves
//! positions to grids through a coarse spatial hash, grids materialize
//! voxels and a scan-cell overlay, and thread-safe facades mutate per-voxel
//! obstacle and occupant state. Line tracers and radius scans enumerate
//! across grid seams. All arithmetic is fixed-point, so results are
//! identical on every platform.
//!
//! Typical flow: [`GlobalGridManager::setup`], register grids via
//! [`GlobalGridManager::try_add_grid`], then mutate and query through the
//! [`obstacle`], [`occupant`], [`tracer`], and [`scan`] modules.

pub mod blocker;
pub mod collections;
pub mod events;
pub mod fixed_math;
pub mod grid;
pub mod manager;
pub mod obstacle;
pub mod occupant;
pub mod scan;
pub mod tracer;

mod hashing;

pub use blocker::Blocker;
pub use events::{ChangeKind, GridChange, ObstacleChange, OccupantChange};
pub use fixed_math::{Fix64, FixedVec2, FixedVec3};
pub use grid::{
    GlobalVoxelIndex, GridConfig, ScanCell, SpatialDirection, Voxel, VoxelGrid, VoxelIndex,
    DEFAULT_SCAN_CELL_SIZE, DIRECTION_OFFSETS, MAX_OBSTACLE_COUNT, MAX_OCCUPANT_COUNT,
};
pub use hashing::mix_hash;
pub use manager::{
    GlobalGridManager, GridAddResult, DEFAULT_SPATIAL_CELL_SIZE, DEFAULT_VOXEL_SIZE, MAX_GRIDS,
};
pub use occupant::{OccupancyMap, VoxelOccupant};
pub use tracer::GridVoxelSet;
