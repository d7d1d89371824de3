//! Shared fixtures for the integration suites.

use std::sync::Arc;

use goshawk::{FixedVec3, GlobalGridManager, GlobalVoxelIndex, GridAddResult, GridConfig, OccupancyMap, VoxelOccupant};

/// Minimal occupant: a fixed position, a group id, and the standard
/// occupancy bookkeeping.
pub struct TestOccupant {
    position: FixedVec3,
    group: i32,
    pub occupancy: OccupancyMap,
}

impl TestOccupant {
    pub fn at(x: f32, y: f32, z: f32) -> Arc<Self> {
        Self::with_group(x, y, z, 0)
    }

    pub fn with_group(x: f32, y: f32, z: f32, group: i32) -> Arc<Self> {
        Arc::new(Self {
            position: FixedVec3::from_f32(x, y, z),
            group,
            occupancy: OccupancyMap::new(),
        })
    }
}

impl VoxelOccupant for TestOccupant {
    fn position(&self) -> FixedVec3 {
        self.position
    }

    fn group_id(&self) -> i32 {
        self.group
    }

    fn set_occupancy(&self, index: GlobalVoxelIndex, ticket: i32) {
        self.occupancy.set(index, ticket);
    }

    fn remove_occupancy(&self, index: GlobalVoxelIndex) {
        self.occupancy.remove(index);
    }

    fn ticket_for(&self, index: GlobalVoxelIndex) -> Option<i32> {
        self.occupancy.get(index)
    }
}

pub fn manager() -> GlobalGridManager {
    // First caller wins; later binaries and tests reuse the subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let manager = GlobalGridManager::new();
    manager.setup_default();
    manager
}

pub fn grid_config(min: (f32, f32, f32), max: (f32, f32, f32)) -> GridConfig {
    GridConfig::new(
        FixedVec3::from_f32(min.0, min.1, min.2),
        FixedVec3::from_f32(max.0, max.1, max.2),
    )
}

pub fn add_grid(manager: &GlobalGridManager, min: (f32, f32, f32), max: (f32, f32, f32)) -> u16 {
    match manager.try_add_grid(grid_config(min, max)) {
        GridAddResult::Success(slot) => slot,
        other => panic!("expected grid registration to succeed, got {other:?}"),
    }
}
