//! Thread-safe obstacle mutation facade.
//!
//! An obstacle is an opaque integer token applied to a voxel. A voxel holds
//! each token at most once; the per-voxel tracker rejects duplicates and the
//! grid keeps an aggregate count. All mutation runs under the owning grid's
//! mutation lock; change events fire after the lock is released.

use once_cell::sync::Lazy;

use crate::collections::ObserverList;
use crate::events::{ChangeKind, ObstacleChange};
use crate::fixed_math::FixedVec3;
use crate::grid::{Voxel, VoxelGrid, VoxelIndex};

static OBSTACLE_EVENTS: Lazy<ObserverList<ObstacleChange>> = Lazy::new(ObserverList::new);

/// Observer registry for obstacle changes across all grids.
pub fn on_obstacle_change() -> &'static ObserverList<ObstacleChange> {
    &OBSTACLE_EVENTS
}

/// Apply `token` to `voxel`.
///
/// Fails when the voxel cannot take another obstacle (deallocated, at
/// capacity, or occupied) or already holds this token.
pub fn try_add_obstacle(grid: &VoxelGrid, voxel: &Voxel, token: i32) -> bool {
    if !voxel.is_blockable() {
        return false;
    }

    {
        let _guard = grid.mutation_lock();
        if !voxel.try_track_obstacle(token) {
            return false;
        }
        grid.obstacle_count_add(1);
        grid.bump_version();
    }
    voxel.set_cached_grid_version(grid.version());

    let event = ObstacleChange {
        kind: ChangeKind::Add,
        index: voxel.global_index(),
    };
    OBSTACLE_EVENTS.notify(&event);
    voxel.on_obstacle_change().notify(&event);
    true
}

/// Clear `token` from `voxel`.
///
/// Fails when the voxel holds no obstacles or does not hold this token.
pub fn try_remove_obstacle(grid: &VoxelGrid, voxel: &Voxel, token: i32) -> bool {
    if voxel.obstacle_count() == 0 {
        return false;
    }

    {
        let _guard = grid.mutation_lock();
        if !voxel.try_untrack_obstacle(token) {
            return false;
        }
        grid.obstacle_count_add(-1);
        grid.bump_version();
    }
    voxel.set_cached_grid_version(grid.version());

    let event = ObstacleChange {
        kind: ChangeKind::Remove,
        index: voxel.global_index(),
    };
    OBSTACLE_EVENTS.notify(&event);
    voxel.on_obstacle_change().notify(&event);
    true
}

/// Index overload: resolve the voxel inside `grid`, then apply.
pub fn try_add_obstacle_at(grid: &VoxelGrid, index: VoxelIndex, token: i32) -> bool {
    match grid.try_get_voxel(index) {
        Some(voxel) => try_add_obstacle(grid, &voxel, token),
        None => false,
    }
}

/// Position overload: resolve the containing voxel, then apply.
pub fn try_add_obstacle_at_position(grid: &VoxelGrid, position: FixedVec3, token: i32) -> bool {
    match grid.try_get_voxel_at(position) {
        Some(voxel) => try_add_obstacle(grid, &voxel, token),
        None => false,
    }
}

/// Index overload: resolve the voxel inside `grid`, then clear.
pub fn try_remove_obstacle_at(grid: &VoxelGrid, index: VoxelIndex, token: i32) -> bool {
    match grid.try_get_voxel(index) {
        Some(voxel) => try_remove_obstacle(grid, &voxel, token),
        None => false,
    }
}

/// Position overload: resolve the containing voxel, then clear.
pub fn try_remove_obstacle_at_position(grid: &VoxelGrid, position: FixedVec3, token: i32) -> bool {
    match grid.try_get_voxel_at(position) {
        Some(voxel) => try_remove_obstacle(grid, &voxel, token),
        None => false,
    }
}
