//! Radius and voxel-granularity occupant queries.
//!
//! Scans prefilter through the active scan cells of the grids covering the
//! query's bounding box, then apply the exact squared-distance check and any
//! occupant or group predicates. Results are owned snapshots.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::fixed_math::{Fix64, FixedVec3};
use crate::grid::GlobalVoxelIndex;
use crate::manager::GlobalGridManager;
use crate::occupant::{self, downcast_occupant, VoxelOccupant};
use crate::tracer::get_covered_scan_cells;

/// Every occupant within `radius` of `center`, after optional occupant and
/// group filters.
///
/// `occupant_predicate` sees each candidate occupant; `group_predicate`
/// sees its group id. Pass `None` to skip a filter. An occupant bound into
/// several voxels is reported once.
pub fn scan_radius(
    manager: &GlobalGridManager,
    center: FixedVec3,
    radius: Fix64,
    occupant_predicate: Option<&dyn Fn(&Arc<dyn VoxelOccupant>) -> bool>,
    group_predicate: Option<&dyn Fn(i32) -> bool>,
) -> Vec<Arc<dyn VoxelOccupant>> {
    let radius_squared = radius * radius;
    let offset = FixedVec3::splat(radius);
    let mut seen: FxHashSet<usize> = FxHashSet::default();
    let mut found: Vec<Arc<dyn VoxelOccupant>> = Vec::new();

    for cell in get_covered_scan_cells(manager, center - offset, center + offset) {
        if !cell.is_occupied() {
            continue;
        }
        let candidates = match group_predicate {
            Some(predicate) => cell.get_conditional_occupants(predicate),
            None => cell.get_occupants(),
        };
        for candidate in candidates {
            if let Some(predicate) = occupant_predicate {
                if !predicate(&candidate) {
                    continue;
                }
            }
            if (candidate.position() - center).length_squared() > radius_squared {
                continue;
            }
            let identity = Arc::as_ptr(&candidate) as *const () as usize;
            if seen.insert(identity) {
                found.push(candidate);
            }
        }
    }
    found
}

/// [`scan_radius`] restricted to occupants of concrete type `T`.
pub fn scan_radius_of<T: VoxelOccupant>(
    manager: &GlobalGridManager,
    center: FixedVec3,
    radius: Fix64,
) -> Vec<Arc<T>> {
    scan_radius(manager, center, radius, None, None)
        .into_iter()
        .filter_map(downcast_occupant::<T>)
        .collect()
}

/// All occupants bound to one voxel.
pub fn get_voxel_occupants(
    manager: &GlobalGridManager,
    index: GlobalVoxelIndex,
) -> Vec<Arc<dyn VoxelOccupant>> {
    let Some((grid, voxel)) = resolve(manager, index) else {
        return Vec::new();
    };
    match grid.try_get_scan_cell(voxel.scan_cell_key()) {
        Some(cell) => cell.get_occupants_for(index),
        None => Vec::new(),
    }
}

/// Occupants of concrete type `T` bound to one voxel.
pub fn get_voxel_occupants_by_type<T: VoxelOccupant>(
    manager: &GlobalGridManager,
    index: GlobalVoxelIndex,
) -> Vec<Arc<T>> {
    get_voxel_occupants(manager, index)
        .into_iter()
        .filter_map(downcast_occupant::<T>)
        .collect()
}

/// Occupants bound to one voxel whose group id passes `group_predicate`.
pub fn get_conditional_occupants(
    manager: &GlobalGridManager,
    index: GlobalVoxelIndex,
    group_predicate: impl Fn(i32) -> bool,
) -> Vec<Arc<dyn VoxelOccupant>> {
    get_voxel_occupants(manager, index)
        .into_iter()
        .filter(|occupant| group_predicate(occupant.group_id()))
        .collect()
}

/// Resolve one occupant on a voxel by its ticket.
pub fn try_get_voxel_occupant(
    manager: &GlobalGridManager,
    index: GlobalVoxelIndex,
    ticket: i32,
) -> Option<Arc<dyn VoxelOccupant>> {
    let (grid, voxel) = resolve(manager, index)?;
    grid.try_get_scan_cell(voxel.scan_cell_key())?
        .try_get_occupant_at(index, ticket)
}

/// Bind `occupant` into the voxel containing its own reported position.
pub fn try_register(manager: &GlobalGridManager, occupant: &Arc<dyn VoxelOccupant>) -> bool {
    let Some((grid, voxel)) = manager.try_get_grid_and_voxel(occupant.position()) else {
        return false;
    };
    occupant::try_add_voxel_occupant(&grid, &voxel, occupant)
}

/// Release `occupant` from the voxel containing its own reported position.
pub fn try_deregister(manager: &GlobalGridManager, occupant: &Arc<dyn VoxelOccupant>) -> bool {
    let Some((grid, voxel)) = manager.try_get_grid_and_voxel(occupant.position()) else {
        return false;
    };
    occupant::try_remove_voxel_occupant(&grid, &voxel, occupant)
}

fn resolve(
    manager: &GlobalGridManager,
    index: GlobalVoxelIndex,
) -> Option<(Arc<crate::grid::VoxelGrid>, Arc<crate::grid::Voxel>)> {
    let grid = manager.try_get_grid_global(index)?;
    let voxel = grid.try_get_voxel_global(index)?;
    Some((grid, voxel))
}
