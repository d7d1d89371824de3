//! Line tracing and bounded-area enumeration across grids.
//!
//! Traces fan out through the registry's spatial hash to every grid the
//! queried region may touch, then resolve voxels per grid with set
//! semantics: one [`GridVoxelSet`] per visited grid, no duplicate voxels
//! within a set.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::fixed_math::{Fix64, FixedVec2, FixedVec3};
use crate::grid::{ScanCell, Voxel, VoxelGrid, VoxelIndex};
use crate::manager::GlobalGridManager;

/// Voxels a trace resolved inside one grid.
pub struct GridVoxelSet {
    pub grid: Arc<VoxelGrid>,
    pub voxels: Vec<Arc<Voxel>>,
}

impl GridVoxelSet {
    fn new(grid: Arc<VoxelGrid>) -> Self {
        Self {
            grid,
            voxels: Vec::new(),
        }
    }
}

/// Accumulates voxels per grid with set semantics.
struct TraceAccumulator {
    groups: Vec<(GridVoxelSet, FxHashSet<VoxelIndex>)>,
}

impl TraceAccumulator {
    fn new() -> Self {
        Self { groups: Vec::new() }
    }

    fn group_for(&mut self, grid: &Arc<VoxelGrid>) -> &mut (GridVoxelSet, FxHashSet<VoxelIndex>) {
        let position = self
            .groups
            .iter()
            .position(|(group, _)| group.grid.global_index() == grid.global_index());
        match position {
            Some(found) => &mut self.groups[found],
            None => {
                self.groups
                    .push((GridVoxelSet::new(Arc::clone(grid)), FxHashSet::default()));
                self.groups.last_mut().expect("group just pushed")
            }
        }
    }

    fn insert(&mut self, grid: &Arc<VoxelGrid>, voxel: Arc<Voxel>) {
        let (group, seen) = self.group_for(grid);
        if seen.insert(voxel.global_index().local) {
            group.voxels.push(voxel);
        }
    }

    fn finish(self) -> Vec<GridVoxelSet> {
        self.groups.into_iter().map(|(group, _)| group).collect()
    }
}

/// Trace the segment `[start, end]`, returning the voxels it crosses
/// grouped per grid (not interleaved).
///
/// Every grid whose spatial cells the segment's bounding box touches is
/// walked independently against its own snapped copy of the segment, so a
/// trace that crosses a grid seam reports both grids. With `include_end`
/// the voxel containing `end` is added to its grid's group even when the
/// stepping missed it.
pub fn trace_line(
    manager: &GlobalGridManager,
    start: FixedVec3,
    end: FixedVec3,
    include_end: bool,
) -> Vec<GridVoxelSet> {
    let bbox_min = start.min(end);
    let bbox_max = start.max(end);
    let voxel_size = manager.voxel_size();
    let mut accumulator = TraceAccumulator::new();

    for grid in manager.grids_in_cells(bbox_min, bbox_max) {
        // Snap outward along the walk direction on each axis: the origin
        // side snaps toward the segment, the destination side away from it.
        // This keeps every sample between the endpoint voxels, so a
        // degenerate trace stays in the single voxel containing `start`.
        let start_floor = grid.floor_to_grid(start);
        let start_ceil = grid.ceil_to_grid(start);
        let end_floor = grid.floor_to_grid(end);
        let end_ceil = grid.ceil_to_grid(end);
        let pick = |ascending: bool, low: Fix64, high: Fix64| if ascending { low } else { high };
        let snapped_start = FixedVec3::new(
            pick(end.x >= start.x, start_floor.x, start_ceil.x),
            pick(end.y >= start.y, start_floor.y, start_ceil.y),
            pick(end.z >= start.z, start_floor.z, start_ceil.z),
        );
        let snapped_end = FixedVec3::new(
            pick(end.x >= start.x, end_ceil.x, end_floor.x),
            pick(end.y >= start.y, end_ceil.y, end_floor.y),
            pick(end.z >= start.z, end_ceil.z, end_floor.z),
        );

        let delta = snapped_end - snapped_start;
        let longest = delta.x.abs().max(delta.y.abs()).max(delta.z.abs());
        let steps = longest.round() + Fix64::ONE;
        let step = delta / (steps + voxel_size);

        let mut i = voxel_size;
        while i <= steps {
            let trace_position = snapped_start + step * i;
            if let Some(voxel) = grid.try_get_voxel_at(trace_position) {
                accumulator.insert(&grid, voxel);
            }
            i += voxel_size;
        }
    }

    if include_end {
        if let Some((grid, voxel)) = manager.try_get_grid_and_voxel(end) {
            accumulator.insert(&grid, voxel);
        }
    }

    accumulator.finish()
}

/// 2D trace over the XZ ground plane at `y = 0`.
pub fn trace_line_2d(
    manager: &GlobalGridManager,
    start: FixedVec2,
    end: FixedVec2,
    include_end: bool,
) -> Vec<GridVoxelSet> {
    trace_line(manager, start.to_ground(), end.to_ground(), include_end)
}

/// Every voxel inside the box `[min, max]`, grouped per grid.
///
/// Walks the voxel-aligned sample lattice of each overlapping grid from the
/// snapped minimum to the snapped maximum, inclusive.
pub fn get_covered_voxels(
    manager: &GlobalGridManager,
    min: FixedVec3,
    max: FixedVec3,
) -> Vec<GridVoxelSet> {
    let bbox_min = min.min(max);
    let bbox_max = min.max(max);
    let voxel_size = manager.voxel_size();
    let mut accumulator = TraceAccumulator::new();

    for grid in manager.grids_in_cells(bbox_min, bbox_max) {
        let from = grid.floor_to_grid(bbox_min);
        let to = grid.ceil_to_grid(bbox_max);

        let mut x = from.x;
        while x <= to.x {
            let mut y = from.y;
            while y <= to.y {
                let mut z = from.z;
                while z <= to.z {
                    if let Some(voxel) = grid.try_get_voxel_at(FixedVec3::new(x, y, z)) {
                        accumulator.insert(&grid, voxel);
                    }
                    z += voxel_size;
                }
                y += voxel_size;
            }
            x += voxel_size;
        }
    }

    accumulator.finish()
}

/// Every scan cell intersecting the box `[min, max]`, across all grids.
pub fn get_covered_scan_cells(
    manager: &GlobalGridManager,
    min: FixedVec3,
    max: FixedVec3,
) -> Vec<Arc<ScanCell>> {
    let bbox_min = min.min(max);
    let bbox_max = min.max(max);
    let mut seen: FxHashSet<(u16, i32)> = FxHashSet::default();
    let mut cells = Vec::new();

    for grid in manager.grids_in_cells(bbox_min, bbox_max) {
        let config = grid.config();
        let clamped_min = bbox_min.clamp(config.bounds_min, config.bounds_max);
        let clamped_max = bbox_max.clamp(config.bounds_min, config.bounds_max);
        let Some(from) = grid.try_get_voxel_coords(clamped_min) else {
            continue;
        };
        let Some(to) = grid.try_get_voxel_coords(clamped_max) else {
            continue;
        };
        let scan_cell_size = config.scan_cell_size;

        for x in (from.x / scan_cell_size)..=(to.x / scan_cell_size) {
            for y in (from.y / scan_cell_size)..=(to.y / scan_cell_size) {
                for z in (from.z / scan_cell_size)..=(to.z / scan_cell_size) {
                    let Some(cell) =
                        grid.try_get_scan_cell(GlobalGridManager::mix_hash(x, y, z))
                    else {
                        continue;
                    };
                    if seen.insert((cell.grid_index(), cell.cell_key())) {
                        cells.push(cell);
                    }
                }
            }
        }
    }

    cells
}
