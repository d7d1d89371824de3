use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::warn;

use crate::fixed_math::{Fix64, FixedVec3};
use crate::hashing::mix_hash;

use super::config::GridConfig;
use super::direction::SpatialDirection;
use super::index::{GlobalVoxelIndex, VoxelIndex};
use super::scan_cell::ScanCell;
use super::voxel::Voxel;

/// Cross-grid adjacency and occupancy bookkeeping, both lazily allocated.
#[derive(Default)]
struct GridLinks {
    neighbors: Option<FxHashMap<SpatialDirection, FxHashSet<u16>>>,
    active_scan_cells: Option<FxHashSet<i32>>,
}

/// One axis-aligned grid of voxels plus its scan-cell overlay.
///
/// Grids are materialized whole by the registry: the voxel array and scan
/// cell map never change shape after construction, so lookups read them
/// without locks. Mutable state (adjacency, active cells, counters) sits
/// behind interior mutability, and cell-level mutation paths serialize on
/// the grid's mutation lock.
pub struct VoxelGrid {
    global_index: u16,
    spawn_token: i32,
    config: GridConfig,
    voxel_size: Fix64,
    width: i32,
    height: i32,
    length: i32,
    size: i32,
    voxels: Vec<Arc<Voxel>>,
    scan_cells: FxHashMap<i32, Arc<ScanCell>>,
    links: RwLock<GridLinks>,
    version: AtomicU32,
    obstacle_count: AtomicI32,
    neighbor_count: AtomicU8,
    is_active: AtomicBool,
    mutation: Mutex<()>,
}

impl VoxelGrid {
    /// Materialize a grid: dimensions from the bounds, then scan cells, then
    /// voxels. Runs once, before the registry publishes the grid.
    pub(crate) fn generate(
        global_index: u16,
        config: GridConfig,
        voxel_size: Fix64,
        spawn_token: i32,
    ) -> Self {
        let span = config.size();
        // The +1 makes degenerate [a, a] bounds a 1x1x1 grid.
        let width = (span.x / voxel_size).floor().to_num::<i32>() + 1;
        let height = (span.y / voxel_size).floor().to_num::<i32>() + 1;
        let length = (span.z / voxel_size).floor().to_num::<i32>() + 1;
        let size = width * height * length;
        let scan_cell_size = config.scan_cell_size;

        let scan_w = (width - 1) / scan_cell_size + 1;
        let scan_h = (height - 1) / scan_cell_size + 1;
        let scan_l = (length - 1) / scan_cell_size + 1;
        let mut scan_cells =
            FxHashMap::with_capacity_and_hasher((scan_w * scan_h * scan_l) as usize, Default::default());
        for z in 0..scan_l {
            for y in 0..scan_h {
                for x in 0..scan_w {
                    let cell_key = mix_hash(x, y, z);
                    let cell_token = mix_hash(cell_key, spawn_token, global_index as i32);
                    scan_cells.insert(
                        cell_key,
                        Arc::new(ScanCell::new(global_index, cell_key, cell_token)),
                    );
                }
            }
        }

        let mut voxels = Vec::with_capacity(size as usize);
        for z in 0..length {
            for y in 0..height {
                for x in 0..width {
                    let local = VoxelIndex::new(x, y, z);
                    let position =
                        config.bounds_min + FixedVec3::from_i32(x, y, z) * voxel_size;
                    let scan_cell_key = mix_hash(
                        x / scan_cell_size,
                        y / scan_cell_size,
                        z / scan_cell_size,
                    );
                    if !scan_cells.contains_key(&scan_cell_key) {
                        warn!(
                            grid = global_index,
                            %local,
                            "voxel maps to a scan cell that was never materialized"
                        );
                    }
                    let is_boundary = x == 0
                        || x == width - 1
                        || y == 0
                        || y == height - 1
                        || z == 0
                        || z == length - 1;
                    voxels.push(Arc::new(Voxel::new(
                        GlobalVoxelIndex::new(global_index, local, spawn_token),
                        position,
                        scan_cell_key,
                        is_boundary,
                        1,
                    )));
                }
            }
        }

        Self {
            global_index,
            spawn_token,
            config,
            voxel_size,
            width,
            height,
            length,
            size,
            voxels,
            scan_cells,
            links: RwLock::new(GridLinks::default()),
            version: AtomicU32::new(1),
            obstacle_count: AtomicI32::new(0),
            neighbor_count: AtomicU8::new(0),
            is_active: AtomicBool::new(true),
            mutation: Mutex::new(()),
        }
    }

    // ------------------------------------------------------------------
    // Identity and aggregates
    // ------------------------------------------------------------------

    pub fn global_index(&self) -> u16 {
        self.global_index
    }

    pub fn spawn_token(&self) -> i32 {
        self.spawn_token
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn voxel_size(&self) -> Fix64 {
        self.voxel_size
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn length(&self) -> i32 {
        self.length
    }

    /// Total voxel count.
    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    pub(crate) fn bump_version(&self) -> u32 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn obstacle_count(&self) -> i32 {
        self.obstacle_count.load(Ordering::Acquire)
    }

    pub(crate) fn obstacle_count_add(&self, delta: i32) {
        self.obstacle_count.fetch_add(delta, Ordering::AcqRel);
    }

    pub fn neighbor_count(&self) -> u8 {
        self.neighbor_count.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Acquire)
    }

    /// Any scan cell currently holds an occupant.
    pub fn is_occupied(&self) -> bool {
        self.links
            .read()
            .active_scan_cells
            .as_ref()
            .is_some_and(|set| !set.is_empty())
    }

    /// Linked to at least one adjoining grid.
    pub fn is_conjoined(&self) -> bool {
        self.neighbor_count() > 0
    }

    /// Total occupants across the grid, summed over its occupied scan cells.
    pub fn occupant_count(&self) -> u32 {
        self.get_active_scan_cells()
            .iter()
            .map(|cell| cell.occupant_count())
            .sum()
    }

    pub(crate) fn mutation_lock(&self) -> MutexGuard<'_, ()> {
        self.mutation.lock()
    }

    // ------------------------------------------------------------------
    // Voxel lookups
    // ------------------------------------------------------------------

    pub fn contains_index(&self, index: VoxelIndex) -> bool {
        index.x >= 0
            && index.x < self.width
            && index.y >= 0
            && index.y < self.height
            && index.z >= 0
            && index.z < self.length
    }

    fn voxel_slot(&self, index: VoxelIndex) -> Option<usize> {
        if !self.contains_index(index) {
            return None;
        }
        Some(((index.z * self.height + index.y) * self.width + index.x) as usize)
    }

    pub fn is_in_bounds(&self, position: FixedVec3) -> bool {
        self.config.bounds_min.all_le(position) && position.all_le(self.config.bounds_max)
    }

    /// Local coordinate of the voxel containing `position`.
    pub fn try_get_voxel_coords(&self, position: FixedVec3) -> Option<VoxelIndex> {
        if !self.is_in_bounds(position) {
            return None;
        }
        let relative = position - self.config.bounds_min;
        Some(VoxelIndex::new(
            (relative.x / self.voxel_size).floor().to_num::<i32>(),
            (relative.y / self.voxel_size).floor().to_num::<i32>(),
            (relative.z / self.voxel_size).floor().to_num::<i32>(),
        ))
    }

    pub fn is_voxel_allocated(&self, index: VoxelIndex) -> bool {
        self.voxel_slot(index)
            .is_some_and(|slot| self.voxels[slot].is_allocated())
    }

    pub fn try_get_voxel(&self, index: VoxelIndex) -> Option<Arc<Voxel>> {
        if !self.is_active() {
            return None;
        }
        let slot = self.voxel_slot(index)?;
        let voxel = &self.voxels[slot];
        voxel.is_allocated().then(|| Arc::clone(voxel))
    }

    pub fn try_get_voxel_at(&self, position: FixedVec3) -> Option<Arc<Voxel>> {
        let coords = self.try_get_voxel_coords(position)?;
        self.try_get_voxel(coords)
    }

    /// Global-index lookup; rejects stale tokens from earlier lifecycles.
    pub fn try_get_voxel_global(&self, index: GlobalVoxelIndex) -> Option<Arc<Voxel>> {
        if index.grid_index != self.global_index || index.grid_token != self.spawn_token {
            return None;
        }
        self.try_get_voxel(index.local)
    }

    pub(crate) fn voxels(&self) -> impl Iterator<Item = &Arc<Voxel>> {
        self.voxels.iter()
    }

    // ------------------------------------------------------------------
    // Scan cells
    // ------------------------------------------------------------------

    /// Key of the scan cell covering a local voxel index. Negative
    /// components have no scan cell.
    pub fn get_scan_cell_key(&self, index: VoxelIndex) -> Option<i32> {
        if index.x < 0 || index.y < 0 || index.z < 0 {
            return None;
        }
        let scs = self.config.scan_cell_size;
        Some(mix_hash(index.x / scs, index.y / scs, index.z / scs))
    }

    pub fn try_get_scan_cell(&self, cell_key: i32) -> Option<Arc<ScanCell>> {
        if !self.is_active() {
            return None;
        }
        self.scan_cells.get(&cell_key).map(Arc::clone)
    }

    pub fn try_get_scan_cell_by_index(&self, index: VoxelIndex) -> Option<Arc<ScanCell>> {
        let key = self.get_scan_cell_key(index)?;
        self.try_get_scan_cell(key)
    }

    pub fn try_get_scan_cell_at(&self, position: FixedVec3) -> Option<Arc<ScanCell>> {
        let coords = self.try_get_voxel_coords(position)?;
        self.try_get_scan_cell_by_index(coords)
    }

    pub fn scan_cell_count(&self) -> usize {
        self.scan_cells.len()
    }

    /// Scan cells currently holding occupants.
    pub fn get_active_scan_cells(&self) -> Vec<Arc<ScanCell>> {
        let keys: SmallVec<[i32; 8]> = {
            let links = self.links.read();
            match links.active_scan_cells.as_ref() {
                Some(set) => set.iter().copied().collect(),
                None => return Vec::new(),
            }
        };
        keys.iter()
            .filter_map(|key| self.scan_cells.get(key).map(Arc::clone))
            .collect()
    }

    pub(crate) fn mark_scan_cell_active(&self, cell_key: i32) {
        let mut links = self.links.write();
        links
            .active_scan_cells
            .get_or_insert_with(FxHashSet::default)
            .insert(cell_key);
    }

    pub(crate) fn mark_scan_cell_inactive(&self, cell_key: i32) {
        let mut links = self.links.write();
        if let Some(set) = links.active_scan_cells.as_mut() {
            set.remove(&cell_key);
            if set.is_empty() {
                links.active_scan_cells = None;
            }
        }
    }

    // ------------------------------------------------------------------
    // Snapping
    // ------------------------------------------------------------------

    /// Largest voxel-aligned position at or below `position`, clamped into
    /// the grid bounds.
    pub fn floor_to_grid(&self, position: FixedVec3) -> FixedVec3 {
        self.snap(position, self.voxel_size, false)
    }

    /// Smallest voxel-aligned position at or above `position`, clamped into
    /// the grid bounds.
    pub fn ceil_to_grid(&self, position: FixedVec3) -> FixedVec3 {
        self.snap(position, self.voxel_size, true)
    }

    /// Snap to the scan-cell lattice, clamped into the grid bounds.
    pub fn snap_to_scan_cell(&self, position: FixedVec3) -> FixedVec3 {
        let span = self.voxel_size * Fix64::from_num(self.config.scan_cell_size);
        self.snap(position, span, false)
    }

    fn snap(&self, position: FixedVec3, step: Fix64, ceil: bool) -> FixedVec3 {
        let relative = position - self.config.bounds_min;
        let snap_axis = |v: Fix64| {
            let steps = if ceil { (v / step).ceil() } else { (v / step).floor() };
            steps * step
        };
        let snapped = FixedVec3::new(
            snap_axis(relative.x),
            snap_axis(relative.y),
            snap_axis(relative.z),
        ) + self.config.bounds_min;
        snapped.clamp(self.config.bounds_min, self.config.bounds_max)
    }

    // ------------------------------------------------------------------
    // Boundary and overlap
    // ------------------------------------------------------------------

    pub fn is_on_boundary(&self, index: VoxelIndex) -> bool {
        self.contains_index(index)
            && (index.x == 0
                || index.x == self.width - 1
                || index.y == 0
                || index.y == self.height - 1
                || index.z == 0
                || index.z == self.length - 1)
    }

    /// True when the voxel at `index` sits on every face named by
    /// `direction` (e.g. `WestBelow` requires both the west and bottom
    /// faces).
    pub fn is_facing_boundary_direction(&self, index: VoxelIndex, direction: SpatialDirection) -> bool {
        let Some((dx, dy, dz)) = direction.offset() else {
            return false;
        };
        if !self.contains_index(index) {
            return false;
        }
        let face = |delta: i32, coord: i32, max: i32| match delta {
            -1 => coord == 0,
            1 => coord == max - 1,
            _ => true,
        };
        face(dx, index.x, self.width)
            && face(dy, index.y, self.height)
            && face(dz, index.z, self.length)
    }

    /// Tolerance-inflated AABB overlap against another grid.
    pub fn is_grid_overlap_valid(&self, other: &VoxelGrid, tolerance: Fix64) -> bool {
        bounds_overlap(
            self.config.bounds_min,
            self.config.bounds_max,
            other.config.bounds_min,
            other.config.bounds_max,
            tolerance,
        )
    }

    // ------------------------------------------------------------------
    // Grid adjacency
    // ------------------------------------------------------------------

    /// Link an adjoining grid in `direction`. Idempotent per (direction,
    /// slot); an actual insertion bumps the version and invalidates the
    /// neighbor caches of the facing boundary voxels.
    pub(crate) fn try_add_grid_neighbor(
        &self,
        other_slot: u16,
        direction: SpatialDirection,
    ) -> bool {
        let inserted = {
            let mut links = self.links.write();
            links
                .neighbors
                .get_or_insert_with(FxHashMap::default)
                .entry(direction)
                .or_default()
                .insert(other_slot)
        };
        if inserted {
            self.neighbor_count.fetch_add(1, Ordering::AcqRel);
            self.bump_version();
            self.notify_boundary_change(direction);
        }
        inserted
    }

    /// Unlink an adjoining grid. Mirrors [`Self::try_add_grid_neighbor`].
    pub(crate) fn try_remove_grid_neighbor(
        &self,
        other_slot: u16,
        direction: SpatialDirection,
    ) -> bool {
        let removed = {
            let mut links = self.links.write();
            let Some(map) = links.neighbors.as_mut() else {
                return false;
            };
            let Some(set) = map.get_mut(&direction) else {
                return false;
            };
            let removed = set.remove(&other_slot);
            if set.is_empty() {
                map.remove(&direction);
            }
            if map.is_empty() {
                links.neighbors = None;
            }
            removed
        };
        if removed {
            self.neighbor_count.fetch_sub(1, Ordering::AcqRel);
            self.bump_version();
            self.notify_boundary_change(direction);
        }
        removed
    }

    pub fn get_all_grid_neighbors(&self) -> Vec<(SpatialDirection, u16)> {
        let links = self.links.read();
        match links.neighbors.as_ref() {
            Some(map) => {
                let mut all: Vec<(SpatialDirection, u16)> = map
                    .iter()
                    .flat_map(|(dir, set)| set.iter().map(|slot| (*dir, *slot)))
                    .collect();
                all.sort_by_key(|(dir, slot)| (*dir as i8, *slot));
                all
            }
            None => Vec::new(),
        }
    }

    pub fn get_grid_neighbors_in_direction(&self, direction: SpatialDirection) -> SmallVec<[u16; 4]> {
        let links = self.links.read();
        links
            .neighbors
            .as_ref()
            .and_then(|map| map.get(&direction))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Invalidate the neighbor caches of the boundary face voxels looking
    /// toward `direction`. Only cardinal directions touch voxels: an
    /// adjoining grid can add cross-boundary neighbors to face voxels only,
    /// and corner or edge voxels refresh transitively when queried.
    pub(crate) fn notify_boundary_change(&self, direction: SpatialDirection) {
        if !direction.is_cardinal() {
            return;
        }
        let mut invalidate = |index: VoxelIndex| {
            if let Some(slot) = self.voxel_slot(index) {
                self.voxels[slot].invalidate_neighbor_cache();
            }
        };
        match direction {
            SpatialDirection::West | SpatialDirection::East => {
                let x = if direction == SpatialDirection::West {
                    0
                } else {
                    self.width - 1
                };
                for y in 0..self.height {
                    for z in 0..self.length {
                        invalidate(VoxelIndex::new(x, y, z));
                    }
                }
            }
            SpatialDirection::Below | SpatialDirection::Above => {
                let y = if direction == SpatialDirection::Below {
                    0
                } else {
                    self.height - 1
                };
                for x in 0..self.width {
                    for z in 0..self.length {
                        invalidate(VoxelIndex::new(x, y, z));
                    }
                }
            }
            SpatialDirection::South | SpatialDirection::North => {
                let z = if direction == SpatialDirection::South {
                    0
                } else {
                    self.length - 1
                };
                for x in 0..self.width {
                    for y in 0..self.height {
                        invalidate(VoxelIndex::new(x, y, z));
                    }
                }
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Tear the grid down after removal from the registry. Every voxel and
    /// scan cell reports deallocated afterwards, so stale handles resolve to
    /// nothing.
    pub(crate) fn reset(&self) {
        // Hold the mutation lock so no obstacle or occupant write can
        // interleave with teardown.
        let _guard = self.mutation.lock();
        self.is_active.store(false, Ordering::Release);
        for voxel in &self.voxels {
            voxel.reset();
        }
        for cell in self.scan_cells.values() {
            cell.reset();
        }
        let mut links = self.links.write();
        links.neighbors = None;
        links.active_scan_cells = None;
        drop(links);
        self.obstacle_count.store(0, Ordering::Release);
        self.neighbor_count.store(0, Ordering::Release);
        self.version.store(0, Ordering::Release);
    }
}

/// Tolerance-inflated AABB overlap used both for grid linking and for
/// overlap queries over raw bounds.
pub(crate) fn bounds_overlap(
    a_min: FixedVec3,
    a_max: FixedVec3,
    b_min: FixedVec3,
    b_max: FixedVec3,
    tolerance: Fix64,
) -> bool {
    a_min.x - tolerance <= b_max.x
        && a_max.x + tolerance >= b_min.x
        && a_min.y - tolerance <= b_max.y
        && a_max.y + tolerance >= b_min.y
        && a_min.z - tolerance <= b_max.z
        && a_max.z + tolerance >= b_min.z
}

impl std::fmt::Debug for VoxelGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoxelGrid")
            .field("global_index", &self.global_index)
            .field("dimensions", &(self.width, self.height, self.length))
            .field("version", &self.version())
            .field("obstacle_count", &self.obstacle_count())
            .field("neighbor_count", &self.neighbor_count())
            .field("is_active", &self.is_active())
            .finish()
    }
}
