//! Process-wide grid registry and coarse spatial index.
//!
//! The [`GlobalGridManager`] owns every active [`VoxelGrid`], detects
//! duplicate registrations by config hash, maintains a spatial hash from
//! coarse world cells to the grids intersecting them, and links adjoining
//! grids as neighbors. All registry mutation goes through one reader/writer
//! lock; cell-level mutation never takes it.

pub mod spatial;


use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::collections::{ObserverList, SlotStore};
use crate::events::{ChangeKind, GridChange};
use crate::fixed_math::{Fix64, FixedVec3};
use crate::grid::voxel_grid::bounds_overlap;
use crate::grid::{GlobalVoxelIndex, GridConfig, SpatialDirection, Voxel, VoxelGrid};
use crate::hashing::mix_hash;

pub use spatial::{spatial_cell_key, spatial_cells_covering};

/// Most grids the registry will hold at once.
pub const MAX_GRIDS: usize = u16::MAX as usize - 1;

/// Edge length of one voxel when `setup` does not choose one.
pub const DEFAULT_VOXEL_SIZE: Fix64 = Fix64::ONE;

/// Edge length of one spatial-hash cell when `setup` does not choose one.
pub const DEFAULT_SPATIAL_CELL_SIZE: i32 = 50;

/// Outcome of [`GlobalGridManager::try_add_grid`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GridAddResult {
    /// Grid registered under this slot.
    Success(u16),
    /// A grid with the same config hash is already registered at this slot.
    AlreadyExists(u16),
    /// Bounds are inverted on at least one axis.
    InvalidBounds,
    /// The registry is at capacity.
    MaxGridsReached,
    /// `setup` has not run (or `reset` has).
    Inactive,
}

struct ManagerState {
    is_active: bool,
    voxel_size: Fix64,
    spatial_cell_size: i32,
    version: u32,
    grids: SlotStore<Arc<VoxelGrid>>,
    bounds_tracker: FxHashMap<i32, u16>,
    spatial_hash: FxHashMap<i32, FxHashSet<u16>>,
}

impl ManagerState {
    fn new() -> Self {
        Self {
            is_active: false,
            voxel_size: DEFAULT_VOXEL_SIZE,
            spatial_cell_size: DEFAULT_SPATIAL_CELL_SIZE,
            version: 0,
            grids: SlotStore::new(),
            bounds_tracker: FxHashMap::default(),
            spatial_hash: FxHashMap::default(),
        }
    }
}

/// Registry of every active grid plus the spatial hash over them.
///
/// Instantiable for isolated use (tests, embedded contexts); the process-wide
/// instance is [`GlobalGridManager::global`]. All methods take `&self`.
pub struct GlobalGridManager {
    state: RwLock<ManagerState>,
    on_active_grid_change: ObserverList<GridChange>,
    on_reset: ObserverList<()>,
}

static GLOBAL: Lazy<GlobalGridManager> = Lazy::new(GlobalGridManager::new);

impl GlobalGridManager {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ManagerState::new()),
            on_active_grid_change: ObserverList::new(),
            on_reset: ObserverList::new(),
        }
    }

    /// The process-wide registry instance.
    pub fn global() -> &'static GlobalGridManager {
        &GLOBAL
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Activate the registry. `voxel_size` is clamped into `(0, 1]`;
    /// non-positive spatial cell sizes fall back to the default. Calling
    /// `setup` on an active registry warns and changes nothing.
    pub fn setup(&self, voxel_size: Fix64, spatial_cell_size: i32) {
        let mut state = self.state.write();
        if state.is_active {
            warn!("grid registry setup called while already active; ignoring");
            return;
        }
        state.voxel_size = if voxel_size > Fix64::ONE {
            Fix64::ONE
        } else if voxel_size <= Fix64::ZERO {
            DEFAULT_VOXEL_SIZE
        } else {
            voxel_size
        };
        state.spatial_cell_size = if spatial_cell_size <= 0 {
            DEFAULT_SPATIAL_CELL_SIZE
        } else {
            spatial_cell_size
        };
        state.version = 1;
        state.is_active = true;
    }

    /// `setup` with the default voxel and spatial cell sizes.
    pub fn setup_default(&self) {
        self.setup(DEFAULT_VOXEL_SIZE, DEFAULT_SPATIAL_CELL_SIZE);
    }

    /// Deactivate the registry and tear down every grid. The reset hook
    /// fires before teardown; grid teardown itself runs after the registry
    /// lock is released so partition callbacks cannot deadlock against it.
    pub fn reset(&self) {
        self.on_reset.notify(&());
        let drained = {
            let mut state = self.state.write();
            let drained = state.grids.drain_all();
            state.grids.compact();
            state.bounds_tracker = FxHashMap::default();
            state.spatial_hash = FxHashMap::default();
            state.is_active = false;
            state.version = 0;
            drained
        };
        for grid in drained {
            grid.reset();
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.read().is_active
    }

    pub fn voxel_size(&self) -> Fix64 {
        self.state.read().voxel_size
    }

    pub fn spatial_cell_size(&self) -> i32 {
        self.state.read().spatial_cell_size
    }

    /// Overlap tolerance for grid linking: half a voxel.
    pub fn voxel_resolution(&self) -> Fix64 {
        self.voxel_size() / Fix64::from_num(2)
    }

    pub fn version(&self) -> u32 {
        self.state.read().version
    }

    pub fn grid_count(&self) -> usize {
        self.state.read().grids.len()
    }

    /// Observer registry for grids entering and leaving.
    pub fn on_active_grid_change(&self) -> &ObserverList<GridChange> {
        &self.on_active_grid_change
    }

    /// Observer registry for the pre-reset hook.
    pub fn on_reset(&self) -> &ObserverList<()> {
        &self.on_reset
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a grid for `config`.
    ///
    /// Rejects duplicates by config hash, inverted bounds, and a full
    /// registry. On success the grid is materialized, indexed into every
    /// spatial cell its bounds cover, and linked bidirectionally with every
    /// already-registered grid whose bounds overlap within the voxel
    /// resolution tolerance. The change event fires after the registry lock
    /// is released.
    pub fn try_add_grid(&self, config: GridConfig) -> GridAddResult {
        {
            let state = self.state.read();
            if !state.is_active {
                return GridAddResult::Inactive;
            }
            if state.grids.len() > MAX_GRIDS {
                return GridAddResult::MaxGridsReached;
            }
            if !config.is_valid() {
                debug!(?config, "rejected grid with inverted bounds");
                return GridAddResult::InvalidBounds;
            }
            if let Some(&existing) = state.bounds_tracker.get(&config.hash_value()) {
                return GridAddResult::AlreadyExists(existing);
            }
        }

        let slot = {
            let mut state = self.state.write();
            if !state.is_active {
                return GridAddResult::Inactive;
            }
            if state.grids.len() > MAX_GRIDS {
                return GridAddResult::MaxGridsReached;
            }
            let config_hash = config.hash_value();
            // Somebody may have raced the same config in between the locks.
            if let Some(&existing) = state.bounds_tracker.get(&config_hash) {
                return GridAddResult::AlreadyExists(existing);
            }

            let voxel_size = state.voxel_size;
            let spatial_cell_size = state.spatial_cell_size;
            let tolerance = voxel_size / Fix64::from_num(2);
            let version = state.version;
            let slot = state.grids.insert_with(|slot| {
                let spawn_token = mix_hash(slot as i32, config_hash, version as i32);
                Arc::new(VoxelGrid::generate(slot, config, voxel_size, spawn_token))
            });
            state.bounds_tracker.insert(config_hash, slot);

            let grid = Arc::clone(state.grids.get(slot).expect("slot just inserted"));
            for cell_key in
                spatial_cells_covering(config.bounds_min, config.bounds_max, spatial_cell_size)
            {
                // Collect before mutating: linking borrows the store.
                let residents: SmallVec<[Arc<VoxelGrid>; 4]> = state
                    .spatial_hash
                    .get(&cell_key)
                    .map(|slots| {
                        slots
                            .iter()
                            .filter_map(|other| state.grids.get(*other).map(Arc::clone))
                            .collect()
                    })
                    .unwrap_or_default();
                for other in residents {
                    if grid.is_grid_overlap_valid(&other, tolerance) {
                        let to_other = get_neighbor_direction(&grid, &other);
                        grid.try_add_grid_neighbor(other.global_index(), to_other);
                        other.try_add_grid_neighbor(slot, to_other.opposite());
                    }
                }
                state
                    .spatial_hash
                    .entry(cell_key)
                    .or_default()
                    .insert(slot);
            }
            state.version += 1;
            slot
        };

        self.on_active_grid_change.notify(&GridChange {
            kind: ChangeKind::Add,
            grid_index: slot,
        });
        GridAddResult::Success(slot)
    }

    /// Unregister the grid at `slot`.
    ///
    /// The removal event fires before teardown. The grid is unlinked from
    /// every spatial cell and neighbor, dropped from the registry, and reset
    /// after the registry lock is released.
    pub fn try_remove_grid(&self, slot: u16) -> bool {
        {
            let state = self.state.read();
            if !state.is_active || !state.grids.contains(slot) {
                return false;
            }
        }

        self.on_active_grid_change.notify(&GridChange {
            kind: ChangeKind::Remove,
            grid_index: slot,
        });

        let removed = {
            let mut state = self.state.write();
            let Some(grid) = state.grids.get(slot).map(Arc::clone) else {
                return false;
            };
            let tolerance = state.voxel_size / Fix64::from_num(2);
            let config = *grid.config();
            for cell_key in spatial_cells_covering(
                config.bounds_min,
                config.bounds_max,
                state.spatial_cell_size,
            ) {
                let Some(residents) = state.spatial_hash.get_mut(&cell_key) else {
                    continue;
                };
                residents.remove(&slot);
                if residents.is_empty() {
                    state.spatial_hash.remove(&cell_key);
                    continue;
                }
                if grid.is_conjoined() {
                    let residents: SmallVec<[Arc<VoxelGrid>; 4]> = state
                        .spatial_hash
                        .get(&cell_key)
                        .map(|slots| {
                            slots
                                .iter()
                                .filter_map(|other| state.grids.get(*other).map(Arc::clone))
                                .collect()
                        })
                        .unwrap_or_default();
                    for other in residents {
                        if grid.is_grid_overlap_valid(&other, tolerance) {
                            let from_other = get_neighbor_direction(&other, &grid);
                            other.try_remove_grid_neighbor(slot, from_other);
                        }
                    }
                }
            }
            state.bounds_tracker.remove(&config.hash_value());
            let removed = state.grids.remove(slot);
            state.version += 1;
            state.grids.compact();
            removed
        };

        match removed {
            Some(grid) => {
                grid.reset();
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    pub fn try_get_grid(&self, slot: u16) -> Option<Arc<VoxelGrid>> {
        let state = self.state.read();
        if !state.is_active {
            return None;
        }
        state.grids.get(slot).map(Arc::clone)
    }

    /// First active grid containing `position`.
    pub fn try_get_grid_at(&self, position: FixedVec3) -> Option<Arc<VoxelGrid>> {
        let state = self.state.read();
        if !state.is_active {
            return None;
        }
        let cell_key = spatial_cell_key(position, state.spatial_cell_size);
        let residents = state.spatial_hash.get(&cell_key)?;
        residents
            .iter()
            .filter_map(|slot| state.grids.get(*slot))
            .find(|grid| grid.is_active() && grid.is_in_bounds(position))
            .map(Arc::clone)
    }

    /// Grid lookup by voxel identity; a stale `grid_token` yields `None`.
    pub fn try_get_grid_global(&self, index: GlobalVoxelIndex) -> Option<Arc<VoxelGrid>> {
        let grid = self.try_get_grid(index.grid_index)?;
        (grid.spawn_token() == index.grid_token).then_some(grid)
    }

    pub fn try_get_grid_and_voxel(
        &self,
        position: FixedVec3,
    ) -> Option<(Arc<VoxelGrid>, Arc<Voxel>)> {
        let grid = self.try_get_grid_at(position)?;
        let voxel = grid.try_get_voxel_at(position)?;
        Some((grid, voxel))
    }

    pub fn try_get_voxel(&self, position: FixedVec3) -> Option<Arc<Voxel>> {
        self.try_get_grid_and_voxel(position).map(|(_, voxel)| voxel)
    }

    pub fn try_get_voxel_global(&self, index: GlobalVoxelIndex) -> Option<Arc<Voxel>> {
        let grid = self.try_get_grid_global(index)?;
        grid.try_get_voxel_global(index)
    }

    /// Slots of every grid whose bounds overlap the given grid's bounds
    /// (within the voxel resolution tolerance).
    pub fn find_overlapping_grids(&self, slot: u16) -> Vec<u16> {
        let Some(grid) = self.try_get_grid(slot) else {
            return Vec::new();
        };
        let config = grid.config();
        self.find_overlapping_grids_in_bounds(config.bounds_min, config.bounds_max)
            .into_iter()
            .filter(|other| *other != slot)
            .collect()
    }

    /// Slots of every grid whose bounds overlap `[min, max]` within the
    /// voxel resolution tolerance.
    pub fn find_overlapping_grids_in_bounds(&self, min: FixedVec3, max: FixedVec3) -> Vec<u16> {
        let state = self.state.read();
        if !state.is_active {
            return Vec::new();
        }
        let tolerance = state.voxel_size / Fix64::from_num(2);
        let mut found: Vec<u16> = Vec::new();
        for cell_key in spatial_cells_covering(min, max, state.spatial_cell_size) {
            let Some(residents) = state.spatial_hash.get(&cell_key) else {
                continue;
            };
            for slot in residents {
                if found.contains(slot) {
                    continue;
                }
                let Some(grid) = state.grids.get(*slot) else {
                    continue;
                };
                let config = grid.config();
                if bounds_overlap(min, max, config.bounds_min, config.bounds_max, tolerance) {
                    found.push(*slot);
                }
            }
        }
        found.sort_unstable();
        found
    }

    /// Every registered grid overlapping `[min, max]` by spatial cell,
    /// without the bounds-overlap filter. Query fan-out starts here.
    pub(crate) fn grids_in_cells(
        &self,
        min: FixedVec3,
        max: FixedVec3,
    ) -> SmallVec<[Arc<VoxelGrid>; 4]> {
        let state = self.state.read();
        if !state.is_active {
            return SmallVec::new();
        }
        let mut found: SmallVec<[Arc<VoxelGrid>; 4]> = SmallVec::new();
        for cell_key in spatial_cells_covering(min, max, state.spatial_cell_size) {
            let Some(residents) = state.spatial_hash.get(&cell_key) else {
                continue;
            };
            for slot in residents {
                if found.iter().any(|grid| grid.global_index() == *slot) {
                    continue;
                }
                if let Some(grid) = state.grids.get(*slot) {
                    if grid.is_active() {
                        found.push(Arc::clone(grid));
                    }
                }
            }
        }
        found
    }

    // ------------------------------------------------------------------
    // Spatial helpers
    // ------------------------------------------------------------------

    /// Key of the spatial cell containing `position`.
    pub fn get_spatial_grid_key(&self, position: FixedVec3) -> i32 {
        spatial_cell_key(position, self.spatial_cell_size())
    }

    /// Keys of every spatial cell covering `[min, max]`.
    pub fn get_spatial_grid_cells(&self, min: FixedVec3, max: FixedVec3) -> Vec<i32> {
        spatial_cells_covering(min, max, self.spatial_cell_size())
    }

    /// The shared hash mixer; exposed because spatial keys and tokens are
    /// part of the registry's stable contract.
    pub fn mix_hash(x: i32, y: i32, z: i32) -> i32 {
        mix_hash(x, y, z)
    }

    pub fn is_diagonal_neighbor(direction: SpatialDirection) -> bool {
        direction.is_diagonal()
    }

    pub fn get_neighbor_direction_from_offset(dx: i32, dy: i32, dz: i32) -> SpatialDirection {
        SpatialDirection::from_offset(dx, dy, dz)
    }

    /// Componentwise ceiling of `position` onto the voxel lattice.
    pub fn ceil_to_voxel_size(&self, position: FixedVec3) -> FixedVec3 {
        let size = self.voxel_size();
        FixedVec3::new(
            (position.x / size).ceil() * size,
            (position.y / size).ceil() * size,
            (position.z / size).ceil() * size,
        )
    }

    /// Componentwise floor of `position` onto the voxel lattice.
    pub fn floor_to_voxel_size(&self, position: FixedVec3) -> FixedVec3 {
        let size = self.voxel_size();
        FixedVec3::new(
            (position.x / size).floor() * size,
            (position.y / size).floor() * size,
            (position.z / size).floor() * size,
        )
    }

    /// Expand `[min, max]` outward onto the voxel lattice.
    pub fn snap_bounds_to_voxel_size(
        &self,
        min: FixedVec3,
        max: FixedVec3,
    ) -> (FixedVec3, FixedVec3) {
        (self.floor_to_voxel_size(min), self.ceil_to_voxel_size(max))
    }
}

impl Default for GlobalGridManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Direction from one grid's center toward another's.
pub fn get_neighbor_direction(from: &VoxelGrid, to: &VoxelGrid) -> SpatialDirection {
    let delta = to.config().center - from.config().center;
    let sign = delta.signum();
    SpatialDirection::from_offset(
        sign.x.to_num::<i32>(),
        sign.y.to_num::<i32>(),
        sign.z.to_num::<i32>(),
    )
}
