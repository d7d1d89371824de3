use std::any::TypeId;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tracing::error;

use crate::collections::ObserverList;
use crate::events::{ObstacleChange, OccupantChange};
use crate::fixed_math::FixedVec3;
use crate::hashing::mix_hash;
use crate::manager::GlobalGridManager;

use super::direction::{SpatialDirection, DIRECTION_OFFSETS};
use super::partition::{downcast_partition, PartitionProvider, VoxelPartition};
use super::{GlobalVoxelIndex, VoxelIndex};

/// Most obstacle tokens one voxel can hold.
pub const MAX_OBSTACLE_COUNT: u8 = 255;

/// Most occupants one voxel can hold.
pub const MAX_OCCUPANT_COUNT: u8 = 255;

struct NeighborCache {
    /// Identity triples for the 26 surrounding voxels, `None` where no
    /// neighbor exists. Resolved through the registry on read so a neighbor
    /// grid that has since been removed simply drops out.
    entries: Option<Box<[Option<GlobalVoxelIndex>; 26]>>,
    valid: bool,
}

/// One cell of a voxel grid.
///
/// Carries obstacle and occupant counters, the set of applied obstacle
/// tokens, typed extension partitions, and a cache of the 26 surrounding
/// voxel identities (which may live in adjoining grids). A voxel never holds
/// an owning reference to its grid; it resolves it through the registry by
/// `(grid_index, grid_token)` when needed.
pub struct Voxel {
    global_index: GlobalVoxelIndex,
    world_position: FixedVec3,
    scan_cell_key: i32,
    is_boundary: bool,
    spawn_token: i32,
    obstacle_count: AtomicU8,
    occupant_count: AtomicU8,
    cached_grid_version: AtomicU32,
    is_allocated: AtomicBool,
    obstacle_tracker: Mutex<Option<FxHashSet<i32>>>,
    partitions: Mutex<PartitionProvider>,
    neighbors: Mutex<NeighborCache>,
    obstacle_observers: ObserverList<ObstacleChange>,
    occupant_observers: ObserverList<OccupantChange>,
}

impl Voxel {
    pub(crate) fn new(
        global_index: GlobalVoxelIndex,
        world_position: FixedVec3,
        scan_cell_key: i32,
        is_boundary: bool,
        grid_version: u32,
    ) -> Self {
        let spawn_token = mix_hash(
            global_index.local.hash_value(),
            global_index.grid_token,
            global_index.grid_index as i32,
        );
        Self {
            global_index,
            world_position,
            scan_cell_key,
            is_boundary,
            spawn_token,
            obstacle_count: AtomicU8::new(0),
            occupant_count: AtomicU8::new(0),
            cached_grid_version: AtomicU32::new(grid_version),
            is_allocated: AtomicBool::new(true),
            obstacle_tracker: Mutex::new(None),
            partitions: Mutex::new(PartitionProvider::default()),
            neighbors: Mutex::new(NeighborCache {
                entries: None,
                valid: false,
            }),
            obstacle_observers: ObserverList::new(),
            occupant_observers: ObserverList::new(),
        }
    }

    pub fn global_index(&self) -> GlobalVoxelIndex {
        self.global_index
    }

    pub fn local_index(&self) -> VoxelIndex {
        self.global_index.local
    }

    pub fn world_position(&self) -> FixedVec3 {
        self.world_position
    }

    pub fn scan_cell_key(&self) -> i32 {
        self.scan_cell_key
    }

    pub fn is_boundary(&self) -> bool {
        self.is_boundary
    }

    pub fn spawn_token(&self) -> i32 {
        self.spawn_token
    }

    pub fn obstacle_count(&self) -> u8 {
        self.obstacle_count.load(Ordering::Acquire)
    }

    pub fn occupant_count(&self) -> u8 {
        self.occupant_count.load(Ordering::Acquire)
    }

    pub fn cached_grid_version(&self) -> u32 {
        self.cached_grid_version.load(Ordering::Acquire)
    }

    pub fn is_allocated(&self) -> bool {
        self.is_allocated.load(Ordering::Acquire)
    }

    /// Blocked: at least one obstacle token applied.
    pub fn is_blocked(&self) -> bool {
        self.is_allocated() && self.obstacle_count() > 0
    }

    /// Can accept another obstacle token: not at capacity and not occupied.
    pub fn is_blockable(&self) -> bool {
        self.is_allocated()
            && self.obstacle_count() < MAX_OBSTACLE_COUNT
            && !self.is_occupied()
    }

    pub fn is_occupied(&self) -> bool {
        self.is_allocated() && self.occupant_count() > 0
    }

    /// Can accept another occupant: not blocked and below capacity.
    pub fn has_vacancy(&self) -> bool {
        !self.is_blocked() && self.occupant_count() < MAX_OCCUPANT_COUNT
    }

    /// Observer registry for obstacle changes on this voxel.
    pub fn on_obstacle_change(&self) -> &ObserverList<ObstacleChange> {
        &self.obstacle_observers
    }

    /// Observer registry for occupant changes on this voxel.
    pub fn on_occupant_change(&self) -> &ObserverList<OccupantChange> {
        &self.occupant_observers
    }

    // ------------------------------------------------------------------
    // Obstacle tracking (callers hold the owning grid's mutation lock)
    // ------------------------------------------------------------------

    /// Apply `token`. Rejects duplicates and rejects at capacity.
    pub(crate) fn try_track_obstacle(&self, token: i32) -> bool {
        let mut tracker = self.obstacle_tracker.lock();
        if self.obstacle_count.load(Ordering::Acquire) >= MAX_OBSTACLE_COUNT {
            return false;
        }
        let set = tracker.get_or_insert_with(FxHashSet::default);
        if !set.insert(token) {
            return false;
        }
        self.obstacle_count.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Clear `token`. The tracker is dropped once the last token clears.
    pub(crate) fn try_untrack_obstacle(&self, token: i32) -> bool {
        let mut tracker = self.obstacle_tracker.lock();
        let Some(set) = tracker.as_mut() else {
            return false;
        };
        if !set.remove(&token) {
            return false;
        }
        let previous = self.obstacle_count.fetch_sub(1, Ordering::AcqRel);
        if previous <= 1 {
            *tracker = None;
        }
        true
    }

    /// Number of distinct obstacle tokens currently applied.
    pub fn tracked_obstacle_count(&self) -> usize {
        self.obstacle_tracker
            .lock()
            .as_ref()
            .map_or(0, |set| set.len())
    }

    pub fn has_obstacle_token(&self, token: i32) -> bool {
        self.obstacle_tracker
            .lock()
            .as_ref()
            .is_some_and(|set| set.contains(&token))
    }

    pub(crate) fn increment_occupants(&self) {
        self.occupant_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn decrement_occupants(&self) {
        self.occupant_count.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn set_cached_grid_version(&self, version: u32) {
        self.cached_grid_version.store(version, Ordering::Release);
    }

    // ------------------------------------------------------------------
    // Partitions
    // ------------------------------------------------------------------

    /// Attach a typed partition. At most one per concrete type; the
    /// partition's add callback runs after the provider lock is released.
    pub fn try_add_partition<P: VoxelPartition>(&self, partition: Arc<P>) -> bool {
        if !self.is_allocated() {
            return false;
        }
        let inserted = {
            let mut provider = self.partitions.lock();
            provider.insert(self.spawn_token, TypeId::of::<P>(), partition.clone())
        };
        if inserted {
            dispatch_partition_callback(|| partition.on_added_to_voxel(self));
        }
        inserted
    }

    /// Detach the partition of type `P`, firing its removal callback.
    pub fn try_remove_partition<P: VoxelPartition>(&self) -> bool {
        let removed = {
            let mut provider = self.partitions.lock();
            provider.remove(TypeId::of::<P>())
        };
        match removed {
            Some(partition) => {
                dispatch_partition_callback(|| partition.on_removed_from_voxel(self));
                true
            }
            None => false,
        }
    }

    pub fn try_get_partition<P: VoxelPartition>(&self) -> Option<Arc<P>> {
        let value = self.partitions.lock().get(TypeId::of::<P>())?;
        downcast_partition(value)
    }

    /// Resolve the partition of type `P`, attaching a default-constructed
    /// one when absent.
    pub fn get_partition_or_default<P: VoxelPartition + Default>(&self) -> Option<Arc<P>> {
        if let Some(existing) = self.try_get_partition::<P>() {
            return Some(existing);
        }
        if !self.is_allocated() {
            return None;
        }
        let fresh = Arc::new(P::default());
        let inserted = {
            let mut provider = self.partitions.lock();
            provider.insert(self.spawn_token, TypeId::of::<P>(), fresh.clone())
        };
        if inserted {
            dispatch_partition_callback(|| fresh.on_added_to_voxel(self));
            Some(fresh)
        } else {
            // Lost a race; somebody else attached one in between.
            self.try_get_partition::<P>()
        }
    }

    pub fn has_partition<P: VoxelPartition>(&self) -> bool {
        self.partitions.lock().contains(TypeId::of::<P>())
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.lock().len()
    }

    pub fn partition_key_of<P: VoxelPartition>(&self) -> Option<i32> {
        self.partitions.lock().key_of(TypeId::of::<P>())
    }

    // ------------------------------------------------------------------
    // Neighbors
    // ------------------------------------------------------------------

    /// Forget cached neighbor identities; the next query recomputes them.
    pub fn invalidate_neighbor_cache(&self) {
        let mut cache = self.neighbors.lock();
        cache.valid = false;
    }

    pub(crate) fn neighbor_cache_valid(&self) -> bool {
        self.neighbors.lock().valid
    }

    /// The surrounding voxels, including cross-grid neighbors for boundary
    /// voxels, tagged with their direction. Unresolvable entries are
    /// skipped, so the result holds at most 26 pairs.
    pub fn get_neighbors(
        &self,
        manager: &GlobalGridManager,
        use_cache: bool,
    ) -> Vec<(SpatialDirection, Arc<Voxel>)> {
        let entries = self.neighbor_entries(manager, use_cache);
        let mut resolved = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            let Some(index) = entry else { continue };
            if let Some(voxel) = manager.try_get_voxel_global(*index) {
                resolved.push((SpatialDirection::from_index(i), voxel));
            }
        }
        resolved
    }

    /// Single neighbor in `direction`, if one exists.
    pub fn try_get_neighbor_from_direction(
        &self,
        manager: &GlobalGridManager,
        direction: SpatialDirection,
        use_cache: bool,
    ) -> Option<Arc<Voxel>> {
        let slot = direction.index()?;
        let entries = self.neighbor_entries(manager, use_cache);
        entries[slot].and_then(|index| manager.try_get_voxel_global(index))
    }

    /// Neighbor at a local offset, resolved through the owning grid only:
    /// offsets landing outside the grid return `None`.
    pub fn try_get_neighbor_from_offset(
        &self,
        manager: &GlobalGridManager,
        dx: i32,
        dy: i32,
        dz: i32,
    ) -> Option<Arc<Voxel>> {
        let grid = manager.try_get_grid_global(self.global_index)?;
        grid.try_get_voxel(self.global_index.local.offset(dx, dy, dz))
    }

    /// Cached identity triples, recomputing when invalid or bypassed.
    ///
    /// The rebuild runs without holding the cache lock: it reads through the
    /// registry, and the registry's write paths invalidate this cache, so
    /// nesting the two would invert lock order. A racing rebuild is wasted
    /// work, not an error.
    fn neighbor_entries(
        &self,
        manager: &GlobalGridManager,
        use_cache: bool,
    ) -> Box<[Option<GlobalVoxelIndex>; 26]> {
        if use_cache {
            let cache = self.neighbors.lock();
            if cache.valid {
                if let Some(entries) = cache.entries.as_ref() {
                    return entries.clone();
                }
            }
        }

        let fresh = self.compute_neighbor_entries(manager);
        let mut cache = self.neighbors.lock();
        cache.entries = Some(fresh.clone());
        cache.valid = true;
        fresh
    }

    fn compute_neighbor_entries(
        &self,
        manager: &GlobalGridManager,
    ) -> Box<[Option<GlobalVoxelIndex>; 26]> {
        let mut entries: Box<[Option<GlobalVoxelIndex>; 26]> = Box::new([None; 26]);
        let Some(grid) = manager.try_get_grid_global(self.global_index) else {
            return entries;
        };
        let voxel_size = manager.voxel_size();
        for (i, &(dx, dy, dz)) in DIRECTION_OFFSETS.iter().enumerate() {
            let candidate = self.global_index.local.offset(dx, dy, dz);
            if grid.contains_index(candidate) {
                entries[i] = Some(GlobalVoxelIndex::new(
                    self.global_index.grid_index,
                    candidate,
                    self.global_index.grid_token,
                ));
            } else if self.is_boundary {
                // Fall through to an adjoining grid, resolved by position.
                let neighbor_position =
                    self.world_position + FixedVec3::from_i32(dx, dy, dz) * voxel_size;
                entries[i] = manager
                    .try_get_voxel(neighbor_position)
                    .map(|voxel| voxel.global_index());
            }
        }
        entries
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Tear the voxel down: partitions detach (with callbacks), obstacle and
    /// occupant state clears, and the voxel reports unallocated to any stale
    /// handle still holding it.
    pub(crate) fn reset(&self) {
        self.is_allocated.store(false, Ordering::Release);

        let drained = self.partitions.lock().drain();
        for partition in drained {
            dispatch_partition_callback(|| partition.on_removed_from_voxel(self));
        }

        *self.obstacle_tracker.lock() = None;
        self.obstacle_count.store(0, Ordering::Release);
        self.occupant_count.store(0, Ordering::Release);

        let mut cache = self.neighbors.lock();
        cache.entries = None;
        cache.valid = false;
        drop(cache);

        self.obstacle_observers.clear();
        self.occupant_observers.clear();
    }
}

fn dispatch_partition_callback(callback: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        error!("voxel partition callback panicked; dropping the panic");
    }
}

impl std::fmt::Debug for Voxel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voxel")
            .field("global_index", &self.global_index)
            .field("world_position", &self.world_position)
            .field("is_boundary", &self.is_boundary)
            .field("obstacle_count", &self.obstacle_count())
            .field("occupant_count", &self.occupant_count())
            .field("is_allocated", &self.is_allocated())
            .finish()
    }
}
