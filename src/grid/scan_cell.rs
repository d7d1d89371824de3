use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::occupant::VoxelOccupant;

use super::GlobalVoxelIndex;

/// Per-voxel occupant storage issuing stable tickets.
///
/// A ticket is the slot index the occupant landed in; removal tombstones the
/// slot and recycles it later, so tickets held by other occupants stay valid
/// across removals. This is what makes occupant removal O(1).
pub(crate) struct OccupantBucket {
    slots: Vec<Option<Arc<dyn VoxelOccupant>>>,
    free: SmallVec<[i32; 4]>,
    len: u32,
}

impl OccupantBucket {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: SmallVec::new(),
            len: 0,
        }
    }

    fn insert(&mut self, occupant: Arc<dyn VoxelOccupant>) -> i32 {
        self.len += 1;
        match self.free.pop() {
            Some(ticket) => {
                self.slots[ticket as usize] = Some(occupant);
                ticket
            }
            None => {
                self.slots.push(Some(occupant));
                (self.slots.len() - 1) as i32
            }
        }
    }

    /// Remove by ticket; the stored occupant must be the same object.
    fn remove(&mut self, ticket: i32, expected: &Arc<dyn VoxelOccupant>) -> bool {
        let Some(slot) = self.slots.get_mut(ticket as usize) else {
            return false;
        };
        let matches = slot
            .as_ref()
            .is_some_and(|held| Arc::ptr_eq(held, expected));
        if !matches {
            return false;
        }
        *slot = None;
        self.free.push(ticket);
        self.len -= 1;
        true
    }

    fn get(&self, ticket: i32) -> Option<Arc<dyn VoxelOccupant>> {
        self.slots.get(ticket as usize)?.as_ref().map(Arc::clone)
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<dyn VoxelOccupant>> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }

    fn len(&self) -> u32 {
        self.len
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Default)]
struct ScanCellState {
    occupants: Option<FxHashMap<GlobalVoxelIndex, OccupantBucket>>,
}

/// Coarse partition of one grid's voxels.
///
/// Each scan cell covers `scan_cell_size³` voxels and holds the occupant
/// buckets for the voxels inside it. The grid's active-scan-cell set tracks
/// which cells currently hold any occupant, which lets bulk queries skip
/// empty regions without touching voxels.
pub struct ScanCell {
    grid_index: u16,
    cell_key: i32,
    spawn_token: i32,
    occupant_count: AtomicU32,
    is_allocated: AtomicBool,
    state: Mutex<ScanCellState>,
}

impl ScanCell {
    pub(crate) fn new(grid_index: u16, cell_key: i32, spawn_token: i32) -> Self {
        Self {
            grid_index,
            cell_key,
            spawn_token,
            occupant_count: AtomicU32::new(0),
            is_allocated: AtomicBool::new(true),
            state: Mutex::new(ScanCellState::default()),
        }
    }

    pub fn grid_index(&self) -> u16 {
        self.grid_index
    }

    pub fn cell_key(&self) -> i32 {
        self.cell_key
    }

    pub fn spawn_token(&self) -> i32 {
        self.spawn_token
    }

    pub fn occupant_count(&self) -> u32 {
        self.occupant_count.load(Ordering::Acquire)
    }

    pub fn is_allocated(&self) -> bool {
        self.is_allocated.load(Ordering::Acquire)
    }

    pub fn is_occupied(&self) -> bool {
        self.is_allocated() && self.occupant_count() > 0
    }

    /// Insert `occupant` into the bucket for `index` and hand the issued
    /// ticket to the occupant's own bookkeeping.
    pub fn add_occupant(&self, index: GlobalVoxelIndex, occupant: &Arc<dyn VoxelOccupant>) -> i32 {
        let ticket = {
            let mut state = self.state.lock();
            let buckets = state.occupants.get_or_insert_with(FxHashMap::default);
            buckets
                .entry(index)
                .or_insert_with(OccupantBucket::new)
                .insert(Arc::clone(occupant))
        };
        occupant.set_occupancy(index, ticket);
        self.occupant_count.fetch_add(1, Ordering::AcqRel);
        ticket
    }

    /// Remove the occupant holding `ticket` in the bucket for `index`.
    ///
    /// The occupant's own record is cleared first in all cases, so a caller
    /// that lost a race is still left with consistent client state. Returns
    /// false when the bucket or ticket does not resolve to this occupant.
    pub fn try_remove_occupant(
        &self,
        index: GlobalVoxelIndex,
        occupant: &Arc<dyn VoxelOccupant>,
        ticket: i32,
    ) -> bool {
        occupant.remove_occupancy(index);

        let mut state = self.state.lock();
        let Some(buckets) = state.occupants.as_mut() else {
            return false;
        };
        let Some(bucket) = buckets.get_mut(&index) else {
            return false;
        };
        if !bucket.remove(ticket, occupant) {
            return false;
        }
        if bucket.is_empty() {
            buckets.remove(&index);
        }
        if buckets.is_empty() {
            state.occupants = None;
        }
        drop(state);

        self.occupant_count.fetch_sub(1, Ordering::AcqRel);
        true
    }

    /// Snapshot of every occupant in the cell.
    pub fn get_occupants(&self) -> Vec<Arc<dyn VoxelOccupant>> {
        let state = self.state.lock();
        match state.occupants.as_ref() {
            Some(buckets) => buckets
                .values()
                .flat_map(|bucket| bucket.iter().map(Arc::clone))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Snapshot of the occupants bound to one voxel.
    pub fn get_occupants_for(&self, index: GlobalVoxelIndex) -> Vec<Arc<dyn VoxelOccupant>> {
        let state = self.state.lock();
        match state.occupants.as_ref().and_then(|map| map.get(&index)) {
            Some(bucket) => bucket.iter().map(Arc::clone).collect(),
            None => Vec::new(),
        }
    }

    /// Snapshot of occupants whose group id satisfies `group_predicate`.
    pub fn get_conditional_occupants(
        &self,
        group_predicate: impl Fn(i32) -> bool,
    ) -> Vec<Arc<dyn VoxelOccupant>> {
        let state = self.state.lock();
        match state.occupants.as_ref() {
            Some(buckets) => buckets
                .values()
                .flat_map(|bucket| bucket.iter())
                .filter(|occupant| group_predicate(occupant.group_id()))
                .map(Arc::clone)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Resolve one occupant by voxel and ticket.
    pub fn try_get_occupant_at(
        &self,
        index: GlobalVoxelIndex,
        ticket: i32,
    ) -> Option<Arc<dyn VoxelOccupant>> {
        let state = self.state.lock();
        state
            .occupants
            .as_ref()
            .and_then(|map| map.get(&index))
            .and_then(|bucket| bucket.get(ticket))
    }

    /// Number of occupants bound to one voxel.
    pub fn occupant_count_for(&self, index: GlobalVoxelIndex) -> u32 {
        let state = self.state.lock();
        state
            .occupants
            .as_ref()
            .and_then(|map| map.get(&index))
            .map_or(0, |bucket| bucket.len())
    }

    /// Drop all occupant state and mark the cell deallocated. Stale handles
    /// observe `is_allocated() == false` afterwards.
    pub(crate) fn reset(&self) {
        self.is_allocated.store(false, Ordering::Release);
        let mut state = self.state.lock();
        state.occupants = None;
        drop(state);
        self.occupant_count.store(0, Ordering::Release);
    }
}

impl std::fmt::Debug for ScanCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCell")
            .field("grid_index", &self.grid_index)
            .field("cell_key", &self.cell_key)
            .field("occupant_count", &self.occupant_count())
            .field("is_allocated", &self.is_allocated())
            .finish()
    }
}
