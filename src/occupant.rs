//! Occupant trait and the thread-safe occupant mutation facade.
//!
//! An occupant is any object a client binds into voxels: an agent, a unit, a
//! sensor. Occupants keep their own record of where they are bound (index →
//! ticket); the facade keeps the voxel, scan cell, and grid aggregates in
//! step under the owning grid's mutation lock.

use std::any::Any;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::collections::ObserverList;
use crate::events::{ChangeKind, OccupantChange};
use crate::fixed_math::FixedVec3;
use crate::grid::{GlobalVoxelIndex, Voxel, VoxelGrid, VoxelIndex};

/// An object that can occupy voxels.
///
/// Implementors carry their own occupancy bookkeeping — the standard way is
/// to embed an [`OccupancyMap`] and delegate the three occupancy methods to
/// it. `position` feeds distance filtering in radius scans; `group_id` feeds
/// group predicates.
pub trait VoxelOccupant: Any + Send + Sync {
    fn position(&self) -> FixedVec3;

    fn group_id(&self) -> i32 {
        0
    }

    /// Record that this occupant holds `ticket` in the scan-cell bucket for
    /// `index`. Called by the scan cell while the binding is made.
    fn set_occupancy(&self, index: GlobalVoxelIndex, ticket: i32);

    /// Clear the record for `index`. Always called during removal, even when
    /// the bucket-side removal subsequently fails, so client state never
    /// leaks a dead binding.
    fn remove_occupancy(&self, index: GlobalVoxelIndex);

    /// Ticket this occupant holds for `index`, if bound there.
    fn ticket_for(&self, index: GlobalVoxelIndex) -> Option<i32>;
}

/// Standard occupancy bookkeeping for [`VoxelOccupant`] implementors.
#[derive(Default)]
pub struct OccupancyMap {
    map: Mutex<FxHashMap<GlobalVoxelIndex, i32>>,
}

impl OccupancyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, index: GlobalVoxelIndex, ticket: i32) {
        self.map.lock().insert(index, ticket);
    }

    pub fn remove(&self, index: GlobalVoxelIndex) {
        self.map.lock().remove(&index);
    }

    pub fn get(&self, index: GlobalVoxelIndex) -> Option<i32> {
        self.map.lock().get(&index).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.lock().len()
    }
}

static OCCUPANT_EVENTS: Lazy<ObserverList<OccupantChange>> = Lazy::new(ObserverList::new);

/// Observer registry for occupant changes across all grids.
pub fn on_occupant_change() -> &'static ObserverList<OccupantChange> {
    &OCCUPANT_EVENTS
}

/// Bind `occupant` into `voxel`.
///
/// Fails when the occupant is already bound to this voxel, the voxel has no
/// vacancy (blocked or at capacity), or the voxel's scan cell cannot be
/// resolved. On success the scan cell issues a ticket, the voxel and grid
/// counters are updated under the grid's mutation lock, and change events
/// fire after the lock is released.
pub fn try_add_voxel_occupant(
    grid: &VoxelGrid,
    voxel: &Voxel,
    occupant: &Arc<dyn VoxelOccupant>,
) -> bool {
    let index = voxel.global_index();
    if occupant.ticket_for(index).is_some() {
        return false;
    }
    if !voxel.has_vacancy() {
        return false;
    }
    let Some(scan_cell) = grid.try_get_scan_cell(voxel.scan_cell_key()) else {
        return false;
    };

    {
        let _guard = grid.mutation_lock();
        // Vacancy can change between the pre-check and the lock.
        if !voxel.has_vacancy() {
            return false;
        }
        scan_cell.add_occupant(index, occupant);
        grid.mark_scan_cell_active(voxel.scan_cell_key());
        voxel.increment_occupants();
        grid.bump_version();
    }

    let event = OccupantChange {
        kind: ChangeKind::Add,
        index,
    };
    OCCUPANT_EVENTS.notify(&event);
    voxel.on_occupant_change().notify(&event);
    true
}

/// Release `occupant` from `voxel`.
///
/// Fails when the occupant is not bound to this voxel, the voxel holds no
/// occupants, or the scan cell cannot be resolved. The occupant's own
/// binding record is cleared even when the bucket-side removal loses a race.
pub fn try_remove_voxel_occupant(
    grid: &VoxelGrid,
    voxel: &Voxel,
    occupant: &Arc<dyn VoxelOccupant>,
) -> bool {
    let index = voxel.global_index();
    let Some(ticket) = occupant.ticket_for(index) else {
        return false;
    };
    if !voxel.is_occupied() {
        return false;
    }
    let Some(scan_cell) = grid.try_get_scan_cell(voxel.scan_cell_key()) else {
        return false;
    };

    let removed = {
        let _guard = grid.mutation_lock();
        let removed = scan_cell.try_remove_occupant(index, occupant, ticket);
        if removed {
            if !scan_cell.is_occupied() {
                grid.mark_scan_cell_inactive(voxel.scan_cell_key());
            }
            voxel.decrement_occupants();
            grid.bump_version();
        }
        removed
    };
    if !removed {
        return false;
    }

    let event = OccupantChange {
        kind: ChangeKind::Remove,
        index,
    };
    OCCUPANT_EVENTS.notify(&event);
    voxel.on_occupant_change().notify(&event);
    true
}

/// Index overload: resolve the voxel inside `grid`, then bind.
pub fn try_add_occupant_at(
    grid: &VoxelGrid,
    index: VoxelIndex,
    occupant: &Arc<dyn VoxelOccupant>,
) -> bool {
    match grid.try_get_voxel(index) {
        Some(voxel) => try_add_voxel_occupant(grid, &voxel, occupant),
        None => false,
    }
}

/// Position overload: resolve the containing voxel, then bind.
pub fn try_add_occupant_at_position(
    grid: &VoxelGrid,
    position: FixedVec3,
    occupant: &Arc<dyn VoxelOccupant>,
) -> bool {
    match grid.try_get_voxel_at(position) {
        Some(voxel) => try_add_voxel_occupant(grid, &voxel, occupant),
        None => false,
    }
}

/// Index overload: resolve the voxel inside `grid`, then release.
pub fn try_remove_occupant_at(
    grid: &VoxelGrid,
    index: VoxelIndex,
    occupant: &Arc<dyn VoxelOccupant>,
) -> bool {
    match grid.try_get_voxel(index) {
        Some(voxel) => try_remove_voxel_occupant(grid, &voxel, occupant),
        None => false,
    }
}

/// Position overload: resolve the containing voxel, then release.
pub fn try_remove_occupant_at_position(
    grid: &VoxelGrid,
    position: FixedVec3,
    occupant: &Arc<dyn VoxelOccupant>,
) -> bool {
    match grid.try_get_voxel_at(position) {
        Some(voxel) => try_remove_voxel_occupant(grid, &voxel, occupant),
        None => false,
    }
}

/// Downcast a shared occupant to its concrete type.
pub fn downcast_occupant<T: VoxelOccupant>(occupant: Arc<dyn VoxelOccupant>) -> Option<Arc<T>> {
    let any: Arc<dyn Any + Send + Sync> = occupant;
    any.downcast::<T>().ok()
}
