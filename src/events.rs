//! Change-event payloads emitted by the registry and the mutation facades.
//!
//! Events are dispatched through [`crate::collections::ObserverList`]s after
//! the critical section they describe, so an observer that re-reads under the
//! same lock discipline always sees the post-mutation state.

use crate::grid::GlobalVoxelIndex;

/// Whether a change added or removed state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Add,
    Remove,
}

/// A grid entered or left the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridChange {
    pub kind: ChangeKind,
    pub grid_index: u16,
}

/// An obstacle token was applied to or cleared from a voxel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObstacleChange {
    pub kind: ChangeKind,
    pub index: GlobalVoxelIndex,
}

/// An occupant was bound to or released from a voxel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OccupantChange {
    pub kind: ChangeKind,
    pub index: GlobalVoxelIndex,
}
