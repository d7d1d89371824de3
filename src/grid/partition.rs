use std::any::{Any, TypeId};
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::hashing::partition_key;

use super::Voxel;

/// Extension object attachable to a voxel, keyed by its concrete type.
///
/// Implementors get lifecycle callbacks when they are attached to or removed
/// from a voxel. Callbacks run outside the voxel's partition lock and must
/// not assume exclusive access to the voxel. Removal callbacks can also fire
/// during grid teardown, so they must not call back into the mutation
/// facades of the grid they are detaching from.
pub trait VoxelPartition: Any + Send + Sync {
    fn on_added_to_voxel(&self, _voxel: &Voxel) {}
    fn on_removed_from_voxel(&self, _voxel: &Voxel) {}
}

struct PartitionEntry {
    /// Identity key: the owning voxel's spawn token XOR the type tag.
    key: i32,
    value: Arc<dyn VoxelPartition>,
}

/// Typed dictionary of partitions owned by one voxel.
///
/// At most one partition per concrete type. The map itself is lazily
/// allocated; most voxels never carry a partition.
#[derive(Default)]
pub struct PartitionProvider {
    entries: Option<FxHashMap<TypeId, PartitionEntry>>,
}

impl PartitionProvider {
    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |map| map.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, type_id: TypeId) -> bool {
        self.entries
            .as_ref()
            .is_some_and(|map| map.contains_key(&type_id))
    }

    pub(crate) fn insert(
        &mut self,
        spawn_token: i32,
        type_id: TypeId,
        value: Arc<dyn VoxelPartition>,
    ) -> bool {
        let map = self.entries.get_or_insert_with(FxHashMap::default);
        if map.contains_key(&type_id) {
            return false;
        }
        let key = partition_key(spawn_token, type_tag(type_id));
        map.insert(type_id, PartitionEntry { key, value });
        true
    }

    pub(crate) fn remove(&mut self, type_id: TypeId) -> Option<Arc<dyn VoxelPartition>> {
        let map = self.entries.as_mut()?;
        let removed = map.remove(&type_id).map(|entry| entry.value);
        if map.is_empty() {
            self.entries = None;
        }
        removed
    }

    pub(crate) fn get(&self, type_id: TypeId) -> Option<Arc<dyn VoxelPartition>> {
        self.entries
            .as_ref()
            .and_then(|map| map.get(&type_id))
            .map(|entry| Arc::clone(&entry.value))
    }

    pub(crate) fn key_of(&self, type_id: TypeId) -> Option<i32> {
        self.entries
            .as_ref()
            .and_then(|map| map.get(&type_id))
            .map(|entry| entry.key)
    }

    /// Empty the provider, returning the partitions so the caller can fire
    /// their removal callbacks outside its own critical section.
    pub(crate) fn drain(&mut self) -> Vec<Arc<dyn VoxelPartition>> {
        match self.entries.take() {
            Some(map) => map.into_values().map(|entry| entry.value).collect(),
            None => Vec::new(),
        }
    }
}

/// Downcast a stored partition to its concrete type.
pub(crate) fn downcast_partition<T: VoxelPartition>(
    value: Arc<dyn VoxelPartition>,
) -> Option<Arc<T>> {
    let any: Arc<dyn Any + Send + Sync> = value;
    any.downcast::<T>().ok()
}

/// Fold a `TypeId` to the 32-bit tag space used by partition keys.
fn type_tag(type_id: TypeId) -> i32 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    type_id.hash(&mut hasher);
    let bits = hasher.finish();
    (bits ^ (bits >> 32)) as i32
}
