//! Registry lifecycle scenarios: registration, duplicate detection,
//! adjacency, and teardown.

mod common;

use common::{add_grid, grid_config, manager};
use goshawk::{FixedVec3, GridAddResult, SpatialDirection, VoxelIndex};

#[test]
fn test_grid_addition_and_voxel_lookup() {
    let manager = manager();
    let slot = add_grid(&manager, (-10.0, 0.0, -10.0), (10.0, 0.0, 10.0));

    let grid = manager.try_get_grid(slot).expect("grid resolves by slot");
    assert_eq!((grid.width(), grid.height(), grid.length()), (21, 1, 21));

    let voxel = manager
        .try_get_voxel(FixedVec3::ZERO)
        .expect("origin voxel resolves");
    assert_eq!(voxel.global_index().grid_index, slot);
    assert_eq!(voxel.world_position(), FixedVec3::ZERO);
}

#[test]
fn test_duplicate_grid_is_rejected_and_count_stable() {
    let manager = manager();
    let cfg = grid_config((-10.0, 0.0, -10.0), (10.0, 0.0, 10.0));

    let slot = match manager.try_add_grid(cfg) {
        GridAddResult::Success(slot) => slot,
        other => panic!("first add must succeed, got {other:?}"),
    };
    assert_eq!(
        manager.try_add_grid(cfg),
        GridAddResult::AlreadyExists(slot)
    );
    assert_eq!(manager.grid_count(), 1);
}

#[test]
fn test_two_grid_neighbor_link_and_unlink() {
    let manager = manager();
    let first = add_grid(&manager, (-10.0, 0.0, -10.0), (10.0, 0.0, 10.0));
    let second = add_grid(&manager, (10.0, 0.0, 10.0), (30.0, 0.0, 30.0));

    let grid_a = manager.try_get_grid(first).unwrap();
    let grid_b = manager.try_get_grid(second).unwrap();

    let a_to_b = goshawk::manager::get_neighbor_direction(&grid_a, &grid_b);
    assert!(
        grid_a.get_grid_neighbors_in_direction(a_to_b).contains(&second),
        "forward link present"
    );
    assert!(
        grid_b
            .get_grid_neighbors_in_direction(a_to_b.opposite())
            .contains(&first),
        "reverse link present"
    );

    assert!(manager.try_remove_grid(second));
    assert!(
        grid_a.get_grid_neighbors_in_direction(a_to_b).is_empty(),
        "removing a grid unlinks its neighbors"
    );
    assert!(!grid_a.is_conjoined());
}

#[test]
fn test_spatial_cells_match_grid_bounds() {
    let manager = manager();
    let slot = add_grid(&manager, (-60.0, 0.0, -60.0), (60.0, 0.0, 60.0));
    let grid = manager.try_get_grid(slot).unwrap();

    let cells = manager.get_spatial_grid_cells(
        grid.config().bounds_min,
        grid.config().bounds_max,
    );
    // -60..60 spans three 50-unit cells on x and z, one on y.
    assert_eq!(cells.len(), 9);

    // Every covered cell resolves this grid by a position inside it.
    for x in [-55.0f32, 0.0, 55.0] {
        for z in [-55.0f32, 0.0, 55.0] {
            let found = manager
                .try_get_grid_at(FixedVec3::from_f32(x, 0.0, z))
                .expect("covered position resolves");
            assert_eq!(found.global_index(), slot);
        }
    }
}

#[test]
fn test_cross_boundary_neighbors_resolve_after_linking() {
    let manager = manager();
    // Two grids sharing the x = 10 face.
    let west = add_grid(&manager, (0.0, 0.0, 0.0), (10.0, 0.0, 10.0));
    let east = add_grid(&manager, (10.0, 0.0, 0.0), (20.0, 0.0, 10.0));

    let west_grid = manager.try_get_grid(west).unwrap();
    let east_grid = manager.try_get_grid(east).unwrap();
    assert!(west_grid.is_conjoined());

    // The east-face voxel of the west grid finds a neighbor in the east
    // grid through the registry.
    let face_voxel = west_grid
        .try_get_voxel(VoxelIndex::new(10, 0, 5))
        .expect("face voxel");
    let neighbor = face_voxel
        .try_get_neighbor_from_direction(&manager, SpatialDirection::East, true)
        .expect("cross-grid neighbor resolves");
    assert_eq!(neighbor.global_index().grid_index, east);
    assert_eq!(
        neighbor.world_position(),
        FixedVec3::from_f32(11.0, 0.0, 5.0)
    );

    // Interior voxels never cross grids.
    let interior = west_grid.try_get_voxel(VoxelIndex::new(5, 0, 5)).unwrap();
    let east_of_interior = interior
        .try_get_neighbor_from_direction(&manager, SpatialDirection::East, true)
        .expect("in-grid neighbor");
    assert_eq!(east_of_interior.global_index().grid_index, west);

    // Offset lookups stay inside the owning grid.
    assert!(face_voxel
        .try_get_neighbor_from_offset(&manager, 1, 0, 0)
        .is_none());
    assert_eq!(east_grid.global_index(), east);
}

#[test]
fn test_neighbor_enumeration_counts() {
    let manager = manager();
    let slot = add_grid(&manager, (0.0, 0.0, 0.0), (4.0, 4.0, 4.0));
    let grid = manager.try_get_grid(slot).unwrap();

    // A fully interior voxel has all 26 neighbors.
    let interior = grid.try_get_voxel(VoxelIndex::new(2, 2, 2)).unwrap();
    assert_eq!(interior.get_neighbors(&manager, true).len(), 26);

    // A corner voxel of a lone grid has 7.
    let corner = grid.try_get_voxel(VoxelIndex::new(0, 0, 0)).unwrap();
    assert_eq!(corner.get_neighbors(&manager, true).len(), 7);

    // Directions are unique within one enumeration.
    let mut dirs: Vec<SpatialDirection> = interior
        .get_neighbors(&manager, true)
        .into_iter()
        .map(|(dir, _)| dir)
        .collect();
    let before = dirs.len();
    dirs.sort_by_key(|dir| *dir as i8);
    dirs.dedup();
    assert_eq!(dirs.len(), before);
}

#[test]
fn test_reset_releases_grids_and_version_restarts() {
    let manager = manager();
    add_grid(&manager, (0.0, 0.0, 0.0), (5.0, 1.0, 5.0));
    add_grid(&manager, (20.0, 0.0, 20.0), (25.0, 1.0, 25.0));
    assert!(manager.version() >= 1);

    manager.reset();
    assert!(!manager.is_active());
    assert_eq!(manager.grid_count(), 0);

    manager.setup_default();
    assert_eq!(manager.version(), 1);
    assert_eq!(manager.grid_count(), 0);
    // A fresh registration works after the restart.
    add_grid(&manager, (0.0, 0.0, 0.0), (5.0, 1.0, 5.0));
}
