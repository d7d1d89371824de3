//! Obstacle and occupant mutation scenarios, including the aggregate
//! counter and active-scan-cell invariants.

mod common;

use std::sync::Arc;

use common::{add_grid, manager, TestOccupant};
use goshawk::{
    mix_hash, obstacle, occupant, scan, FixedVec3, VoxelIndex, VoxelOccupant,
};

#[test]
fn test_obstacle_apply_and_remove_round_trip() {
    let manager = manager();
    let slot = add_grid(&manager, (-10.0, 0.0, -10.0), (10.0, 0.0, 10.0));
    let grid = manager.try_get_grid(slot).unwrap();
    let voxel = manager.try_get_voxel(FixedVec3::ZERO).unwrap();

    let min = FixedVec3::from_f32(-10.0, 0.0, -10.0);
    let max = FixedVec3::from_f32(10.0, 0.0, 10.0);
    let token = mix_hash(7, min.hash_value(), max.hash_value());

    assert!(obstacle::try_add_obstacle(&grid, &voxel, token));
    assert!(voxel.is_blocked());
    assert_eq!(voxel.obstacle_count(), 1);
    assert_eq!(grid.obstacle_count(), 1);

    // Duplicate token: rejected, counts unchanged.
    assert!(!obstacle::try_add_obstacle(&grid, &voxel, token));
    assert_eq!(voxel.obstacle_count(), 1);
    assert_eq!(grid.obstacle_count(), 1);

    assert!(obstacle::try_remove_obstacle(&grid, &voxel, token));
    assert!(!voxel.is_blocked());
    assert_eq!(grid.obstacle_count(), 0);

    // Removing from an unblocked voxel is rejected.
    assert!(!obstacle::try_remove_obstacle(&grid, &voxel, token));
}

#[test]
fn test_grid_obstacle_count_sums_voxel_counts() {
    let manager = manager();
    let slot = add_grid(&manager, (0.0, 0.0, 0.0), (8.0, 0.0, 8.0));
    let grid = manager.try_get_grid(slot).unwrap();

    let targets = [(0, 0), (1, 3), (4, 4), (8, 8)];
    let mut per_voxel_total = 0;
    for (i, (x, z)) in targets.iter().enumerate() {
        let voxel = grid.try_get_voxel(VoxelIndex::new(*x, 0, *z)).unwrap();
        for t in 0..=i as i32 {
            assert!(obstacle::try_add_obstacle(&grid, &voxel, 100 + t));
        }
        per_voxel_total += voxel.obstacle_count() as i32;
    }
    assert_eq!(grid.obstacle_count(), per_voxel_total);
    assert_eq!(grid.obstacle_count(), 1 + 2 + 3 + 4);
}

#[test]
fn test_obstacle_version_bump_signals_voxel_cache() {
    let manager = manager();
    let slot = add_grid(&manager, (0.0, 0.0, 0.0), (4.0, 0.0, 4.0));
    let grid = manager.try_get_grid(slot).unwrap();
    let voxel = grid.try_get_voxel(VoxelIndex::new(2, 0, 2)).unwrap();

    let before = grid.version();
    assert!(obstacle::try_add_obstacle(&grid, &voxel, 1));
    assert!(grid.version() > before, "mutation bumps the grid version");
    assert_eq!(voxel.cached_grid_version(), grid.version());
}

#[test]
fn test_occupant_lifecycle_with_ticket() {
    let manager = manager();
    let slot = add_grid(&manager, (-10.0, 0.0, -10.0), (10.0, 0.0, 10.0));
    let grid = manager.try_get_grid(slot).unwrap();
    let voxel = manager
        .try_get_voxel(FixedVec3::from_f32(6.0, 0.0, 6.0))
        .unwrap();

    let agent = TestOccupant::at(6.0, 0.0, 6.0);
    let agent_dyn: Arc<dyn VoxelOccupant> = agent.clone();

    assert!(occupant::try_add_voxel_occupant(&grid, &voxel, &agent_dyn));
    assert!(voxel.is_occupied());
    assert!(grid.is_occupied());

    let index = voxel.global_index();
    let ticket = agent.occupancy.get(index).expect("ticket recorded");
    assert!(scan::try_get_voxel_occupant(&manager, index, ticket).is_some());

    // Double registration against the same voxel is rejected.
    assert!(!occupant::try_add_voxel_occupant(&grid, &voxel, &agent_dyn));

    assert!(occupant::try_remove_voxel_occupant(&grid, &voxel, &agent_dyn));
    assert!(!voxel.is_occupied());
    assert!(!grid.is_occupied());
    assert!(agent.occupancy.get(index).is_none());
    assert!(
        scan::try_get_voxel_occupant(&manager, index, ticket).is_none(),
        "released ticket no longer resolves"
    );

    // Removing again is rejected.
    assert!(!occupant::try_remove_voxel_occupant(&grid, &voxel, &agent_dyn));
}

#[test]
fn test_active_scan_cells_track_occupancy() {
    let manager = manager();
    let slot = add_grid(&manager, (0.0, 0.0, 0.0), (20.0, 0.0, 20.0));
    let grid = manager.try_get_grid(slot).unwrap();
    assert!(grid.get_active_scan_cells().is_empty());

    // Two occupants in one scan cell, one in another.
    let near_a = TestOccupant::at(1.0, 0.0, 1.0);
    let near_b = TestOccupant::at(2.0, 0.0, 2.0);
    let far = TestOccupant::at(15.0, 0.0, 15.0);
    for occ in [&near_a, &near_b, &far] {
        let occ_dyn: Arc<dyn VoxelOccupant> = occ.clone();
        assert!(scan::try_register(&manager, &occ_dyn));
    }

    let active = grid.get_active_scan_cells();
    assert_eq!(active.len(), 2);
    assert_eq!(grid.occupant_count(), 3);
    for cell in &active {
        assert!(cell.is_occupied(), "active cells are exactly the occupied ones");
    }

    // Draining one cell removes only that cell from the active set.
    let near_a_dyn: Arc<dyn VoxelOccupant> = near_a.clone();
    let near_b_dyn: Arc<dyn VoxelOccupant> = near_b.clone();
    assert!(scan::try_deregister(&manager, &near_a_dyn));
    assert_eq!(grid.get_active_scan_cells().len(), 2);
    assert!(scan::try_deregister(&manager, &near_b_dyn));
    assert_eq!(grid.get_active_scan_cells().len(), 1);

    let far_dyn: Arc<dyn VoxelOccupant> = far.clone();
    assert!(scan::try_deregister(&manager, &far_dyn));
    assert!(grid.get_active_scan_cells().is_empty());
    assert!(!grid.is_occupied());
}

#[test]
fn test_scan_cell_count_matches_bucket_sums() {
    let manager = manager();
    let slot = add_grid(&manager, (0.0, 0.0, 0.0), (10.0, 0.0, 10.0));
    let grid = manager.try_get_grid(slot).unwrap();

    // Three occupants across two voxels of the same scan cell.
    let occupants = [
        TestOccupant::at(0.0, 0.0, 0.0),
        TestOccupant::at(0.0, 0.0, 0.0),
        TestOccupant::at(3.0, 0.0, 3.0),
    ];
    for occ in &occupants {
        let occ_dyn: Arc<dyn VoxelOccupant> = occ.clone();
        assert!(scan::try_register(&manager, &occ_dyn));
    }

    let voxel = grid.try_get_voxel(VoxelIndex::new(0, 0, 0)).unwrap();
    let cell = grid.try_get_scan_cell(voxel.scan_cell_key()).unwrap();
    assert_eq!(cell.occupant_count(), 3);
    assert_eq!(
        cell.occupant_count(),
        cell.get_occupants().len() as u32,
        "cell count equals the sum over its buckets"
    );
    assert_eq!(cell.get_occupants_for(voxel.global_index()).len(), 2);
    assert_eq!(voxel.occupant_count(), 2);
}

#[test]
fn test_occupied_voxel_rejects_obstacles_and_vice_versa() {
    let manager = manager();
    let slot = add_grid(&manager, (0.0, 0.0, 0.0), (4.0, 0.0, 4.0));
    let grid = manager.try_get_grid(slot).unwrap();
    let voxel = grid.try_get_voxel(VoxelIndex::new(2, 0, 2)).unwrap();

    let agent = TestOccupant::at(2.0, 0.0, 2.0);
    let agent_dyn: Arc<dyn VoxelOccupant> = agent.clone();
    assert!(occupant::try_add_voxel_occupant(&grid, &voxel, &agent_dyn));

    // Occupied voxels cannot take obstacles.
    assert!(!obstacle::try_add_obstacle(&grid, &voxel, 7));

    assert!(occupant::try_remove_voxel_occupant(&grid, &voxel, &agent_dyn));
    assert!(obstacle::try_add_obstacle(&grid, &voxel, 7));

    // Blocked voxels have no vacancy.
    assert!(!occupant::try_add_voxel_occupant(&grid, &voxel, &agent_dyn));
}

#[test]
fn test_position_and_index_overloads_route_to_same_voxel() {
    let manager = manager();
    let slot = add_grid(&manager, (0.0, 0.0, 0.0), (8.0, 0.0, 8.0));
    let grid = manager.try_get_grid(slot).unwrap();

    assert!(obstacle::try_add_obstacle_at(&grid, VoxelIndex::new(3, 0, 3), 11));
    // Same voxel by position: the duplicate token is rejected.
    assert!(!obstacle::try_add_obstacle_at_position(
        &grid,
        FixedVec3::from_f32(3.5, 0.0, 3.5),
        11
    ));
    assert!(obstacle::try_remove_obstacle_at_position(
        &grid,
        FixedVec3::from_f32(3.5, 0.0, 3.5),
        11
    ));

    let agent = TestOccupant::at(5.0, 0.0, 5.0);
    let agent_dyn: Arc<dyn VoxelOccupant> = agent.clone();
    assert!(occupant::try_add_occupant_at_position(
        &grid,
        FixedVec3::from_f32(5.0, 0.0, 5.0),
        &agent_dyn
    ));
    assert!(occupant::try_remove_occupant_at(
        &grid,
        VoxelIndex::new(5, 0, 5),
        &agent_dyn
    ));
}
