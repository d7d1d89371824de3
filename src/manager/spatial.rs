use crate::fixed_math::{sign_i32, Fix64, FixedVec3};
use crate::hashing::mix_hash;

/// Coarse spatial-cell coordinate of a scalar world coordinate.
///
/// Signed-abs-floor form: `⌊|v|/S⌋·sign(v)`. A plain floor would bucket
/// `-0.5` and `-49.5` into different cells than their positive mirrors;
/// this form keeps the lattice symmetric around the origin.
pub(crate) fn spatial_cell_coord(value: Fix64, cell_size: Fix64) -> i32 {
    (value.abs() / cell_size).floor().to_num::<i32>() * sign_i32(value)
}

/// Key of the spatial cell containing `position`.
pub fn spatial_cell_key(position: FixedVec3, cell_size: i32) -> i32 {
    let size = Fix64::from_num(cell_size);
    mix_hash(
        spatial_cell_coord(position.x, size),
        spatial_cell_coord(position.y, size),
        spatial_cell_coord(position.z, size),
    )
}

/// Keys of every spatial cell covering the axis-aligned box `[min, max]`,
/// inclusive on each axis.
pub fn spatial_cells_covering(min: FixedVec3, max: FixedVec3, cell_size: i32) -> Vec<i32> {
    let size = Fix64::from_num(cell_size);
    let (x0, x1) = (
        spatial_cell_coord(min.x, size),
        spatial_cell_coord(max.x, size),
    );
    let (y0, y1) = (
        spatial_cell_coord(min.y, size),
        spatial_cell_coord(max.y, size),
    );
    let (z0, z1) = (
        spatial_cell_coord(min.z, size),
        spatial_cell_coord(max.z, size),
    );

    let mut keys = Vec::with_capacity(
        ((x1 - x0 + 1) * (y1 - y0 + 1) * (z1 - z0 + 1)).max(0) as usize,
    );
    for x in x0..=x1 {
        for y in y0..=y1 {
            for z in z0..=z1 {
                keys.push(mix_hash(x, y, z));
            }
        }
    }
    keys
}
