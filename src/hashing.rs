//! Integer hash mixing shared by every key in the crate.
//!
//! Grid spawn tokens, voxel spawn tokens, scan cell keys, spatial cell keys,
//! and config identity hashes all derive from [`mix_hash`]. The mixer is part
//! of the crate's stable contract: changing it changes every key.

use crate::fixed_math::Fix64;

/// 32-bit wrapping hash mix of three integers.
///
/// `h = 17; h = (h * 31) ^ x; h = (h * 31) ^ y; h = (h * 31) ^ z`
pub fn mix_hash(x: i32, y: i32, z: i32) -> i32 {
    let mut h: i32 = 17;
    h = h.wrapping_mul(31) ^ x;
    h = h.wrapping_mul(31) ^ y;
    h = h.wrapping_mul(31) ^ z;
    h
}

/// Fold a fixed-point value's 64-bit representation to 32 bits.
pub(crate) fn fold_fix(value: Fix64) -> i32 {
    let bits = value.to_bits();
    (bits ^ (bits >> 32)) as i32
}

/// Key for a typed partition attached to a voxel: the voxel's spawn token
/// XORed with the partition type's tag. XOR keeps the collision discipline
/// of the token space.
pub(crate) fn partition_key(spawn_token: i32, type_tag: i32) -> i32 {
    spawn_token ^ type_tag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_hash_matches_reference_values() {
        // h starts at 17: ((17*31 ^ x)*31 ^ y)*31 ^ z
        assert_eq!(mix_hash(0, 0, 0), ((17i32 * 31) * 31) * 31);
        assert_eq!(mix_hash(1, 2, 3), (((17i32 * 31 ^ 1) * 31) ^ 2) * 31 ^ 3);
    }

    #[test]
    fn test_mix_hash_is_order_sensitive() {
        assert_ne!(mix_hash(1, 2, 3), mix_hash(3, 2, 1));
        assert_ne!(mix_hash(1, 2, 3), mix_hash(2, 1, 3));
    }

    #[test]
    fn test_mix_hash_wraps_instead_of_overflowing() {
        // Large magnitudes must wrap silently.
        let h = mix_hash(i32::MAX, i32::MIN, i32::MAX);
        let _ = mix_hash(h, h, h);
    }

    #[test]
    fn test_fold_fix_distinguishes_fractions() {
        let a = fold_fix(Fix64::from_num(1.0));
        let b = fold_fix(Fix64::from_num(1.5));
        assert_ne!(a, b, "fractional bits must contribute to the fold");
    }
}
