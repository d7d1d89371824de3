//! Deterministic fixed-point mathematics.
//!
//! All world positions, sizes, and distances in the crate use fixed-point
//! arithmetic so that every platform and architecture computes identical
//! results. This is what makes grid state reproducible across lockstep
//! simulations: there is no floating-point rounding anywhere in a query or
//! mutation path.

use fixed::types::I48F16;

pub use vec2::FixedVec2;
pub use vec3::FixedVec3;

mod vec2;
mod vec3;

/// Fixed-point number type used throughout the crate.
///
/// Uses I48F16 format: 48 bits for the integer part, 16 bits for the
/// fractional part. This provides a range of approximately ±140 trillion
/// with a precision of ~0.000015.
pub type Fix64 = I48F16;

/// Componentwise sign as an integer in {-1, 0, 1}.
pub fn sign_i32(value: Fix64) -> i32 {
    value.signum().to_num::<i32>()
}
