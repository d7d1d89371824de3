use serde::{Deserialize, Serialize};

use super::{Fix64, FixedVec3};

/// Two-component fixed-point vector.
///
/// Used by the 2D trace surface, which treats `(x, y)` as a point in the XZ
/// ground plane and lifts it to 3D at height zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FixedVec2 {
    pub x: Fix64,
    pub y: Fix64,
}

impl FixedVec2 {
    pub const ZERO: Self = Self {
        x: Fix64::ZERO,
        y: Fix64::ZERO,
    };

    pub const fn new(x: Fix64, y: Fix64) -> Self {
        Self { x, y }
    }

    pub fn from_f32(x: f32, y: f32) -> Self {
        Self {
            x: Fix64::from_num(x),
            y: Fix64::from_num(y),
        }
    }

    pub fn length_squared(self) -> Fix64 {
        self.x * self.x + self.y * self.y
    }

    /// Lift into the XZ ground plane at `y = 0`.
    pub fn to_ground(self) -> FixedVec3 {
        FixedVec3::new(self.x, Fix64::ZERO, self.y)
    }
}

impl std::ops::Add for FixedVec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for FixedVec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Mul<Fix64> for FixedVec2 {
    type Output = Self;
    fn mul(self, rhs: Fix64) -> Self::Output {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}
