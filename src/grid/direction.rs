use serde::{Deserialize, Serialize};

/// One of the 26 cells surrounding a voxel or grid, or `None` for no
/// relation (the center of the 3x3x3 lattice).
///
/// Discriminants are part of the crate's stable contract: the six
/// axis-aligned directions are `0..=5`, the twelve edge diagonals `6..=17`,
/// the eight corner diagonals `18..=25`. `West`/`East` run along -x/+x,
/// `Below`/`Above` along -y/+y, `South`/`North` along -z/+z.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i8)]
pub enum SpatialDirection {
    None = -1,
    West = 0,
    South = 1,
    East = 2,
    North = 3,
    Below = 4,
    Above = 5,
    WestBelow = 6,
    WestAbove = 7,
    EastBelow = 8,
    EastAbove = 9,
    SouthWest = 10,
    NorthWest = 11,
    SouthEast = 12,
    NorthEast = 13,
    SouthBelow = 14,
    SouthAbove = 15,
    NorthBelow = 16,
    NorthAbove = 17,
    SouthWestBelow = 18,
    SouthWestAbove = 19,
    SouthEastBelow = 20,
    SouthEastAbove = 21,
    NorthWestBelow = 22,
    NorthWestAbove = 23,
    NorthEastBelow = 24,
    NorthEastAbove = 25,
}

use SpatialDirection::*;

/// Unit offsets parallel to the direction discriminants: entry `i` is the
/// `(dx, dy, dz)` of the direction with discriminant `i`.
pub const DIRECTION_OFFSETS: [(i32, i32, i32); 26] = [
    (-1, 0, 0),   // West
    (0, 0, -1),   // South
    (1, 0, 0),    // East
    (0, 0, 1),    // North
    (0, -1, 0),   // Below
    (0, 1, 0),    // Above
    (-1, -1, 0),  // WestBelow
    (-1, 1, 0),   // WestAbove
    (1, -1, 0),   // EastBelow
    (1, 1, 0),    // EastAbove
    (-1, 0, -1),  // SouthWest
    (-1, 0, 1),   // NorthWest
    (1, 0, -1),   // SouthEast
    (1, 0, 1),    // NorthEast
    (0, -1, -1),  // SouthBelow
    (0, 1, -1),   // SouthAbove
    (0, -1, 1),   // NorthBelow
    (0, 1, 1),    // NorthAbove
    (-1, -1, -1), // SouthWestBelow
    (-1, 1, -1),  // SouthWestAbove
    (1, -1, -1),  // SouthEastBelow
    (1, 1, -1),   // SouthEastAbove
    (-1, -1, 1),  // NorthWestBelow
    (-1, 1, 1),   // NorthWestAbove
    (1, -1, 1),   // NorthEastBelow
    (1, 1, 1),    // NorthEastAbove
];

/// The 3x3x3 lattice laid out as `((z+1)*3 + (y+1))*3 + (x+1)`; index 13 is
/// the center. Kept in sync with [`DIRECTION_OFFSETS`] (checked by test).
const LATTICE_TO_DIRECTION: [SpatialDirection; 27] = [
    SouthWestBelow, // (-1,-1,-1)
    SouthBelow,     // ( 0,-1,-1)
    SouthEastBelow, // ( 1,-1,-1)
    SouthWest,      // (-1, 0,-1)
    South,          // ( 0, 0,-1)
    SouthEast,      // ( 1, 0,-1)
    SouthWestAbove, // (-1, 1,-1)
    SouthAbove,     // ( 0, 1,-1)
    SouthEastAbove, // ( 1, 1,-1)
    WestBelow,      // (-1,-1, 0)
    Below,          // ( 0,-1, 0)
    EastBelow,      // ( 1,-1, 0)
    West,           // (-1, 0, 0)
    None,           // ( 0, 0, 0)
    East,           // ( 1, 0, 0)
    WestAbove,      // (-1, 1, 0)
    Above,          // ( 0, 1, 0)
    EastAbove,      // ( 1, 1, 0)
    NorthWestBelow, // (-1,-1, 1)
    NorthBelow,     // ( 0,-1, 1)
    NorthEastBelow, // ( 1,-1, 1)
    NorthWest,      // (-1, 0, 1)
    North,          // ( 0, 0, 1)
    NorthEast,      // ( 1, 0, 1)
    NorthWestAbove, // (-1, 1, 1)
    NorthAbove,     // ( 0, 1, 1)
    NorthEastAbove, // ( 1, 1, 1)
];

impl SpatialDirection {
    /// Direction for a unit-signed offset. Components outside `{-1, 0, 1}`
    /// are clamped to their sign, so any center-to-center delta works.
    pub fn from_offset(dx: i32, dy: i32, dz: i32) -> SpatialDirection {
        let (x, y, z) = (dx.signum(), dy.signum(), dz.signum());
        let lattice = ((z + 1) * 3 + (y + 1)) * 3 + (x + 1);
        LATTICE_TO_DIRECTION[lattice as usize]
    }

    /// The `(dx, dy, dz)` unit offset of this direction; `None` for
    /// [`SpatialDirection::None`].
    pub fn offset(self) -> Option<(i32, i32, i32)> {
        self.index().map(|i| DIRECTION_OFFSETS[i])
    }

    /// Discriminant as a table index, when this is a real direction.
    pub fn index(self) -> Option<usize> {
        match self {
            None => Option::None,
            _ => Some(self as i8 as usize),
        }
    }

    pub fn from_index(index: usize) -> SpatialDirection {
        if index < 26 {
            let (dx, dy, dz) = DIRECTION_OFFSETS[index];
            Self::from_offset(dx, dy, dz)
        } else {
            None
        }
    }

    /// Axis-aligned directions: the six face neighbors.
    pub fn is_cardinal(self) -> bool {
        matches!(self, West | South | East | North | Below | Above)
    }

    /// Edge or corner diagonal.
    pub fn is_diagonal(self) -> bool {
        (self as i8) >= 6
    }

    pub fn opposite(self) -> SpatialDirection {
        match self.offset() {
            Some((dx, dy, dz)) => Self::from_offset(-dx, -dy, -dz),
            Option::None => None,
        }
    }

    /// All 26 real directions in discriminant order.
    pub fn all() -> impl Iterator<Item = SpatialDirection> {
        (0..26).map(Self::from_index)
    }
}
