use std::fmt;

use serde::Serialize;

/// Identity of a tile within the pyramid.
///
/// `x` and `y` are the grid column and row, `z` the resolution level
/// (0 = coarsest). Two identities are equal when all three coordinates match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TileId {
    /// Grid column (0-indexed from left)
    pub x: u32,

    /// Grid row (0-indexed from top)
    pub y: u32,

    /// Resolution level (0 = coarsest)
    pub z: u32,
}

impl TileId {
    /// Create a new tile identity.
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    /// String key of the form `x_y_z`.
    pub fn key(&self) -> String {
        format!("{}_{}_{}", self.x, self.y, self.z)
    }

    /// The tile one level coarser that covers this one.
    ///
    /// Returns `None` at level 0.
    pub fn parent(&self) -> Option<TileId> {
        if self.z == 0 {
            return None;
        }
        Some(TileId::new(self.x / 2, self.y / 2, self.z - 1))
    }

    /// The four tiles one level finer that this tile covers, row-major by column.
    pub fn children(&self) -> [TileId; 4] {
        let (x, y, z) = (self.x * 2, self.y * 2, self.z + 1);
        [
            TileId::new(x, y, z),
            TileId::new(x, y + 1, z),
            TileId::new(x + 1, y, z),
            TileId::new(x + 1, y + 1, z),
        ]
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.x, self.y, self.z)
    }
}
