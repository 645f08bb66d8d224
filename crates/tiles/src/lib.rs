//! Tile identifiers and the per-frame bookkeeping built on them.
//!
//! - `clip`: stencil clip ID assignment across every visible tile.
//! - `pyramid`: which tiles a source keeps and draws while others load.
//! - `cover`: the ideal tiles under a viewport.

mod clip;
mod cover;
mod pyramid;

use std::fmt;

pub use clip::{ClipId, ClipIdAssignment, ClipOverflowPolicy, STENCIL_BITS, compute_clip_ids};
pub use cover::{TileBounds, tile_cover};
pub use pyramid::{RetainedTiles, TilePyramid, TileState};

pub const MAX_ZOOM_LEVEL: u8 = 24;

/// Address of a tile in the quadtree. Ordered by `(z, x, y)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        assert!(z <= MAX_ZOOM_LEVEL, "zoom level {z} exceeds {MAX_ZOOM_LEVEL}");
        let dimension = 1u32 << z;
        assert!(
            x < dimension && y < dimension,
            "tile {x}/{y} is out of range at zoom {z}"
        );
        Self { z, x, y }
    }

    pub fn tiles_per_axis(z: u8) -> u32 {
        1u32 << z
    }

    pub fn parent(&self) -> Option<TileId> {
        self.ancestor_at(self.z.checked_sub(1)?)
    }

    pub fn ancestor_at(&self, z: u8) -> Option<TileId> {
        if z > self.z {
            return None;
        }
        let shift = self.z - z;
        Some(TileId {
            z,
            x: self.x >> shift,
            y: self.y >> shift,
        })
    }

    pub fn is_ancestor_of(&self, other: &TileId) -> bool {
        self.z < other.z && other.ancestor_at(self.z) == Some(*self)
    }

    /// True when the two tiles cover any common area.
    pub fn overlaps(&self, other: &TileId) -> bool {
        self == other || self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }

    pub fn children(&self) -> [TileId; 4] {
        assert!(self.z < MAX_ZOOM_LEVEL, "tile {self} has no children");
        let z = self.z + 1;
        let x = self.x * 2;
        let y = self.y * 2;
        [
            TileId { z, x, y },
            TileId { z, x: x + 1, y },
            TileId { z, x, y: y + 1 },
            TileId {
                z,
                x: x + 1,
                y: y + 1,
            },
        ]
    }
}

impl fmt::Debug for TileId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "TileId({}/{}/{})", self.z, self.x, self.y)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}/{}/{}", self.z, self.x, self.y)
    }
}

#[cfg(test)]
mod tests;
