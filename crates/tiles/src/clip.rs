//! Stencil clip IDs.
//!
//! Every occupied zoom level owns a contiguous bit field of the stencil,
//! allocated from the most significant bit downward. A tile's reference is
//! its 1-based rank inside its level, written into that field; its mask
//! covers every field up to and including its own. A coarser tile's field is
//! always zero in a finer tile's reference, so overlapping tiles never pass
//! each other's equality test.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::TileId;

pub const STENCIL_BITS: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipId {
    pub reference: u8,
    pub length: u8,
}

impl ClipId {
    /// The top `length` bits of the stencil.
    pub fn read_mask(&self) -> u8 {
        if self.length == 0 {
            return 0;
        }
        let length = self.length.min(STENCIL_BITS);
        (0xFFu16 << (STENCIL_BITS - length)) as u8
    }

    /// Whether a stencil value passes this ID's equality test.
    pub fn accepts(&self, stencil_value: u8) -> bool {
        stencil_value & self.read_mask() == self.reference & self.read_mask()
    }
}

/// Which zoom levels lose stencil protection when the fields of all
/// occupied levels do not fit into the stencil.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipOverflowPolicy {
    #[default]
    DropFinestLevels,
    DropCoarsestLevels,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClipIdAssignment {
    ids: BTreeMap<TileId, ClipId>,
    unclipped: BTreeSet<TileId>,
    bits_used: u8,
}

impl ClipIdAssignment {
    pub fn get(&self, tile: &TileId) -> Option<ClipId> {
        self.ids.get(tile).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TileId, &ClipId)> {
        self.ids.iter()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Tiles that did not get a clip ID because the stencil ran out of bits.
    pub fn unclipped(&self) -> impl Iterator<Item = &TileId> {
        self.unclipped.iter()
    }

    pub fn unclipped_count(&self) -> usize {
        self.unclipped.len()
    }

    pub fn bits_used(&self) -> u8 {
        self.bits_used
    }
}

struct Level {
    tiles: Vec<TileId>,
    width: u8,
}

fn field_width(tile_count: usize) -> u8 {
    (usize::BITS - tile_count.leading_zeros()) as u8
}

/// Assigns clip IDs to the union of every active source's visible tiles.
/// The result only depends on the set of IDs, not on their order.
pub fn compute_clip_ids<I>(tiles: I, policy: ClipOverflowPolicy) -> ClipIdAssignment
where
    I: IntoIterator<Item = TileId>,
{
    let unique: BTreeSet<TileId> = tiles.into_iter().collect();
    let mut by_zoom: BTreeMap<u8, Vec<TileId>> = BTreeMap::new();
    for tile in unique {
        by_zoom.entry(tile.z).or_default().push(tile);
    }
    let levels: Vec<Level> = by_zoom
        .into_values()
        .map(|tiles| Level {
            width: field_width(tiles.len()),
            tiles,
        })
        .collect();

    let kept = select_levels(&levels, policy);

    let mut assignment = ClipIdAssignment::default();
    let mut offset = 0u8;
    for (index, level) in levels.iter().enumerate() {
        if !kept.contains(&index) {
            log::trace!(
                "zoom level {} left unclipped ({} tiles)",
                level.tiles[0].z,
                level.tiles.len()
            );
            assignment.unclipped.extend(level.tiles.iter().copied());
            continue;
        }
        offset += level.width;
        let shift = STENCIL_BITS - offset;
        for (rank, tile) in level.tiles.iter().enumerate() {
            let reference = ((rank + 1) << shift) as u8;
            assignment.ids.insert(
                *tile,
                ClipId {
                    reference,
                    length: offset,
                },
            );
        }
    }
    assignment.bits_used = offset;
    assignment
}

fn select_levels(levels: &[Level], policy: ClipOverflowPolicy) -> BTreeSet<usize> {
    let mut kept = BTreeSet::new();
    let mut used = 0u8;
    let mut admit = |index: usize| {
        let width = levels[index].width;
        if used + width > STENCIL_BITS {
            return false;
        }
        used += width;
        kept.insert(index);
        true
    };
    match policy {
        ClipOverflowPolicy::DropFinestLevels => {
            for index in 0..levels.len() {
                if !admit(index) {
                    break;
                }
            }
        }
        ClipOverflowPolicy::DropCoarsestLevels => {
            for index in (0..levels.len()).rev() {
                if !admit(index) {
                    break;
                }
            }
        }
    }
    kept
}
