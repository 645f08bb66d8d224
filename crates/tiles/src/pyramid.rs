use std::collections::{BTreeMap, BTreeSet};

use crate::{MAX_ZOOM_LEVEL, TileId};

const DEFAULT_PARENT_SEARCH_LEVELS: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Loading,
    Loaded,
}

/// Outcome of one cover update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RetainedTiles {
    /// Loaded tiles to draw this frame, ordered by `(z, x, y)`.
    pub visible: Vec<TileId>,
    /// Ideal tiles the pyramid has never seen; the caller requests them.
    pub missing: Vec<TileId>,
    /// Tiles dropped because nothing needs them anymore.
    pub evicted: Vec<TileId>,
}

/// Loading and loaded tiles of one source. While an ideal tile is loading,
/// its loaded children or nearest loaded ancestor stand in for it.
#[derive(Debug, Clone)]
pub struct TilePyramid {
    tiles: BTreeMap<TileId, TileState>,
    parent_search_levels: u8,
}

impl Default for TilePyramid {
    fn default() -> Self {
        Self::new()
    }
}

impl TilePyramid {
    pub fn new() -> Self {
        Self::with_parent_search_levels(DEFAULT_PARENT_SEARCH_LEVELS)
    }

    pub fn with_parent_search_levels(parent_search_levels: u8) -> Self {
        Self {
            tiles: BTreeMap::new(),
            parent_search_levels,
        }
    }

    pub fn state(&self, tile: &TileId) -> Option<TileState> {
        self.tiles.get(tile).copied()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn mark_loading(&mut self, tile: TileId) {
        self.tiles.entry(tile).or_insert(TileState::Loading);
    }

    pub fn mark_loaded(&mut self, tile: TileId) {
        self.tiles.insert(tile, TileState::Loaded);
    }

    pub fn remove(&mut self, tile: &TileId) -> Option<TileState> {
        self.tiles.remove(tile)
    }

    pub fn clear(&mut self) -> Vec<TileId> {
        let evicted = self.tiles.keys().copied().collect();
        self.tiles.clear();
        evicted
    }

    fn is_loaded(&self, tile: &TileId) -> bool {
        self.tiles.get(tile) == Some(&TileState::Loaded)
    }

    /// Keeps the ideal cover plus whatever stands in for its unloaded
    /// tiles, evicting everything else.
    pub fn retain_cover(&mut self, ideal: &[TileId]) -> RetainedTiles {
        let mut retained = BTreeSet::new();
        let mut visible = BTreeSet::new();
        let mut missing = Vec::new();

        for tile in ideal {
            retained.insert(*tile);
            if self.is_loaded(tile) {
                visible.insert(*tile);
                continue;
            }
            if !self.tiles.contains_key(tile) {
                missing.push(*tile);
            }

            let mut children_complete = tile.z < MAX_ZOOM_LEVEL;
            if tile.z < MAX_ZOOM_LEVEL {
                for child in tile.children() {
                    if self.is_loaded(&child) {
                        retained.insert(child);
                        visible.insert(child);
                    } else {
                        children_complete = false;
                    }
                }
            }
            if children_complete {
                continue;
            }

            let lowest = tile.z.saturating_sub(self.parent_search_levels);
            let mut z = tile.z;
            while z > lowest {
                z -= 1;
                let Some(ancestor) = tile.ancestor_at(z) else {
                    break;
                };
                if self.is_loaded(&ancestor) {
                    retained.insert(ancestor);
                    visible.insert(ancestor);
                    break;
                }
                if self.tiles.contains_key(&ancestor) {
                    retained.insert(ancestor);
                }
            }
        }

        let evicted: Vec<TileId> = self
            .tiles
            .keys()
            .filter(|tile| !retained.contains(tile))
            .copied()
            .collect();
        for tile in &evicted {
            self.tiles.remove(tile);
        }

        RetainedTiles {
            visible: visible.into_iter().collect(),
            missing,
            evicted,
        }
    }
}
