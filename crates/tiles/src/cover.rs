use crate::TileId;

/// Axis-aligned bounds in normalized world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl TileBounds {
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) * 0.5,
            (self.min_y + self.max_y) * 0.5,
        )
    }
}

/// Every tile at zoom `z` touching `bounds`, nearest to the bounds' center
/// first so loaders see the most visible tiles early. The world does not
/// wrap; bounds are clamped to it.
pub fn tile_cover(z: u8, bounds: &TileBounds) -> Vec<TileId> {
    let dimension = TileId::tiles_per_axis(z);
    let last = f64::from(dimension - 1);
    let to_index =
        |value: f64| (value * f64::from(dimension)).floor().clamp(0.0, last) as u32;

    if !(bounds.min_x < bounds.max_x && bounds.min_y < bounds.max_y)
        || bounds.max_x <= 0.0
        || bounds.max_y <= 0.0
        || bounds.min_x >= 1.0
        || bounds.min_y >= 1.0
    {
        return Vec::new();
    }

    let min_x = to_index(bounds.min_x);
    let max_x = to_index(bounds.max_x);
    let min_y = to_index(bounds.min_y);
    let max_y = to_index(bounds.max_y);

    let mut tiles = Vec::with_capacity(((max_x - min_x + 1) * (max_y - min_y + 1)) as usize);
    for x in min_x..=max_x {
        for y in min_y..=max_y {
            tiles.push(TileId { z, x, y });
        }
    }

    let (center_x, center_y) = bounds.center();
    let scale = f64::from(dimension);
    tiles.sort_by(|left, right| {
        let distance = |tile: &TileId| {
            let dx = f64::from(tile.x) + 0.5 - center_x * scale;
            let dy = f64::from(tile.y) + 0.5 - center_y * scale;
            dx * dx + dy * dy
        };
        distance(left).total_cmp(&distance(right)).then(left.cmp(right))
    });
    tiles
}
