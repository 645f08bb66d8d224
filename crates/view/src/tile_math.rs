use render_protocol::matrix::{self, Matrix4x4F64};
use render_protocol::{FrameSnapshot, TransformMatrix4x4, TranslateAnchor};
use tiles::{MAX_ZOOM_LEVEL, TileBounds, TileId};

/// Size in pixels of one tile at its own zoom level.
pub const TILE_SIZE: f64 = 512.0;

fn world_size(frame: &FrameSnapshot) -> f64 {
    TILE_SIZE * frame.scale()
}

/// Maps tile-local coordinates in `[0, extent]` to clip space.
pub fn tile_matrix(frame: &FrameSnapshot, tile: TileId, extent: f64) -> TransformMatrix4x4 {
    let width = f64::from(frame.size.width);
    let height = f64::from(frame.size.height);
    let world_size = world_size(frame);
    let tile_scale = world_size / f64::from(TileId::tiles_per_axis(tile.z));

    let mut transform = matrix::ortho(0.0, width, height, 0.0, 0.0, 1.0);
    transform = matrix::translate(&transform, width * 0.5, height * 0.5, 0.0);
    transform = matrix::rotate_z(&transform, frame.bearing);
    transform = matrix::translate(
        &transform,
        -frame.center.x * world_size,
        -frame.center.y * world_size,
        0.0,
    );
    transform = matrix::translate(
        &transform,
        f64::from(tile.x) * tile_scale,
        f64::from(tile.y) * tile_scale,
        0.0,
    );
    transform = matrix::scale(&transform, tile_scale / extent, tile_scale / extent, 1.0);
    matrix::to_gpu(&transform)
}

/// `tile_matrix` shifted by a layer offset in logical pixels. Map-anchored
/// offsets turn with the map; viewport-anchored ones are counter-rotated so
/// they stay aligned with the screen.
pub fn translated_matrix(
    frame: &FrameSnapshot,
    tile_matrix: &TransformMatrix4x4,
    tile: TileId,
    extent: f64,
    translate: [f32; 2],
    anchor: TranslateAnchor,
) -> TransformMatrix4x4 {
    if translate == [0.0, 0.0] {
        return *tile_matrix;
    }
    let units_per_pixel = extent * f64::from(TileId::tiles_per_axis(tile.z)) / world_size(frame);
    let (x, y) = (f64::from(translate[0]), f64::from(translate[1]));
    let (x, y) = match anchor {
        TranslateAnchor::Map => (x, y),
        TranslateAnchor::Viewport => {
            let (sine, cosine) = (-frame.bearing).sin_cos();
            (x * cosine - y * sine, x * sine + y * cosine)
        }
    };
    let shifted = matrix::translate(
        &matrix::from_gpu(tile_matrix),
        x * units_per_pixel,
        y * units_per_pixel,
        0.0,
    );
    matrix::to_gpu(&shifted)
}

/// Normalized world bounds of everything the viewport shows, including
/// the corners uncovered by rotation.
pub fn visible_bounds(frame: &FrameSnapshot) -> TileBounds {
    let half_width = f64::from(frame.size.width) * 0.5;
    let half_height = f64::from(frame.size.height) * 0.5;
    let world_size = world_size(frame);
    let (sine, cosine) = (-frame.bearing).sin_cos();

    let mut bounds = TileBounds {
        min_x: f64::INFINITY,
        min_y: f64::INFINITY,
        max_x: f64::NEG_INFINITY,
        max_y: f64::NEG_INFINITY,
    };
    for (corner_x, corner_y) in [
        (-half_width, -half_height),
        (half_width, -half_height),
        (-half_width, half_height),
        (half_width, half_height),
    ] {
        let x = frame.center.x + (cosine * corner_x - sine * corner_y) / world_size;
        let y = frame.center.y + (sine * corner_x + cosine * corner_y) / world_size;
        bounds.min_x = bounds.min_x.min(x);
        bounds.min_y = bounds.min_y.min(y);
        bounds.max_x = bounds.max_x.max(x);
        bounds.max_y = bounds.max_y.max(y);
    }
    bounds
}

/// The zoom level whose tiles of `tile_size` pixels best match the frame.
pub fn covering_zoom(frame: &FrameSnapshot, tile_size: f64) -> u8 {
    let zoom = frame.zoom + (TILE_SIZE / tile_size).log2();
    zoom.floor().clamp(0.0, f64::from(MAX_ZOOM_LEVEL)) as u8
}

/// Maps the full-viewport quad (clip space) to pattern coordinates, where
/// one unit is one repetition of a `pattern_width` x `pattern_height` image.
/// The pattern is anchored to the map at the integer zoom level and scaled
/// by the fractional remainder, so it pans and rotates with the map.
pub fn pattern_matrix(
    frame: &FrameSnapshot,
    pattern_width: f64,
    pattern_height: f64,
) -> TransformMatrix4x4 {
    let width = f64::from(frame.size.width);
    let height = f64::from(frame.size.height);
    let integer_world_size = TILE_SIZE * f64::from(frame.integer_zoom()).exp2();
    let offset_x = (frame.center.x * integer_world_size).rem_euclid(pattern_width);
    let offset_y = (frame.center.y * integer_world_size).rem_euclid(pattern_height);
    let fraction_scale = (-frame.zoom_fraction()).exp2();

    let mut transform: Matrix4x4F64 = matrix::identity();
    transform = matrix::scale(&transform, 1.0 / pattern_width, 1.0 / pattern_height, 1.0);
    transform = matrix::translate(&transform, offset_x, offset_y, 0.0);
    transform = matrix::scale(&transform, fraction_scale, fraction_scale, 1.0);
    transform = matrix::rotate_z(&transform, -frame.bearing);
    transform = matrix::scale(&transform, width * 0.5, -height * 0.5, 1.0);
    matrix::to_gpu(&transform)
}
