//! A tile source over a loader: picks the tiles covering the viewport,
//! requests the missing ones and draws loaded ancestors or children in
//! place of tiles that are still loading.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use render_protocol::{Color, FrameSnapshot, IDENTITY_MATRIX};
use renderer::{
    DepthRange, DeviceError, DrawCall, FinalizeContext, PlainUniforms, ProgramId, RenderTile,
    Source, StencilTest, TileData,
};
use tiles::{ClipIdAssignment, TileId, TilePyramid, tile_cover};
use view::{covering_zoom, tile_matrix, visible_bounds};

/// A tile the loader finished. `data` is `None` for tiles that do not
/// exist or failed to decode; they count as loaded and draw nothing.
pub struct LoadedTile {
    pub id: TileId,
    pub data: Option<Arc<dyn TileData>>,
}

/// Fetches and decodes tiles off the render thread.
pub trait TileLoader: Send {
    /// Must not block; results come back through `poll`.
    fn request(&mut self, tile: TileId);

    fn poll(&mut self) -> Vec<LoadedTile>;

    /// The tile is no longer wanted. Late results for it are ignored.
    fn cancel(&mut self, _tile: TileId) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiledSourceConfig {
    /// Pixel size the tiles are designed for.
    pub tile_size: f64,
    /// Coordinate range of tile-local geometry.
    pub extent: f32,
    pub min_zoom: u8,
    /// Deeper frames overzoom tiles of this level.
    pub max_zoom: u8,
}

impl Default for TiledSourceConfig {
    fn default() -> Self {
        Self {
            tile_size: 512.0,
            extent: 8192.0,
            min_zoom: 0,
            max_zoom: 14,
        }
    }
}

const DEBUG_EVEN: Color = Color::rgba(1.0, 0.0, 0.0, 1.0);
const DEBUG_ODD: Color = Color::rgba(0.0, 0.0, 1.0, 1.0);
const DEBUG_OPACITY: f32 = 0.15;

pub struct TiledSource<L: TileLoader> {
    config: TiledSourceConfig,
    loader: L,
    pyramid: TilePyramid,
    pending: BTreeSet<TileId>,
    data: HashMap<TileId, Arc<dyn TileData>>,
    render_tiles: Vec<RenderTile>,
}

impl<L: TileLoader> TiledSource<L> {
    pub fn new(config: TiledSourceConfig, loader: L) -> Self {
        Self {
            config,
            loader,
            pyramid: TilePyramid::new(),
            pending: BTreeSet::new(),
            data: HashMap::new(),
            render_tiles: Vec::new(),
        }
    }

    pub fn config(&self) -> &TiledSourceConfig {
        &self.config
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Requested tiles the loader has not delivered yet.
    pub fn pending(&self) -> impl Iterator<Item = &TileId> {
        self.pending.iter()
    }

    fn accept_loaded(&mut self) {
        for loaded in self.loader.poll() {
            if !self.pending.remove(&loaded.id) {
                log::trace!("ignoring stale tile {}", loaded.id);
                continue;
            }
            self.pyramid.mark_loaded(loaded.id);
            if let Some(data) = loaded.data {
                self.data.insert(loaded.id, data);
            }
        }
    }

    fn ideal_cover(&self, frame: &FrameSnapshot) -> Vec<TileId> {
        if !frame.has_surface_area() {
            return Vec::new();
        }
        let zoom = covering_zoom(frame, self.config.tile_size);
        if zoom < self.config.min_zoom {
            return Vec::new();
        }
        tile_cover(zoom.min(self.config.max_zoom), &visible_bounds(frame))
    }
}

impl<L: TileLoader> Source for TiledSource<L> {
    fn deactivate(&mut self) {
        for tile in std::mem::take(&mut self.pending) {
            self.loader.cancel(tile);
        }
        self.pyramid.clear();
        self.data.clear();
        self.render_tiles.clear();
    }

    fn refresh_tile_set(&mut self, frame: &FrameSnapshot) {
        self.accept_loaded();

        let ideal = self.ideal_cover(frame);
        let retained = self.pyramid.retain_cover(&ideal);
        for tile in retained.evicted {
            self.data.remove(&tile);
            if self.pending.remove(&tile) {
                self.loader.cancel(tile);
            }
        }
        for tile in retained.missing {
            self.pyramid.mark_loading(tile);
            self.pending.insert(tile);
            self.loader.request(tile);
        }

        let extent = self.config.extent;
        self.render_tiles = retained
            .visible
            .into_iter()
            .filter_map(|id| {
                let data = self.data.get(&id)?;
                Some(RenderTile {
                    id,
                    matrix: IDENTITY_MATRIX,
                    extent,
                    clip: None,
                    data: Arc::clone(data),
                })
            })
            .collect();
    }

    fn tile_ids(&self) -> Vec<TileId> {
        self.render_tiles.iter().map(|tile| tile.id).collect()
    }

    fn update_clip_ids(&mut self, clip_ids: &ClipIdAssignment) {
        for tile in &mut self.render_tiles {
            tile.clip = clip_ids.get(&tile.id);
        }
    }

    fn update_matrices(&mut self, frame: &FrameSnapshot) {
        let extent = f64::from(self.config.extent);
        for tile in &mut self.render_tiles {
            tile.matrix = tile_matrix(frame, tile.id, extent);
        }
    }

    fn tiles(&self) -> &[RenderTile] {
        &self.render_tiles
    }

    fn has_data(&self) -> bool {
        !self.render_tiles.is_empty()
    }

    /// Tints every drawn tile when tile debugging is on.
    fn finalize_frame(&mut self, context: &mut FinalizeContext<'_>) -> Result<(), DeviceError> {
        if !context.debug_tiles() || self.render_tiles.is_empty() {
            return Ok(());
        }
        context.use_program(ProgramId::BACKGROUND_PLAIN)?;
        context.set_stencil_test(StencilTest::Disabled)?;
        context.set_depth_range(DepthRange {
            near: 1.0,
            far: 1.0,
        })?;
        let frame = *context.frame();
        for tile in &self.render_tiles {
            let color = if (tile.id.x + tile.id.y) % 2 == 0 {
                DEBUG_EVEN
            } else {
                DEBUG_ODD
            };
            let uniforms = PlainUniforms {
                matrix: tile_matrix(&frame, tile.id, 1.0),
                color: color.premultiplied(DEBUG_OPACITY),
            };
            context.set_uniforms(bytemuck::bytes_of(&uniforms))?;
            context.draw(&DrawCall::Quad)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use render_protocol::{
        BucketRef, FillProperties, FramebufferSize, LayerNode, LayerProperties, LeafLayer,
        LogicalSize, SourceId,
    };
    use renderer::{
        Bucket, FrameInput, RecordingDevice, RenderOptions, Renderer, SourceRegistry,
    };
    use tiles::{ClipOverflowPolicy, compute_clip_ids};
    use view::MapTransform;

    use super::*;

    struct EmptyTile;

    impl TileData for EmptyTile {
        fn bucket(&self, _name: &str) -> Option<&dyn Bucket> {
            None
        }
    }

    #[derive(Default)]
    struct LoaderLog {
        requested: Vec<TileId>,
        cancelled: Vec<TileId>,
        ready: Vec<LoadedTile>,
    }

    #[derive(Clone, Default)]
    struct FakeLoader {
        log: Arc<Mutex<LoaderLog>>,
    }

    impl FakeLoader {
        fn requested(&self) -> Vec<TileId> {
            self.log.lock().expect("loader log lock poisoned").requested.clone()
        }

        fn cancelled(&self) -> Vec<TileId> {
            self.log.lock().expect("loader log lock poisoned").cancelled.clone()
        }

        /// Completes every outstanding request.
        fn deliver_all(&self) {
            let mut log = self.log.lock().expect("loader log lock poisoned");
            let ready: Vec<LoadedTile> = log
                .requested
                .drain(..)
                .map(|id| LoadedTile {
                    id,
                    data: Some(Arc::new(EmptyTile) as Arc<dyn TileData>),
                })
                .collect();
            log.ready.extend(ready);
        }

        fn deliver(&self, tile: LoadedTile) {
            self.log
                .lock()
                .expect("loader log lock poisoned")
                .ready
                .push(tile);
        }
    }

    impl TileLoader for FakeLoader {
        fn request(&mut self, tile: TileId) {
            self.log
                .lock()
                .expect("loader log lock poisoned")
                .requested
                .push(tile);
        }

        fn poll(&mut self) -> Vec<LoadedTile> {
            std::mem::take(&mut self.log.lock().expect("loader log lock poisoned").ready)
        }

        fn cancel(&mut self, tile: TileId) {
            let mut log = self.log.lock().expect("loader log lock poisoned");
            log.requested.retain(|requested| *requested != tile);
            log.cancelled.push(tile);
        }
    }

    fn frame_at(zoom: f64) -> FrameSnapshot {
        let mut transform = MapTransform::new(0.0, 20.0).expect("zoom range");
        transform
            .resize(LogicalSize::new(512, 512), 1.0, FramebufferSize::new(512, 512))
            .expect("resize");
        transform.set_zoom(zoom).expect("zoom");
        transform.current_state().snapshot(Duration::ZERO)
    }

    fn sorted(mut tiles: Vec<TileId>) -> Vec<TileId> {
        tiles.sort();
        tiles
    }

    fn quadrants(z: u8) -> Vec<TileId> {
        let mid = TileId::tiles_per_axis(z) / 2;
        sorted(vec![
            TileId::new(z, mid - 1, mid - 1),
            TileId::new(z, mid - 1, mid),
            TileId::new(z, mid, mid - 1),
            TileId::new(z, mid, mid),
        ])
    }

    #[test]
    fn requests_the_cover_and_draws_once_loaded() {
        let loader = FakeLoader::default();
        let mut source = TiledSource::new(TiledSourceConfig::default(), loader.clone());

        source.refresh_tile_set(&frame_at(1.0));
        assert_eq!(sorted(loader.requested()), quadrants(1));
        assert!(!source.has_data());
        assert!(source.tile_ids().is_empty());

        loader.deliver_all();
        let frame = frame_at(1.0);
        source.refresh_tile_set(&frame);
        assert!(source.has_data());
        assert_eq!(sorted(source.tile_ids()), quadrants(1));
        assert_eq!(source.pending().count(), 0);

        let clip_ids = compute_clip_ids(source.tile_ids(), ClipOverflowPolicy::default());
        source.update_clip_ids(&clip_ids);
        source.update_matrices(&frame);
        for tile in source.tiles() {
            assert_eq!(tile.clip, clip_ids.get(&tile.id));
            assert_eq!(tile.matrix, tile_matrix(&frame, tile.id, 8192.0));
            assert_eq!(tile.extent, 8192.0);
        }
    }

    #[test]
    fn loaded_parent_stands_in_until_children_arrive() {
        let loader = FakeLoader::default();
        let mut source = TiledSource::new(TiledSourceConfig::default(), loader.clone());
        source.refresh_tile_set(&frame_at(0.0));
        loader.deliver_all();
        source.refresh_tile_set(&frame_at(0.0));
        assert_eq!(source.tile_ids(), vec![TileId::new(0, 0, 0)]);

        source.refresh_tile_set(&frame_at(1.0));
        assert_eq!(sorted(loader.requested()), quadrants(1));
        assert_eq!(source.tile_ids(), vec![TileId::new(0, 0, 0)]);

        loader.deliver_all();
        source.refresh_tile_set(&frame_at(1.0));
        assert_eq!(sorted(source.tile_ids()), quadrants(1));
    }

    #[test]
    fn overzooms_past_the_deepest_level() {
        let loader = FakeLoader::default();
        let config = TiledSourceConfig {
            max_zoom: 1,
            ..TiledSourceConfig::default()
        };
        let mut source = TiledSource::new(config, loader.clone());
        source.refresh_tile_set(&frame_at(3.0));
        assert!(loader.requested().iter().all(|tile| tile.z == 1));
        assert!(!loader.requested().is_empty());
    }

    #[test]
    fn evicted_requests_are_cancelled_and_late_results_ignored() {
        let loader = FakeLoader::default();
        let mut source = TiledSource::new(TiledSourceConfig::default(), loader.clone());
        source.refresh_tile_set(&frame_at(1.0));
        let first_cover = quadrants(1);

        // Zooming out drops children that are still loading.
        source.refresh_tile_set(&frame_at(0.0));
        assert_eq!(sorted(loader.cancelled()), first_cover);

        loader.deliver(LoadedTile {
            id: first_cover[0],
            data: Some(Arc::new(EmptyTile) as Arc<dyn TileData>),
        });
        source.refresh_tile_set(&frame_at(0.0));
        assert!(!source.tile_ids().contains(&first_cover[0]));
    }

    #[test]
    fn empty_tiles_count_as_loaded_but_draw_nothing() {
        let loader = FakeLoader::default();
        let mut source = TiledSource::new(TiledSourceConfig::default(), loader.clone());
        source.refresh_tile_set(&frame_at(0.0));
        loader.deliver(LoadedTile {
            id: TileId::new(0, 0, 0),
            data: None,
        });
        source.refresh_tile_set(&frame_at(0.0));
        assert_eq!(source.pending().count(), 0);
        assert!(!source.has_data());
        source.refresh_tile_set(&frame_at(0.0));
        assert_eq!(loader.requested(), vec![TileId::new(0, 0, 0)]);
    }

    #[test]
    fn deactivation_cancels_pending_loads_and_forgets_tiles() {
        let loader = FakeLoader::default();
        let mut source = TiledSource::new(TiledSourceConfig::default(), loader.clone());
        source.refresh_tile_set(&frame_at(0.0));
        loader.deliver_all();
        source.refresh_tile_set(&frame_at(0.0));
        source.refresh_tile_set(&frame_at(1.0));

        source.deactivate();
        assert_eq!(sorted(loader.cancelled()), quadrants(1));
        assert!(source.tiles().is_empty());
        assert_eq!(source.pending().count(), 0);
    }

    #[test]
    fn debug_tiles_tint_every_drawn_tile() {
        let loader = FakeLoader::default();
        let mut registry = SourceRegistry::new();
        registry.insert(
            SourceId::from("streets"),
            Box::new(TiledSource::new(TiledSourceConfig::default(), loader.clone())),
        );
        let layers = vec![LayerNode::Leaf(LeafLayer {
            id: "water".into(),
            properties: LayerProperties::Fill(FillProperties::default()),
            bucket: Some(BucketRef::new("water", "streets")),
        })];
        let frame = frame_at(1.0);
        let prepare = |registry: &mut SourceRegistry| {
            registry.update_active_set(&layers);
            for (_, source) in registry.active_mut() {
                source.refresh_tile_set(&frame);
            }
            let ids: Vec<TileId> = registry
                .active()
                .flat_map(|(_, source)| source.tile_ids())
                .collect();
            let clip_ids = compute_clip_ids(ids, ClipOverflowPolicy::default());
            for (_, source) in registry.active_mut() {
                source.update_clip_ids(&clip_ids);
                source.update_matrices(&frame);
            }
        };
        prepare(&mut registry);
        loader.deliver_all();
        prepare(&mut registry);

        let options = RenderOptions {
            debug_tiles: true,
            ..RenderOptions::default()
        };
        let mut renderer = Renderer::new(RecordingDevice::new(), options);
        renderer
            .render_frame(
                FrameInput {
                    frame: &frame,
                    layers: &layers,
                    transitions_active: false,
                },
                &mut registry,
            )
            .expect("frame");
        assert_eq!(
            renderer.device().draw_count(ProgramId::BACKGROUND_PLAIN),
            4
        );
    }
}
