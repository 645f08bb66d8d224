//! Tile sources as the orchestrator sees them, and the registry that tracks
//! which of them the current layer tree needs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use render_protocol::{
    FrameSnapshot, LayerNode, LeafLayer, SourceId, TransformMatrix4x4, TranslateAnchor,
};
use tiles::{ClipId, ClipIdAssignment, TileId};

use crate::device::{
    DepthRange, DeviceError, DrawCall, GraphicsDevice, ProgramId, StencilTest, TextureId,
};
use crate::gpu_state::GpuStateCache;
use crate::planning::{RenderPass, STRATA_EPSILON};

/// Geometry of one layer within a loaded tile.
pub trait Bucket: Send + Sync {
    fn has_data(&self) -> bool;

    fn draw(&self, layer: &LeafLayer, context: &mut LayerDrawContext<'_>)
    -> Result<(), DeviceError>;
}

/// Everything a source loaded for one tile, keyed by bucket name.
pub trait TileData: Send + Sync {
    fn bucket(&self, name: &str) -> Option<&dyn Bucket>;
}

/// A tile a source wants drawn this frame.
#[derive(Clone)]
pub struct RenderTile {
    pub id: TileId,
    /// Maps tile units (`0..extent`) to clip space.
    pub matrix: TransformMatrix4x4,
    pub extent: f32,
    pub clip: Option<ClipId>,
    pub data: Arc<dyn TileData>,
}

impl fmt::Debug for RenderTile {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RenderTile")
            .field("id", &self.id)
            .field("extent", &self.extent)
            .field("clip", &self.clip)
            .finish_non_exhaustive()
    }
}

/// Per-frame lifecycle of a tile source. Frame preparation calls these in
/// order: `refresh_tile_set`, `update_clip_ids`, `update_matrices`; the draw
/// passes then read `tiles` and end with `finalize_frame`.
pub trait Source: Send {
    fn activate(&mut self) {}

    fn deactivate(&mut self) {}

    fn refresh_tile_set(&mut self, frame: &FrameSnapshot);

    /// Tiles that will be drawn and therefore need a clip ID.
    fn tile_ids(&self) -> Vec<TileId>;

    fn update_clip_ids(&mut self, clip_ids: &ClipIdAssignment);

    fn update_matrices(&mut self, frame: &FrameSnapshot);

    fn tiles(&self) -> &[RenderTile];

    fn has_data(&self) -> bool;

    /// Runs once per frame for every active source, whether or not any
    /// layer drew one of its tiles.
    fn finalize_frame(&mut self, _context: &mut FinalizeContext<'_>) -> Result<(), DeviceError> {
        Ok(())
    }
}

pub struct SourceEntry {
    source: Box<dyn Source>,
    active: bool,
}

impl SourceEntry {
    pub fn source(&self) -> &dyn Source {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> &mut dyn Source {
        self.source.as_mut()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSetChange {
    pub activated: Vec<SourceId>,
    pub deactivated: Vec<SourceId>,
    /// Referenced by a layer but never registered.
    pub missing: Vec<SourceId>,
}

impl ActiveSetChange {
    pub fn is_empty(&self) -> bool {
        self.activated.is_empty() && self.deactivated.is_empty() && self.missing.is_empty()
    }
}

/// All configured sources in a stable order.
#[derive(Default)]
pub struct SourceRegistry {
    entries: BTreeMap<SourceId, SourceEntry>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any source with the same ID; the replaced one is
    /// deactivated first if it was active.
    pub fn insert(&mut self, id: SourceId, source: Box<dyn Source>) {
        let replaced = self.entries.insert(
            id,
            SourceEntry {
                source,
                active: false,
            },
        );
        if let Some(mut previous) = replaced {
            if previous.active {
                previous.source.deactivate();
            }
        }
    }

    pub fn remove(&mut self, id: &SourceId) -> Option<Box<dyn Source>> {
        let mut entry = self.entries.remove(id)?;
        if entry.active {
            entry.source.deactivate();
        }
        Some(entry.source)
    }

    pub fn contains(&self, id: &SourceId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &SourceId) -> Option<&SourceEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_active(&self, id: &SourceId) -> bool {
        self.entries.get(id).is_some_and(|entry| entry.active)
    }

    /// Mark and sweep over `layers`: a source is active while at least one
    /// leaf anywhere in the tree references it.
    pub fn update_active_set(&mut self, layers: &[LayerNode]) -> ActiveSetChange {
        let mut referenced = BTreeSet::new();
        for layer in layers {
            layer.visit_sources(&mut |id| {
                referenced.insert(id.clone());
            });
        }

        let mut change = ActiveSetChange::default();
        for (id, entry) in &mut self.entries {
            let wanted = referenced.contains(id);
            if wanted && !entry.active {
                entry.source.activate();
                entry.active = true;
                change.activated.push(id.clone());
            } else if !wanted && entry.active {
                entry.source.deactivate();
                entry.active = false;
                change.deactivated.push(id.clone());
            }
        }
        change.missing = referenced
            .into_iter()
            .filter(|id| !self.entries.contains_key(id))
            .collect();
        change
    }

    pub fn active(&self) -> impl Iterator<Item = (&SourceId, &dyn Source)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.active)
            .map(|(id, entry)| (id, entry.source.as_ref()))
    }

    pub fn active_mut(&mut self) -> impl Iterator<Item = (&SourceId, &mut dyn Source)> {
        self.entries
            .iter_mut()
            .filter(|(_, entry)| entry.active)
            .map(|(id, entry)| (id, entry.source.as_mut() as &mut dyn Source))
    }

    /// Deactivates everything, for example when the map stops.
    pub fn deactivate_all(&mut self) {
        for entry in self.entries.values_mut() {
            if entry.active {
                entry.source.deactivate();
                entry.active = false;
            }
        }
    }
}

/// Cross-fade parameters for zoom-dependent content.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeState {
    pub active: bool,
    /// Blend weight of the finer zoom level's content, `0..=1`.
    pub mix: f32,
}

impl FadeState {
    pub fn for_frame(frame: &FrameSnapshot, active: bool) -> Self {
        let fraction = frame.zoom_fraction() as f32;
        let mix = if active {
            fraction
        } else if fraction < 0.5 {
            0.0
        } else {
            1.0
        };
        Self { active, mix }
    }
}

/// What a bucket may do while one of its layers is drawn for one tile.
/// Raster state that belongs to the pass (blend, depth writes, stencil) is
/// already set and is not reachable from here.
pub struct LayerDrawContext<'a> {
    pub(crate) device: &'a mut dyn GraphicsDevice,
    pub(crate) gpu_state: &'a mut GpuStateCache,
    pub(crate) frame: &'a FrameSnapshot,
    pub(crate) tile: &'a RenderTile,
    pub(crate) pass: RenderPass,
    pub(crate) fade: FadeState,
    pub(crate) draw_calls: &'a mut u32,
}

impl LayerDrawContext<'_> {
    pub fn frame(&self) -> &FrameSnapshot {
        self.frame
    }

    pub fn tile(&self) -> &RenderTile {
        self.tile
    }

    pub fn pass(&self) -> RenderPass {
        self.pass
    }

    pub fn strata(&self) -> f32 {
        self.gpu_state.strata()
    }

    pub fn fade(&self) -> FadeState {
        self.fade
    }

    /// The tile matrix moved by a screen offset in logical pixels.
    pub fn translated_matrix(
        &self,
        translate: [f32; 2],
        anchor: TranslateAnchor,
    ) -> TransformMatrix4x4 {
        view::translated_matrix(
            self.frame,
            &self.tile.matrix,
            self.tile.id,
            f64::from(self.tile.extent),
            translate,
            anchor,
        )
    }

    /// The matrix `layer`'s geometry is drawn with, its translate applied.
    pub fn layer_matrix(&self, layer: &LeafLayer) -> TransformMatrix4x4 {
        let (translate, anchor) = layer.properties.translation();
        self.translated_matrix(translate, anchor)
    }

    pub fn use_program(&mut self, program: ProgramId) -> Result<(), DeviceError> {
        self.gpu_state.use_program(self.device, program)
    }

    pub fn set_line_width(&mut self, width: f32) -> Result<(), DeviceError> {
        self.gpu_state.set_line_width(self.device, width)
    }

    /// Moves the near depth bound `offset` epsilons above the layer's
    /// strata, for sub-draws of one layer that must not z-fight.
    pub fn set_depth_range_offset(&mut self, offset: u16) -> Result<(), DeviceError> {
        let near = self.gpu_state.strata() + f32::from(offset) * STRATA_EPSILON;
        self.gpu_state
            .set_depth_range(self.device, DepthRange { near, far: 1.0 })
    }

    pub fn set_uniforms(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
        self.device.set_uniforms(bytes)
    }

    pub fn bind_texture(&mut self, texture: TextureId) -> Result<(), DeviceError> {
        self.device.bind_texture(texture)
    }

    pub fn draw(&mut self, call: &DrawCall) -> Result<(), DeviceError> {
        self.device.draw(call)?;
        *self.draw_calls += 1;
        Ok(())
    }
}

/// Device access for a source's end-of-frame work such as debug overlays.
pub struct FinalizeContext<'a> {
    pub(crate) device: &'a mut dyn GraphicsDevice,
    pub(crate) gpu_state: &'a mut GpuStateCache,
    pub(crate) frame: &'a FrameSnapshot,
    pub(crate) debug_tiles: bool,
    pub(crate) draw_calls: &'a mut u32,
}

impl FinalizeContext<'_> {
    pub fn frame(&self) -> &FrameSnapshot {
        self.frame
    }

    pub fn debug_tiles(&self) -> bool {
        self.debug_tiles
    }

    pub fn use_program(&mut self, program: ProgramId) -> Result<(), DeviceError> {
        self.gpu_state.use_program(self.device, program)
    }

    pub fn set_line_width(&mut self, width: f32) -> Result<(), DeviceError> {
        self.gpu_state.set_line_width(self.device, width)
    }

    /// Overlays usually draw above everything, unclipped.
    pub fn set_depth_range(&mut self, range: DepthRange) -> Result<(), DeviceError> {
        self.gpu_state.set_depth_range(self.device, range)
    }

    pub fn set_stencil_test(&mut self, test: StencilTest) -> Result<(), DeviceError> {
        self.gpu_state.set_stencil_test(self.device, test)
    }

    pub fn set_uniforms(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
        self.device.set_uniforms(bytes)
    }

    pub fn draw(&mut self, call: &DrawCall) -> Result<(), DeviceError> {
        self.device.draw(call)?;
        *self.draw_calls += 1;
        Ok(())
    }
}
