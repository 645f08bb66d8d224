//! Renderer crate root.
//!
//! This module defines the public API (`Renderer`, `RenderOptions`, `FrameInput`,
//! `FrameReport`) and the state compartments the frame pipeline works on.
//!
//! Internal architecture overview:
//! - `renderer_frame`: one frame from reset to source finalization.
//! - `renderer_clip`: stencil clip masks and their reuse between frames.
//! - `renderer_layers`: the opaque and translucent passes over the layer tree.
//! - `renderer_composite`: offscreen rendering of group layers.
//! - `planning`/`gpu_state`/`frame_history`: pass rules, redundant state
//!   filtering and fade bookkeeping shared by the orchestration modules.
//! - `device`/`source`: the seams to the GPU and to tile sources.
//! - `wgpu_device`/`wgpu_pipeline`/`wgpu_surface`: the `wgpu` backend.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use render_protocol::{FrameSnapshot, FramebufferSize, LayerNode, PatternRef, TransformMatrix4x4};

mod device;
mod frame_history;
mod gpu_state;
mod planning;
mod renderer_clip;
mod renderer_composite;
mod renderer_frame;
mod renderer_layers;
mod source;
mod uniforms;
mod wgpu_device;
mod wgpu_pipeline;
mod wgpu_surface;

#[cfg(any(test, feature = "test-helpers"))]
mod recording;

pub use device::{
    BufferId, ClearRequest, DepthRange, DeviceError, DrawCall, GraphicsDevice, Primitive,
    ProgramId, StencilTest, TextureId,
};
pub use frame_history::{FrameHistory, FrameHistoryEntry};
pub use planning::{
    RenderPass, STRATA_EPSILON, background_pass, layer_strata, leaf_draws_in_pass,
    strata_thickness,
};
#[cfg(any(test, feature = "test-helpers"))]
pub use recording::{DeviceCall, RecordingDevice};
pub use source::{
    ActiveSetChange, Bucket, FadeState, FinalizeContext, LayerDrawContext, RenderTile, Source,
    SourceEntry, SourceRegistry, TileData,
};
pub use uniforms::{ClipMaskUniforms, CompositeUniforms, PatternUniforms, PlainUniforms};
pub use wgpu_device::{GpuContext, WgpuDevice, WgpuDeviceConfig};
pub use wgpu_pipeline::ProgramDescriptor;
pub use wgpu_surface::{PresentStatus, SurfacePresenter};

use gpu_state::GpuStateCache;
use renderer_clip::ClipMaskState;

/// Maps the unit quad emitted by `DrawCall::Quad` onto the whole viewport.
pub const VIEWPORT_QUAD_MATRIX: TransformMatrix4x4 = [
    2.0, 0.0, 0.0, 0.0, // col0
    0.0, 2.0, 0.0, 0.0, // col1
    0.0, 0.0, 1.0, 0.0, // col2
    -1.0, -1.0, 0.0, 1.0, // col3
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// How long zoom-dependent content keeps cross-fading after the zoom
    /// level changes.
    pub fade_duration: Duration,
    /// Logs the traversal of every frame at trace level.
    pub trace_render_tree: bool,
    /// Asks sources to draw tile debug overlays in `finalize_frame`.
    pub debug_tiles: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            fade_duration: Duration::from_millis(300),
            trace_render_tree: false,
            debug_tiles: false,
        }
    }
}

/// Binds the atlas image of a background pattern for
/// `ProgramId::BACKGROUND_PATTERN`. The sprite atlas belongs to the host.
pub trait PatternBinder: Send {
    /// Returns `false` when the pattern is not available yet.
    fn bind_pattern(
        &mut self,
        device: &mut dyn GraphicsDevice,
        pattern: &PatternRef,
    ) -> Result<bool, DeviceError>;
}

pub struct FrameInput<'a> {
    pub frame: &'a FrameSnapshot,
    pub layers: &'a [LayerNode],
    /// A camera or style transition will change the next frame.
    pub transitions_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    /// Every draw issued, masks and composites included.
    pub draw_calls: u32,
    pub clip_mask_draws: u32,
    pub clip_masks_redrawn: bool,
    pub fade_active: bool,
    /// Another frame must follow this one.
    pub owes_frame: bool,
}

struct ViewState {
    framebuffer: Option<FramebufferSize>,
}

struct DiagnosticsState {
    reported_layers: HashSet<Arc<str>>,
}

impl DiagnosticsState {
    /// Logs a layer problem the first time it is seen.
    fn warn_once(&mut self, layer_id: &Arc<str>, message: fmt::Arguments<'_>) {
        if self.reported_layers.insert(Arc::clone(layer_id)) {
            log::warn!("layer '{layer_id}': {message}");
        }
    }
}

pub struct Renderer<D: GraphicsDevice> {
    device: D,
    gpu_state: GpuStateCache,
    frame_history: FrameHistory,
    clip_state: ClipMaskState,
    view_state: ViewState,
    diagnostics: DiagnosticsState,
    pattern_binder: Option<Box<dyn PatternBinder>>,
    options: RenderOptions,
}

impl<D: GraphicsDevice> Renderer<D> {
    pub fn new(device: D, options: RenderOptions) -> Self {
        Self {
            device,
            gpu_state: GpuStateCache::default(),
            frame_history: FrameHistory::new(),
            clip_state: ClipMaskState::default(),
            view_state: ViewState { framebuffer: None },
            diagnostics: DiagnosticsState {
                reported_layers: HashSet::new(),
            },
            pattern_binder: None,
            options,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn set_trace_render_tree(&mut self, enabled: bool) {
        self.options.trace_render_tree = enabled;
    }

    pub fn set_debug_tiles(&mut self, enabled: bool) {
        self.options.debug_tiles = enabled;
    }

    pub fn set_pattern_binder(&mut self, binder: Box<dyn PatternBinder>) {
        self.pattern_binder = Some(binder);
    }

    pub fn frame_history(&self) -> &FrameHistory {
        &self.frame_history
    }

    /// Whether fades started by a zoom change still run at `now`. The
    /// history keeps reporting the last change, so the fade also ends
    /// `fade_duration` after it.
    pub fn needs_animation(&self, now: Duration) -> bool {
        let within_window = self
            .frame_history
            .entries()
            .last()
            .is_some_and(|last| now <= last.timestamp + self.options.fade_duration);
        within_window && self.frame_history.needs_animation(self.options.fade_duration)
    }

    /// The fade state buckets see while drawing `frame`.
    pub fn fade_state(&self, frame: &FrameSnapshot) -> FadeState {
        FadeState::for_frame(frame, self.needs_animation(frame.timestamp))
    }

    /// Drops offscreen targets sized for the old framebuffer. The stencil
    /// content goes with them, so the next frame redraws its clip masks.
    pub fn release_framebuffers(&mut self) {
        self.device.release_framebuffers();
        self.clip_state.invalidate();
    }

    /// Releases offscreen targets and forgets state that depends on the
    /// framebuffer, for example when the map goes idle.
    pub fn cleanup(&mut self) {
        self.device.release_framebuffers();
        self.clip_state.invalidate();
        self.view_state.framebuffer = None;
        self.diagnostics.reported_layers.clear();
    }
}

#[cfg(test)]
mod tests;

#[cfg(test)]
mod wgsl_tests;
