//! Stencil clip masks.
//!
//! Every tile with a clip ID writes its reference into the stencil under its
//! own footprint before any layer draws. The masks survive in the main
//! target's stencil, so a frame whose masks match the previous frame's skips
//! both the stencil clear and the redraw.

use std::collections::BTreeMap;

use render_protocol::{FramebufferSize, TransformMatrix4x4};
use tiles::{ClipId, TileId};

use crate::device::{DepthRange, DeviceError, DrawCall, GraphicsDevice, ProgramId, StencilTest};
use crate::gpu_state::GpuStateCache;
use crate::source::SourceRegistry;
use crate::uniforms::ClipMaskUniforms;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct MaskTile {
    pub(crate) id: TileId,
    pub(crate) clip: ClipId,
    pub(crate) matrix: TransformMatrix4x4,
    pub(crate) extent: f32,
}

#[derive(Debug, Clone, PartialEq)]
struct MaskFingerprint {
    framebuffer: FramebufferSize,
    tiles: Vec<MaskTile>,
}

#[derive(Debug, Default)]
pub(crate) struct ClipMaskState {
    previous: Option<MaskFingerprint>,
}

impl ClipMaskState {
    /// Records this frame's masks; returns whether they differ from what
    /// the stencil holds.
    pub(crate) fn update(&mut self, framebuffer: FramebufferSize, tiles: &[MaskTile]) -> bool {
        let unchanged = self.previous.as_ref().is_some_and(|previous| {
            previous.framebuffer == framebuffer && previous.tiles == tiles
        });
        if !unchanged {
            self.previous = Some(MaskFingerprint {
                framebuffer,
                tiles: tiles.to_vec(),
            });
        }
        !unchanged
    }

    pub(crate) fn invalidate(&mut self) {
        self.previous = None;
    }
}

/// One mask per tile ID across all active sources, ordered by `(z, x, y)`.
/// When several sources show the same tile the first source's matrix wins;
/// the clip ID is shared anyway.
pub(crate) fn collect_mask_tiles(sources: &SourceRegistry) -> Vec<MaskTile> {
    let mut masks = BTreeMap::new();
    for (_, source) in sources.active() {
        for tile in source.tiles() {
            let Some(clip) = tile.clip else {
                continue;
            };
            masks.entry(tile.id).or_insert(MaskTile {
                id: tile.id,
                clip,
                matrix: tile.matrix,
                extent: tile.extent,
            });
        }
    }
    masks.into_values().collect()
}

/// Writes every mask into the current target's stencil. Color and depth
/// writes are off meanwhile; the caller re-establishes pass state.
pub(crate) fn draw_clip_masks(
    device: &mut dyn GraphicsDevice,
    gpu_state: &mut GpuStateCache,
    masks: &[MaskTile],
) -> Result<u32, DeviceError> {
    if masks.is_empty() {
        return Ok(0);
    }

    gpu_state.forget_pass();
    gpu_state.set_color_writes(device, false)?;
    gpu_state.set_depth_mask(device, false)?;
    gpu_state.set_blend(device, false)?;
    gpu_state.set_depth_range(device, DepthRange::FULL)?;
    gpu_state.use_program(device, ProgramId::CLIP_MASK)?;

    let mut draws = 0;
    for mask in masks {
        gpu_state.set_stencil_test(
            device,
            StencilTest::Write {
                reference: mask.clip.reference,
            },
        )?;
        let uniforms = ClipMaskUniforms {
            matrix: mask.matrix,
            extent: mask.extent,
            _padding: [0.0; 3],
        };
        device.set_uniforms(bytemuck::bytes_of(&uniforms))?;
        device.draw(&DrawCall::Quad)?;
        draws += 1;
    }

    gpu_state.set_color_writes(device, true)?;
    Ok(draws)
}
