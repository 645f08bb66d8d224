//! Opaque and translucent passes over the layer tree.
//!
//! The opaque pass walks a layer list top-most first so depth writes reject
//! hidden fragments of lower layers early; the translucent pass walks it
//! bottom-most first so blending composes in order. Both give a layer the
//! same strata.

use std::fmt;

use render_protocol::{BackgroundLayer, FrameSnapshot, LayerNode, LeafLayer};

use crate::device::{DepthRange, DeviceError, DrawCall, GraphicsDevice, ProgramId, StencilTest};
use crate::planning::{
    RenderPass, STRATA_EPSILON, background_pass, layer_strata, leaf_draws_in_pass,
};
use crate::renderer_clip::MaskTile;
use crate::source::{FadeState, LayerDrawContext, SourceRegistry};
use crate::uniforms::{PatternUniforms, PlainUniforms};
use crate::{Renderer, VIEWPORT_QUAD_MATRIX};

/// Read-only inputs and counters of the frame being drawn.
pub(crate) struct FrameContext<'a> {
    pub(crate) frame: &'a FrameSnapshot,
    pub(crate) sources: &'a SourceRegistry,
    pub(crate) masks: &'a [MaskTile],
    pub(crate) fade: FadeState,
    pub(crate) draw_calls: u32,
    pub(crate) clip_mask_draws: u32,
    /// Nesting of the traversal, for trace indentation.
    pub(crate) depth: usize,
}

impl<D: GraphicsDevice> Renderer<D> {
    /// Draws `layers` into the current target: opaque pass, then
    /// translucent pass.
    pub(crate) fn render_layer_tree(
        &mut self,
        context: &mut FrameContext<'_>,
        layers: &[LayerNode],
    ) -> Result<(), DeviceError> {
        self.render_pass(context, layers, RenderPass::Opaque)?;
        self.render_pass(context, layers, RenderPass::Translucent)
    }

    fn render_pass(
        &mut self,
        context: &mut FrameContext<'_>,
        layers: &[LayerNode],
        pass: RenderPass,
    ) -> Result<(), DeviceError> {
        self.gpu_state.set_pass(&mut self.device, pass)?;
        self.trace(context, format_args!("{} {{", pass.label()));
        context.depth += 1;

        let count = layers.len();
        for step in 0..count {
            let index = match pass {
                RenderPass::Opaque => count - 1 - step,
                RenderPass::Translucent => step,
            };
            self.gpu_state.set_strata(layer_strata(index, count));
            match &layers[index] {
                LayerNode::Leaf(leaf) => self.render_leaf(context, leaf, pass)?,
                LayerNode::Background(background) => {
                    self.render_background(context, background, pass)?
                }
                LayerNode::Group(group) => {
                    if pass == RenderPass::Translucent {
                        self.render_group(context, group)?;
                    }
                }
            }
        }

        context.depth -= 1;
        self.trace(context, format_args!("}}"));
        Ok(())
    }

    fn render_leaf(
        &mut self,
        context: &mut FrameContext<'_>,
        layer: &LeafLayer,
        pass: RenderPass,
    ) -> Result<(), DeviceError> {
        if !leaf_draws_in_pass(layer, pass) {
            return Ok(());
        }
        let Some(bucket_ref) = layer.bucket.as_ref() else {
            self.diagnostics
                .warn_once(&layer.id, format_args!("no bucket to draw from"));
            return Ok(());
        };
        let Some(source_id) = bucket_ref.source.as_ref() else {
            self.diagnostics
                .warn_once(&layer.id, format_args!("bucket '{}' names no source", bucket_ref.name));
            return Ok(());
        };
        let sources = context.sources;
        let Some(entry) = sources.get(source_id) else {
            self.diagnostics
                .warn_once(&layer.id, format_args!("source '{source_id}' is not registered"));
            return Ok(());
        };
        if !entry.is_active() || !entry.source().has_data() {
            return Ok(());
        }
        if !bucket_ref.covers_zoom(context.frame.zoom) {
            return Ok(());
        }

        self.trace(
            context,
            format_args!("{} ({:?}) strata {}", layer.id, layer.kind(), self.gpu_state.strata()),
        );
        let near = self.gpu_state.strata();
        let frame = context.frame;
        for tile in entry.source().tiles() {
            let Some(bucket) = tile.data.bucket(&bucket_ref.name) else {
                continue;
            };
            if !bucket.has_data() {
                continue;
            }

            let stencil = match tile.clip {
                Some(clip) => StencilTest::Equal {
                    reference: clip.reference,
                    read_mask: clip.read_mask(),
                },
                None => StencilTest::Disabled,
            };
            self.gpu_state.set_stencil_test(&mut self.device, stencil)?;
            self.gpu_state
                .set_depth_range(&mut self.device, DepthRange { near, far: 1.0 })?;

            let mut draw_context = LayerDrawContext {
                device: &mut self.device,
                gpu_state: &mut self.gpu_state,
                frame,
                tile,
                pass,
                fade: context.fade,
                draw_calls: &mut context.draw_calls,
            };
            bucket.draw(layer, &mut draw_context)?;
            self.frame_history
                .record(frame.timestamp, frame.normalized_zoom());
        }
        Ok(())
    }

    fn render_background(
        &mut self,
        context: &mut FrameContext<'_>,
        layer: &BackgroundLayer,
        pass: RenderPass,
    ) -> Result<(), DeviceError> {
        let properties = &layer.properties;
        if background_pass(properties) != Some(pass) {
            return Ok(());
        }
        self.trace(context, format_args!("{} (Background)", layer.id));

        self.gpu_state
            .set_stencil_test(&mut self.device, StencilTest::Disabled)?;
        let near = self.gpu_state.strata() + STRATA_EPSILON;
        self.gpu_state
            .set_depth_range(&mut self.device, DepthRange { near, far: 1.0 })?;

        match properties.pattern.as_ref() {
            None => {
                self.gpu_state
                    .use_program(&mut self.device, ProgramId::BACKGROUND_PLAIN)?;
                let uniforms = PlainUniforms {
                    matrix: VIEWPORT_QUAD_MATRIX,
                    color: properties.color.premultiplied(properties.opacity),
                };
                self.device.set_uniforms(bytemuck::bytes_of(&uniforms))?;
            }
            Some(pattern) => {
                if pattern.width <= 0.0 || pattern.height <= 0.0 {
                    self.diagnostics.warn_once(
                        &layer.id,
                        format_args!("pattern '{}' has no area", pattern.name),
                    );
                    return Ok(());
                }
                let Some(binder) = self.pattern_binder.as_mut() else {
                    self.diagnostics.warn_once(
                        &layer.id,
                        format_args!("pattern '{}' needs a pattern binder", pattern.name),
                    );
                    return Ok(());
                };
                self.gpu_state
                    .use_program(&mut self.device, ProgramId::BACKGROUND_PATTERN)?;
                if !binder.bind_pattern(&mut self.device, pattern)? {
                    return Ok(());
                }
                let uniforms = PatternUniforms {
                    pattern_matrix: view::pattern_matrix(
                        context.frame,
                        f64::from(pattern.width),
                        f64::from(pattern.height),
                    ),
                    mix: context.frame.zoom_fraction() as f32,
                    opacity: properties.opacity,
                    _padding: [0.0; 2],
                };
                self.device.set_uniforms(bytemuck::bytes_of(&uniforms))?;
            }
        }

        self.device.draw(&DrawCall::Quad)?;
        context.draw_calls += 1;
        Ok(())
    }

    pub(crate) fn trace(&self, context: &FrameContext<'_>, message: fmt::Arguments<'_>) {
        if self.options.trace_render_tree {
            log::trace!("{:indent$}{message}", "", indent = context.depth * 4);
        }
    }
}
