//! Frame-level orchestration.
//!
//! One call draws one frame: reset, clip masks, opaque pass, translucent
//! pass, source finalization, flush.

use render_protocol::LayerNode;

use crate::device::{ClearRequest, DeviceError, GraphicsDevice};
use crate::renderer_clip::{collect_mask_tiles, draw_clip_masks};
use crate::renderer_layers::FrameContext;
use crate::source::{FinalizeContext, SourceRegistry};
use crate::{FrameInput, FrameReport, Renderer};

impl<D: GraphicsDevice> Renderer<D> {
    pub fn render_frame(
        &mut self,
        input: FrameInput<'_>,
        sources: &mut SourceRegistry,
    ) -> Result<FrameReport, DeviceError> {
        let frame = input.frame;
        self.gpu_state.reset();

        if self.view_state.framebuffer != Some(frame.framebuffer) {
            self.device.set_viewport(frame.framebuffer)?;
            self.view_state.framebuffer = Some(frame.framebuffer);
        }

        let masks = collect_mask_tiles(sources);
        let masks_changed = self.clip_state.update(frame.framebuffer, &masks);
        self.device.clear(ClearRequest {
            color: Some([0.0; 4]),
            depth: Some(0.0),
            stencil: masks_changed.then_some(0),
        })?;

        let fade = self.fade_state(frame);
        let mut context = FrameContext {
            frame,
            sources,
            masks: &masks,
            fade,
            draw_calls: 0,
            clip_mask_draws: 0,
            depth: 0,
        };

        if let Err(error) = self.draw_masks_and_layers(&mut context, masks_changed, input.layers)
        {
            // The stencil may hold a partial mask set now.
            self.clip_state.invalidate();
            return Err(error);
        }

        let FrameContext {
            mut draw_calls,
            clip_mask_draws,
            ..
        } = context;

        for (id, source) in sources.active_mut() {
            let mut finalize_context = FinalizeContext {
                device: &mut self.device,
                gpu_state: &mut self.gpu_state,
                frame,
                debug_tiles: self.options.debug_tiles,
                draw_calls: &mut draw_calls,
            };
            if let Err(error) = source.finalize_frame(&mut finalize_context) {
                log::error!("source '{id}' failed to finalize the frame: {error}");
                return Err(error);
            }
        }

        self.device.flush()?;

        let report = FrameReport {
            draw_calls,
            clip_mask_draws,
            clip_masks_redrawn: masks_changed,
            fade_active: fade.active,
            owes_frame: input.transitions_active || fade.active,
        };
        log::trace!(
            "frame at {:?}: {} draw calls, {} clip masks",
            frame.timestamp,
            report.draw_calls,
            report.clip_mask_draws
        );
        Ok(report)
    }

    fn draw_masks_and_layers(
        &mut self,
        context: &mut FrameContext<'_>,
        masks_changed: bool,
        layers: &[LayerNode],
    ) -> Result<(), DeviceError> {
        if masks_changed {
            let mask_draws =
                draw_clip_masks(&mut self.device, &mut self.gpu_state, context.masks)?;
            context.clip_mask_draws += mask_draws;
            context.draw_calls += mask_draws;
        }
        self.render_layer_tree(context, layers)
    }
}
