//! Group layers.
//!
//! A visible group renders its children through both passes into a fresh
//! offscreen target, then blends that target over the current one with the
//! group's opacity. Offscreen targets nest as deep as the layer tree.

use render_protocol::GroupLayer;

use crate::device::{DeviceError, GraphicsDevice};
use crate::planning::RenderPass;
use crate::renderer_clip::draw_clip_masks;
use crate::renderer_layers::FrameContext;
use crate::Renderer;

impl<D: GraphicsDevice> Renderer<D> {
    pub(crate) fn render_group(
        &mut self,
        context: &mut FrameContext<'_>,
        group: &GroupLayer,
    ) -> Result<(), DeviceError> {
        if !group.properties.is_visible() {
            return Ok(());
        }
        self.trace(
            context,
            format_args!("{} (Composite) opacity {} {{", group.id, group.properties.opacity),
        );
        context.depth += 1;
        let parent_strata = self.gpu_state.strata();

        self.device.push_framebuffer()?;
        // The new target starts with an empty stencil.
        let mask_draws = draw_clip_masks(&mut self.device, &mut self.gpu_state, context.masks)?;
        context.clip_mask_draws += mask_draws;
        context.draw_calls += mask_draws;

        self.render_layer_tree(context, &group.children)?;

        let texture = self.device.pop_framebuffer()?;
        self.device
            .draw_composite(texture, group.properties.opacity)?;
        context.draw_calls += 1;

        self.gpu_state.set_strata(parent_strata);
        self.gpu_state
            .set_pass(&mut self.device, RenderPass::Translucent)?;
        context.depth -= 1;
        self.trace(context, format_args!("}}"));
        Ok(())
    }
}
