use crate::device::{DepthRange, DeviceError, GraphicsDevice, ProgramId, StencilTest};
use crate::planning::RenderPass;

/// Last values sent to the device. Setters forward only real changes.
/// Everything is forgotten at the start of a frame so the first use in each
/// frame always reaches the device.
#[derive(Debug, Default)]
pub(crate) struct GpuStateCache {
    program: Option<ProgramId>,
    line_width: Option<f32>,
    depth_mask: Option<bool>,
    blend: Option<bool>,
    depth_range: Option<DepthRange>,
    stencil: Option<StencilTest>,
    color_writes: Option<bool>,
    pass: Option<RenderPass>,
    strata: f32,
}

impl GpuStateCache {
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn pass(&self) -> Option<RenderPass> {
        self.pass
    }

    /// Forces the next `set_pass` to re-apply blend and depth writes.
    pub(crate) fn forget_pass(&mut self) {
        self.pass = None;
    }

    pub(crate) fn strata(&self) -> f32 {
        self.strata
    }

    pub(crate) fn set_strata(&mut self, strata: f32) {
        self.strata = strata;
    }

    pub(crate) fn set_pass(
        &mut self,
        device: &mut dyn GraphicsDevice,
        pass: RenderPass,
    ) -> Result<(), DeviceError> {
        if self.pass == Some(pass) {
            return Ok(());
        }
        self.set_blend(device, pass.blending())?;
        self.set_depth_mask(device, pass.depth_writes())?;
        self.pass = Some(pass);
        Ok(())
    }

    pub(crate) fn use_program(
        &mut self,
        device: &mut dyn GraphicsDevice,
        program: ProgramId,
    ) -> Result<(), DeviceError> {
        if self.program != Some(program) {
            device.use_program(program)?;
            self.program = Some(program);
        }
        Ok(())
    }

    pub(crate) fn set_line_width(
        &mut self,
        device: &mut dyn GraphicsDevice,
        width: f32,
    ) -> Result<(), DeviceError> {
        if self.line_width != Some(width) {
            device.set_line_width(width)?;
            self.line_width = Some(width);
        }
        Ok(())
    }

    pub(crate) fn set_depth_mask(
        &mut self,
        device: &mut dyn GraphicsDevice,
        write: bool,
    ) -> Result<(), DeviceError> {
        if self.depth_mask != Some(write) {
            device.set_depth_mask(write)?;
            self.depth_mask = Some(write);
        }
        Ok(())
    }

    pub(crate) fn set_blend(
        &mut self,
        device: &mut dyn GraphicsDevice,
        enabled: bool,
    ) -> Result<(), DeviceError> {
        if self.blend != Some(enabled) {
            device.set_blend(enabled)?;
            self.blend = Some(enabled);
        }
        Ok(())
    }

    pub(crate) fn set_depth_range(
        &mut self,
        device: &mut dyn GraphicsDevice,
        range: DepthRange,
    ) -> Result<(), DeviceError> {
        if self.depth_range != Some(range) {
            device.set_depth_range(range)?;
            self.depth_range = Some(range);
        }
        Ok(())
    }

    pub(crate) fn set_stencil_test(
        &mut self,
        device: &mut dyn GraphicsDevice,
        test: StencilTest,
    ) -> Result<(), DeviceError> {
        if self.stencil != Some(test) {
            device.set_stencil_test(test)?;
            self.stencil = Some(test);
        }
        Ok(())
    }

    pub(crate) fn set_color_writes(
        &mut self,
        device: &mut dyn GraphicsDevice,
        enabled: bool,
    ) -> Result<(), DeviceError> {
        if self.color_writes != Some(enabled) {
            device.set_color_writes(enabled)?;
            self.color_writes = Some(enabled);
        }
        Ok(())
    }
}
