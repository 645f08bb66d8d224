//! A device that records calls instead of drawing, for tests.

use render_protocol::FramebufferSize;
use slotmap::SlotMap;

use crate::device::{
    ClearRequest, DepthRange, DeviceError, DrawCall, GraphicsDevice, ProgramId, StencilTest,
    TextureId,
};

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Clear(ClearRequest),
    SetViewport(FramebufferSize),
    UseProgram(ProgramId),
    SetLineWidth(f32),
    SetDepthMask(bool),
    SetBlend(bool),
    SetDepthRange(DepthRange),
    SetStencilTest(StencilTest),
    SetColorWrites(bool),
    SetUniforms(Vec<u8>),
    BindTexture(TextureId),
    Draw {
        program: ProgramId,
        call: DrawCall,
        depth_range: DepthRange,
        stencil: StencilTest,
        /// Offscreen nesting at the time of the draw; 0 is the main target.
        target_depth: usize,
    },
    PushFramebuffer,
    PopFramebuffer(TextureId),
    DrawComposite { texture: TextureId, opacity: f32 },
    ReleaseFramebuffers,
    Flush,
}

/// Tracks the bound state so a `Draw` entry shows what it was drawn with.
#[derive(Debug)]
pub struct RecordingDevice {
    calls: Vec<DeviceCall>,
    program: Option<ProgramId>,
    depth_range: DepthRange,
    stencil: StencilTest,
    targets: Vec<TextureId>,
    textures: SlotMap<TextureId, ()>,
    offscreen: Vec<TextureId>,
    fail_draws: bool,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            program: None,
            depth_range: DepthRange::FULL,
            stencil: StencilTest::Disabled,
            targets: Vec::new(),
            textures: SlotMap::with_key(),
            offscreen: Vec::new(),
            fail_draws: false,
        }
    }
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    /// A texture that `bind_texture` accepts, standing in for an upload.
    pub fn create_texture(&mut self) -> TextureId {
        self.textures.insert(())
    }

    pub fn take_calls(&mut self) -> Vec<DeviceCall> {
        std::mem::take(&mut self.calls)
    }

    /// Makes every following draw fail like a lost device.
    pub fn fail_draws(&mut self, fail: bool) {
        self.fail_draws = fail;
    }

    pub fn draws(&self) -> impl Iterator<Item = &DeviceCall> {
        self.calls
            .iter()
            .filter(|call| matches!(call, DeviceCall::Draw { .. }))
    }

    /// Draws issued with `program`.
    pub fn draw_count(&self, program: ProgramId) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, DeviceCall::Draw { program: drawn, .. } if *drawn == program))
            .count()
    }

    pub fn count(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }
}

impl GraphicsDevice for RecordingDevice {
    fn clear(&mut self, request: ClearRequest) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::Clear(request));
        Ok(())
    }

    fn set_viewport(&mut self, size: FramebufferSize) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::SetViewport(size));
        Ok(())
    }

    fn use_program(&mut self, program: ProgramId) -> Result<(), DeviceError> {
        self.program = Some(program);
        self.calls.push(DeviceCall::UseProgram(program));
        Ok(())
    }

    fn set_line_width(&mut self, width: f32) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::SetLineWidth(width));
        Ok(())
    }

    fn set_depth_mask(&mut self, write: bool) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::SetDepthMask(write));
        Ok(())
    }

    fn set_blend(&mut self, enabled: bool) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::SetBlend(enabled));
        Ok(())
    }

    fn set_depth_range(&mut self, range: DepthRange) -> Result<(), DeviceError> {
        self.depth_range = range;
        self.calls.push(DeviceCall::SetDepthRange(range));
        Ok(())
    }

    fn set_stencil_test(&mut self, test: StencilTest) -> Result<(), DeviceError> {
        self.stencil = test;
        self.calls.push(DeviceCall::SetStencilTest(test));
        Ok(())
    }

    fn set_color_writes(&mut self, enabled: bool) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::SetColorWrites(enabled));
        Ok(())
    }

    fn set_uniforms(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::SetUniforms(bytes.to_vec()));
        Ok(())
    }

    fn bind_texture(&mut self, texture: TextureId) -> Result<(), DeviceError> {
        if !self.textures.contains_key(texture) {
            return Err(DeviceError::UnknownTexture(texture));
        }
        self.calls.push(DeviceCall::BindTexture(texture));
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> Result<(), DeviceError> {
        if self.fail_draws {
            return Err(DeviceError::Backend("recording device set to fail".to_owned()));
        }
        let program = self.program.ok_or(DeviceError::NoProgramBound)?;
        self.calls.push(DeviceCall::Draw {
            program,
            call: *call,
            depth_range: self.depth_range,
            stencil: self.stencil,
            target_depth: self.targets.len(),
        });
        Ok(())
    }

    fn push_framebuffer(&mut self) -> Result<(), DeviceError> {
        let texture = self.textures.insert(());
        self.targets.push(texture);
        self.offscreen.push(texture);
        self.calls.push(DeviceCall::PushFramebuffer);
        Ok(())
    }

    fn pop_framebuffer(&mut self) -> Result<TextureId, DeviceError> {
        let texture = self.targets.pop().ok_or(DeviceError::FramebufferUnderflow)?;
        self.calls.push(DeviceCall::PopFramebuffer(texture));
        Ok(texture)
    }

    fn draw_composite(&mut self, texture: TextureId, opacity: f32) -> Result<(), DeviceError> {
        if !self.textures.contains_key(texture) {
            return Err(DeviceError::UnknownTexture(texture));
        }
        self.calls
            .push(DeviceCall::DrawComposite { texture, opacity });
        Ok(())
    }

    fn release_framebuffers(&mut self) {
        for texture in self.offscreen.drain(..) {
            self.textures.remove(texture);
        }
        self.calls.push(DeviceCall::ReleaseFramebuffers);
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        self.calls.push(DeviceCall::Flush);
        Ok(())
    }
}
