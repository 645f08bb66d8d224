//! Presenting recorded frames to a window surface.

use render_protocol::FramebufferSize;

use crate::device::DeviceError;
use crate::wgpu_device::WgpuDevice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// The surface was outdated or lost and has been reconfigured; the frame
    /// was dropped and should be drawn again.
    Reconfigured,
    /// Acquiring the next texture timed out or the window is hidden.
    Skipped,
}

pub struct SurfacePresenter<'window> {
    surface: wgpu::Surface<'window>,
    config: wgpu::SurfaceConfiguration,
}

impl<'window> SurfacePresenter<'window> {
    /// Configures `surface` with the device's color format.
    pub fn new(
        surface: wgpu::Surface<'window>,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        size: FramebufferSize,
    ) -> Self {
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
        };
        surface.configure(device, &config);
        Self { surface, config }
    }

    pub fn size(&self) -> FramebufferSize {
        FramebufferSize::new(self.config.width, self.config.height)
    }

    pub fn resize(&mut self, device: &wgpu::Device, size: FramebufferSize) {
        if !size.has_area() || size == self.size() {
            return;
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(device, &self.config);
    }

    /// Replays the frame recorded on `renderer_device` into the next surface
    /// texture and presents it.
    pub fn present(
        &mut self,
        device: &wgpu::Device,
        renderer_device: &mut WgpuDevice,
    ) -> Result<PresentStatus, DeviceError> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                log::warn!("surface outdated, reconfiguring");
                self.surface.configure(device, &self.config);
                renderer_device.discard_frame();
                return Ok(PresentStatus::Reconfigured);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                renderer_device.discard_frame();
                return Ok(PresentStatus::Skipped);
            }
            Err(error) => return Err(DeviceError::SurfaceLost(error.to_string())),
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        renderer_device.submit_frame(&view)?;
        frame.present();
        Ok(PresentStatus::Presented)
    }
}
