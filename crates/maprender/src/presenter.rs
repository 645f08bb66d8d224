//! Where a drawn frame goes once the renderer is done with it.

use frame_scheduler::{FrameRequester, SwapStatus};
use render_protocol::FramebufferSize;
use renderer::{DeviceError, PresentStatus, SurfacePresenter, WgpuDevice};

pub trait Presenter<D>: Send {
    fn present(
        &mut self,
        device: &mut D,
        requester: &FrameRequester,
    ) -> Result<SwapStatus, DeviceError>;

    /// The framebuffer size changed since the previous frame.
    fn resize(&mut self, _framebuffer: FramebufferSize) {}
}

/// The host presents on its own thread: it polls `needs_swap` and reports
/// back through `swapped`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferredPresenter;

impl<D> Presenter<D> for DeferredPresenter {
    fn present(
        &mut self,
        _device: &mut D,
        _requester: &FrameRequester,
    ) -> Result<SwapStatus, DeviceError> {
        Ok(SwapStatus::Pending)
    }
}

/// Treats the frame as presented once drawn. Headless rendering and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediatePresenter;

impl<D> Presenter<D> for ImmediatePresenter {
    fn present(
        &mut self,
        _device: &mut D,
        _requester: &FrameRequester,
    ) -> Result<SwapStatus, DeviceError> {
        Ok(SwapStatus::Completed)
    }
}

/// Presents the frame recorded on a `WgpuDevice` to a window surface.
pub struct WgpuPresenter {
    surface: SurfacePresenter<'static>,
    device: wgpu::Device,
}

impl WgpuPresenter {
    pub fn new(surface: SurfacePresenter<'static>, device: wgpu::Device) -> Self {
        Self { surface, device }
    }
}

impl Presenter<WgpuDevice> for WgpuPresenter {
    fn present(
        &mut self,
        device: &mut WgpuDevice,
        requester: &FrameRequester,
    ) -> Result<SwapStatus, DeviceError> {
        match self.surface.present(&self.device, device)? {
            PresentStatus::Presented => {}
            // The frame never reached the screen.
            PresentStatus::Reconfigured | PresentStatus::Skipped => requester.mark_dirty(),
        }
        Ok(SwapStatus::Completed)
    }

    fn resize(&mut self, framebuffer: FramebufferSize) {
        self.surface.resize(&self.device, framebuffer);
    }
}
