use std::time::Duration;

use crate::matrix::TransformMatrix4x4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FramebufferSize {
    pub width: u32,
    pub height: u32,
}

impl FramebufferSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Viewport size in logical (density independent) pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogicalSize {
    pub width: u16,
    pub height: u16,
}

impl LogicalSize {
    pub const fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub const fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// A point in normalized Web-Mercator space, both axes in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldPoint {
    pub x: f64,
    pub y: f64,
}

/// Camera state frozen for one frame. Built on the render thread during
/// preparation and only read afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSnapshot {
    pub timestamp: Duration,
    pub projection_matrix: TransformMatrix4x4,
    pub extrusion_matrix: TransformMatrix4x4,
    pub native_matrix: TransformMatrix4x4,
    pub size: LogicalSize,
    pub framebuffer: FramebufferSize,
    pub pixel_ratio: f32,
    pub zoom: f64,
    /// Radians, clockwise.
    pub bearing: f64,
    pub center: WorldPoint,
}

impl FrameSnapshot {
    pub fn integer_zoom(&self) -> u8 {
        self.zoom.floor().clamp(0.0, f64::from(u8::MAX)) as u8
    }

    pub fn zoom_fraction(&self) -> f64 {
        self.zoom - self.zoom.floor()
    }

    /// Zoom relative to 512 pixel tiles. Property functions and the frame
    /// history are keyed on this value.
    pub fn normalized_zoom(&self) -> f64 {
        self.zoom.max(0.0)
    }

    pub fn scale(&self) -> f64 {
        self.zoom.exp2()
    }

    pub fn has_surface_area(&self) -> bool {
        self.size.has_area() && self.framebuffer.has_area()
    }

    /// Whether offscreen targets sized for `previous` can be reused.
    pub fn dimensions_match(&self, previous: &FrameSnapshot) -> bool {
        self.framebuffer == previous.framebuffer && self.pixel_ratio == previous.pixel_ratio
    }
}
