use std::time::Duration;

use render_protocol::matrix;
use render_protocol::{FrameSnapshot, FramebufferSize, LogicalSize, WorldPoint};

use crate::latlng::LatLng;
use crate::tile_math::TILE_SIZE;
use crate::transition::{CameraTarget, CameraTransition, wrap_bearing};
use crate::{TransformError, checked_add, checked_finite};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InteractionFlags {
    pub panning: bool,
    pub scaling: bool,
    pub rotating: bool,
}

impl InteractionFlags {
    pub fn any(&self) -> bool {
        self.panning || self.scaling || self.rotating
    }
}

/// Logical pixels from the top-left corner of the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

/// Copy of the camera taken once per frame on the render thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformState {
    pub center: WorldPoint,
    pub zoom: f64,
    pub bearing: f64,
    pub size: LogicalSize,
    pub pixel_ratio: f32,
    pub framebuffer: FramebufferSize,
    pub interaction: InteractionFlags,
}

impl TransformState {
    pub fn has_size(&self) -> bool {
        self.size.has_area() && self.framebuffer.has_area()
    }

    fn world_size(&self) -> f64 {
        TILE_SIZE * self.zoom.exp2()
    }

    /// Where `location` appears on screen.
    pub fn project(&self, location: LatLng) -> ScreenPoint {
        let world = location.to_world();
        let world_size = self.world_size();
        let offset_x = (world.x - self.center.x) * world_size;
        let offset_y = (world.y - self.center.y) * world_size;
        let (sine, cosine) = self.bearing.sin_cos();
        ScreenPoint {
            x: f64::from(self.size.width) * 0.5 + cosine * offset_x - sine * offset_y,
            y: f64::from(self.size.height) * 0.5 + sine * offset_x + cosine * offset_y,
        }
    }

    /// The location shown at `point`. Points beyond the edges of the
    /// world resolve to the nearest edge.
    pub fn unproject(&self, point: ScreenPoint) -> LatLng {
        let offset_x = point.x - f64::from(self.size.width) * 0.5;
        let offset_y = point.y - f64::from(self.size.height) * 0.5;
        let world_size = self.world_size();
        let (sine, cosine) = (-self.bearing).sin_cos();
        let world = WorldPoint {
            x: (self.center.x + (cosine * offset_x - sine * offset_y) / world_size).clamp(0.0, 1.0),
            y: (self.center.y + (sine * offset_x + cosine * offset_y) / world_size).clamp(0.0, 1.0),
        };
        LatLng::from_world(world)
    }

    pub fn snapshot(&self, timestamp: Duration) -> FrameSnapshot {
        let width = f64::from(self.size.width);
        let height = f64::from(self.size.height);
        let projection = matrix::ortho(0.0, width, height, 0.0, 0.0, 1.0);
        let extrusion = matrix::rotate_z(&projection, self.bearing);
        FrameSnapshot {
            timestamp,
            projection_matrix: matrix::to_gpu(&projection),
            extrusion_matrix: matrix::to_gpu(&extrusion),
            native_matrix: matrix::to_gpu(&projection),
            size: self.size,
            framebuffer: self.framebuffer,
            pixel_ratio: self.pixel_ratio,
            zoom: self.zoom,
            bearing: self.bearing,
            center: self.center,
        }
    }
}

/// The camera. Mutated by the map session from caller threads; the render
/// thread advances transitions and reads a `TransformState` per frame.
#[derive(Debug, Clone)]
pub struct MapTransform {
    center: WorldPoint,
    zoom: f64,
    bearing: f64,
    min_zoom: f64,
    max_zoom: f64,
    size: LogicalSize,
    pixel_ratio: f32,
    framebuffer: FramebufferSize,
    interaction: InteractionFlags,
    transition: Option<CameraTransition>,
}

impl Default for MapTransform {
    fn default() -> Self {
        Self {
            center: WorldPoint { x: 0.5, y: 0.5 },
            zoom: 0.0,
            bearing: 0.0,
            min_zoom: 0.0,
            max_zoom: 18.0,
            size: LogicalSize::default(),
            pixel_ratio: 1.0,
            framebuffer: FramebufferSize::default(),
            interaction: InteractionFlags::default(),
            transition: None,
        }
    }
}

impl MapTransform {
    pub fn new(min_zoom: f64, max_zoom: f64) -> Result<Self, TransformError> {
        let mut transform = Self::default();
        transform.set_zoom_range(min_zoom, max_zoom)?;
        Ok(transform)
    }

    pub fn set_zoom_range(&mut self, min_zoom: f64, max_zoom: f64) -> Result<(), TransformError> {
        let min_zoom = checked_finite(min_zoom)?;
        let max_zoom = checked_finite(max_zoom)?;
        if min_zoom > max_zoom || min_zoom < 0.0 {
            return Err(TransformError::InvalidZoomRange);
        }
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self.zoom = self.zoom.clamp(min_zoom, max_zoom);
        Ok(())
    }

    pub fn center(&self) -> LatLng {
        LatLng::from_world(self.center)
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Degrees, clockwise.
    pub fn bearing(&self) -> f64 {
        self.bearing.to_degrees()
    }

    pub fn min_zoom(&self) -> f64 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> f64 {
        self.max_zoom
    }

    pub fn interaction(&self) -> InteractionFlags {
        self.interaction
    }

    /// Rotation turns the map around the viewport center, so it needs a
    /// viewport and no pinch in progress.
    pub fn can_rotate(&self) -> bool {
        self.size.has_area() && !self.interaction.scaling
    }

    pub fn project(&self, location: LatLng) -> ScreenPoint {
        self.current_state().project(location)
    }

    pub fn unproject(&self, point: ScreenPoint) -> LatLng {
        self.current_state().unproject(point)
    }

    fn current_target(&self) -> CameraTarget {
        CameraTarget {
            center: self.center,
            zoom: self.zoom,
            bearing: self.bearing,
        }
    }

    fn apply(&mut self, target: CameraTarget) {
        self.center = WorldPoint {
            x: target.center.x.clamp(0.0, 1.0),
            y: target.center.y.clamp(0.0, 1.0),
        };
        self.zoom = target.zoom.clamp(self.min_zoom, self.max_zoom);
        self.bearing = wrap_bearing(target.bearing);
    }

    fn clamp_zoom(&self, zoom: f64) -> Result<f64, TransformError> {
        if !zoom.is_finite() {
            return Err(TransformError::InvalidZoom);
        }
        Ok(zoom.clamp(self.min_zoom, self.max_zoom))
    }

    /// Starts a transition towards `target`, or jumps there when `duration`
    /// is zero. Replaces any running transition.
    fn transition_to(&mut self, target: CameraTarget, duration: Duration, now: Duration, arc: f64) {
        if duration.is_zero() {
            self.transition = None;
            self.apply(target);
            return;
        }
        if self.transition.is_some() {
            log::trace!("camera transition replaced at {now:?}");
        }
        self.transition = Some(
            CameraTransition::new(now, duration, self.current_target(), target).with_arc(arc),
        );
    }

    pub fn set_center(&mut self, center: LatLng) {
        self.transition = None;
        self.center = center.to_world();
    }

    pub fn set_zoom(&mut self, zoom: f64) -> Result<(), TransformError> {
        let zoom = self.clamp_zoom(zoom)?;
        self.transition = None;
        self.zoom = zoom;
        Ok(())
    }

    pub fn set_bearing(&mut self, degrees: f64) -> Result<(), TransformError> {
        let degrees = checked_finite(degrees)?;
        self.transition = None;
        self.bearing = wrap_bearing(degrees.to_radians());
        Ok(())
    }

    /// Moves the map content by a screen-space delta in logical pixels.
    pub fn pan_by(
        &mut self,
        delta_x: f64,
        delta_y: f64,
        duration: Duration,
        now: Duration,
    ) -> Result<(), TransformError> {
        let delta_x = checked_finite(delta_x)?;
        let delta_y = checked_finite(delta_y)?;
        let world_size = TILE_SIZE * self.zoom.exp2();
        let (sine, cosine) = (-self.bearing).sin_cos();
        let world_dx = (cosine * delta_x - sine * delta_y) / world_size;
        let world_dy = (sine * delta_x + cosine * delta_y) / world_size;
        let target = CameraTarget {
            center: WorldPoint {
                x: checked_add(self.center.x, -world_dx)?,
                y: checked_add(self.center.y, -world_dy)?,
            },
            ..self.current_target()
        };
        self.transition_to(target, duration, now, 0.0);
        Ok(())
    }

    pub fn pan_to(&mut self, center: LatLng, duration: Duration, now: Duration) {
        let target = CameraTarget {
            center: center.to_world(),
            ..self.current_target()
        };
        self.transition_to(target, duration, now, 0.0);
    }

    /// Zooms, keeping `around` fixed on screen when given.
    pub fn zoom_to(
        &mut self,
        zoom: f64,
        around: Option<LatLng>,
        duration: Duration,
        now: Duration,
    ) -> Result<(), TransformError> {
        let zoom = self.clamp_zoom(zoom)?;
        let center = match around {
            Some(anchor) => {
                let anchor = anchor.to_world();
                let factor = (self.zoom - zoom).exp2();
                WorldPoint {
                    x: anchor.x + (self.center.x - anchor.x) * factor,
                    y: anchor.y + (self.center.y - anchor.y) * factor,
                }
            }
            None => self.center,
        };
        let target = CameraTarget {
            center,
            zoom,
            bearing: self.bearing,
        };
        self.transition_to(target, duration, now, 0.0);
        Ok(())
    }

    pub fn rotate_to(
        &mut self,
        degrees: f64,
        duration: Duration,
        now: Duration,
    ) -> Result<(), TransformError> {
        let degrees = checked_finite(degrees)?;
        let target = CameraTarget {
            bearing: degrees.to_radians(),
            ..self.current_target()
        };
        self.transition_to(target, duration, now, 0.0);
        Ok(())
    }

    pub fn ease_to(
        &mut self,
        center: LatLng,
        zoom: f64,
        degrees: f64,
        duration: Duration,
        now: Duration,
    ) -> Result<(), TransformError> {
        let target = CameraTarget {
            center: center.to_world(),
            zoom: self.clamp_zoom(zoom)?,
            bearing: checked_finite(degrees)?.to_radians(),
        };
        self.transition_to(target, duration, now, 0.0);
        Ok(())
    }

    /// Like `ease_to`, but zooms out mid-way when the hop is longer than
    /// the viewport so the path stays in view.
    pub fn fly_to(
        &mut self,
        center: LatLng,
        zoom: f64,
        degrees: f64,
        duration: Duration,
        now: Duration,
    ) -> Result<(), TransformError> {
        let target = CameraTarget {
            center: center.to_world(),
            zoom: self.clamp_zoom(zoom)?,
            bearing: checked_finite(degrees)?.to_radians(),
        };
        let lowest_zoom = self.zoom.min(target.zoom);
        let world_size = TILE_SIZE * lowest_zoom.exp2();
        let distance = (target.center.x - self.center.x).hypot(target.center.y - self.center.y)
            * world_size;
        let viewport = f64::from(self.size.width.max(self.size.height)).max(1.0);
        let arc = if distance > viewport {
            (distance / viewport).log2().min(lowest_zoom - self.min_zoom)
        } else {
            0.0
        };
        self.transition_to(target, duration, now, arc);
        Ok(())
    }

    pub fn cancel_transitions(&mut self) {
        self.transition = None;
    }

    pub fn needs_transition(&self) -> bool {
        self.transition.is_some()
    }

    /// Advances the running transition to `now`, dropping it once finished.
    pub fn update_transitions(&mut self, now: Duration) {
        let Some(transition) = self.transition else {
            return;
        };
        self.apply(transition.sample(now));
        if transition.is_finished(now) {
            self.transition = None;
        }
    }

    pub fn start_panning(&mut self) {
        self.interaction.panning = true;
    }

    pub fn stop_panning(&mut self) {
        self.interaction.panning = false;
    }

    pub fn start_scaling(&mut self) {
        self.interaction.scaling = true;
    }

    pub fn stop_scaling(&mut self) {
        self.interaction.scaling = false;
    }

    pub fn start_rotating(&mut self) {
        self.interaction.rotating = true;
    }

    pub fn stop_rotating(&mut self) {
        self.interaction.rotating = false;
    }

    /// Returns whether anything changed.
    pub fn resize(
        &mut self,
        size: LogicalSize,
        pixel_ratio: f32,
        framebuffer: FramebufferSize,
    ) -> Result<bool, TransformError> {
        if !pixel_ratio.is_finite() || pixel_ratio <= 0.0 {
            return Err(TransformError::InvalidSize);
        }
        let changed = self.size != size
            || self.pixel_ratio != pixel_ratio
            || self.framebuffer != framebuffer;
        self.size = size;
        self.pixel_ratio = pixel_ratio;
        self.framebuffer = framebuffer;
        Ok(changed)
    }

    pub fn current_state(&self) -> TransformState {
        TransformState {
            center: self.center,
            zoom: self.zoom,
            bearing: self.bearing,
            size: self.size,
            pixel_ratio: self.pixel_ratio,
            framebuffer: self.framebuffer,
            interaction: self.interaction,
        }
    }
}
