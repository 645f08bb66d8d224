//! The caller-thread side of a map: camera edits and posted session ops.
//! Nothing here touches the renderer; mutations end in `mark_dirty`, or in a
//! plain wake when the render side decides whether a frame is owed.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use frame_scheduler::FrameRequester;
use render_protocol::{FramebufferSize, LogicalSize, SourceId};
use renderer::Source;
use view::{LatLng, MapTransform, ScreenPoint, TransformState};

use crate::error::MapError;
use crate::style::Style;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugOptions {
    pub trace_render_tree: bool,
    pub debug_tiles: bool,
}

pub(crate) enum SessionOp {
    SetStyle(Box<dyn Style>),
    AddSource(SourceId, Box<dyn Source>),
    RemoveSource(SourceId),
    SetDebug(DebugOptions),
    SetClasses(Vec<String>),
    SetStyleTransition(Duration),
    Cleanup,
}

/// Style settings that outlive a style replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StyleSettings {
    pub classes: Vec<String>,
    pub transition: Duration,
}

pub(crate) struct SessionShared {
    camera: Mutex<MapTransform>,
    debug: Mutex<DebugOptions>,
    style_settings: Mutex<StyleSettings>,
    epoch: Instant,
}

impl SessionShared {
    pub(crate) fn new(
        camera: MapTransform,
        debug: DebugOptions,
        style_settings: StyleSettings,
    ) -> Self {
        Self {
            camera: Mutex::new(camera),
            debug: Mutex::new(debug),
            style_settings: Mutex::new(style_settings),
            epoch: Instant::now(),
        }
    }

    pub(crate) fn camera(&self) -> MutexGuard<'_, MapTransform> {
        self.camera
            .lock()
            .unwrap_or_else(|_| panic!("map camera lock poisoned"))
    }

    fn debug(&self) -> MutexGuard<'_, DebugOptions> {
        self.debug
            .lock()
            .unwrap_or_else(|_| panic!("map debug options lock poisoned"))
    }

    pub(crate) fn style_settings(&self) -> MutexGuard<'_, StyleSettings> {
        self.style_settings
            .lock()
            .unwrap_or_else(|_| panic!("map style settings lock poisoned"))
    }

    /// Animation clock shared by camera transitions and frame snapshots.
    pub(crate) fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Cheap cloneable access to a running map from any thread.
#[derive(Clone)]
pub struct MapHandle {
    shared: Arc<SessionShared>,
    ops: Sender<SessionOp>,
    requester: FrameRequester,
    default_transition: Duration,
}

impl MapHandle {
    pub(crate) fn new(
        shared: Arc<SessionShared>,
        ops: Sender<SessionOp>,
        requester: FrameRequester,
        default_transition: Duration,
    ) -> Self {
        Self {
            shared,
            ops,
            requester,
            default_transition,
        }
    }

    fn edit_camera<T>(
        &self,
        edit: impl FnOnce(&mut MapTransform, Duration) -> Result<T, MapError>,
    ) -> Result<T, MapError> {
        let now = self.shared.now();
        let result = edit(&mut self.shared.camera(), now)?;
        self.requester.mark_dirty();
        Ok(result)
    }

    /// For edits that cannot be rejected.
    fn update_camera(&self, edit: impl FnOnce(&mut MapTransform, Duration)) {
        let now = self.shared.now();
        edit(&mut self.shared.camera(), now);
        self.requester.mark_dirty();
    }

    fn send(&self, op: SessionOp) -> bool {
        if self.ops.send(op).is_err() {
            log::warn!("map session op dropped: render side is gone");
            return false;
        }
        true
    }

    fn post(&self, op: SessionOp) {
        if self.send(op) {
            self.requester.mark_dirty();
        }
    }

    /// The render side decides whether the op changes the screen.
    fn post_quiet(&self, op: SessionOp) {
        if self.send(op) {
            self.requester.wake();
        }
    }

    pub fn camera_state(&self) -> TransformState {
        self.shared.camera().current_state()
    }

    pub fn center(&self) -> LatLng {
        self.shared.camera().center()
    }

    pub fn zoom(&self) -> f64 {
        self.shared.camera().zoom()
    }

    /// Degrees, clockwise.
    pub fn bearing(&self) -> f64 {
        self.shared.camera().bearing()
    }

    pub fn default_transition(&self) -> Duration {
        self.default_transition
    }

    pub fn set_center(&self, center: LatLng) {
        self.update_camera(|camera, _| camera.set_center(center));
    }

    pub fn set_zoom(&self, zoom: f64) -> Result<(), MapError> {
        self.edit_camera(|camera, _| Ok(camera.set_zoom(zoom)?))
    }

    pub fn set_bearing(&self, degrees: f64) -> Result<(), MapError> {
        self.edit_camera(|camera, _| Ok(camera.set_bearing(degrees)?))
    }

    pub fn set_zoom_range(&self, min_zoom: f64, max_zoom: f64) -> Result<(), MapError> {
        self.edit_camera(|camera, _| Ok(camera.set_zoom_range(min_zoom, max_zoom)?))
    }

    /// Moves the content by a screen delta in logical pixels.
    pub fn pan_by(&self, delta_x: f64, delta_y: f64, duration: Duration) -> Result<(), MapError> {
        self.edit_camera(|camera, now| Ok(camera.pan_by(delta_x, delta_y, duration, now)?))
    }

    pub fn pan_to(&self, center: LatLng, duration: Duration) {
        self.update_camera(|camera, now| camera.pan_to(center, duration, now));
    }

    pub fn zoom_to(
        &self,
        zoom: f64,
        around: Option<LatLng>,
        duration: Duration,
    ) -> Result<(), MapError> {
        self.edit_camera(|camera, now| Ok(camera.zoom_to(zoom, around, duration, now)?))
    }

    /// Zooms by `factor` (2.0 is one level in) over the default transition.
    pub fn scale_by(&self, factor: f64, around: Option<LatLng>) -> Result<(), MapError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(MapError::Transform(view::TransformError::InvalidZoom));
        }
        let duration = self.default_transition;
        self.edit_camera(|camera, now| {
            let zoom = camera.zoom() + factor.log2();
            Ok(camera.zoom_to(zoom, around, duration, now)?)
        })
    }

    pub fn rotate_to(&self, degrees: f64, duration: Duration) -> Result<(), MapError> {
        self.edit_camera(|camera, now| Ok(camera.rotate_to(degrees, duration, now)?))
    }

    pub fn reset_north(&self) -> Result<(), MapError> {
        self.rotate_to(0.0, self.default_transition)
    }

    pub fn ease_to(
        &self,
        center: LatLng,
        zoom: f64,
        degrees: f64,
        duration: Duration,
    ) -> Result<(), MapError> {
        self.edit_camera(|camera, now| Ok(camera.ease_to(center, zoom, degrees, duration, now)?))
    }

    pub fn fly_to(
        &self,
        center: LatLng,
        zoom: f64,
        degrees: f64,
        duration: Duration,
    ) -> Result<(), MapError> {
        self.edit_camera(|camera, now| Ok(camera.fly_to(center, zoom, degrees, duration, now)?))
    }

    pub fn cancel_transitions(&self) {
        self.update_camera(|camera, _| camera.cancel_transitions());
    }

    pub fn can_rotate(&self) -> bool {
        self.shared.camera().can_rotate()
    }

    /// Screen position of `location` under the current camera.
    pub fn project(&self, location: LatLng) -> ScreenPoint {
        self.shared.camera().project(location)
    }

    pub fn unproject(&self, point: ScreenPoint) -> LatLng {
        self.shared.camera().unproject(point)
    }

    pub fn start_panning(&self) {
        self.shared.camera().start_panning();
    }

    pub fn stop_panning(&self) {
        self.shared.camera().stop_panning();
        self.requester.mark_dirty();
    }

    pub fn start_scaling(&self) {
        self.shared.camera().start_scaling();
    }

    pub fn stop_scaling(&self) {
        self.shared.camera().stop_scaling();
        self.requester.mark_dirty();
    }

    pub fn start_rotating(&self) {
        self.shared.camera().start_rotating();
    }

    pub fn stop_rotating(&self) {
        self.shared.camera().stop_rotating();
        self.requester.mark_dirty();
    }

    /// Only a real change of size or pixel ratio costs a frame.
    pub fn resize(
        &self,
        size: LogicalSize,
        pixel_ratio: f32,
        framebuffer: FramebufferSize,
    ) -> Result<(), MapError> {
        let changed = self
            .shared
            .camera()
            .resize(size, pixel_ratio, framebuffer)?;
        if changed {
            self.requester.mark_dirty();
        }
        Ok(())
    }

    pub fn set_style(&self, style: Box<dyn Style>) {
        self.post(SessionOp::SetStyle(style));
    }

    pub fn add_source(&self, id: SourceId, source: Box<dyn Source>) {
        self.post(SessionOp::AddSource(id, source));
    }

    pub fn remove_source(&self, id: SourceId) {
        self.post(SessionOp::RemoveSource(id));
    }

    /// Replaces the applied style classes. A frame follows only if the
    /// change starts style transitions.
    pub fn set_applied_classes(&self, classes: Vec<String>) {
        self.shared.style_settings().classes = classes.clone();
        self.post_quiet(SessionOp::SetClasses(classes));
    }

    /// Adds or removes one class and returns whether it is now applied.
    pub fn toggle_class(&self, name: &str) -> bool {
        let (classes, applied) = {
            let mut settings = self.shared.style_settings();
            let applied = match settings.classes.iter().position(|class| class == name) {
                Some(index) => {
                    settings.classes.remove(index);
                    false
                }
                None => {
                    settings.classes.push(name.to_owned());
                    true
                }
            };
            (settings.classes.clone(), applied)
        };
        self.post_quiet(SessionOp::SetClasses(classes));
        applied
    }

    pub fn applied_classes(&self) -> Vec<String> {
        self.shared.style_settings().classes.clone()
    }

    /// Duration of style property transitions that do not name their own.
    pub fn set_style_transition(&self, duration: Duration) {
        self.shared.style_settings().transition = duration;
        self.post_quiet(SessionOp::SetStyleTransition(duration));
    }

    pub fn style_transition(&self) -> Duration {
        self.shared.style_settings().transition
    }

    pub fn debug(&self) -> DebugOptions {
        *self.shared.debug()
    }

    pub fn set_debug(&self, options: DebugOptions) {
        *self.shared.debug() = options;
        self.post(SessionOp::SetDebug(options));
    }

    /// Flips tile debugging and returns the new setting.
    pub fn toggle_debug(&self) -> bool {
        let options = {
            let mut debug = self.shared.debug();
            debug.debug_tiles = !debug.debug_tiles;
            *debug
        };
        self.post(SessionOp::SetDebug(options));
        options.debug_tiles
    }

    /// Releases offscreen targets on the render side before the next frame.
    pub fn cleanup(&self) {
        self.post(SessionOp::Cleanup);
    }

    /// Host side of deferred presentation: true once per frame waiting to
    /// be presented.
    pub fn needs_swap(&self) -> bool {
        self.requester.needs_swap()
    }

    pub fn swapped(&self) {
        self.requester.swapped();
    }

    pub fn mark_dirty(&self) {
        self.requester.mark_dirty();
    }
}
