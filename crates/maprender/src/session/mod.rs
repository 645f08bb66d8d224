//! Map session: owns the scheduler, the render thread and the render state,
//! and hands out `MapHandle`s for caller threads.
//!
//! While idle the render state lives here and frames can be drawn
//! synchronously; `start` moves it onto the render thread and `stop` brings
//! it back.

mod driver;
mod handle;

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::unbounded;
use frame_scheduler::{FrameDriver, FrameScheduler, RenderThread, WakeOutcome};
use render_protocol::{FramebufferSize, LogicalSize, SourceId};
use renderer::{FrameReport, GraphicsDevice, Renderer, Source};
use view::{LatLng, MapTransform, ScreenPoint};

use crate::config::MapConfig;
use crate::error::MapError;
use crate::frame_prepare::{FramePreparer, PreparedFrame};
use crate::presenter::Presenter;
use crate::style::Style;

use driver::{MapDriver, MapDriverParts};
use handle::{SessionShared, StyleSettings};

pub use handle::{DebugOptions, MapHandle};

enum SessionState<D: GraphicsDevice, P: Presenter<D>> {
    Idle(Box<MapDriver<D, P>>),
    Running(RenderThread<MapDriver<D, P>>),
    /// The render thread died with an error and took the render state.
    Failed,
}

pub struct Map<D, P>
where
    D: GraphicsDevice + Send + 'static,
    P: Presenter<D> + 'static,
{
    config: MapConfig,
    scheduler: FrameScheduler,
    handle: MapHandle,
    state: SessionState<D, P>,
}

impl<D, P> Map<D, P>
where
    D: GraphicsDevice + Send + 'static,
    P: Presenter<D> + 'static,
{
    pub fn new(
        device: D,
        presenter: P,
        mut style: Box<dyn Style>,
        config: MapConfig,
    ) -> Result<Self, MapError> {
        config.validate()?;
        let camera = MapTransform::new(config.camera.min_zoom, config.camera.max_zoom)?;
        let debug = DebugOptions {
            trace_render_tree: config.render.trace_render_tree,
            debug_tiles: config.render.debug_tiles,
        };
        style.set_default_transition(config.style_transition());
        let style_settings = StyleSettings {
            classes: Vec::new(),
            transition: config.style_transition(),
        };
        let shared = Arc::new(SessionShared::new(camera, debug, style_settings));
        let scheduler = FrameScheduler::new();
        let (op_sender, op_receiver) = unbounded();
        let handle = MapHandle::new(
            Arc::clone(&shared),
            op_sender,
            scheduler.requester(),
            config.default_transition(),
        );
        let driver = MapDriver::new(MapDriverParts {
            shared,
            ops: op_receiver,
            requester: scheduler.requester(),
            renderer: Renderer::new(device, config.render_options()),
            presenter,
            style,
            preparer: FramePreparer::new(config.render.clip_overflow),
        });
        Ok(Self {
            config,
            scheduler,
            handle,
            state: SessionState::Idle(Box::new(driver)),
        })
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    pub fn handle(&self) -> &MapHandle {
        &self.handle
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, SessionState::Running(_))
    }

    /// Moves the render state onto a background thread.
    pub fn start(&mut self) -> Result<(), MapError> {
        match std::mem::replace(&mut self.state, SessionState::Failed) {
            SessionState::Idle(driver) => {
                let thread = RenderThread::spawn(
                    self.scheduler.clone(),
                    *driver,
                    &self.config.scheduler_config(),
                )
                .map_err(MapError::Spawn)?;
                self.state = SessionState::Running(thread);
                Ok(())
            }
            running @ SessionState::Running(_) => {
                self.state = running;
                Err(MapError::AlreadyStarted)
            }
            SessionState::Failed => Err(MapError::SessionUnavailable),
        }
    }

    /// Joins the render thread and takes the render state back. A fatal
    /// render error surfaces here and leaves the session unusable.
    pub fn stop(&mut self) -> Result<(), MapError> {
        match std::mem::replace(&mut self.state, SessionState::Failed) {
            SessionState::Running(thread) => {
                let driver = thread.stop()?;
                self.state = SessionState::Idle(Box::new(driver));
                Ok(())
            }
            idle @ SessionState::Idle(_) => {
                self.state = idle;
                Err(MapError::NotStarted)
            }
            SessionState::Failed => Err(MapError::SessionUnavailable),
        }
    }

    fn idle_driver(&mut self) -> Result<&mut MapDriver<D, P>, MapError> {
        match &mut self.state {
            SessionState::Idle(driver) => Ok(driver.as_mut()),
            SessionState::Running(_) => Err(MapError::AlreadyStarted),
            SessionState::Failed => Err(MapError::SessionUnavailable),
        }
    }

    /// Prepares, draws and presents one frame on the calling thread,
    /// whether or not anything changed. Does nothing without a surface.
    pub fn render_sync(&mut self) -> Result<(), MapError> {
        let scheduler = self.scheduler.clone();
        let driver = self.idle_driver()?;
        if !driver.has_surface_area() {
            log::debug!("render_sync skipped: viewport has no area");
            return Ok(());
        }
        scheduler.run_once(driver)?;
        Ok(())
    }

    /// Runs one wake-up on the calling thread: a frame is drawn only if
    /// something changed since the last one.
    pub fn on_wake(&mut self) -> Result<WakeOutcome, MapError> {
        let scheduler = self.scheduler.clone();
        let driver = self.idle_driver()?;
        Ok(scheduler.on_wake(driver)?)
    }

    /// Handles a pending wake-up, for hosts that drive frames from their
    /// own loop instead of a render thread. Returns `None` when nothing
    /// asked for a frame.
    pub fn pump(&mut self) -> Result<Option<WakeOutcome>, MapError> {
        self.idle_driver()?;
        if !self.scheduler.take_wake() {
            return Ok(None);
        }
        self.on_wake().map(Some)
    }

    /// Only available while idle.
    pub fn renderer(&self) -> Option<&Renderer<D>> {
        match &self.state {
            SessionState::Idle(driver) => Some(driver.renderer()),
            _ => None,
        }
    }

    pub fn device(&self) -> Option<&D> {
        self.renderer().map(Renderer::device)
    }

    pub fn last_report(&self) -> Option<FrameReport> {
        match &self.state {
            SessionState::Idle(driver) => driver.last_report(),
            _ => None,
        }
    }

    pub fn last_frame(&self) -> Option<&PreparedFrame> {
        match &self.state {
            SessionState::Idle(driver) => driver.last_prepared(),
            _ => None,
        }
    }

    pub fn has_source(&self, id: &SourceId) -> Option<bool> {
        match &self.state {
            SessionState::Idle(driver) => Some(driver.sources().contains(id)),
            _ => None,
        }
    }

    pub fn set_center(&self, center: LatLng) {
        self.handle.set_center(center);
    }

    pub fn set_zoom(&self, zoom: f64) -> Result<(), MapError> {
        self.handle.set_zoom(zoom)
    }

    pub fn set_bearing(&self, degrees: f64) -> Result<(), MapError> {
        self.handle.set_bearing(degrees)
    }

    pub fn can_rotate(&self) -> bool {
        self.handle.can_rotate()
    }

    pub fn project(&self, location: LatLng) -> ScreenPoint {
        self.handle.project(location)
    }

    pub fn unproject(&self, point: ScreenPoint) -> LatLng {
        self.handle.unproject(point)
    }

    pub fn resize(
        &self,
        size: LogicalSize,
        pixel_ratio: f32,
        framebuffer: FramebufferSize,
    ) -> Result<(), MapError> {
        self.handle.resize(size, pixel_ratio, framebuffer)
    }

    pub fn set_style(&self, style: Box<dyn Style>) {
        self.handle.set_style(style);
    }

    pub fn set_applied_classes(&self, classes: Vec<String>) {
        self.handle.set_applied_classes(classes);
    }

    pub fn toggle_class(&self, name: &str) -> bool {
        self.handle.toggle_class(name)
    }

    pub fn applied_classes(&self) -> Vec<String> {
        self.handle.applied_classes()
    }

    pub fn set_style_transition(&self, duration: Duration) {
        self.handle.set_style_transition(duration);
    }

    pub fn add_source(&self, id: SourceId, source: Box<dyn Source>) {
        self.handle.add_source(id, source);
    }

    pub fn remove_source(&self, id: SourceId) {
        self.handle.remove_source(id);
    }

    pub fn set_debug(&self, options: DebugOptions) {
        self.handle.set_debug(options);
    }

    pub fn toggle_debug(&self) -> bool {
        self.handle.toggle_debug()
    }

    pub fn needs_swap(&self) -> bool {
        self.handle.needs_swap()
    }

    pub fn swapped(&self) {
        self.handle.swapped();
    }

    pub fn cleanup(&self) {
        self.handle.cleanup();
    }
}
