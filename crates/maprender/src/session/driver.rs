//! The render-thread side of a map session.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use frame_scheduler::{FrameDriver, FrameRequester, SwapStatus};
use renderer::{DeviceError, FrameInput, FrameReport, GraphicsDevice, Renderer, SourceRegistry};

use crate::frame_prepare::{FramePreparer, PreparedFrame};
use crate::presenter::Presenter;
use crate::session::handle::{SessionOp, SessionShared};
use crate::style::Style;

pub(crate) struct MapDriver<D: GraphicsDevice, P> {
    shared: Arc<SessionShared>,
    ops: Receiver<SessionOp>,
    requester: FrameRequester,
    renderer: Renderer<D>,
    presenter: P,
    style: Box<dyn Style>,
    sources: SourceRegistry,
    preparer: FramePreparer,
    prepared: Option<PreparedFrame>,
    transitions_active: bool,
    last_report: Option<FrameReport>,
}

pub(crate) struct MapDriverParts<D: GraphicsDevice, P> {
    pub shared: Arc<SessionShared>,
    pub ops: Receiver<SessionOp>,
    pub requester: FrameRequester,
    pub renderer: Renderer<D>,
    pub presenter: P,
    pub style: Box<dyn Style>,
    pub preparer: FramePreparer,
}

impl<D: GraphicsDevice, P: Presenter<D>> MapDriver<D, P> {
    pub(crate) fn new(parts: MapDriverParts<D, P>) -> Self {
        Self {
            shared: parts.shared,
            ops: parts.ops,
            requester: parts.requester,
            renderer: parts.renderer,
            presenter: parts.presenter,
            style: parts.style,
            sources: SourceRegistry::new(),
            preparer: parts.preparer,
            prepared: None,
            transitions_active: false,
            last_report: None,
        }
    }

    pub(crate) fn renderer(&self) -> &Renderer<D> {
        &self.renderer
    }

    pub(crate) fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    pub(crate) fn last_report(&self) -> Option<FrameReport> {
        self.last_report
    }

    pub(crate) fn last_prepared(&self) -> Option<&PreparedFrame> {
        self.prepared.as_ref()
    }

    fn apply_ops(&mut self) {
        while let Ok(op) = self.ops.try_recv() {
            match op {
                SessionOp::SetStyle(mut style) => {
                    log::debug!("style replaced ({} top-level layers)", style.layers().len());
                    let settings = self.shared.style_settings().clone();
                    style.set_default_transition(settings.transition);
                    style.set_applied_classes(&settings.classes, self.shared.now());
                    self.style = style;
                }
                SessionOp::SetClasses(classes) => {
                    self.style
                        .set_applied_classes(&classes, self.shared.now());
                    if self.style.has_transitions() {
                        self.requester.mark_dirty();
                    }
                }
                SessionOp::SetStyleTransition(duration) => {
                    self.style.set_default_transition(duration);
                }
                SessionOp::AddSource(id, source) => {
                    if self.sources.contains(&id) {
                        log::debug!("source '{id}' replaced");
                    }
                    self.sources.insert(id, source);
                }
                SessionOp::RemoveSource(id) => {
                    if self.sources.remove(&id).is_none() {
                        log::warn!("cannot remove unknown source '{id}'");
                    }
                }
                SessionOp::SetDebug(options) => {
                    self.renderer
                        .set_trace_render_tree(options.trace_render_tree);
                    self.renderer.set_debug_tiles(options.debug_tiles);
                }
                SessionOp::Cleanup => {
                    self.renderer.cleanup();
                    self.preparer.reset();
                }
            }
        }
    }
}

impl<D: GraphicsDevice, P: Presenter<D>> FrameDriver for MapDriver<D, P> {
    type Error = DeviceError;

    fn setup(&mut self) -> Result<(), Self::Error> {
        log::debug!("map render thread started");
        Ok(())
    }

    fn has_surface_area(&self) -> bool {
        self.shared.camera().current_state().has_size()
    }

    fn prepare(&mut self, _requester: &FrameRequester) -> Result<(), Self::Error> {
        self.apply_ops();

        let now = self.shared.now();
        let (state, camera_moving) = {
            let mut camera = self.shared.camera();
            camera.update_transitions(now);
            (camera.current_state(), camera.needs_transition())
        };

        let prepared = self
            .preparer
            .prepare(&state, now, self.style.as_mut(), &mut self.sources);
        self.transitions_active = camera_moving || self.style.has_transitions();
        if prepared.dimensions_changed {
            log::debug!(
                "framebuffer now {}x{} at pixel ratio {}",
                prepared.snapshot.framebuffer.width,
                prepared.snapshot.framebuffer.height,
                prepared.snapshot.pixel_ratio
            );
            self.renderer.release_framebuffers();
            self.presenter.resize(prepared.snapshot.framebuffer);
        }
        self.prepared = Some(prepared);
        Ok(())
    }

    fn render(&mut self, requester: &FrameRequester) -> Result<(), Self::Error> {
        let Some(prepared) = &self.prepared else {
            return Ok(());
        };
        let report = self.renderer.render_frame(
            FrameInput {
                frame: &prepared.snapshot,
                layers: self.style.layers(),
                transitions_active: self.transitions_active,
            },
            &mut self.sources,
        )?;
        if report.owes_frame {
            requester.mark_dirty();
        }
        self.last_report = Some(report);
        Ok(())
    }

    fn present(&mut self) -> Result<SwapStatus, Self::Error> {
        self.presenter
            .present(self.renderer.device_mut(), &self.requester)
    }

    fn teardown(&mut self) {
        self.sources.deactivate_all();
        self.renderer.cleanup();
        self.preparer.reset();
        log::debug!("map render thread stopped");
    }
}
