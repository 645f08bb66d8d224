//! The style as the render thread sees it: an ordered layer tree whose
//! properties are already resolved for the current zoom.

use std::time::Duration;

use render_protocol::LayerNode;

pub trait Style: Send {
    /// Bottom-most first.
    fn layers(&self) -> &[LayerNode];

    /// Re-evaluates zoom- and time-dependent properties before a frame.
    fn update_properties(&mut self, zoom: f64, now: Duration);

    /// Some property is still transitioning and will change the next frame.
    fn has_transitions(&self) -> bool;

    /// Switches the style classes in effect. Properties that change because
    /// of it may start transitions at `now`.
    fn set_applied_classes(&mut self, _classes: &[String], _now: Duration) {}

    /// Duration of property transitions that do not name their own.
    fn set_default_transition(&mut self, _duration: Duration) {}
}

/// A style whose properties never change.
#[derive(Debug, Clone, Default)]
pub struct StaticStyle {
    layers: Vec<LayerNode>,
}

impl StaticStyle {
    pub fn new(layers: Vec<LayerNode>) -> Self {
        Self { layers }
    }
}

impl Style for StaticStyle {
    fn layers(&self) -> &[LayerNode] {
        &self.layers
    }

    fn update_properties(&mut self, _zoom: f64, _now: Duration) {}

    fn has_transitions(&self) -> bool {
        false
    }
}
