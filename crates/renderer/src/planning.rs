use render_protocol::{BackgroundProperties, LayerKind, LeafLayer};

/// Depth offset between draws of one layer that must not z-fight, such as a
/// fill and its antialiased outline.
pub const STRATA_EPSILON: f32 = 1.0 / 65536.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderPass {
    /// Top-most layer first, depth writes on, blending off.
    Opaque,
    /// Bottom-most layer first, blending on, depth writes off.
    Translucent,
}

impl RenderPass {
    pub fn depth_writes(&self) -> bool {
        matches!(self, Self::Opaque)
    }

    pub fn blending(&self) -> bool {
        matches!(self, Self::Translucent)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Opaque => "OPAQUE",
            Self::Translucent => "TRANSLUCENT",
        }
    }
}

/// Depth slab height for a list of `layer_count` siblings.
pub fn strata_thickness(layer_count: usize) -> f32 {
    1.0 / (layer_count as f32 + 1.0)
}

/// Depth value of the layer at `index` among `layer_count` siblings, in
/// `[0, 1)`. Higher layers sit nearer, so the opaque pass (which walks the
/// list backwards) sees strictly decreasing values.
pub fn layer_strata(index: usize, layer_count: usize) -> f32 {
    index as f32 * strata_thickness(layer_count)
}

/// Whether a leaf has any work in `pass`. Invisible layers never do.
pub fn leaf_draws_in_pass(layer: &LeafLayer, pass: RenderPass) -> bool {
    if !layer.properties.is_visible() {
        return false;
    }
    match (layer.kind(), pass) {
        (LayerKind::Fill, _) => true,
        (LayerKind::Line | LayerKind::Symbol, RenderPass::Opaque) => false,
        (LayerKind::Line | LayerKind::Symbol, RenderPass::Translucent) => true,
        (LayerKind::Raster, RenderPass::Opaque) => true,
        (LayerKind::Raster, RenderPass::Translucent) => false,
    }
}

pub fn background_pass(properties: &BackgroundProperties) -> Option<RenderPass> {
    if !properties.is_visible() {
        return None;
    }
    if properties.is_opaque() {
        Some(RenderPass::Opaque)
    } else {
        Some(RenderPass::Translucent)
    }
}
