use std::fmt;
use std::sync::Arc;

/// Name of a configured data source.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(Arc<str>);

impl SourceId {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SourceId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "SourceId({:?})", self.0)
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Straight (non premultiplied) RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color(pub [f32; 4]);

impl Color {
    pub const TRANSPARENT: Self = Self([0.0, 0.0, 0.0, 0.0]);
    pub const BLACK: Self = Self([0.0, 0.0, 0.0, 1.0]);
    pub const WHITE: Self = Self([1.0, 1.0, 1.0, 1.0]);

    pub const fn rgba(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self([red, green, blue, alpha])
    }

    pub const fn alpha(&self) -> f32 {
        self.0[3]
    }

    /// Premultiplied form scaled by `opacity`, ready for a
    /// `One, OneMinusSrcAlpha` blend.
    pub fn premultiplied(&self, opacity: f32) -> [f32; 4] {
        let alpha = self.0[3] * opacity;
        [self.0[0] * alpha, self.0[1] * alpha, self.0[2] * alpha, alpha]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Fill,
    Line,
    Symbol,
    Raster,
}

/// What a layer's `translate` offset is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranslateAnchor {
    /// Offsets turn with the map.
    #[default]
    Map,
    /// Offsets stay aligned with the screen whatever the bearing.
    Viewport,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillProperties {
    pub antialias: bool,
    pub opacity: f32,
    pub fill_color: Color,
    /// Outline color; `None` outlines with the fill color when antialiased.
    pub stroke_color: Option<Color>,
    /// Logical pixels.
    pub translate: [f32; 2],
    pub translate_anchor: TranslateAnchor,
}

impl Default for FillProperties {
    fn default() -> Self {
        Self {
            antialias: true,
            opacity: 1.0,
            fill_color: Color::BLACK,
            stroke_color: None,
            translate: [0.0, 0.0],
            translate_anchor: TranslateAnchor::Map,
        }
    }
}

impl FillProperties {
    pub fn is_visible(&self) -> bool {
        self.opacity > 0.0
            && (self.fill_color.alpha() > 0.0
                || self.stroke_color.is_some_and(|color| color.alpha() > 0.0))
    }

    /// A fully opaque fill can be drawn front to back in the opaque pass.
    pub fn is_opaque(&self) -> bool {
        self.opacity >= 1.0 && self.fill_color.alpha() >= 1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineProperties {
    pub opacity: f32,
    pub color: Color,
    /// Logical pixels.
    pub translate: [f32; 2],
    pub translate_anchor: TranslateAnchor,
    pub width: f32,
    pub offset: f32,
    pub blur: f32,
    pub dash_array: Option<[f32; 2]>,
}

impl Default for LineProperties {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            color: Color::BLACK,
            translate: [0.0, 0.0],
            translate_anchor: TranslateAnchor::Map,
            width: 1.0,
            offset: 0.0,
            blur: 0.0,
            dash_array: None,
        }
    }
}

impl LineProperties {
    pub fn is_visible(&self) -> bool {
        self.opacity > 0.0 && self.color.alpha() > 0.0 && self.width > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymbolProperties {
    pub icon_opacity: f32,
    pub icon_rotate: f32,
    pub text_opacity: f32,
    pub text_size: f32,
    pub text_color: Color,
    pub halo_color: Color,
    pub halo_width: f32,
    pub halo_blur: f32,
}

impl Default for SymbolProperties {
    fn default() -> Self {
        Self {
            icon_opacity: 1.0,
            icon_rotate: 0.0,
            text_opacity: 1.0,
            text_size: 12.0,
            text_color: Color::BLACK,
            halo_color: Color::rgba(1.0, 1.0, 1.0, 0.75),
            halo_width: 0.25,
            halo_blur: 1.0,
        }
    }
}

impl SymbolProperties {
    pub fn icon_visible(&self) -> bool {
        self.icon_opacity > 0.0
    }

    pub fn text_visible(&self) -> bool {
        self.text_opacity > 0.0
            && (self.text_color.alpha() > 0.0 || self.halo_color.alpha() > 0.0)
            && self.text_size > 0.0
    }

    pub fn is_visible(&self) -> bool {
        self.icon_visible() || self.text_visible()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterProperties {
    pub opacity: f32,
    pub spin: f32,
    pub brightness: [f32; 2],
    pub saturation: f32,
    pub contrast: f32,
    pub fade: f32,
}

impl Default for RasterProperties {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            spin: 0.0,
            brightness: [0.0, 1.0],
            saturation: 0.0,
            contrast: 0.0,
            fade: 0.0,
        }
    }
}

impl RasterProperties {
    pub fn is_visible(&self) -> bool {
        self.opacity > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeProperties {
    pub opacity: f32,
}

impl Default for CompositeProperties {
    fn default() -> Self {
        Self { opacity: 1.0 }
    }
}

impl CompositeProperties {
    pub fn is_visible(&self) -> bool {
        self.opacity > 0.0
    }
}

/// A repeating image from the sprite atlas. Only its pixel size matters here;
/// atlas placement belongs to whoever binds the pattern program.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternRef {
    pub name: Arc<str>,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundProperties {
    pub color: Color,
    pub opacity: f32,
    pub pattern: Option<PatternRef>,
}

impl Default for BackgroundProperties {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            opacity: 1.0,
            pattern: None,
        }
    }
}

impl BackgroundProperties {
    pub fn is_visible(&self) -> bool {
        self.opacity > 0.0 && (self.pattern.is_some() || self.color.alpha() > 0.0)
    }

    pub fn is_opaque(&self) -> bool {
        self.pattern.is_none() && self.opacity >= 1.0 && self.color.alpha() >= 1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerProperties {
    Fill(FillProperties),
    Line(LineProperties),
    Symbol(SymbolProperties),
    Raster(RasterProperties),
}

impl LayerProperties {
    pub fn kind(&self) -> LayerKind {
        match self {
            Self::Fill(_) => LayerKind::Fill,
            Self::Line(_) => LayerKind::Line,
            Self::Symbol(_) => LayerKind::Symbol,
            Self::Raster(_) => LayerKind::Raster,
        }
    }

    pub fn is_visible(&self) -> bool {
        match self {
            Self::Fill(properties) => properties.is_visible(),
            Self::Line(properties) => properties.is_visible(),
            Self::Symbol(properties) => properties.is_visible(),
            Self::Raster(properties) => properties.is_visible(),
        }
    }

    /// Screen offset of the geometry; zero for kinds that cannot move.
    pub fn translation(&self) -> ([f32; 2], TranslateAnchor) {
        match self {
            Self::Fill(properties) => (properties.translate, properties.translate_anchor),
            Self::Line(properties) => (properties.translate, properties.translate_anchor),
            Self::Symbol(_) | Self::Raster(_) => ([0.0, 0.0], TranslateAnchor::Map),
        }
    }
}

/// Where a leaf layer's geometry lives: a named bucket inside the tiles of
/// a source, usable within `[min_zoom, max_zoom)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketRef {
    pub name: Arc<str>,
    pub source: Option<SourceId>,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl BucketRef {
    pub fn new(name: impl Into<Arc<str>>, source: impl Into<SourceId>) -> Self {
        Self {
            name: name.into(),
            source: Some(source.into()),
            min_zoom: f64::NEG_INFINITY,
            max_zoom: f64::INFINITY,
        }
    }

    pub fn with_zoom_range(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    pub fn covers_zoom(&self, zoom: f64) -> bool {
        self.min_zoom <= zoom && zoom < self.max_zoom
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeafLayer {
    pub id: Arc<str>,
    pub properties: LayerProperties,
    pub bucket: Option<BucketRef>,
}

impl LeafLayer {
    pub fn kind(&self) -> LayerKind {
        self.properties.kind()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupLayer {
    pub id: Arc<str>,
    pub properties: CompositeProperties,
    pub children: Arc<[LayerNode]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundLayer {
    pub id: Arc<str>,
    pub properties: BackgroundProperties,
}

/// One entry of the ordered layer tree, bottom-most first.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerNode {
    Leaf(LeafLayer),
    Group(GroupLayer),
    Background(BackgroundLayer),
}

impl LayerNode {
    pub fn id(&self) -> &str {
        match self {
            Self::Leaf(leaf) => &leaf.id,
            Self::Group(group) => &group.id,
            Self::Background(background) => &background.id,
        }
    }

    /// Visits the source of every bucket in this sub-tree.
    pub fn visit_sources(&self, visit: &mut dyn FnMut(&SourceId)) {
        match self {
            Self::Leaf(leaf) => {
                if let Some(source) = leaf.bucket.as_ref().and_then(|bucket| bucket.source.as_ref())
                {
                    visit(source);
                }
            }
            Self::Group(group) => {
                for child in group.children.iter() {
                    child.visit_sources(visit);
                }
            }
            Self::Background(_) => {}
        }
    }
}
