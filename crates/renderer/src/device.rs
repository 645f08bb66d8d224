//! The seam between draw orchestration and a concrete GPU API.

use std::fmt;

use render_protocol::FramebufferSize;

slotmap::new_key_type! {
    pub struct TextureId;
    pub struct BufferId;
}

/// A shader program known to the device. Built-in programs have fixed IDs;
/// buckets register their own from `ProgramId::FIRST_CUSTOM` upward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub u32);

impl ProgramId {
    pub const CLIP_MASK: Self = Self(0);
    pub const BACKGROUND_PLAIN: Self = Self(1);
    /// Provided by whoever owns the sprite atlas.
    pub const BACKGROUND_PATTERN: Self = Self(2);
    pub const COMPOSITE: Self = Self(3);
    pub const FIRST_CUSTOM: u32 = 16;

    pub fn is_builtin(&self) -> bool {
        self.0 < Self::FIRST_CUSTOM
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClearRequest {
    pub color: Option<[f32; 4]>,
    pub depth: Option<f32>,
    pub stencil: Option<u8>,
}

/// Window-space depth bounds for the next draws. Strata are expressed by
/// moving `near` while `far` stays at 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthRange {
    pub near: f32,
    pub far: f32,
}

impl DepthRange {
    pub const FULL: Self = Self {
        near: 0.0,
        far: 1.0,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilTest {
    Disabled,
    /// Pass where `stencil & read_mask == reference & read_mask`.
    Equal { reference: u8, read_mask: u8 },
    /// Always pass and replace the stencil with `reference`.
    Write { reference: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Triangles,
    TriangleStrip,
    Lines,
    LineStrip,
    Points,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawCall {
    /// The unit quad every device can emit without a vertex buffer.
    Quad,
    Arrays {
        buffer: BufferId,
        primitive: Primitive,
        first: u32,
        count: u32,
    },
    Indexed {
        buffer: BufferId,
        primitive: Primitive,
        first_index: u32,
        index_count: u32,
        base_vertex: i32,
    },
}

impl DrawCall {
    pub fn primitive(&self) -> Primitive {
        match self {
            Self::Quad => Primitive::TriangleStrip,
            Self::Arrays { primitive, .. } | Self::Indexed { primitive, .. } => *primitive,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    NoProgramBound,
    UnknownProgram(ProgramId),
    UnknownBuffer(BufferId),
    UnknownTexture(TextureId),
    FramebufferUnderflow,
    UniformBlockTooLarge { size: usize, max: usize },
    SurfaceLost(String),
    Backend(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoProgramBound => write!(formatter, "draw issued without a bound program"),
            Self::UnknownProgram(program) => write!(formatter, "unknown program {}", program.0),
            Self::UnknownBuffer(buffer) => write!(formatter, "unknown buffer {buffer:?}"),
            Self::UnknownTexture(texture) => write!(formatter, "unknown texture {texture:?}"),
            Self::FramebufferUnderflow => {
                write!(formatter, "pop_framebuffer without matching push")
            }
            Self::UniformBlockTooLarge { size, max } => write!(
                formatter,
                "uniform block of {size} bytes exceeds the {max} byte limit"
            ),
            Self::SurfaceLost(message) => write!(formatter, "presentation surface lost: {message}"),
            Self::Backend(message) => write!(formatter, "graphics backend failure: {message}"),
        }
    }
}

impl std::error::Error for DeviceError {}

/// Stateful command interface in the style of a classic immediate-mode GL
/// context. State set here persists across draws and framebuffers until
/// changed. Any error is fatal for the frame.
pub trait GraphicsDevice {
    fn clear(&mut self, request: ClearRequest) -> Result<(), DeviceError>;

    fn set_viewport(&mut self, size: FramebufferSize) -> Result<(), DeviceError>;

    fn use_program(&mut self, program: ProgramId) -> Result<(), DeviceError>;

    fn set_line_width(&mut self, width: f32) -> Result<(), DeviceError>;

    fn set_depth_mask(&mut self, write: bool) -> Result<(), DeviceError>;

    fn set_blend(&mut self, enabled: bool) -> Result<(), DeviceError>;

    fn set_depth_range(&mut self, range: DepthRange) -> Result<(), DeviceError>;

    fn set_stencil_test(&mut self, test: StencilTest) -> Result<(), DeviceError>;

    fn set_color_writes(&mut self, enabled: bool) -> Result<(), DeviceError>;

    /// Uniform block for the next draws of the bound program.
    fn set_uniforms(&mut self, bytes: &[u8]) -> Result<(), DeviceError>;

    /// Texture sampled by the next draws of programs that read one.
    fn bind_texture(&mut self, texture: TextureId) -> Result<(), DeviceError>;

    fn draw(&mut self, call: &DrawCall) -> Result<(), DeviceError>;

    /// Redirects drawing into a fresh offscreen target of the current
    /// viewport size, cleared to transparent with depth and stencil zeroed.
    fn push_framebuffer(&mut self) -> Result<(), DeviceError>;

    /// Returns to the previous target; the popped target's color texture
    /// stays valid for compositing until the frame is submitted.
    fn pop_framebuffer(&mut self) -> Result<TextureId, DeviceError>;

    /// Blends `texture` over the current target as a full-viewport quad,
    /// with stencil and depth tests off. Leaves the bound state untouched.
    fn draw_composite(&mut self, texture: TextureId, opacity: f32) -> Result<(), DeviceError>;

    /// Drops pooled offscreen targets, for example after a resize.
    fn release_framebuffers(&mut self);

    fn flush(&mut self) -> Result<(), DeviceError>;
}
