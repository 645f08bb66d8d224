//! Uniform block layouts of the built-in programs. Every block is padded to
//! a multiple of 16 bytes so it can live in a std140 buffer slot.

use render_protocol::TransformMatrix4x4;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ClipMaskUniforms {
    pub matrix: TransformMatrix4x4,
    pub extent: f32,
    pub _padding: [f32; 3],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PlainUniforms {
    pub matrix: TransformMatrix4x4,
    /// Premultiplied.
    pub color: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PatternUniforms {
    /// Clip space to pattern repetitions.
    pub pattern_matrix: TransformMatrix4x4,
    pub mix: f32,
    pub opacity: f32,
    pub _padding: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CompositeUniforms {
    pub opacity: f32,
    pub _padding: [f32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_blocks_are_sixteen_byte_multiples() {
        for size in [
            std::mem::size_of::<ClipMaskUniforms>(),
            std::mem::size_of::<PlainUniforms>(),
            std::mem::size_of::<PatternUniforms>(),
            std::mem::size_of::<CompositeUniforms>(),
        ] {
            assert_eq!(size % 16, 0, "uniform block of {size} bytes");
        }
    }
}
