//! Shader programs and the render pipelines built from them.
//!
//! A classic GL program becomes one `wgpu::ShaderModule`; every raster
//! state combination it is drawn with becomes one pipeline, created on first
//! use and cached by `PipelineKey`.

use crate::device::{Primitive, ProgramId, StencilTest};

/// Size of one slot in the uniform arena. Blocks are padded to it so each
/// draw's dynamic offset stays aligned.
pub(crate) const UNIFORM_SLOT_SIZE: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum StencilMode {
    Disabled,
    Equal { read_mask: u8 },
    Write,
}

impl StencilMode {
    /// Splits a stencil test into its pipeline part and the dynamic
    /// reference set on the pass.
    pub(crate) fn from_test(test: StencilTest) -> (Self, u8) {
        match test {
            StencilTest::Disabled => (Self::Disabled, 0),
            StencilTest::Equal {
                reference,
                read_mask,
            } => (Self::Equal { read_mask }, reference),
            StencilTest::Write { reference } => (Self::Write, reference),
        }
    }

    fn state(&self) -> wgpu::StencilState {
        let (compare, pass_op, read_mask, write_mask) = match self {
            Self::Disabled => (
                wgpu::CompareFunction::Always,
                wgpu::StencilOperation::Keep,
                0,
                0,
            ),
            Self::Equal { read_mask } => (
                wgpu::CompareFunction::Equal,
                wgpu::StencilOperation::Keep,
                u32::from(*read_mask),
                0,
            ),
            Self::Write => (
                wgpu::CompareFunction::Always,
                wgpu::StencilOperation::Replace,
                0xFF,
                0xFF,
            ),
        };
        let face = wgpu::StencilFaceState {
            compare,
            fail_op: wgpu::StencilOperation::Keep,
            depth_fail_op: wgpu::StencilOperation::Keep,
            pass_op,
        };
        wgpu::StencilState {
            front: face,
            back: face,
            read_mask,
            write_mask,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PipelineKey {
    pub(crate) program: ProgramId,
    pub(crate) primitive: Primitive,
    pub(crate) blend: bool,
    pub(crate) depth_write: bool,
    pub(crate) color_writes: bool,
    pub(crate) stencil: StencilMode,
    pub(crate) format: wgpu::TextureFormat,
}

/// A program as registered by a host for its bucket types.
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    pub label: String,
    pub wgsl: String,
    /// Zero for programs that only use `DrawCall::Quad`.
    pub vertex_stride: u64,
    pub vertex_attributes: Vec<wgpu::VertexAttribute>,
    /// Reads the texture set with `bind_texture` from bind group 1.
    pub samples_texture: bool,
}

pub(crate) struct Program {
    label: String,
    module: wgpu::ShaderModule,
    vertex_stride: u64,
    vertex_attributes: Vec<wgpu::VertexAttribute>,
    pub(crate) samples_texture: bool,
    /// Clip masks and composites ignore depth; everything else is ordered
    /// by strata.
    depth_tested: bool,
}

impl Program {
    pub(crate) fn new(device: &wgpu::Device, descriptor: &ProgramDescriptor) -> Self {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&descriptor.label),
            source: wgpu::ShaderSource::Wgsl(descriptor.wgsl.as_str().into()),
        });
        Self {
            label: descriptor.label.clone(),
            module,
            vertex_stride: descriptor.vertex_stride,
            vertex_attributes: descriptor.vertex_attributes.clone(),
            samples_texture: descriptor.samples_texture,
            depth_tested: true,
        }
    }

    fn builtin(
        device: &wgpu::Device,
        label: &str,
        wgsl: &str,
        samples_texture: bool,
        depth_tested: bool,
    ) -> Self {
        let mut program = Self::new(
            device,
            &ProgramDescriptor {
                label: label.to_owned(),
                wgsl: wgsl.to_owned(),
                vertex_stride: 0,
                vertex_attributes: Vec::new(),
                samples_texture,
            },
        );
        program.depth_tested = depth_tested;
        program
    }
}

pub(crate) fn builtin_programs(device: &wgpu::Device) -> Vec<(ProgramId, Program)> {
    vec![
        (
            ProgramId::CLIP_MASK,
            Program::builtin(
                device,
                "renderer.clip_mask",
                include_str!("clip_mask.wgsl"),
                false,
                false,
            ),
        ),
        (
            ProgramId::BACKGROUND_PLAIN,
            Program::builtin(
                device,
                "renderer.background",
                include_str!("background.wgsl"),
                false,
                true,
            ),
        ),
        (
            ProgramId::COMPOSITE,
            Program::builtin(
                device,
                "renderer.composite",
                include_str!("composite.wgsl"),
                true,
                false,
            ),
        ),
    ]
}

pub(crate) struct PipelineLayouts {
    pub(crate) uniforms: wgpu::BindGroupLayout,
    pub(crate) texture: wgpu::BindGroupLayout,
    uniforms_only: wgpu::PipelineLayout,
    with_texture: wgpu::PipelineLayout,
}

impl PipelineLayouts {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let uniforms = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("renderer.uniform_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("renderer.texture_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let uniforms_only = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("renderer.pipeline_layout.uniforms"),
            bind_group_layouts: &[&uniforms],
            immediate_size: 0,
        });
        let with_texture = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("renderer.pipeline_layout.texture"),
            bind_group_layouts: &[&uniforms, &texture],
            immediate_size: 0,
        });
        Self {
            uniforms,
            texture,
            uniforms_only,
            with_texture,
        }
    }
}

fn topology(primitive: Primitive) -> (wgpu::PrimitiveTopology, Option<wgpu::IndexFormat>) {
    match primitive {
        Primitive::Triangles => (wgpu::PrimitiveTopology::TriangleList, None),
        Primitive::TriangleStrip => (
            wgpu::PrimitiveTopology::TriangleStrip,
            Some(wgpu::IndexFormat::Uint32),
        ),
        Primitive::Lines => (wgpu::PrimitiveTopology::LineList, None),
        Primitive::LineStrip => (
            wgpu::PrimitiveTopology::LineStrip,
            Some(wgpu::IndexFormat::Uint32),
        ),
        Primitive::Points => (wgpu::PrimitiveTopology::PointList, None),
    }
}

/// Premultiplied source-over.
fn premultiplied_blend() -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

pub(crate) fn create_pipeline(
    device: &wgpu::Device,
    layouts: &PipelineLayouts,
    program: &Program,
    key: &PipelineKey,
    depth_stencil_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let (topology, strip_index_format) = topology(key.primitive);
    let layout = if program.samples_texture {
        &layouts.with_texture
    } else {
        &layouts.uniforms_only
    };
    let vertex_buffers = [wgpu::VertexBufferLayout {
        array_stride: program.vertex_stride,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &program.vertex_attributes,
    }];
    let buffers: &[wgpu::VertexBufferLayout<'_>] = if program.vertex_stride == 0 {
        &[]
    } else {
        &vertex_buffers
    };
    let depth_compare = if program.depth_tested {
        wgpu::CompareFunction::GreaterEqual
    } else {
        wgpu::CompareFunction::Always
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&program.label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &program.module,
            entry_point: Some("vs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module: &program.module,
            entry_point: Some("fs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: key.format,
                blend: key.blend.then(premultiplied_blend),
                write_mask: if key.color_writes {
                    wgpu::ColorWrites::ALL
                } else {
                    wgpu::ColorWrites::empty()
                },
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology,
            strip_index_format,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: depth_stencil_format,
            depth_write_enabled: key.depth_write && program.depth_tested,
            depth_compare,
            stencil: key.stencil.state(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}
