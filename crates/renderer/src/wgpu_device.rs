//! `GraphicsDevice` on top of `wgpu`.
//!
//! State calls are recorded into segments, one per stretch of drawing into a
//! single target, and `submit_frame` replays every segment as a render pass
//! in one command encoder. A segment starts at each clear and at each
//! framebuffer push or pop.

use std::collections::HashMap;

use render_protocol::FramebufferSize;
use slotmap::SlotMap;
use wgpu::util::DeviceExt;

use crate::device::{
    BufferId, ClearRequest, DepthRange, DeviceError, DrawCall, GraphicsDevice, ProgramId,
    StencilTest, TextureId,
};
use crate::uniforms::CompositeUniforms;
use crate::wgpu_pipeline::{
    PipelineKey, PipelineLayouts, Program, ProgramDescriptor, StencilMode, UNIFORM_SLOT_SIZE,
    builtin_programs, create_pipeline,
};

const INITIAL_UNIFORM_SLOTS: u64 = 64;

pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Any adapter, no surface. Used for offscreen rendering and tests.
    pub fn request_headless() -> Result<Self, DeviceError> {
        pollster::block_on(async {
            let instance = wgpu::Instance::default();
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::LowPower,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|error| DeviceError::Backend(format!("request adapter: {error}")))?;
            Self::request(&adapter).await
        })
    }

    pub async fn request(adapter: &wgpu::Adapter) -> Result<Self, DeviceError> {
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("renderer.device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|error| DeviceError::Backend(format!("request device: {error}")))?;
        Ok(Self { device, queue })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WgpuDeviceConfig {
    /// Format of the presented target and of every offscreen target.
    pub color_format: wgpu::TextureFormat,
    pub depth_stencil_format: wgpu::TextureFormat,
}

impl Default for WgpuDeviceConfig {
    fn default() -> Self {
        Self {
            color_format: wgpu::TextureFormat::Bgra8Unorm,
            depth_stencil_format: wgpu::TextureFormat::Depth24PlusStencil8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Main,
    Offscreen(TextureId),
}

#[derive(Debug, Clone, Copy, Default)]
struct LoadOps {
    color: Option<[f32; 4]>,
    depth: Option<f32>,
    stencil: Option<u8>,
}

#[derive(Debug, Clone, Copy)]
struct RecordedDraw {
    key: PipelineKey,
    uniform_offset: u32,
    call: DrawCall,
    depth_range: DepthRange,
    stencil_reference: u8,
    texture: Option<TextureId>,
}

#[derive(Debug)]
struct Segment {
    target: Target,
    load: LoadOps,
    draws: Vec<RecordedDraw>,
}

/// What the next draw is recorded with.
#[derive(Debug, Clone, Copy)]
struct BoundState {
    program: Option<ProgramId>,
    blend: bool,
    depth_write: bool,
    color_writes: bool,
    depth_range: DepthRange,
    stencil: StencilTest,
    uniform_offset: u32,
    texture: Option<TextureId>,
}

impl Default for BoundState {
    fn default() -> Self {
        Self {
            program: None,
            blend: false,
            depth_write: false,
            color_writes: true,
            depth_range: DepthRange::FULL,
            stencil: StencilTest::Disabled,
            uniform_offset: 0,
            texture: None,
        }
    }
}

struct GpuTexture {
    view: wgpu::TextureView,
    /// Present on offscreen targets only.
    depth_stencil: Option<wgpu::TextureView>,
    size: FramebufferSize,
}

struct GpuBuffer {
    vertices: wgpu::Buffer,
    indices: Option<wgpu::Buffer>,
}

struct UniformArena {
    staging: Vec<u8>,
    buffer: wgpu::Buffer,
    capacity: u64,
    bind_group: wgpu::BindGroup,
}

impl UniformArena {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, slots: u64) -> Self {
        let capacity = slots * UNIFORM_SLOT_SIZE;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("renderer.uniforms"),
            size: capacity,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("renderer.uniforms"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(UNIFORM_SLOT_SIZE),
                }),
            }],
        });
        Self {
            staging: Vec::new(),
            buffer,
            capacity,
            bind_group,
        }
    }

    /// Slot 0 of every frame is zeroed for draws issued before any
    /// uniforms.
    fn reserve_origin(&mut self) {
        if self.staging.is_empty() {
            self.staging.resize(UNIFORM_SLOT_SIZE as usize, 0);
        }
    }

    /// Appends one block and returns its dynamic offset.
    fn push(&mut self, bytes: &[u8]) -> u32 {
        self.reserve_origin();
        let offset = self.staging.len();
        self.staging.extend_from_slice(bytes);
        self.staging.resize(offset + UNIFORM_SLOT_SIZE as usize, 0);
        offset as u32
    }
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: WgpuDeviceConfig,
    layouts: PipelineLayouts,
    programs: HashMap<ProgramId, Program>,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    sampler: wgpu::Sampler,
    uniforms: UniformArena,
    buffers: SlotMap<BufferId, GpuBuffer>,
    textures: SlotMap<TextureId, GpuTexture>,
    /// Offscreen targets free for the next push.
    offscreen_pool: Vec<TextureId>,
    /// Offscreen targets pushed this frame; back to the pool on submit.
    offscreen_in_use: Vec<TextureId>,
    target_stack: Vec<TextureId>,
    viewport: FramebufferSize,
    main_depth_stencil: Option<(FramebufferSize, wgpu::TextureView)>,
    segments: Vec<Segment>,
    bound: BoundState,
    line_width: f32,
}

impl WgpuDevice {
    pub fn new(context: &GpuContext, config: WgpuDeviceConfig) -> Self {
        let device = context.device.clone();
        let layouts = PipelineLayouts::new(&device);
        let programs = builtin_programs(&device).into_iter().collect();
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("renderer.sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let uniforms = UniformArena::new(&device, &layouts.uniforms, INITIAL_UNIFORM_SLOTS);
        Self {
            device,
            queue: context.queue.clone(),
            config,
            layouts,
            programs,
            pipelines: HashMap::new(),
            sampler,
            uniforms,
            buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            offscreen_pool: Vec::new(),
            offscreen_in_use: Vec::new(),
            target_stack: Vec::new(),
            viewport: FramebufferSize::new(1, 1),
            main_depth_stencil: None,
            segments: Vec::new(),
            bound: BoundState::default(),
            line_width: 1.0,
        }
    }

    pub fn config(&self) -> WgpuDeviceConfig {
        self.config
    }

    pub fn line_width(&self) -> f32 {
        self.line_width
    }

    /// Registers or replaces a bucket program. Built-in IDs other than
    /// `ProgramId::BACKGROUND_PATTERN` are reserved.
    pub fn register_program(
        &mut self,
        id: ProgramId,
        descriptor: &ProgramDescriptor,
    ) -> Result<(), DeviceError> {
        if id.is_builtin() && id != ProgramId::BACKGROUND_PATTERN {
            return Err(DeviceError::UnknownProgram(id));
        }
        self.pipelines.retain(|key, _| key.program != id);
        self.programs.insert(id, Program::new(&self.device, descriptor));
        Ok(())
    }

    pub fn create_buffer(&mut self, label: &str, vertices: &[u8], indices: Option<&[u32]>) -> BufferId {
        let vertices = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: vertices,
                usage: wgpu::BufferUsages::VERTEX,
            });
        let indices = indices.map(|indices| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::cast_slice(indices),
                    usage: wgpu::BufferUsages::INDEX,
                })
        });
        self.buffers.insert(GpuBuffer { vertices, indices })
    }

    pub fn release_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(buffer);
    }

    /// Uploads tightly packed RGBA8 pixels, for raster tiles and sprite
    /// atlases.
    pub fn upload_texture(
        &mut self,
        label: &str,
        size: FramebufferSize,
        pixels: &[u8],
    ) -> Result<TextureId, DeviceError> {
        let expected = size.width as usize * size.height as usize * 4;
        if !size.has_area() || pixels.len() != expected {
            return Err(DeviceError::Backend(format!(
                "texture '{label}' expects {expected} bytes for {}x{}, got {}",
                size.width,
                size.height,
                pixels.len()
            )));
        }
        let extent = wgpu::Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(size.width * 4),
                rows_per_image: Some(size.height),
            },
            extent,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(self.textures.insert(GpuTexture {
            view,
            depth_stencil: None,
            size,
        }))
    }

    pub fn release_texture(&mut self, texture: TextureId) {
        if self.offscreen_pool.contains(&texture) || self.offscreen_in_use.contains(&texture) {
            return;
        }
        self.textures.remove(texture);
    }

    /// Replays everything recorded since the last submit into `target`,
    /// which must have `WgpuDeviceConfig::color_format` and the viewport
    /// size.
    pub fn submit_frame(&mut self, target: &wgpu::TextureView) -> Result<(), DeviceError> {
        if !self.target_stack.is_empty() {
            return Err(DeviceError::Backend(format!(
                "{} offscreen targets still pushed at submit",
                self.target_stack.len()
            )));
        }
        let segments = std::mem::take(&mut self.segments);
        if segments.is_empty() {
            return Ok(());
        }
        self.upload_uniforms();
        self.ensure_main_depth_stencil();
        let texture_groups = self.texture_bind_groups(&segments)?;
        let main_depth_stencil = self
            .main_depth_stencil
            .as_ref()
            .map(|(_, view)| view)
            .ok_or_else(|| DeviceError::Backend("main depth-stencil missing".to_owned()))?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("renderer.frame"),
            });
        for segment in &segments {
            let (color_view, depth_view, size) = match segment.target {
                Target::Main => (target, main_depth_stencil, self.viewport),
                Target::Offscreen(id) => {
                    let texture = self
                        .textures
                        .get(id)
                        .ok_or(DeviceError::UnknownTexture(id))?;
                    let depth_view = texture
                        .depth_stencil
                        .as_ref()
                        .ok_or(DeviceError::UnknownTexture(id))?;
                    (&texture.view, depth_view, texture.size)
                }
            };
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(match segment.target {
                    Target::Main => "renderer.pass.main",
                    Target::Offscreen(_) => "renderer.pass.offscreen",
                }),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: match segment.load.color {
                            Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                                r: f64::from(r),
                                g: f64::from(g),
                                b: f64::from(b),
                                a: f64::from(a),
                            }),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: segment
                            .load
                            .depth
                            .map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: segment
                            .load
                            .stencil
                            .map_or(wgpu::LoadOp::Load, |value| {
                                wgpu::LoadOp::Clear(u32::from(value))
                            }),
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            let mut viewport_range = None;
            for draw in &segment.draws {
                let pipeline = self
                    .pipelines
                    .get(&draw.key)
                    .ok_or(DeviceError::UnknownProgram(draw.key.program))?;
                if viewport_range != Some(draw.depth_range) {
                    let far = draw.depth_range.far.clamp(0.0, 1.0);
                    let near = draw.depth_range.near.clamp(0.0, far);
                    pass.set_viewport(
                        0.0,
                        0.0,
                        size.width as f32,
                        size.height as f32,
                        near,
                        far,
                    );
                    viewport_range = Some(draw.depth_range);
                }
                pass.set_pipeline(pipeline);
                pass.set_stencil_reference(u32::from(draw.stencil_reference));
                pass.set_bind_group(0, &self.uniforms.bind_group, &[draw.uniform_offset]);
                if let Some(texture) = draw.texture {
                    let group = texture_groups
                        .get(&texture)
                        .ok_or(DeviceError::UnknownTexture(texture))?;
                    pass.set_bind_group(1, group, &[]);
                }
                match draw.call {
                    DrawCall::Quad => pass.draw(0..4, 0..1),
                    DrawCall::Arrays {
                        buffer, first, count, ..
                    } => {
                        let buffer = self
                            .buffers
                            .get(buffer)
                            .ok_or(DeviceError::UnknownBuffer(buffer))?;
                        pass.set_vertex_buffer(0, buffer.vertices.slice(..));
                        pass.draw(first..first + count, 0..1);
                    }
                    DrawCall::Indexed {
                        buffer: id,
                        first_index,
                        index_count,
                        base_vertex,
                        ..
                    } => {
                        let buffer = self.buffers.get(id).ok_or(DeviceError::UnknownBuffer(id))?;
                        let indices = buffer
                            .indices
                            .as_ref()
                            .ok_or(DeviceError::UnknownBuffer(id))?;
                        pass.set_vertex_buffer(0, buffer.vertices.slice(..));
                        pass.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
                        pass.draw_indexed(first_index..first_index + index_count, base_vertex, 0..1);
                    }
                }
            }
        }
        self.queue.submit(Some(encoder.finish()));

        self.uniforms.staging.clear();
        self.bound.uniform_offset = 0;
        self.offscreen_pool.append(&mut self.offscreen_in_use);
        Ok(())
    }

    /// Drops everything recorded since the last submit.
    pub fn discard_frame(&mut self) {
        self.segments.clear();
        self.target_stack.clear();
        self.uniforms.staging.clear();
        self.bound.uniform_offset = 0;
        self.offscreen_pool.append(&mut self.offscreen_in_use);
    }

    fn upload_uniforms(&mut self) {
        let needed = self.uniforms.staging.len() as u64;
        if needed > self.uniforms.capacity {
            let slots = (needed / UNIFORM_SLOT_SIZE).next_power_of_two();
            log::debug!("growing uniform arena to {slots} slots");
            let staging = std::mem::take(&mut self.uniforms.staging);
            self.uniforms = UniformArena::new(&self.device, &self.layouts.uniforms, slots);
            self.uniforms.staging = staging;
        }
        if needed > 0 {
            self.queue
                .write_buffer(&self.uniforms.buffer, 0, &self.uniforms.staging);
        }
    }

    fn ensure_main_depth_stencil(&mut self) {
        if matches!(&self.main_depth_stencil, Some((size, _)) if *size == self.viewport) {
            return;
        }
        let texture = self.create_depth_stencil("renderer.depth_stencil.main", self.viewport);
        self.main_depth_stencil = Some((
            self.viewport,
            texture.create_view(&wgpu::TextureViewDescriptor::default()),
        ));
    }

    fn create_depth_stencil(&self, label: &str, size: FramebufferSize) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.width.max(1),
                height: size.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.config.depth_stencil_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
    }

    fn texture_bind_groups(
        &self,
        segments: &[Segment],
    ) -> Result<HashMap<TextureId, wgpu::BindGroup>, DeviceError> {
        let mut groups = HashMap::new();
        for texture in segments
            .iter()
            .flat_map(|segment| segment.draws.iter())
            .filter_map(|draw| draw.texture)
        {
            if groups.contains_key(&texture) {
                continue;
            }
            let view = &self
                .textures
                .get(texture)
                .ok_or(DeviceError::UnknownTexture(texture))?
                .view;
            let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("renderer.texture"),
                layout: &self.layouts.texture,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            });
            groups.insert(texture, group);
        }
        Ok(groups)
    }

    fn current_target(&self) -> Target {
        self.target_stack
            .last()
            .map_or(Target::Main, |id| Target::Offscreen(*id))
    }

    fn begin_segment(&mut self, load: LoadOps) {
        let target = self.current_target();
        if let Some(last) = self.segments.last_mut() {
            if last.target == target && last.draws.is_empty() {
                last.load.color = load.color.or(last.load.color);
                last.load.depth = load.depth.or(last.load.depth);
                last.load.stencil = load.stencil.or(last.load.stencil);
                return;
            }
        }
        self.segments.push(Segment {
            target,
            load,
            draws: Vec::new(),
        });
    }

    fn record(&mut self, draw: RecordedDraw) -> Result<(), DeviceError> {
        if !self.pipelines.contains_key(&draw.key) {
            let program = self
                .programs
                .get(&draw.key.program)
                .ok_or(DeviceError::UnknownProgram(draw.key.program))?;
            let pipeline = create_pipeline(
                &self.device,
                &self.layouts,
                program,
                &draw.key,
                self.config.depth_stencil_format,
            );
            self.pipelines.insert(draw.key, pipeline);
        }
        let target = self.current_target();
        if self.segments.last().is_none_or(|segment| segment.target != target) {
            self.begin_segment(LoadOps::default());
        }
        if let Some(segment) = self.segments.last_mut() {
            segment.draws.push(draw);
        }
        Ok(())
    }

    fn take_offscreen(&mut self) -> TextureId {
        let size = self.viewport;
        if let Some(index) = self
            .offscreen_pool
            .iter()
            .position(|id| self.textures.get(*id).is_some_and(|texture| texture.size == size))
        {
            return self.offscreen_pool.swap_remove(index);
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("renderer.offscreen"),
            size: wgpu::Extent3d {
                width: size.width.max(1),
                height: size.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.config.color_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_stencil = self
            .create_depth_stencil("renderer.depth_stencil.offscreen", size)
            .create_view(&wgpu::TextureViewDescriptor::default());
        log::debug!("allocated offscreen target {}x{}", size.width, size.height);
        self.textures.insert(GpuTexture {
            view,
            depth_stencil: Some(depth_stencil),
            size,
        })
    }
}

impl GraphicsDevice for WgpuDevice {
    fn clear(&mut self, request: ClearRequest) -> Result<(), DeviceError> {
        self.begin_segment(LoadOps {
            color: request.color,
            depth: request.depth,
            stencil: request.stencil,
        });
        Ok(())
    }

    fn set_viewport(&mut self, size: FramebufferSize) -> Result<(), DeviceError> {
        if !size.has_area() {
            return Err(DeviceError::Backend(format!(
                "viewport {}x{} has no area",
                size.width, size.height
            )));
        }
        self.viewport = size;
        Ok(())
    }

    fn use_program(&mut self, program: ProgramId) -> Result<(), DeviceError> {
        if !self.programs.contains_key(&program) {
            return Err(DeviceError::UnknownProgram(program));
        }
        self.bound.program = Some(program);
        Ok(())
    }

    fn set_line_width(&mut self, width: f32) -> Result<(), DeviceError> {
        // wgpu rasterizes lines one pixel wide; the width only matters to
        // buckets that expand lines into triangles themselves.
        self.line_width = width;
        Ok(())
    }

    fn set_depth_mask(&mut self, write: bool) -> Result<(), DeviceError> {
        self.bound.depth_write = write;
        Ok(())
    }

    fn set_blend(&mut self, enabled: bool) -> Result<(), DeviceError> {
        self.bound.blend = enabled;
        Ok(())
    }

    fn set_depth_range(&mut self, range: DepthRange) -> Result<(), DeviceError> {
        self.bound.depth_range = range;
        Ok(())
    }

    fn set_stencil_test(&mut self, test: StencilTest) -> Result<(), DeviceError> {
        self.bound.stencil = test;
        Ok(())
    }

    fn set_color_writes(&mut self, enabled: bool) -> Result<(), DeviceError> {
        self.bound.color_writes = enabled;
        Ok(())
    }

    fn set_uniforms(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
        let max = UNIFORM_SLOT_SIZE as usize;
        if bytes.len() > max {
            return Err(DeviceError::UniformBlockTooLarge {
                size: bytes.len(),
                max,
            });
        }
        self.bound.uniform_offset = self.uniforms.push(bytes);
        Ok(())
    }

    fn bind_texture(&mut self, texture: TextureId) -> Result<(), DeviceError> {
        if !self.textures.contains_key(texture) {
            return Err(DeviceError::UnknownTexture(texture));
        }
        self.bound.texture = Some(texture);
        Ok(())
    }

    fn draw(&mut self, call: &DrawCall) -> Result<(), DeviceError> {
        let program = self.bound.program.ok_or(DeviceError::NoProgramBound)?;
        match call {
            DrawCall::Quad => {}
            DrawCall::Arrays { buffer, .. } | DrawCall::Indexed { buffer, .. } => {
                if !self.buffers.contains_key(*buffer) {
                    return Err(DeviceError::UnknownBuffer(*buffer));
                }
            }
        }
        let samples_texture = self
            .programs
            .get(&program)
            .ok_or(DeviceError::UnknownProgram(program))?
            .samples_texture;
        let texture = if samples_texture {
            Some(self.bound.texture.ok_or_else(|| {
                DeviceError::Backend(format!("program {} drawn without a texture", program.0))
            })?)
        } else {
            None
        };
        self.uniforms.reserve_origin();
        let (stencil, stencil_reference) = StencilMode::from_test(self.bound.stencil);
        self.record(RecordedDraw {
            key: PipelineKey {
                program,
                primitive: call.primitive(),
                blend: self.bound.blend,
                depth_write: self.bound.depth_write,
                color_writes: self.bound.color_writes,
                stencil,
                format: self.config.color_format,
            },
            uniform_offset: self.bound.uniform_offset,
            call: *call,
            depth_range: self.bound.depth_range,
            stencil_reference,
            texture,
        })
    }

    fn push_framebuffer(&mut self) -> Result<(), DeviceError> {
        let texture = self.take_offscreen();
        self.offscreen_in_use.push(texture);
        self.target_stack.push(texture);
        self.segments.push(Segment {
            target: Target::Offscreen(texture),
            load: LoadOps {
                color: Some([0.0; 4]),
                depth: Some(0.0),
                stencil: Some(0),
            },
            draws: Vec::new(),
        });
        Ok(())
    }

    fn pop_framebuffer(&mut self) -> Result<TextureId, DeviceError> {
        let texture = self
            .target_stack
            .pop()
            .ok_or(DeviceError::FramebufferUnderflow)?;
        self.begin_segment(LoadOps::default());
        Ok(texture)
    }

    fn draw_composite(&mut self, texture: TextureId, opacity: f32) -> Result<(), DeviceError> {
        if !self.textures.contains_key(texture) {
            return Err(DeviceError::UnknownTexture(texture));
        }
        let uniforms = CompositeUniforms {
            opacity,
            _padding: [0.0; 3],
        };
        let uniform_offset = self.uniforms.push(bytemuck::bytes_of(&uniforms));
        self.record(RecordedDraw {
            key: PipelineKey {
                program: ProgramId::COMPOSITE,
                primitive: DrawCall::Quad.primitive(),
                blend: true,
                depth_write: false,
                color_writes: true,
                stencil: StencilMode::Disabled,
                format: self.config.color_format,
            },
            uniform_offset,
            call: DrawCall::Quad,
            depth_range: DepthRange::FULL,
            stencil_reference: 0,
            texture: Some(texture),
        })
    }

    fn release_framebuffers(&mut self) {
        for texture in self.offscreen_pool.drain(..) {
            self.textures.remove(texture);
        }
        self.main_depth_stencil = None;
    }

    fn flush(&mut self) -> Result<(), DeviceError> {
        // Recording ends here; the host decides which target the frame is
        // replayed into.
        if !self.target_stack.is_empty() {
            return Err(DeviceError::Backend(
                "flush with offscreen targets still pushed".to_owned(),
            ));
        }
        Ok(())
    }
}
