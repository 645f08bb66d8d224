//! Renderer unit tests.
//!
//! These drive whole frames through a `RecordingDevice` and check pass
//! ordering, strata, clip mask reuse, group compositing, fades and source
//! bookkeeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use render_protocol::{
    BackgroundLayer, BackgroundProperties, BucketRef, Color, CompositeProperties,
    FillProperties, GroupLayer, IDENTITY_MATRIX, LayerProperties, LeafLayer, LineProperties,
    LogicalSize, SourceId, TranslateAnchor, WorldPoint,
};
use tiles::{ClipId, ClipIdAssignment, TileId};

use super::*;

const MASK_CLIP: ClipId = ClipId {
    reference: 0x80,
    length: 1,
};

fn custom(offset: u32) -> ProgramId {
    ProgramId(ProgramId::FIRST_CUSTOM + offset)
}

struct TestBucket {
    program: ProgramId,
}

impl Bucket for TestBucket {
    fn has_data(&self) -> bool {
        true
    }

    fn draw(
        &self,
        _layer: &LeafLayer,
        context: &mut LayerDrawContext<'_>,
    ) -> Result<(), DeviceError> {
        context.use_program(self.program)?;
        context.set_line_width(2.0)?;
        context.set_uniforms(&[0; 16])?;
        context.draw(&DrawCall::Quad)
    }
}

struct TestTileData {
    buckets: Vec<(&'static str, TestBucket)>,
}

impl TileData for TestTileData {
    fn bucket(&self, name: &str) -> Option<&dyn Bucket> {
        self.buckets
            .iter()
            .find(|(bucket_name, _)| *bucket_name == name)
            .map(|(_, bucket)| bucket as &dyn Bucket)
    }
}

fn tile(id: TileId, clip: Option<ClipId>, buckets: &[(&'static str, u32)]) -> RenderTile {
    RenderTile {
        id,
        matrix: IDENTITY_MATRIX,
        extent: 8192.0,
        clip,
        data: Arc::new(TestTileData {
            buckets: buckets
                .iter()
                .map(|(name, offset)| {
                    (
                        *name,
                        TestBucket {
                            program: custom(*offset),
                        },
                    )
                })
                .collect(),
        }),
    }
}

struct TestSource {
    tiles: Vec<RenderTile>,
    has_data: bool,
    finalized: Arc<AtomicUsize>,
}

impl Source for TestSource {
    fn refresh_tile_set(&mut self, _frame: &FrameSnapshot) {}

    fn tile_ids(&self) -> Vec<TileId> {
        self.tiles.iter().map(|tile| tile.id).collect()
    }

    fn update_clip_ids(&mut self, clip_ids: &ClipIdAssignment) {
        for tile in &mut self.tiles {
            tile.clip = clip_ids.get(&tile.id);
        }
    }

    fn update_matrices(&mut self, _frame: &FrameSnapshot) {}

    fn tiles(&self) -> &[RenderTile] {
        &self.tiles
    }

    fn has_data(&self) -> bool {
        self.has_data
    }

    fn finalize_frame(&mut self, _context: &mut FinalizeContext<'_>) -> Result<(), DeviceError> {
        self.finalized.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn register(registry: &mut SourceRegistry, id: &str, tiles: Vec<RenderTile>) -> Arc<AtomicUsize> {
    let finalized = Arc::new(AtomicUsize::new(0));
    registry.insert(
        SourceId::from(id),
        Box::new(TestSource {
            tiles,
            has_data: true,
            finalized: Arc::clone(&finalized),
        }),
    );
    finalized
}

fn line_layer(id: &str, source: &str, bucket: &str) -> LayerNode {
    LayerNode::Leaf(LeafLayer {
        id: id.into(),
        properties: LayerProperties::Line(LineProperties::default()),
        bucket: Some(BucketRef::new(bucket, source)),
    })
}

fn fill_layer(id: &str, source: &str, bucket: &str) -> LayerNode {
    LayerNode::Leaf(LeafLayer {
        id: id.into(),
        properties: LayerProperties::Fill(FillProperties::default()),
        bucket: Some(BucketRef::new(bucket, source)),
    })
}

fn background_layer(properties: BackgroundProperties) -> LayerNode {
    LayerNode::Background(BackgroundLayer {
        id: "background".into(),
        properties,
    })
}

fn frame_at(zoom: f64, millis: u64) -> FrameSnapshot {
    FrameSnapshot {
        timestamp: Duration::from_millis(millis),
        projection_matrix: IDENTITY_MATRIX,
        extrusion_matrix: IDENTITY_MATRIX,
        native_matrix: IDENTITY_MATRIX,
        size: LogicalSize::new(256, 256),
        framebuffer: FramebufferSize::new(512, 512),
        pixel_ratio: 2.0,
        zoom,
        bearing: 0.0,
        center: WorldPoint { x: 0.5, y: 0.5 },
    }
}

fn test_renderer() -> Renderer<RecordingDevice> {
    Renderer::new(RecordingDevice::new(), RenderOptions::default())
}

fn render(
    renderer: &mut Renderer<RecordingDevice>,
    registry: &mut SourceRegistry,
    frame: &FrameSnapshot,
    layers: &[LayerNode],
) -> FrameReport {
    registry.update_active_set(layers);
    renderer
        .render_frame(
            FrameInput {
                frame,
                layers,
                transitions_active: false,
            },
            registry,
        )
        .expect("render frame")
}

fn custom_draws(device: &RecordingDevice) -> Vec<(ProgramId, DepthRange)> {
    device
        .draws()
        .filter_map(|call| match call {
            DeviceCall::Draw {
                program,
                depth_range,
                ..
            } if !program.is_builtin() => Some((*program, *depth_range)),
            _ => None,
        })
        .collect()
}

#[test]
fn invisible_layer_issues_no_draws() {
    let mut registry = SourceRegistry::new();
    register(&mut registry, "streets", vec![tile(TileId::new(0, 0, 0), None, &[("roads", 0)])]);
    let layers = vec![LayerNode::Leaf(LeafLayer {
        id: "roads".into(),
        properties: LayerProperties::Line(LineProperties {
            opacity: 0.0,
            ..LineProperties::default()
        }),
        bucket: Some(BucketRef::new("roads", "streets")),
    })];

    let mut renderer = test_renderer();
    let report = render(&mut renderer, &mut registry, &frame_at(3.0, 0), &layers);
    assert_eq!(report.draw_calls, 0);
    assert!(custom_draws(renderer.device()).is_empty());
}

#[test]
fn bucket_zoom_range_is_half_open() {
    let mut registry = SourceRegistry::new();
    register(&mut registry, "streets", vec![tile(TileId::new(0, 0, 0), None, &[("roads", 0)])]);
    let layers = vec![LayerNode::Leaf(LeafLayer {
        id: "roads".into(),
        properties: LayerProperties::Line(LineProperties::default()),
        bucket: Some(BucketRef::new("roads", "streets").with_zoom_range(2.0, 5.0)),
    })];

    let mut renderer = test_renderer();
    for (zoom, expected) in [(1.9, 0), (2.0, 1), (3.0, 1), (4.9, 1), (5.0, 0)] {
        renderer.device_mut().take_calls();
        render(&mut renderer, &mut registry, &frame_at(zoom, 0), &layers);
        assert_eq!(
            custom_draws(renderer.device()).len(),
            expected,
            "zoom {zoom}"
        );
    }
}

#[test]
fn opaque_pass_walks_top_down_and_translucent_pass_reuses_strata() {
    let mut registry = SourceRegistry::new();
    register(
        &mut registry,
        "streets",
        vec![tile(
            TileId::new(0, 0, 0),
            None,
            &[("water", 0), ("parks", 1), ("buildings", 2)],
        )],
    );
    let layers = vec![
        fill_layer("water", "streets", "water"),
        fill_layer("parks", "streets", "parks"),
        fill_layer("buildings", "streets", "buildings"),
    ];

    let mut renderer = test_renderer();
    render(&mut renderer, &mut registry, &frame_at(3.0, 0), &layers);
    let draws = custom_draws(renderer.device());
    assert_eq!(draws.len(), 6);

    let (opaque, translucent) = draws.split_at(3);
    let opaque_programs: Vec<_> = opaque.iter().map(|(program, _)| *program).collect();
    assert_eq!(opaque_programs, vec![custom(2), custom(1), custom(0)]);
    for pair in opaque.windows(2) {
        assert!(pair[0].1.near > pair[1].1.near);
    }
    for (_, range) in &draws {
        assert!((0.0..1.0).contains(&range.near));
        assert_eq!(range.far, 1.0);
    }

    let reversed: Vec<_> = opaque.iter().rev().copied().collect();
    assert_eq!(translucent, reversed.as_slice());
    assert_eq!(translucent[1].1.near, strata_thickness(3));
}

#[test]
fn passes_switch_blend_and_depth_writes() {
    let mut registry = SourceRegistry::new();
    register(&mut registry, "streets", vec![tile(TileId::new(0, 0, 0), None, &[("water", 0)])]);
    let layers = vec![fill_layer("water", "streets", "water")];

    let mut renderer = test_renderer();
    render(&mut renderer, &mut registry, &frame_at(3.0, 0), &layers);
    let calls = renderer.device().calls();
    let position = |wanted: &DeviceCall| calls.iter().position(|call| call == wanted);
    let first_draw = calls
        .iter()
        .position(|call| matches!(call, DeviceCall::Draw { .. }))
        .expect("opaque draw");
    let opaque_blend = position(&DeviceCall::SetBlend(false)).expect("blend off");
    let opaque_depth = position(&DeviceCall::SetDepthMask(true)).expect("depth writes on");
    let translucent_blend = position(&DeviceCall::SetBlend(true)).expect("blend on");
    let translucent_depth = position(&DeviceCall::SetDepthMask(false)).expect("depth writes off");
    assert!(opaque_blend < first_draw && opaque_depth < first_draw);
    assert!(translucent_blend > first_draw && translucent_depth > first_draw);
}

#[test]
fn state_cache_filters_redundant_program_and_line_width() {
    let mut registry = SourceRegistry::new();
    register(
        &mut registry,
        "streets",
        vec![
            tile(TileId::new(1, 0, 0), None, &[("roads", 0)]),
            tile(TileId::new(1, 1, 0), None, &[("roads", 0)]),
            tile(TileId::new(1, 1, 1), None, &[("roads", 0)]),
        ],
    );
    let layers = vec![line_layer("roads", "streets", "roads")];

    let mut renderer = test_renderer();
    render(&mut renderer, &mut registry, &frame_at(3.0, 0), &layers);
    let device = renderer.device();
    assert_eq!(device.draw_count(custom(0)), 3);
    assert_eq!(
        device.count(|call| *call == DeviceCall::UseProgram(custom(0))),
        1
    );
    assert_eq!(
        device.count(|call| matches!(call, DeviceCall::SetLineWidth(_))),
        1
    );
    assert_eq!(
        device.count(|call| matches!(call, DeviceCall::SetUniforms(_))),
        3
    );
}

#[test]
fn clipped_tiles_test_against_their_mask() {
    let mut registry = SourceRegistry::new();
    register(
        &mut registry,
        "streets",
        vec![tile(TileId::new(0, 0, 0), Some(MASK_CLIP), &[("roads", 0)])],
    );
    let layers = vec![line_layer("roads", "streets", "roads")];

    let mut renderer = test_renderer();
    let report = render(&mut renderer, &mut registry, &frame_at(3.0, 0), &layers);
    assert_eq!(report.clip_mask_draws, 1);
    assert!(report.clip_masks_redrawn);

    let stencils: Vec<_> = renderer
        .device()
        .draws()
        .filter_map(|call| match call {
            DeviceCall::Draw {
                program, stencil, ..
            } => Some((*program, *stencil)),
            _ => None,
        })
        .collect();
    assert_eq!(
        stencils,
        vec![
            (ProgramId::CLIP_MASK, StencilTest::Write { reference: 0x80 }),
            (
                custom(0),
                StencilTest::Equal {
                    reference: 0x80,
                    read_mask: 0x80,
                }
            ),
        ]
    );
    assert!(
        renderer
            .device()
            .calls()
            .contains(&DeviceCall::SetColorWrites(true))
    );
}

#[test]
fn unchanged_clip_masks_skip_stencil_clear_and_redraw() {
    let mut registry = SourceRegistry::new();
    register(
        &mut registry,
        "streets",
        vec![tile(TileId::new(0, 0, 0), Some(MASK_CLIP), &[("roads", 0)])],
    );
    let layers = vec![line_layer("roads", "streets", "roads")];
    let mut renderer = test_renderer();

    render(&mut renderer, &mut registry, &frame_at(3.0, 0), &layers);
    let first = renderer.device_mut().take_calls();
    assert!(first.contains(&DeviceCall::Clear(ClearRequest {
        color: Some([0.0; 4]),
        depth: Some(0.0),
        stencil: Some(0),
    })));

    let report = render(&mut renderer, &mut registry, &frame_at(3.0, 16), &layers);
    assert!(!report.clip_masks_redrawn);
    assert_eq!(report.clip_mask_draws, 0);
    let device = renderer.device();
    assert!(device.calls().contains(&DeviceCall::Clear(ClearRequest {
        color: Some([0.0; 4]),
        depth: Some(0.0),
        stencil: None,
    })));
    assert_eq!(device.draw_count(ProgramId::CLIP_MASK), 0);
    assert_eq!(device.draw_count(custom(0)), 1);

    let mut resized = frame_at(3.0, 32);
    resized.framebuffer = FramebufferSize::new(1024, 768);
    let report = render(&mut renderer, &mut registry, &resized, &layers);
    assert!(report.clip_masks_redrawn);
}

#[test]
fn failed_frame_forces_mask_redraw() {
    let mut registry = SourceRegistry::new();
    register(
        &mut registry,
        "streets",
        vec![tile(TileId::new(0, 0, 0), Some(MASK_CLIP), &[("roads", 0)])],
    );
    let layers = vec![line_layer("roads", "streets", "roads")];
    let frame = frame_at(3.0, 0);
    let mut renderer = test_renderer();

    registry.update_active_set(&layers);
    renderer.device_mut().fail_draws(true);
    let result = renderer.render_frame(
        FrameInput {
            frame: &frame,
            layers: &layers,
            transitions_active: false,
        },
        &mut registry,
    );
    assert!(matches!(result, Err(DeviceError::Backend(_))));

    renderer.device_mut().fail_draws(false);
    let report = render(&mut renderer, &mut registry, &frame, &layers);
    assert!(report.clip_masks_redrawn);
    assert_eq!(report.clip_mask_draws, 1);
}

#[test]
fn group_renders_children_offscreen_and_composites() {
    let mut registry = SourceRegistry::new();
    register(
        &mut registry,
        "streets",
        vec![tile(TileId::new(0, 0, 0), Some(MASK_CLIP), &[("roads", 0)])],
    );
    let layers = vec![LayerNode::Group(GroupLayer {
        id: "overlay".into(),
        properties: CompositeProperties { opacity: 0.5 },
        children: Arc::from(vec![line_layer("roads", "streets", "roads")]),
    })];

    let mut renderer = test_renderer();
    let report = render(&mut renderer, &mut registry, &frame_at(3.0, 0), &layers);
    // Once into the main stencil, once into the offscreen target's.
    assert_eq!(report.clip_mask_draws, 2);

    let calls = renderer.device().calls();
    let push = calls
        .iter()
        .position(|call| *call == DeviceCall::PushFramebuffer)
        .expect("push");
    let child_draw = calls
        .iter()
        .position(|call| {
            matches!(call, DeviceCall::Draw { program, target_depth: 1, .. } if *program == custom(0))
        })
        .expect("child drawn offscreen");
    let (pop, texture) = calls
        .iter()
        .enumerate()
        .find_map(|(index, call)| match call {
            DeviceCall::PopFramebuffer(texture) => Some((index, *texture)),
            _ => None,
        })
        .expect("pop");
    let composite = calls
        .iter()
        .position(|call| {
            *call
                == DeviceCall::DrawComposite {
                    texture,
                    opacity: 0.5,
                }
        })
        .expect("composite");
    assert!(push < child_draw && child_draw < pop && pop < composite);
    assert_eq!(report.draw_calls, 4);
}

#[test]
fn invisible_group_is_skipped() {
    let mut registry = SourceRegistry::new();
    register(&mut registry, "streets", vec![tile(TileId::new(0, 0, 0), None, &[("roads", 0)])]);
    let layers = vec![LayerNode::Group(GroupLayer {
        id: "overlay".into(),
        properties: CompositeProperties { opacity: 0.0 },
        children: Arc::from(vec![line_layer("roads", "streets", "roads")]),
    })];

    let mut renderer = test_renderer();
    render(&mut renderer, &mut registry, &frame_at(3.0, 0), &layers);
    let device = renderer.device();
    assert_eq!(device.count(|call| *call == DeviceCall::PushFramebuffer), 0);
    assert_eq!(device.draw_count(custom(0)), 0);
}

#[test]
fn missing_source_warns_once_and_skips() {
    let mut registry = SourceRegistry::new();
    let layers = vec![line_layer("roads", "nowhere", "roads")];
    let mut renderer = test_renderer();

    let change = registry.update_active_set(&layers);
    assert_eq!(change.missing, vec![SourceId::from("nowhere")]);
    render(&mut renderer, &mut registry, &frame_at(3.0, 0), &layers);
    render(&mut renderer, &mut registry, &frame_at(3.0, 16), &layers);
    assert!(renderer.diagnostics.reported_layers.contains("roads"));
    assert_eq!(renderer.device().draws().count(), 0);

    renderer.cleanup();
    assert!(renderer.diagnostics.reported_layers.is_empty());
}

#[test]
fn source_without_data_is_skipped_but_finalized() {
    let mut registry = SourceRegistry::new();
    let with_data = register(&mut registry, "streets", vec![tile(TileId::new(0, 0, 0), None, &[("roads", 0)])]);
    let finalized_empty = Arc::new(AtomicUsize::new(0));
    registry.insert(
        SourceId::from("terrain"),
        Box::new(TestSource {
            tiles: vec![tile(TileId::new(0, 0, 0), None, &[("hills", 1)])],
            has_data: false,
            finalized: Arc::clone(&finalized_empty),
        }),
    );
    let unused = register(&mut registry, "unused", Vec::new());
    let layers = vec![
        line_layer("hills", "terrain", "hills"),
        line_layer("roads", "streets", "roads"),
    ];

    let mut renderer = test_renderer();
    render(&mut renderer, &mut registry, &frame_at(3.0, 0), &layers);
    assert_eq!(renderer.device().draw_count(custom(1)), 0);
    assert_eq!(renderer.device().draw_count(custom(0)), 1);
    assert_eq!(with_data.load(Ordering::SeqCst), 1);
    assert_eq!(finalized_empty.load(Ordering::SeqCst), 1);
    assert_eq!(unused.load(Ordering::SeqCst), 0);
}

#[test]
fn opaque_background_draws_in_opaque_pass_above_its_strata() {
    let mut registry = SourceRegistry::new();
    let layers = vec![background_layer(BackgroundProperties::default())];
    let mut renderer = test_renderer();

    render(&mut renderer, &mut registry, &frame_at(3.0, 0), &layers);
    let calls = renderer.device().calls();
    let draws: Vec<_> = renderer.device().draws().collect();
    assert_eq!(draws.len(), 1);
    let DeviceCall::Draw {
        program,
        depth_range,
        stencil,
        ..
    } = draws[0]
    else {
        panic!("expected a draw");
    };
    assert_eq!(*program, ProgramId::BACKGROUND_PLAIN);
    assert_eq!(depth_range.near, STRATA_EPSILON);
    assert_eq!(*stencil, StencilTest::Disabled);

    let draw_index = calls
        .iter()
        .position(|call| matches!(call, DeviceCall::Draw { .. }))
        .expect("draw");
    let blend_on = calls
        .iter()
        .position(|call| *call == DeviceCall::SetBlend(true))
        .expect("translucent pass");
    assert!(draw_index < blend_on);
}

#[test]
fn translucent_background_draws_after_opaque_pass() {
    let mut registry = SourceRegistry::new();
    let layers = vec![background_layer(BackgroundProperties {
        color: Color::rgba(1.0, 0.0, 0.0, 0.5),
        ..BackgroundProperties::default()
    })];
    let mut renderer = test_renderer();

    render(&mut renderer, &mut registry, &frame_at(3.0, 0), &layers);
    let calls = renderer.device().calls();
    let draw_index = calls
        .iter()
        .position(|call| matches!(call, DeviceCall::Draw { .. }))
        .expect("draw");
    let blend_on = calls
        .iter()
        .position(|call| *call == DeviceCall::SetBlend(true))
        .expect("translucent pass");
    assert!(draw_index > blend_on);

    let uniforms = calls
        .iter()
        .find_map(|call| match call {
            DeviceCall::SetUniforms(bytes) => Some(bytes.clone()),
            _ => None,
        })
        .expect("background uniforms");
    let uniforms: PlainUniforms = bytemuck::pod_read_unaligned(&uniforms);
    assert_eq!(uniforms.color, [0.5, 0.0, 0.0, 0.5]);
    assert_eq!(uniforms.matrix, VIEWPORT_QUAD_MATRIX);
}

struct TestPatternBinder {
    available: bool,
    requests: Arc<AtomicUsize>,
}

impl PatternBinder for TestPatternBinder {
    fn bind_pattern(
        &mut self,
        _device: &mut dyn GraphicsDevice,
        _pattern: &PatternRef,
    ) -> Result<bool, DeviceError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        Ok(self.available)
    }
}

fn pattern_background() -> LayerNode {
    background_layer(BackgroundProperties {
        pattern: Some(PatternRef {
            name: "dots".into(),
            width: 16.0,
            height: 16.0,
        }),
        ..BackgroundProperties::default()
    })
}

#[test]
fn pattern_background_needs_a_binder() {
    let mut registry = SourceRegistry::new();
    let layers = vec![pattern_background()];

    let mut renderer = test_renderer();
    render(&mut renderer, &mut registry, &frame_at(3.0, 0), &layers);
    assert_eq!(renderer.device().draws().count(), 0);
    assert!(renderer.diagnostics.reported_layers.contains("background"));

    let requests = Arc::new(AtomicUsize::new(0));
    renderer.set_pattern_binder(Box::new(TestPatternBinder {
        available: false,
        requests: Arc::clone(&requests),
    }));
    renderer.device_mut().take_calls();
    render(&mut renderer, &mut registry, &frame_at(3.0, 16), &layers);
    assert_eq!(requests.load(Ordering::SeqCst), 1);
    assert_eq!(renderer.device().draws().count(), 0);

    renderer.set_pattern_binder(Box::new(TestPatternBinder {
        available: true,
        requests: Arc::clone(&requests),
    }));
    renderer.device_mut().take_calls();
    render(&mut renderer, &mut registry, &frame_at(3.25, 32), &layers);
    assert_eq!(renderer.device().draw_count(ProgramId::BACKGROUND_PATTERN), 1);
    let uniforms = renderer
        .device()
        .calls()
        .iter()
        .find_map(|call| match call {
            DeviceCall::SetUniforms(bytes) => Some(bytes.clone()),
            _ => None,
        })
        .expect("pattern uniforms");
    let uniforms: PatternUniforms = bytemuck::pod_read_unaligned(&uniforms);
    assert_eq!(uniforms.mix, 0.25);
    assert_eq!(uniforms.opacity, 1.0);
}

#[test]
fn fade_runs_for_the_fade_duration_after_a_zoom_change() {
    let mut registry = SourceRegistry::new();
    register(&mut registry, "streets", vec![tile(TileId::new(0, 0, 0), None, &[("roads", 0)])]);
    let layers = vec![line_layer("roads", "streets", "roads")];
    let mut renderer = test_renderer();

    let first = render(&mut renderer, &mut registry, &frame_at(3.0, 0), &layers);
    assert!(!first.fade_active);
    assert!(!first.owes_frame);

    // The zoom change is recorded while this frame draws.
    render(&mut renderer, &mut registry, &frame_at(3.5, 100), &layers);
    assert!(renderer.needs_animation(Duration::from_millis(100)));
    assert!(renderer.needs_animation(Duration::from_millis(400)));
    assert!(!renderer.needs_animation(Duration::from_millis(401)));

    let fading = render(&mut renderer, &mut registry, &frame_at(3.5, 200), &layers);
    assert!(fading.fade_active);
    assert!(fading.owes_frame);
    assert_eq!(renderer.fade_state(&frame_at(3.5, 200)).mix, 0.5);

    let settled = render(&mut renderer, &mut registry, &frame_at(3.5, 450), &layers);
    assert!(!settled.fade_active);
    assert!(!settled.owes_frame);
    let fade = renderer.fade_state(&frame_at(3.5, 450));
    assert!(!fade.active);
    assert_eq!(fade.mix, 1.0);
    assert!(!renderer.needs_animation(Duration::from_millis(450)));
}

/// Uploads the matrix its layer is drawn with.
struct MatrixBucket;

impl Bucket for MatrixBucket {
    fn has_data(&self) -> bool {
        true
    }

    fn draw(&self, layer: &LeafLayer, context: &mut LayerDrawContext<'_>) -> Result<(), DeviceError> {
        context.use_program(custom(0))?;
        let matrix = context.layer_matrix(layer);
        context.set_uniforms(bytemuck::bytes_of(&matrix))?;
        context.draw(&DrawCall::Quad)
    }
}

struct MatrixTileData;

impl TileData for MatrixTileData {
    fn bucket(&self, _name: &str) -> Option<&dyn Bucket> {
        Some(&MatrixBucket)
    }
}

fn uploaded_matrices(device: &RecordingDevice) -> Vec<TransformMatrix4x4> {
    device
        .calls()
        .iter()
        .filter_map(|call| match call {
            DeviceCall::SetUniforms(bytes) if bytes.len() == 64 => {
                Some(bytemuck::pod_read_unaligned(bytes))
            }
            _ => None,
        })
        .collect()
}

#[test]
fn layer_translate_shifts_the_tile_matrix() {
    let mut registry = SourceRegistry::new();
    register(
        &mut registry,
        "streets",
        vec![RenderTile {
            id: TileId::new(3, 0, 0),
            matrix: IDENTITY_MATRIX,
            extent: 8192.0,
            clip: None,
            data: Arc::new(MatrixTileData),
        }],
    );
    let shifted = |translate_anchor| {
        LayerNode::Leaf(LeafLayer {
            id: "casing".into(),
            properties: LayerProperties::Line(LineProperties {
                translate: [10.0, 0.0],
                translate_anchor,
                ..LineProperties::default()
            }),
            bucket: Some(BucketRef::new("roads", "streets")),
        })
    };
    let layers = vec![
        line_layer("roads", "streets", "roads"),
        shifted(TranslateAnchor::Map),
    ];

    let mut renderer = test_renderer();
    render(&mut renderer, &mut registry, &frame_at(3.0, 0), &layers);
    let matrices = uploaded_matrices(renderer.device());
    assert_eq!(matrices.len(), 2);
    assert_eq!(matrices[0], IDENTITY_MATRIX);
    // A z3 tile at zoom 3 spans 512 px, so one pixel is 16 tile units.
    assert_eq!(matrices[1][12], 160.0);
    assert_eq!(matrices[1][13], 0.0);

    let mut rotated = frame_at(3.0, 16);
    rotated.bearing = std::f64::consts::FRAC_PI_2;
    let layers = vec![shifted(TranslateAnchor::Viewport)];
    let mut renderer = test_renderer();
    render(&mut renderer, &mut registry, &rotated, &layers);
    let matrices = uploaded_matrices(renderer.device());
    assert!(matrices[0][12].abs() < 1e-3);
    assert!((matrices[0][13] + 160.0).abs() < 1e-3);
}

#[test]
fn transitions_keep_the_frame_owed() {
    let mut registry = SourceRegistry::new();
    let layers = vec![background_layer(BackgroundProperties::default())];
    let frame = frame_at(3.0, 0);
    let mut renderer = test_renderer();

    let report = renderer
        .render_frame(
            FrameInput {
                frame: &frame,
                layers: &layers,
                transitions_active: true,
            },
            &mut registry,
        )
        .expect("render frame");
    assert!(report.owes_frame);
    assert!(!report.fade_active);
}

#[test]
fn viewport_is_set_only_when_the_framebuffer_changes() {
    let mut registry = SourceRegistry::new();
    let layers = vec![background_layer(BackgroundProperties::default())];
    let mut renderer = test_renderer();

    render(&mut renderer, &mut registry, &frame_at(3.0, 0), &layers);
    render(&mut renderer, &mut registry, &frame_at(3.0, 16), &layers);
    let viewports = |device: &RecordingDevice| {
        device.count(|call| matches!(call, DeviceCall::SetViewport(_)))
    };
    assert_eq!(viewports(renderer.device()), 1);

    renderer.cleanup();
    render(&mut renderer, &mut registry, &frame_at(3.0, 32), &layers);
    assert_eq!(viewports(renderer.device()), 2);
    assert!(
        renderer
            .device()
            .calls()
            .contains(&DeviceCall::ReleaseFramebuffers)
    );
    assert_eq!(renderer.device().calls().last(), Some(&DeviceCall::Flush));
}

#[test]
fn source_registry_tracks_the_active_set() {
    let mut registry = SourceRegistry::new();
    register(&mut registry, "streets", Vec::new());
    register(&mut registry, "terrain", Vec::new());

    let change = registry.update_active_set(&[
        line_layer("roads", "streets", "roads"),
        line_layer("labels", "places", "labels"),
    ]);
    assert_eq!(change.activated, vec![SourceId::from("streets")]);
    assert!(change.deactivated.is_empty());
    assert_eq!(change.missing, vec![SourceId::from("places")]);
    assert!(registry.is_active(&SourceId::from("streets")));

    let nested = LayerNode::Group(GroupLayer {
        id: "overlay".into(),
        properties: CompositeProperties::default(),
        children: Arc::from(vec![line_layer("hills", "terrain", "hills")]),
    });
    let change = registry.update_active_set(&[nested.clone()]);
    assert_eq!(change.activated, vec![SourceId::from("terrain")]);
    assert_eq!(change.deactivated, vec![SourceId::from("streets")]);

    assert!(registry.update_active_set(&[nested]).is_empty());
    assert_eq!(registry.active().count(), 1);

    registry.deactivate_all();
    assert_eq!(registry.active().count(), 0);
}
