const BUILTIN_SHADERS: [(&str, &str); 3] = [
    ("clip_mask.wgsl", include_str!("clip_mask.wgsl")),
    ("background.wgsl", include_str!("background.wgsl")),
    ("composite.wgsl", include_str!("composite.wgsl")),
];

#[test]
fn builtin_shaders_parse_and_validate() {
    for (label, source) in BUILTIN_SHADERS {
        let module = parse_wgsl(label, source);
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::empty(),
        )
        .validate(&module)
        .unwrap_or_else(|error| panic!("WGSL validation failed for {label}: {error:?}"));
    }
}

#[test]
fn builtin_shaders_export_the_pipeline_entry_points() {
    for (label, source) in BUILTIN_SHADERS {
        let module = parse_wgsl(label, source);
        for (name, stage) in [
            ("vs_main", naga::ShaderStage::Vertex),
            ("fs_main", naga::ShaderStage::Fragment),
        ] {
            assert!(
                module
                    .entry_points
                    .iter()
                    .any(|entry| entry.name == name && entry.stage == stage),
                "{label} lacks {name}"
            );
        }
    }
}

fn parse_wgsl(label: &str, source: &str) -> naga::Module {
    naga::front::wgsl::parse_str(source).unwrap_or_else(|error| {
        panic!(
            "WGSL parse failed for {label}: {}",
            error.emit_to_string(source)
        )
    })
}
