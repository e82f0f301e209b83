#[test]
fn renderer_wgsl_sources_parse_successfully() {
    parse_wgsl("color_mapping.wgsl", include_str!("color_mapping.wgsl"));
    parse_wgsl("tile_raster.wgsl", crate::renderer_init::TILE_RASTER_SHADER);
    parse_wgsl(
        "animation_raster.wgsl",
        crate::renderer_init::ANIMATION_RASTER_SHADER,
    );
    parse_wgsl("composite.wgsl", include_str!("composite.wgsl"));
}

#[test]
fn uniform_block_matches_wgsl_layout() {
    let source = crate::renderer_init::TILE_RASTER_SHADER;
    let module = naga::front::wgsl::parse_str(source).unwrap_or_else(|error| {
        panic!("WGSL parse failed: {}", error.emit_to_string(source))
    });
    let struct_size = |name: &str| {
        module
            .types
            .iter()
            .find(|(_, ty)| ty.name.as_deref() == Some(name))
            .map(|(_, ty)| ty.inner.size(module.to_ctx()))
            .unwrap_or_else(|| panic!("struct {name} missing"))
    };

    assert_eq!(
        struct_size("FrameUniforms") as usize,
        std::mem::size_of::<crate::FrameUniformsGpu>()
    );
    assert_eq!(
        struct_size("TileInstance") as usize,
        std::mem::size_of::<crate::TileInstanceGpu>()
    );
}

fn parse_wgsl(label: &str, source: &str) {
    naga::front::wgsl::parse_str(source).unwrap_or_else(|error| {
        panic!(
            "WGSL parse failed for {label}: {}",
            error.emit_to_string(source)
        )
    });
}
