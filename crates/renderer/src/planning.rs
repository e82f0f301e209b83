//! Per-frame planning.
//!
//! Everything here is pure: it turns a `FrameSnapshot` plus residency answers into draw
//! lists and uniform blocks, so the GPU side only uploads and submits.

use model::{ImageLayout, Point2D, TileCoordinate};
use render_protocol::FrameSnapshot;
use tiles::{RequiredTiles, TileTextureParameters, required_tiles};
use view::{FrameTransform, TileGeometry, animation_quad, animation_texture_size};

use crate::resolver::{ResolvedTile, resolve_placeholders};
use crate::{FrameUniformsGpu, RenderError, TileInstanceGpu};

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTile {
    pub resolved: ResolvedTile<TileTextureParameters>,
    pub geometry: TileGeometry,
}

/// Draw list for one tiled pass, in draw order.
#[derive(Debug, Clone, PartialEq)]
pub struct TiledFramePlan {
    pub required: RequiredTiles,
    pub tiles: Vec<PlannedTile>,
    pub instances: Vec<TileInstanceGpu>,
    pub uniforms: FrameUniformsGpu,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationFramePlan {
    pub texture_size: (u32, u32),
    /// Clip-space corners in triangle-strip order.
    pub quad: [Point2D; 4],
    pub uniforms: FrameUniformsGpu,
}

/// Plans a tiled pass.
///
/// `lookup(tile, peek)` answers whether a tile can be drawn this pass and where its texels
/// are. Draw order is resolver order; each draw gets a depth that increases with its index,
/// so with a `Less` depth test the first tile drawn over a pixel is the one that stays.
/// The root tile is requested on every pass that needs tiles, so placeholder lookups
/// can fall back to it once it arrives.
pub fn plan_tiled_frame<F>(
    snapshot: &FrameSnapshot,
    tile_size: u32,
    placeholder_depth: u32,
    color_map_count: u32,
    mut lookup: F,
) -> Result<TiledFramePlan, RenderError>
where
    F: FnMut(TileCoordinate, bool) -> Option<TileTextureParameters>,
{
    let layout = ImageLayout::new(snapshot.image_width, snapshot.image_height, tile_size)?;
    let required = required_tiles(&snapshot.required_view, &layout);
    let transform = frame_transform(snapshot)?;
    if !required.is_empty() {
        lookup(TileCoordinate::root(), false);
    }
    let resolved = resolve_placeholders(&required.tiles, required.mip, placeholder_depth, lookup);

    let count = resolved.len();
    let mut tiles = Vec::with_capacity(count);
    let mut instances = Vec::with_capacity(count);
    for (index, resolved) in resolved.into_iter().enumerate() {
        let params = resolved.payload;
        let geometry =
            transform.tile_geometry(resolved.coordinate, resolved.mip, tile_size, params.texel_size);
        instances.push(TileInstanceGpu {
            offset: [geometry.offset.x as f32, geometry.offset.y as f32],
            scaling: geometry.scaling as f32,
            depth: draw_depth(index, count),
            texel_size: [params.texel_size[0] as f32, params.texel_size[1] as f32],
            atlas_origin: [params.texel_origin[0] as f32, params.texel_origin[1] as f32],
            atlas_layer: params.atlas_layer,
            _padding: [0; 3],
        });
        tiles.push(PlannedTile { resolved, geometry });
    }

    let uniforms = frame_uniforms(snapshot, &transform, None, color_map_count);
    Ok(TiledFramePlan {
        required,
        tiles,
        instances,
        uniforms,
    })
}

/// Plans an animation pass. `None` when the current view covers no texels.
pub fn plan_animation_frame(
    snapshot: &FrameSnapshot,
    color_map_count: u32,
) -> Result<Option<AnimationFramePlan>, RenderError> {
    let texture_size = animation_texture_size(&snapshot.current_view);
    if texture_size.0 == 0 || texture_size.1 == 0 || snapshot.required_view.is_empty() {
        return Ok(None);
    }
    let transform = frame_transform(snapshot)?;
    let quad = animation_quad(&snapshot.current_view, &snapshot.required_view);
    let uniforms = frame_uniforms(snapshot, &transform, Some(&quad), color_map_count);
    Ok(Some(AnimationFramePlan {
        texture_size,
        quad,
        uniforms,
    }))
}

/// Uniform block for one pass: colour mapping from the snapshot, canvas and registration
/// from `transform`.
pub fn frame_uniforms(
    snapshot: &FrameSnapshot,
    transform: &FrameTransform,
    quad: Option<&[Point2D; 4]>,
    color_map_count: u32,
) -> FrameUniformsGpu {
    let config = &snapshot.render_config;
    let (canvas_width, canvas_height) = transform.canvas_size();
    let (rotation_origin, rotation_angle, scale_adjustment) = transform.registration();
    let animation_quad = quad.map_or([-1.0, -1.0, 1.0, 1.0], |quad| {
        [
            quad[0].x as f32,
            quad[0].y as f32,
            quad[3].x as f32,
            quad[3].y as f32,
        ]
    });
    FrameUniformsGpu {
        canvas_size: [canvas_width as f32, canvas_height as f32],
        scale_min: config.scale_min,
        scale_max: config.scale_max,
        nan_color: snapshot.nan_color.0,
        color_map: config.color_map.min(color_map_count.saturating_sub(1)),
        scaling: config.scaling.shader_code(),
        inverted: u32::from(config.inverted),
        color_map_count,
        bias: config.bias,
        contrast: config.contrast,
        gamma: config.gamma,
        alpha: config.alpha,
        rotation_origin: [rotation_origin.x as f32, rotation_origin.y as f32],
        rotation_angle: rotation_angle as f32,
        scale_adjustment: scale_adjustment as f32,
        animation_quad,
    }
}

fn frame_transform(snapshot: &FrameSnapshot) -> Result<FrameTransform, RenderError> {
    let (reference_view, zoom) = snapshot.geometry_reference();
    let (canvas_width, canvas_height) = snapshot.surface_size();
    Ok(FrameTransform::new(
        &reference_view,
        zoom,
        canvas_width,
        canvas_height,
        snapshot.spatial_transform(),
    )?)
}

/// Depth of the `index`-th of `count` draws, strictly inside `(0, 1)` and increasing.
pub(crate) fn draw_depth(index: usize, count: usize) -> f32 {
    (index as f64 + 1.0) as f32 / (count as f64 + 2.0) as f32
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use model::FrameView;
    use render_protocol::{NanColor, RasterRenderType, RenderConfig, ScalingType};

    use super::*;
    use crate::resolver::ResolvedKind;

    fn snapshot(view: FrameView, zoom_level: f64) -> FrameSnapshot {
        FrameSnapshot {
            image_id: 7,
            channel: 0,
            polarization: 0,
            image_width: 1024,
            image_height: 1024,
            required_view: view,
            current_view: view,
            zoom_level,
            render_width: 512,
            render_height: 512,
            device_pixel_ratio: 1.0,
            render_type: RasterRenderType::Tiled,
            is_renderable: true,
            render_config: RenderConfig::default(),
            nan_color: NanColor::default(),
            spatial: None,
            animation_data: None,
        }
    }

    fn full_view(mip: f64) -> FrameView {
        FrameView {
            x_min: 0.0,
            x_max: 1024.0,
            y_min: 0.0,
            y_max: 1024.0,
            mip,
        }
    }

    fn params(slot: u32) -> TileTextureParameters {
        TileTextureParameters {
            atlas_layer: slot / 4,
            texel_origin: [(slot % 2) * 256, ((slot / 2) % 2) * 256],
            texel_size: [256, 256],
        }
    }

    #[test]
    fn resident_layer_draws_every_required_tile_in_place() {
        let frame = snapshot(full_view(2.0), 0.5);
        let plan = plan_tiled_frame(&frame, 256, 3, 4, |tile, _| {
            (tile.layer() == 1).then(|| params(tile.x() + 2 * tile.y()))
        })
        .expect("plan");

        assert_eq!(plan.required.layer, 1);
        assert_eq!(plan.required.mip, 2);
        assert_eq!(plan.tiles.len(), 4);
        assert!(
            plan.tiles
                .iter()
                .all(|tile| tile.resolved.kind == ResolvedKind::Exact)
        );

        let first = &plan.tiles[0];
        assert_eq!(first.resolved.coordinate, TileCoordinate::new(1, 0, 0).expect("tile"));
        // Half a source pixel in, at half a canvas pixel per source pixel.
        assert_eq!(first.geometry.offset, Point2D::new(0.25, 0.25));
        assert_eq!(plan.instances[0].scaling, 1.0);
        assert_eq!(plan.uniforms.canvas_size, [512.0, 512.0]);
    }

    #[test]
    fn depths_increase_with_draw_order() {
        let frame = snapshot(full_view(2.0), 0.5);
        let plan = plan_tiled_frame(&frame, 256, 3, 4, |tile, _| {
            (tile.layer() == 1).then(|| params(tile.x() + 2 * tile.y()))
        })
        .expect("plan");
        let depths: Vec<_> = plan.instances.iter().map(|instance| instance.depth).collect();
        assert!(depths.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(depths.iter().all(|depth| *depth > 0.0 && *depth < 1.0));
    }

    #[test]
    fn missing_tiles_are_covered_by_the_root_placeholder() {
        let frame = snapshot(full_view(2.0), 0.5);
        let mut probes = HashMap::new();
        let mut requests = Vec::new();
        let plan = plan_tiled_frame(&frame, 256, 3, 4, |tile, peek| {
            probes.insert(tile, peek);
            requests.push((tile, peek));
            (tile.layer() == 0).then(|| TileTextureParameters {
                atlas_layer: 0,
                texel_origin: [0, 0],
                texel_size: [256, 256],
            })
        })
        .expect("plan");

        assert_eq!(plan.tiles.len(), 1);
        let root = &plan.tiles[0];
        assert_eq!(root.resolved.kind, ResolvedKind::LowerResolution);
        assert_eq!(root.resolved.mip, 4);
        // The root spans the whole 1024 px image: 256 texels at 4 px each, 0.5 zoom.
        assert_eq!(root.geometry.scaling, 2.0);
        assert_eq!(probes.get(&TileCoordinate::new(1, 1, 1).expect("tile")), Some(&false));
        assert_eq!(probes.get(&TileCoordinate::root()), Some(&true));
        assert_eq!(requests.first(), Some(&(TileCoordinate::root(), false)));
    }

    #[test]
    fn view_outside_the_image_draws_nothing() {
        let view = FrameView {
            x_min: 2000.0,
            x_max: 2500.0,
            y_min: 0.0,
            y_max: 500.0,
            mip: 1.0,
        };
        let frame = snapshot(view, 1.0);
        let plan = plan_tiled_frame(&frame, 256, 3, 4, |_, _| {
            panic!("no tile should be looked up")
        })
        .expect("plan");
        assert!(plan.required.is_empty());
        assert!(plan.instances.is_empty());
    }

    #[test]
    fn zero_zoom_is_rejected() {
        let frame = snapshot(full_view(1.0), 0.0);
        assert!(matches!(
            plan_tiled_frame(&frame, 256, 3, 4, |_, _| None),
            Err(RenderError::Transform(view::TransformError::InvalidZoom))
        ));
    }

    #[test]
    fn uniforms_carry_colour_mapping_and_clamp_the_map_index() {
        let mut frame = snapshot(full_view(1.0), 0.5);
        frame.render_config = RenderConfig {
            scale_min: -1.0,
            scale_max: 5.0,
            color_map: 40,
            scaling: ScalingType::Gamma,
            gamma: 2.2,
            inverted: true,
            ..RenderConfig::default()
        };
        let plan = plan_tiled_frame(&frame, 256, 3, 6, |_, _| None).expect("plan");
        let uniforms = plan.uniforms;
        assert_eq!(uniforms.scale_min, -1.0);
        assert_eq!(uniforms.scale_max, 5.0);
        assert_eq!(uniforms.color_map, 5);
        assert_eq!(uniforms.scaling, 5);
        assert_eq!(uniforms.inverted, 1);
        assert_eq!(uniforms.gamma, 2.2);
        assert_eq!(uniforms.nan_color, NanColor::default().0);
        assert_eq!(uniforms.scale_adjustment, 1.0);
    }

    #[test]
    fn animation_plan_sizes_texture_from_current_view() {
        let mut frame = snapshot(full_view(1.0), 0.5);
        frame.render_type = RasterRenderType::Animation;
        frame.current_view = FrameView {
            x_min: 0.0,
            x_max: 1000.0,
            y_min: 0.0,
            y_max: 501.0,
            mip: 2.0,
        };
        let plan = plan_animation_frame(&frame, 4)
            .expect("plan")
            .expect("non-empty view");
        assert_eq!(plan.texture_size, (500, 251));
        assert_eq!(plan.uniforms.animation_quad[0], plan.quad[0].x as f32);
        assert_eq!(plan.uniforms.animation_quad[3], plan.quad[3].y as f32);

        frame.current_view.x_max = 0.0;
        assert_eq!(plan_animation_frame(&frame, 4).expect("plan"), None);
    }

    #[test]
    fn draw_depth_stays_open_interval() {
        assert!(draw_depth(0, 1) > 0.0);
        assert!(draw_depth(9999, 10_000) < 1.0);
        assert!(draw_depth(3, 10) < draw_depth(4, 10));
    }
}
