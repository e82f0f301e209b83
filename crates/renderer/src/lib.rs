//! Renderer crate root.
//!
//! This module defines the public API (`Renderer`, `RendererConfig`, `FrameStats`) and the
//! GPU-visible structs shared with the WGSL sources, and wires internal modules around the
//! state compartments used by the frame pipeline.
//!
//! Internal architecture overview:
//! - `renderer_init`: constructs pipelines, bind groups, and the off-screen target.
//! - `renderer_frame`: runs one pass per snapshot and composites it onto the surface.
//! - `resolver`: placeholder resolution for tiles that are not resident yet.
//! - `planning`: pure per-frame geometry and uniform construction.
//! - `animation`: full-frame texture used by animation mode.
//! - `colormap`: colour-map lookup table uploaded once at start-up.

use model::ImageLayoutError;
use render_protocol::FramePassKind;
use tiles::{AtlasError, GpuContext, ManagerStats, TileAtlasGpu, TileResourceManager};
use view::TransformError;

pub use colormap::{COLOR_MAP_WIDTH, COLOR_MAPS, ColorMap, color_map_index, color_map_table};
pub use planning::{
    AnimationFramePlan, PlannedTile, TiledFramePlan, frame_uniforms, plan_animation_frame,
    plan_tiled_frame,
};
pub use resolver::{ResolvedKind, ResolvedTile, resolve_placeholders};

pub const DEFAULT_PLACEHOLDER_DEPTH: u32 = 3;
const INITIAL_TILE_INSTANCE_CAPACITY: usize = 256;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Per-frame uniform block. Field order and padding mirror `FrameUniforms` in
/// `color_mapping.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniformsGpu {
    pub canvas_size: [f32; 2],
    pub scale_min: f32,
    pub scale_max: f32,
    pub nan_color: [f32; 4],
    pub color_map: u32,
    pub scaling: u32,
    pub inverted: u32,
    pub color_map_count: u32,
    pub bias: f32,
    pub contrast: f32,
    pub gamma: f32,
    pub alpha: f32,
    pub rotation_origin: [f32; 2],
    pub rotation_angle: f32,
    pub scale_adjustment: f32,
    /// Clip-space `(left, bottom, right, top)` of the animation quad.
    pub animation_quad: [f32; 4],
}

/// One tile draw. Mirrors `TileInstance` in `tile_raster.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TileInstanceGpu {
    /// Canvas position of the tile's bottom-left corner before registration.
    pub offset: [f32; 2],
    /// Canvas pixels per texel.
    pub scaling: f32,
    pub depth: f32,
    pub texel_size: [f32; 2],
    pub atlas_origin: [f32; 2],
    pub atlas_layer: u32,
    pub _padding: [u32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererConfig {
    /// Edge of a source tile in texels; also the atlas cell size.
    pub tile_size: u32,
    pub atlas_tiles_per_row: u32,
    pub atlas_layers: u32,
    /// How many layers below a missing tile its descendants are searched.
    pub placeholder_depth: u32,
    pub clear_color: wgpu::Color,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            tile_size: model::DEFAULT_TILE_SIZE,
            atlas_tiles_per_row: tiles::DEFAULT_ATLAS_TILES_PER_ROW,
            atlas_layers: tiles::DEFAULT_ATLAS_LAYERS,
            placeholder_depth: DEFAULT_PLACEHOLDER_DEPTH,
            clear_color: wgpu::Color {
                r: 0.0,
                g: 0.0,
                b: 0.0,
                a: 1.0,
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Atlas(#[from] AtlasError),
    #[error(transparent)]
    Layout(#[from] ImageLayoutError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("surface texture unavailable: {0}")]
    Surface(#[from] wgpu::SurfaceError),
}

struct SurfaceState {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
}

/// What one `render_frame` call did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub pass_kind: FramePassKind,
    pub required_tiles: usize,
    pub exact_tiles: usize,
    pub higher_resolution_tiles: usize,
    pub lower_resolution_tiles: usize,
    pub tiles: ManagerStats,
    pub animation_uploaded: bool,
}

impl FrameStats {
    fn new(pass_kind: FramePassKind) -> Self {
        Self {
            pass_kind,
            required_tiles: 0,
            exact_tiles: 0,
            higher_resolution_tiles: 0,
            lower_resolution_tiles: 0,
            tiles: ManagerStats::default(),
            animation_uploaded: false,
        }
    }

    pub fn drawn_tiles(&self) -> usize {
        self.exact_tiles + self.higher_resolution_tiles + self.lower_resolution_tiles
    }

    /// Required tiles neither drawn nor covered by a placeholder are fetched in the
    /// background; a later pass picks them up.
    pub fn is_complete(&self) -> bool {
        self.exact_tiles == self.required_tiles
    }
}

struct GpuState {
    gpu: GpuContext,
    /// `None` for off-screen renderers; frames then stay in the target.
    surface: Option<SurfaceState>,
    output_size: (u32, u32),
    target_format: wgpu::TextureFormat,
    frame_uniform_buffer: wgpu::Buffer,
    frame_bind_group_layout: wgpu::BindGroupLayout,
    frame_bind_group: wgpu::BindGroup,
    image_bind_group_layout: wgpu::BindGroupLayout,
    composite_bind_group_layout: wgpu::BindGroupLayout,
    tile_pipeline: wgpu::RenderPipeline,
    animation_pipeline: wgpu::RenderPipeline,
    composite_pipeline: wgpu::RenderPipeline,
    composite_sampler: wgpu::Sampler,
    color_map_view: wgpu::TextureView,
    color_map_count: u32,
    tile_instance_buffer: wgpu::Buffer,
    tile_instance_capacity: usize,
}

struct TargetState {
    size: (u32, u32),
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    composite_bind_group: wgpu::BindGroup,
}

struct TileState {
    manager: TileResourceManager<TileAtlasGpu>,
    atlas_bind_group: wgpu::BindGroup,
}

/// Draws one image per pass into an off-screen target and composites it onto the surface.
pub struct Renderer {
    config: RendererConfig,
    gpu_state: GpuState,
    target_state: TargetState,
    tile_state: TileState,
    animation_state: animation::AnimationState,
}

impl Renderer {
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn tile_manager(&self) -> &TileResourceManager<TileAtlasGpu> {
        &self.tile_state.manager
    }

    /// Gives the frame-state owner access to eviction and store notifications.
    pub fn tile_manager_mut(&mut self) -> &mut TileResourceManager<TileAtlasGpu> {
        &mut self.tile_state.manager
    }

    pub fn surface_size(&self) -> (u32, u32) {
        self.gpu_state.output_size
    }

    #[cfg(test)]
    pub(crate) fn target_texture(&self) -> &wgpu::Texture {
        &self.target_state.color
    }
}

mod animation;

mod colormap;

mod planning;

mod renderer_frame;

mod renderer_init;

mod resolver;


#[cfg(test)]
mod wgsl_tests;
