//! Renderer initialization and GPU resource construction.
//!
//! This module owns `Renderer::new`, `Renderer::new_offscreen` and helper routines that allocate pipelines,
//! bind groups, the colour-map texture, and the off-screen target.

use tiles::{GpuContext, TileAtlasGpu, TileAtlasLayout, TileResourceManager, TileStore};
use wgpu::util::DeviceExt;

use crate::animation::AnimationState;
use crate::colormap::{COLOR_MAP_WIDTH, COLOR_MAPS, color_map_table};
use crate::{
    DEPTH_FORMAT, FrameUniformsGpu, GpuState, INITIAL_TILE_INSTANCE_CAPACITY, RenderError,
    Renderer, RendererConfig, SurfaceState, TargetState, TileInstanceGpu, TileState,
};

pub(crate) const TILE_RASTER_SHADER: &str = concat!(
    include_str!("color_mapping.wgsl"),
    include_str!("tile_raster.wgsl")
);
pub(crate) const ANIMATION_RASTER_SHADER: &str = concat!(
    include_str!("color_mapping.wgsl"),
    include_str!("animation_raster.wgsl")
);

impl Renderer {
    /// Builds the renderer on an already configured device, presenting to `surface`.
    ///
    /// The surface is reconfigured so that a non-sRGB view of its format can be rendered to;
    /// colour-map values are already display-encoded.
    pub fn new(
        gpu: GpuContext,
        surface: wgpu::Surface<'static>,
        mut surface_config: wgpu::SurfaceConfiguration,
        store: Box<dyn TileStore>,
        config: RendererConfig,
    ) -> Result<Self, RenderError> {
        let target_format = surface_config.format.remove_srgb_suffix();
        if target_format != surface_config.format
            && !surface_config.view_formats.contains(&target_format)
        {
            surface_config.view_formats.push(target_format);
        }
        surface.configure(&gpu.device, &surface_config);

        let size = (surface_config.width, surface_config.height);
        let mut renderer = Self::new_offscreen(gpu, target_format, size, store, config)?;
        renderer.gpu_state.surface = Some(SurfaceState {
            surface,
            config: surface_config,
        });
        Ok(renderer)
    }

    /// Builds a renderer that draws into its off-screen target only.
    ///
    /// `render_frame` then leaves each pass in the target instead of presenting it. sRGB
    /// formats are drawn through their linear counterpart.
    pub fn new_offscreen(
        gpu: GpuContext,
        target_format: wgpu::TextureFormat,
        size: (u32, u32),
        store: Box<dyn TileStore>,
        config: RendererConfig,
    ) -> Result<Self, RenderError> {
        let target_format = target_format.remove_srgb_suffix();
        let atlas_layout = TileAtlasLayout::square(
            config.tile_size,
            config.atlas_tiles_per_row,
            config.atlas_layers,
        )?;
        let atlas = TileAtlasGpu::new(&gpu, atlas_layout)?;
        let device = &gpu.device;

        let frame_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("renderer.frame_uniform"),
            size: std::mem::size_of::<FrameUniformsGpu>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let tile_instance_capacity = INITIAL_TILE_INSTANCE_CAPACITY;
        let tile_instance_buffer = create_tile_instance_buffer(device, tile_instance_capacity);

        let frame_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("renderer.frame_layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                ],
            });
        let atlas_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("renderer.atlas_layout"),
                entries: &[unfilterable_texture_entry(
                    wgpu::TextureViewDimension::D2Array,
                )],
            });
        let image_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("renderer.animation_layout"),
                entries: &[unfilterable_texture_entry(wgpu::TextureViewDimension::D2)],
            });
        let composite_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("renderer.composite_layout"),
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

        let color_map_view = create_color_map_view(&gpu);
        let composite_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("renderer.composite_sampler"),
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let frame_bind_group = create_frame_bind_group(
            device,
            &frame_bind_group_layout,
            &frame_uniform_buffer,
            &tile_instance_buffer,
            &color_map_view,
        );
        let atlas_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("renderer.atlas_bind_group"),
            layout: &atlas_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(atlas.view()),
            }],
        });

        let tile_pipeline = create_raster_pipeline(
            device,
            "renderer.tile",
            TILE_RASTER_SHADER,
            &[&frame_bind_group_layout, &atlas_bind_group_layout],
            target_format,
        );
        let animation_pipeline = create_raster_pipeline(
            device,
            "renderer.animation",
            ANIMATION_RASTER_SHADER,
            &[&frame_bind_group_layout, &image_bind_group_layout],
            target_format,
        );
        let composite_pipeline =
            create_composite_pipeline(device, &composite_bind_group_layout, target_format);

        let target_size = (size.0.max(1), size.1.max(1));
        let target_state = create_target_state(
            device,
            &composite_bind_group_layout,
            &composite_sampler,
            target_format,
            target_size,
        );

        log::info!(
            "renderer ready: {target_format:?} target, {} atlas cells of {} texels",
            atlas_layout.capacity(),
            config.tile_size
        );

        let manager = TileResourceManager::new(store, atlas, atlas_layout);
        Ok(Self {
            config,
            gpu_state: GpuState {
                gpu,
                surface: None,
                output_size: target_size,
                target_format,
                frame_uniform_buffer,
                frame_bind_group_layout,
                frame_bind_group,
                image_bind_group_layout,
                composite_bind_group_layout,
                tile_pipeline,
                animation_pipeline,
                composite_pipeline,
                composite_sampler,
                color_map_view,
                color_map_count: COLOR_MAPS.len() as u32,
                tile_instance_buffer,
                tile_instance_capacity,
            },
            target_state,
            tile_state: TileState {
                manager,
                atlas_bind_group,
            },
            animation_state: AnimationState::default(),
        })
    }
}

fn unfilterable_texture_entry(
    view_dimension: wgpu::TextureViewDimension,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension,
            multisampled: false,
        },
        count: None,
    }
}

pub(crate) fn create_tile_instance_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("renderer.tile_instances"),
        size: (capacity * std::mem::size_of::<TileInstanceGpu>()) as u64,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

pub(crate) fn create_frame_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniform_buffer: &wgpu::Buffer,
    tile_instance_buffer: &wgpu::Buffer,
    color_map_view: &wgpu::TextureView,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("renderer.frame_bind_group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: tile_instance_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(color_map_view),
            },
        ],
    })
}

fn create_color_map_view(gpu: &GpuContext) -> wgpu::TextureView {
    let texture = gpu.device.create_texture_with_data(
        &gpu.queue,
        &wgpu::TextureDescriptor {
            label: Some("renderer.color_maps"),
            size: wgpu::Extent3d {
                width: COLOR_MAP_WIDTH,
                height: COLOR_MAPS.len() as u32,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        },
        wgpu::util::TextureDataOrder::LayerMajor,
        &color_map_table(),
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_raster_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: &'static str,
    bind_group_layouts: &[&wgpu::BindGroupLayout],
    target_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts,
        immediate_size: 0,
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: target_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

fn create_composite_pipeline(
    device: &wgpu::Device,
    bind_group_layout: &wgpu::BindGroupLayout,
    target_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("renderer.composite"),
        source: wgpu::ShaderSource::Wgsl(include_str!("composite.wgsl").into()),
    });
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("renderer.composite"),
        bind_group_layouts: &[bind_group_layout],
        immediate_size: 0,
    });
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("renderer.composite"),
        layout: Some(&layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: target_format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

/// Off-screen colour and depth targets of `size` device pixels.
pub(crate) fn create_target_state(
    device: &wgpu::Device,
    composite_layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    format: wgpu::TextureFormat,
    size: (u32, u32),
) -> TargetState {
    let extent = wgpu::Extent3d {
        width: size.0,
        height: size.1,
        depth_or_array_layers: 1,
    };
    let color = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("renderer.target.color"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let depth = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("renderer.target.depth"),
        size: extent,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
    let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
    let composite_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("renderer.composite_bind_group"),
        layout: composite_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&color_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });
    TargetState {
        size,
        color,
        color_view,
        depth_view,
        composite_bind_group,
    }
}
