use crate::{AtlasError, SlotAddress, TileAtlasLayout, TileTextureSink};

const ATLAS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

/// Shared device and queue. Every component that issues GPU calls receives a clone of
/// this handle at construction; there is no global context.
#[derive(Debug, Clone)]
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }
}

/// Layered single-channel float texture holding resident tiles.
#[derive(Debug)]
pub struct TileAtlasGpu {
    gpu: GpuContext,
    layout: TileAtlasLayout,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl TileAtlasGpu {
    pub fn new(gpu: &GpuContext, layout: TileAtlasLayout) -> Result<Self, AtlasError> {
        validate_against_device(&gpu.device, &layout)?;
        let (texture, view) = create_atlas_texture_and_array_view(&gpu.device, &layout);
        log::info!(
            "created tile atlas {}x{} texels x {} layers",
            layout.atlas_width(),
            layout.atlas_height(),
            layout.layers()
        );
        Ok(Self {
            gpu: gpu.clone(),
            layout,
            texture,
            view,
        })
    }

    pub fn layout(&self) -> &TileAtlasLayout {
        &self.layout
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

impl TileTextureSink for TileAtlasGpu {
    fn write_tile(&mut self, address: SlotAddress, width: u32, height: u32, pixels: &[f32]) {
        let [x, y] = self.layout.texel_origin(address);
        self.gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x,
                    y,
                    z: address.atlas_layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(pixels),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

fn validate_against_device(
    device: &wgpu::Device,
    layout: &TileAtlasLayout,
) -> Result<(), AtlasError> {
    validate_against_limits(&device.limits(), layout)
}

fn validate_against_limits(
    limits: &wgpu::Limits,
    layout: &TileAtlasLayout,
) -> Result<(), AtlasError> {
    if layout.layers() > limits.max_texture_array_layers {
        return Err(AtlasError::LayersExceedDeviceLimit {
            layers: layout.layers(),
            limit: limits.max_texture_array_layers,
        });
    }
    let edge = layout.atlas_width().max(layout.atlas_height());
    if edge > limits.max_texture_dimension_2d {
        return Err(AtlasError::SizeExceedsDeviceLimit {
            size: edge,
            limit: limits.max_texture_dimension_2d,
        });
    }
    Ok(())
}

fn create_atlas_texture_and_array_view(
    device: &wgpu::Device,
    layout: &TileAtlasLayout,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("tiles.atlas"),
        size: wgpu::Extent3d {
            width: layout.atlas_width(),
            height: layout.atlas_height(),
            depth_or_array_layers: layout.layers(),
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: ATLAS_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("tiles.atlas.array_view"),
        format: Some(ATLAS_FORMAT),
        dimension: Some(wgpu::TextureViewDimension::D2Array),
        usage: None,
        aspect: wgpu::TextureAspect::All,
        base_mip_level: 0,
        mip_level_count: Some(1),
        base_array_layer: 0,
        array_layer_count: Some(layout.layers()),
    });
    (texture, view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_reject_too_many_layers() {
        let limits = wgpu::Limits::downlevel_webgl2_defaults();
        let layout = TileAtlasLayout::square(256, 4, limits.max_texture_array_layers + 1)
            .expect("layout");
        assert_eq!(
            validate_against_limits(&limits, &layout),
            Err(AtlasError::LayersExceedDeviceLimit {
                layers: limits.max_texture_array_layers + 1,
                limit: limits.max_texture_array_layers
            })
        );
    }

    #[test]
    fn limits_reject_oversized_atlas_edge() {
        let limits = wgpu::Limits::downlevel_webgl2_defaults();
        let tiles_per_row = limits.max_texture_dimension_2d / 256 + 1;
        let layout = TileAtlasLayout::square(256, tiles_per_row, 1).expect("layout");
        assert!(matches!(
            validate_against_limits(&limits, &layout),
            Err(AtlasError::SizeExceedsDeviceLimit { .. })
        ));
    }

    #[test]
    fn default_layout_fits_webgl2_limits() {
        let limits = wgpu::Limits::downlevel_webgl2_defaults();
        let layout = TileAtlasLayout::square(
            model::DEFAULT_TILE_SIZE,
            crate::DEFAULT_ATLAS_TILES_PER_ROW,
            crate::DEFAULT_ATLAS_LAYERS,
        )
        .expect("layout");
        assert_eq!(validate_against_limits(&limits, &layout), Ok(()));
    }
}
