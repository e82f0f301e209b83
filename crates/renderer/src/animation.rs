//! Full-frame texture for animation mode.
//!
//! Playback hands over a new sample buffer per frame. The texture is only rewritten when the
//! buffer itself changes, and is recreated when the view's texel dimensions change.

use std::sync::Arc;

use tiles::GpuContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AnimationUpload {
    /// The uploaded texture already holds this buffer.
    Keep,
    Upload { width: u32, height: u32 },
    /// The buffer does not match the view's texel grid; the previous texture stays.
    ShapeMismatch { expected: usize, actual: usize },
}

pub(crate) fn plan_animation_upload(
    uploaded: Option<(&Arc<[f32]>, (u32, u32))>,
    data: &Arc<[f32]>,
    size: (u32, u32),
) -> AnimationUpload {
    if let Some((previous, previous_size)) = uploaded {
        if Arc::ptr_eq(previous, data) && previous_size == size {
            return AnimationUpload::Keep;
        }
    }
    let expected = size.0 as usize * size.1 as usize;
    if data.len() != expected {
        return AnimationUpload::ShapeMismatch {
            expected,
            actual: data.len(),
        };
    }
    AnimationUpload::Upload {
        width: size.0,
        height: size.1,
    }
}

struct AnimationTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    size: (u32, u32),
    data: Arc<[f32]>,
}

#[derive(Default)]
pub(crate) struct AnimationState {
    current: Option<AnimationTexture>,
}

impl AnimationState {
    pub(crate) fn bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.current.as_ref().map(|texture| &texture.bind_group)
    }

    /// Brings the texture in line with `data`. Returns whether texels were written.
    pub(crate) fn update(
        &mut self,
        gpu: &GpuContext,
        layout: &wgpu::BindGroupLayout,
        data: &Arc<[f32]>,
        size: (u32, u32),
    ) -> bool {
        let uploaded = self
            .current
            .as_ref()
            .map(|texture| (&texture.data, texture.size));
        match plan_animation_upload(uploaded, data, size) {
            AnimationUpload::Keep => false,
            AnimationUpload::ShapeMismatch { expected, actual } => {
                log::warn!(
                    "animation frame has {actual} samples, view needs {expected} ({}x{}); keeping previous frame",
                    size.0,
                    size.1
                );
                false
            }
            AnimationUpload::Upload { width, height } => {
                let reuse = self
                    .current
                    .as_ref()
                    .is_some_and(|texture| texture.size == (width, height));
                if !reuse {
                    self.current = Some(create_animation_texture(gpu, layout, data, width, height));
                }
                let Some(current) = self.current.as_mut() else {
                    return false;
                };
                write_animation_texels(gpu, &current.texture, data, width, height);
                current.data = Arc::clone(data);
                true
            }
        }
    }
}

fn create_animation_texture(
    gpu: &GpuContext,
    layout: &wgpu::BindGroupLayout,
    data: &Arc<[f32]>,
    width: u32,
    height: u32,
) -> AnimationTexture {
    log::debug!("creating {width}x{height} animation texture");
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("renderer.animation.frame"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R32Float,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("renderer.animation.bind_group"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::TextureView(&view),
        }],
    });
    AnimationTexture {
        texture,
        bind_group,
        size: (width, height),
        data: Arc::clone(data),
    }
}

fn write_animation_texels(
    gpu: &GpuContext,
    texture: &wgpu::Texture,
    data: &[f32],
    width: u32,
    height: u32,
) {
    gpu.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(data),
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
