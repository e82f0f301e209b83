//! Frame execution.
//!
//! One `render_frame` call is one render pass over one image: pick the pass kind, draw the
//! image into the off-screen target (or leave it untouched), then composite that target
//! onto the surface and present.

use render_protocol::{FramePassKind, FrameSnapshot};
use tiles::TileRequest;

use crate::planning::{plan_animation_frame, plan_tiled_frame};
use crate::renderer_init::{
    create_frame_bind_group, create_target_state, create_tile_instance_buffer,
};
use crate::resolver::ResolvedKind;
use crate::{FrameStats, FrameUniformsGpu, RenderError, Renderer, TileInstanceGpu};

impl Renderer {
    /// Reconfigures the surface for a new window size. Zero-sized windows are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || self.gpu_state.output_size == (width, height) {
            return;
        }
        self.gpu_state.output_size = (width, height);
        if let Some(surface) = self.gpu_state.surface.as_mut() {
            surface.config.width = width;
            surface.config.height = height;
            surface
                .surface
                .configure(&self.gpu_state.gpu.device, &surface.config);
        }
    }

    /// Reconfigures the surface at its current size, after it was reported lost or outdated.
    pub fn reconfigure_surface(&mut self) {
        if let Some(surface) = self.gpu_state.surface.as_ref() {
            surface
                .surface
                .configure(&self.gpu_state.gpu.device, &surface.config);
        }
    }

    /// Runs one render pass for `snapshot` and presents the result. Off-screen renderers
    /// keep the result in their target.
    ///
    /// Missing tiles, failed uploads and malformed animation frames are logged and reflected
    /// in the returned stats; only surface acquisition and invalid frame geometry are errors.
    pub fn render_frame(&mut self, snapshot: &FrameSnapshot) -> Result<FrameStats, RenderError> {
        let mut pass_kind = snapshot.pass_kind();
        let surface_size = snapshot.surface_size();
        if matches!(pass_kind, FramePassKind::Tiled | FramePassKind::Animation)
            && (surface_size.0 == 0 || surface_size.1 == 0)
        {
            log::debug!("render area of image {} is empty; skipping", snapshot.image_id);
            pass_kind = FramePassKind::Skip;
        }
        let mut stats = FrameStats::new(pass_kind);

        if pass_kind != FramePassKind::Skip {
            self.ensure_target_size(surface_size);
            let mut encoder =
                self.gpu_state
                    .gpu
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("renderer.frame.image"),
                    });
            match pass_kind {
                FramePassKind::ClearOnly => self.encode_image_pass(&mut encoder, None),
                FramePassKind::Tiled => self.encode_tiled_pass(&mut encoder, snapshot, &mut stats)?,
                FramePassKind::Animation => {
                    self.encode_animation_pass(&mut encoder, snapshot, &mut stats)?
                }
                FramePassKind::Skip => {}
            }
            self.gpu_state.gpu.queue.submit(Some(encoder.finish()));
        }

        self.present_target()?;
        log::trace!("frame for image {}: {stats:?}", snapshot.image_id);
        Ok(stats)
    }

    fn ensure_target_size(&mut self, size: (u32, u32)) {
        if self.target_state.size == size {
            return;
        }
        log::debug!("resizing off-screen target to {}x{}", size.0, size.1);
        self.target_state = create_target_state(
            &self.gpu_state.gpu.device,
            &self.gpu_state.composite_bind_group_layout,
            &self.gpu_state.composite_sampler,
            self.gpu_state.target_format,
            size,
        );
    }

    fn encode_tiled_pass(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        snapshot: &FrameSnapshot,
        stats: &mut FrameStats,
    ) -> Result<(), RenderError> {
        let (image_id, channel, polarization) =
            (snapshot.image_id, snapshot.channel, snapshot.polarization);
        let manager = &mut self.tile_state.manager;
        manager.begin_pass();
        let plan = plan_tiled_frame(
            snapshot,
            self.config.tile_size,
            self.config.placeholder_depth,
            self.gpu_state.color_map_count,
            |coordinate, peek| {
                let request = TileRequest {
                    image_id,
                    channel,
                    polarization,
                    tile: coordinate.encode(),
                };
                let mut tile = manager.get_tile(request, peek)?;
                manager.upload_tile_to_gpu(&mut tile).ok()?;
                manager.get_tile_texture_parameters(&tile)
            },
        )?;

        stats.required_tiles = plan.required.tiles.len();
        for tile in &plan.tiles {
            match tile.resolved.kind {
                ResolvedKind::Exact => stats.exact_tiles += 1,
                ResolvedKind::HigherResolution => stats.higher_resolution_tiles += 1,
                ResolvedKind::LowerResolution => stats.lower_resolution_tiles += 1,
            }
        }
        stats.tiles = self.tile_state.manager.stats();

        self.write_uniforms(&plan.uniforms);
        self.write_tile_instances(&plan.instances);
        let instance_count = plan.instances.len() as u32;
        self.encode_image_pass(
            encoder,
            Some(&|pass: &mut wgpu::RenderPass<'_>, renderer: &Renderer| {
                pass.set_pipeline(&renderer.gpu_state.tile_pipeline);
                pass.set_bind_group(0, &renderer.gpu_state.frame_bind_group, &[]);
                pass.set_bind_group(1, &renderer.tile_state.atlas_bind_group, &[]);
                for instance in 0..instance_count {
                    pass.draw(0..4, instance..instance + 1);
                }
            }),
        );
        Ok(())
    }

    fn encode_animation_pass(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        snapshot: &FrameSnapshot,
        stats: &mut FrameStats,
    ) -> Result<(), RenderError> {
        let Some(plan) = plan_animation_frame(snapshot, self.gpu_state.color_map_count)? else {
            self.encode_image_pass(encoder, None);
            return Ok(());
        };
        if let Some(data) = &snapshot.animation_data {
            stats.animation_uploaded = self.animation_state.update(
                &self.gpu_state.gpu,
                &self.gpu_state.image_bind_group_layout,
                data,
                plan.texture_size,
            );
        }
        if self.animation_state.bind_group().is_none() {
            log::debug!(
                "no animation frame for image {} yet; clearing",
                snapshot.image_id
            );
            self.encode_image_pass(encoder, None);
            return Ok(());
        }

        self.write_uniforms(&plan.uniforms);
        self.encode_image_pass(
            encoder,
            Some(&|pass: &mut wgpu::RenderPass<'_>, renderer: &Renderer| {
                let Some(animation_bind_group) = renderer.animation_state.bind_group() else {
                    return;
                };
                pass.set_pipeline(&renderer.gpu_state.animation_pipeline);
                pass.set_bind_group(0, &renderer.gpu_state.frame_bind_group, &[]);
                pass.set_bind_group(1, animation_bind_group, &[]);
                pass.draw(0..4, 0..1);
            }),
        );
        Ok(())
    }

    /// Clears the off-screen target and runs `draw` inside the same pass.
    fn encode_image_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        draw: Option<&dyn Fn(&mut wgpu::RenderPass<'_>, &Renderer)>,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("renderer.image"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.target_state.color_view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.config.clear_color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.target_state.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        if let Some(draw) = draw {
            draw(&mut pass, self);
        }
    }

    fn present_target(&mut self) -> Result<(), RenderError> {
        let Some(surface) = self.gpu_state.surface.as_ref() else {
            return Ok(());
        };
        let frame = surface.surface.get_current_texture()?;
        let frame_view = frame.texture.create_view(&wgpu::TextureViewDescriptor {
            format: Some(self.gpu_state.target_format),
            ..Default::default()
        });
        let mut encoder =
            self.gpu_state
                .gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("renderer.frame.composite"),
                });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("renderer.composite"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.config.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_pipeline(&self.gpu_state.composite_pipeline);
            pass.set_bind_group(0, &self.target_state.composite_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.gpu_state.gpu.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(())
    }

    fn write_uniforms(&self, uniforms: &FrameUniformsGpu) {
        self.gpu_state.gpu.queue.write_buffer(
            &self.gpu_state.frame_uniform_buffer,
            0,
            bytemuck::bytes_of(uniforms),
        );
    }

    fn write_tile_instances(&mut self, instances: &[TileInstanceGpu]) {
        if instances.is_empty() {
            return;
        }
        if instances.len() > self.gpu_state.tile_instance_capacity {
            let capacity = instances
                .len()
                .checked_next_power_of_two()
                .unwrap_or(instances.len());
            log::debug!("growing tile instance buffer to {capacity} entries");
            let device = &self.gpu_state.gpu.device;
            self.gpu_state.tile_instance_buffer = create_tile_instance_buffer(device, capacity);
            self.gpu_state.tile_instance_capacity = capacity;
            self.gpu_state.frame_bind_group = create_frame_bind_group(
                device,
                &self.gpu_state.frame_bind_group_layout,
                &self.gpu_state.frame_uniform_buffer,
                &self.gpu_state.tile_instance_buffer,
                &self.gpu_state.color_map_view,
            );
        }
        self.gpu_state.gpu.queue.write_buffer(
            &self.gpu_state.tile_instance_buffer,
            0,
            bytemuck::cast_slice(instances),
        );
    }
}
