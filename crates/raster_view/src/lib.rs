//! Windowed viewer for one multi-resolution tiled image.
//!
//! `GpuState` owns the wgpu surface and the renderer; `ViewState` owns camera and display
//! settings. Tile completions from the store arrive on a background channel and are
//! forwarded to the event loop as `ViewerEvent::TilesAvailable`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use renderer::{COLOR_MAPS, FrameStats, RenderError, Renderer};
use tiles::{GpuContext, TileAvailable, TileStore};
use winit::dpi::PhysicalSize;
use winit::event_loop::EventLoopProxy;
use winit::window::Window;

pub mod config;
pub mod synthetic_store;
pub mod view_state;

use config::ViewerConfig;
use synthetic_store::{StoreSettings, SyntheticImage, SyntheticTileStore};
use view_state::ViewState;

pub const IMAGE_ID: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerEvent {
    /// Tiles finished loading since the last notification; `count` is how many.
    TilesAvailable { count: u32 },
}

pub struct GpuState {
    renderer: Renderer,
    view: ViewState,
    surface_size: PhysicalSize<u32>,
}

impl GpuState {
    pub async fn new(
        window: Arc<Window>,
        config: &ViewerConfig,
        proxy: EventLoopProxy<ViewerEvent>,
        max_notifications_per_tick: usize,
    ) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("create wgpu surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("request wgpu adapter")?;
        log::info!("using adapter {:?}", adapter.get_info());

        let limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("raster_view.device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("request wgpu device")?;

        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("surface reports no supported formats")?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let mut size = window.inner_size();
        size.width = size.width.max(1);
        size.height = size.height.max(1);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        let image = SyntheticImage {
            image_id: IMAGE_ID,
            width: config.image_width,
            height: config.image_height,
            tile_size: config.tile_size,
        };
        let store = SyntheticTileStore::start(
            image,
            StoreSettings {
                workers: config.fetch_workers,
                latency: Duration::from_millis(config.tile_latency_ms),
                cache_tiles: config.store_cache_tiles,
            },
        )
        .context("create synthetic tile store")?;
        spawn_notification_forwarder(store.subscribe(), proxy, max_notifications_per_tick)?;

        let renderer = Renderer::new(
            GpuContext::new(device, queue),
            surface,
            surface_config,
            Box::new(store),
            config.renderer_config(),
        )
        .context("create renderer")?;

        let view = ViewState::new(
            image,
            config.render,
            config.initial_nan_color()?,
            (size.width, size.height),
            window.scale_factor(),
        )
        .context("fit initial view")?;

        Ok(Self {
            renderer,
            view,
            surface_size: size,
        })
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>, scale_factor: f64) {
        self.view
            .resize((new_size.width, new_size.height), scale_factor);
        let width = new_size.width.max(1);
        let height = new_size.height.max(1);
        if self.surface_size.width == width && self.surface_size.height == height {
            return;
        }
        self.surface_size = PhysicalSize::new(width, height);
        self.renderer.resize(width, height);
    }

    pub fn reconfigure_surface(&mut self) {
        self.renderer.reconfigure_surface();
    }

    pub fn pan_canvas(&mut self, delta_x: f64, delta_y: f64) {
        if let Err(error) = self.view.pan(delta_x, delta_y) {
            log::warn!("pan ignored: {error}");
        }
    }

    pub fn zoom_canvas_about_viewport_point(
        &mut self,
        zoom_factor: f64,
        viewport_x: f64,
        viewport_y: f64,
    ) {
        if let Err(error) = self.view.zoom_about(zoom_factor, viewport_x, viewport_y) {
            log::warn!("zoom ignored: {error}");
        }
    }

    pub fn rotate_canvas(&mut self, delta_radians: f64) {
        self.view.rotate(delta_radians);
    }

    pub fn toggle_visibility(&mut self) {
        self.view.toggle_visibility();
    }

    pub fn toggle_animation(&mut self) {
        self.view.toggle_animation();
        log::info!("render mode: {:?}", self.view.render_type());
    }

    pub fn toggle_inverted(&mut self) {
        self.view.toggle_inverted();
    }

    pub fn cycle_color_map(&mut self) {
        self.view.cycle_color_map(COLOR_MAPS.len() as u32);
        let index = self.view.render_config().color_map as usize;
        if let Some(color_map) = COLOR_MAPS.get(index) {
            log::info!("colour map: {}", color_map.name);
        }
    }

    pub fn cycle_scaling(&mut self) {
        self.view.cycle_scaling();
        log::info!("scaling: {:?}", self.view.render_config().scaling);
    }

    /// Applies reloaded colour settings. Image, store and atlas settings need a restart.
    pub fn apply_display_settings(&mut self, config: &ViewerConfig) -> Result<()> {
        self.view
            .update_display(config.render, &config.nan_color, config.nan_alpha)
            .with_context(|| format!("invalid NaN colour {:?}", config.nan_color))
    }

    pub fn resident_tiles(&self) -> usize {
        self.renderer.tile_manager().resident_count()
    }

    /// Releases the atlas cells held by the image before the window goes away.
    pub fn close_image(&mut self) {
        let released = self.renderer.tile_manager_mut().evict_image(IMAGE_ID);
        log::info!("closed image {IMAGE_ID}, released {released} atlas cells");
    }

    /// Renders the current view. Animation mode advances one step per rendered frame.
    pub fn render(&mut self) -> Result<FrameStats, RenderError> {
        let snapshot = self.view.snapshot();
        let stats = self.renderer.render_frame(&snapshot)?;
        self.view.advance_animation();
        Ok(stats)
    }
}

/// Forwards store notifications to the event loop, batching whatever is already queued.
fn spawn_notification_forwarder(
    notifications: Receiver<TileAvailable>,
    proxy: EventLoopProxy<ViewerEvent>,
    max_notifications_per_tick: usize,
) -> Result<()> {
    std::thread::Builder::new()
        .name("tile-notifications".to_owned())
        .spawn(move || {
            while let Some(count) = next_batch(&notifications, max_notifications_per_tick) {
                if proxy
                    .send_event(ViewerEvent::TilesAvailable { count })
                    .is_err()
                {
                    break;
                }
            }
            log::debug!("tile notification forwarder stopped");
        })
        .context("spawn tile notification forwarder")?;
    Ok(())
}

/// Blocks for one notification, then takes up to `max - 1` more without waiting.
/// `None` once every sender is gone.
fn next_batch(notifications: &Receiver<TileAvailable>, max: usize) -> Option<u32> {
    notifications.recv().ok()?;
    let extra = notifications.try_iter().take(max.saturating_sub(1)).count();
    Some(u32::try_from(extra + 1).unwrap_or(u32::MAX))
}
