use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use frame_scheduler::{RedrawReasons, RedrawScheduler, SchedulerConfig};
use raster_view::config::{Cli, ViewerConfig};
use raster_view::{GpuState, ViewerEvent};
use render_protocol::RasterRenderType;
use renderer::RenderError;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

const ROTATION_RADIANS_PER_PIXEL: f64 = 0.01;
const WHEEL_ZOOM_SPEED: f64 = 0.1;
const PIXELS_PER_SCROLL_LINE: f64 = 120.0;

struct App {
    cli: Cli,
    config: ViewerConfig,
    proxy: EventLoopProxy<ViewerEvent>,
    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    scheduler: RedrawScheduler,
    is_left_mouse_pressed: bool,
    is_rotate_pressed: bool,
    last_cursor_position: Option<(f64, f64)>,
    startup_error: Option<anyhow::Error>,
}

impl App {
    fn new(cli: Cli, config: ViewerConfig, proxy: EventLoopProxy<ViewerEvent>) -> Self {
        Self {
            cli,
            config,
            proxy,
            window: None,
            gpu: None,
            scheduler: RedrawScheduler::new(SchedulerConfig::default()),
            is_left_mouse_pressed: false,
            is_rotate_pressed: false,
            last_cursor_position: None,
            startup_error: None,
        }
    }

    fn window_id(&self) -> Option<WindowId> {
        self.window.as_ref().map(|w| w.id())
    }

    fn request_redraw(&mut self, reasons: RedrawReasons) {
        if self.scheduler.request(reasons) {
            self.ask_for_tick();
        }
    }

    fn ask_for_tick(&self) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn close(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.close_image();
        }
        event_loop.exit();
    }

    /// Re-reads the configuration file and flags, then applies the colour settings.
    fn reload_config(&mut self) {
        let config = match ViewerConfig::load(&self.cli) {
            Ok(config) => config,
            Err(error) => {
                log::warn!("configuration not reloaded: {error:#}");
                return;
            }
        };
        if let Some(gpu) = self.gpu.as_mut() {
            if let Err(error) = gpu.apply_display_settings(&config) {
                log::warn!("display settings not applied: {error:#}");
                return;
            }
        }
        log::info!("display settings reloaded");
        self.config = config;
        self.request_redraw(RedrawReasons::CONFIG_CHANGED);
    }

    fn create_gpu(&self, event_loop: &ActiveEventLoop) -> Result<(Arc<Window>, GpuState)> {
        let window = Arc::new(
            event_loop.create_window(
                WindowAttributes::default()
                    .with_title("raster_view")
                    .with_inner_size(PhysicalSize::new(
                        self.config.window_width,
                        self.config.window_height,
                    )),
            )?,
        );
        let gpu = pollster::block_on(GpuState::new(
            window.clone(),
            &self.config,
            self.proxy.clone(),
            self.scheduler.config().max_notifications_per_tick,
        ))?;
        Ok((window, gpu))
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        let ticket = match self.scheduler.begin_pass() {
            Ok(ticket) => ticket,
            Err(error) => {
                log::warn!("redraw skipped: {error}");
                return;
            }
        };
        log::trace!(
            "pass {} for {:?} ({} tile notifications)",
            ticket.sequence,
            ticket.reasons,
            ticket.coalesced_tile_notifications
        );

        let mut redraw_again = false;
        match gpu.render() {
            Ok(stats) => {
                if !stats.is_complete() {
                    log::debug!(
                        "pass {} drew {} tiles for {} required, {} exact; {} resident",
                        ticket.sequence,
                        stats.drawn_tiles(),
                        stats.required_tiles,
                        stats.exact_tiles,
                        gpu.resident_tiles()
                    );
                }
            }
            Err(RenderError::Surface(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost)) => {
                log::warn!("surface outdated or lost; reconfiguring");
                gpu.reconfigure_surface();
                redraw_again = true;
            }
            Err(RenderError::Surface(wgpu::SurfaceError::Timeout)) => {
                redraw_again = true;
            }
            Err(RenderError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                log::error!("GPU out of memory");
                event_loop.exit();
                return;
            }
            Err(error) => {
                log::error!("frame {} failed: {error}", ticket.sequence);
            }
        }

        let animating = gpu.view().render_type() == RasterRenderType::Animation;
        if let Err(error) = self.scheduler.end_pass() {
            log::warn!("{error}");
        }
        if redraw_again || animating {
            self.scheduler.request(RedrawReasons::VIEW_CHANGED);
        }
        if self.scheduler.is_pending() {
            self.ask_for_tick();
        }
    }
}

impl ApplicationHandler<ViewerEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);

        if self.window.is_some() {
            return;
        }

        match self.create_gpu(event_loop) {
            Ok((window, gpu)) => {
                self.window = Some(window);
                self.gpu = Some(gpu);
                self.request_redraw(RedrawReasons::RESIZED);
            }
            Err(error) => {
                self.startup_error = Some(error);
                event_loop.exit();
            }
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, event: ViewerEvent) {
        match event {
            ViewerEvent::TilesAvailable { count } => {
                if self.scheduler.tiles_available(count) {
                    self.ask_for_tick();
                }
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window_id() != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => self.close(event_loop),
            WindowEvent::KeyboardInput { event, .. } => {
                let is_pressed = event.state == ElementState::Pressed;
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                if code == KeyCode::KeyR {
                    self.is_rotate_pressed = is_pressed;
                    return;
                }
                if !is_pressed || event.repeat {
                    return;
                }
                match code {
                    KeyCode::Escape => return self.close(event_loop),
                    KeyCode::F5 => return self.reload_config(),
                    _ => {}
                }
                let Some(gpu) = self.gpu.as_mut() else {
                    return;
                };
                match code {
                    KeyCode::KeyH => gpu.toggle_visibility(),
                    KeyCode::KeyA => gpu.toggle_animation(),
                    KeyCode::KeyC => gpu.cycle_color_map(),
                    KeyCode::KeyS => gpu.cycle_scaling(),
                    KeyCode::KeyI => gpu.toggle_inverted(),
                    _ => return,
                }
                self.request_redraw(RedrawReasons::CONFIG_CHANGED);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    self.is_left_mouse_pressed = state == ElementState::Pressed;
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                let previous = self.last_cursor_position.replace((position.x, position.y));
                if !self.is_left_mouse_pressed {
                    return;
                }
                let (Some((last_x, last_y)), Some(gpu)) = (previous, self.gpu.as_mut()) else {
                    return;
                };
                let delta_x = position.x - last_x;
                let delta_y = position.y - last_y;
                if self.is_rotate_pressed {
                    gpu.rotate_canvas(delta_x * ROTATION_RADIANS_PER_PIXEL);
                } else {
                    gpu.pan_canvas(delta_x, delta_y);
                }
                self.request_redraw(RedrawReasons::VIEW_CHANGED);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll_lines = match delta {
                    MouseScrollDelta::LineDelta(_, vertical_lines) => f64::from(vertical_lines),
                    MouseScrollDelta::PixelDelta(physical_position) => {
                        physical_position.y / PIXELS_PER_SCROLL_LINE
                    }
                };
                let zoom_factor = (scroll_lines * WHEEL_ZOOM_SPEED).exp();
                let (anchor_x, anchor_y) = if let Some(cursor) = self.last_cursor_position {
                    cursor
                } else if let Some(window) = self.window.as_ref() {
                    let size = window.inner_size();
                    (f64::from(size.width) * 0.5, f64::from(size.height) * 0.5)
                } else {
                    (0.0, 0.0)
                };
                if let Some(gpu) = self.gpu.as_mut() {
                    gpu.zoom_canvas_about_viewport_point(zoom_factor, anchor_x, anchor_y);
                }
                self.request_redraw(RedrawReasons::VIEW_CHANGED);
            }
            WindowEvent::Resized(new_size) => {
                let scale_factor = self
                    .window
                    .as_ref()
                    .map_or(1.0, |window| window.scale_factor());
                if let Some(gpu) = self.gpu.as_mut() {
                    gpu.resize(new_size, scale_factor);
                }
                self.request_redraw(RedrawReasons::RESIZED);
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                if let (Some(gpu), Some(window)) = (self.gpu.as_mut(), self.window.as_ref()) {
                    gpu.resize(window.inner_size(), scale_factor);
                }
                self.request_redraw(RedrawReasons::RESIZED);
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }
}

/// `RUST_LOG` wins over the configured level; `--log-level` wins over both.
fn init_logging(cli: &Cli, config: &ViewerConfig) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.log_level.as_str()),
    );
    if let Some(level) = &cli.log_level {
        builder.parse_filters(level);
    }
    builder.init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ViewerConfig::load(&cli)?;
    init_logging(&cli, &config);
    log::info!(
        "viewing a {}x{} synthetic image with {} ms tile latency",
        config.image_width,
        config.image_height,
        config.tile_latency_ms
    );

    let event_loop = EventLoop::<ViewerEvent>::with_user_event().build()?;
    let mut app = App::new(cli, config, event_loop.create_proxy());
    event_loop.run_app(&mut app)?;

    match app.startup_error.take() {
        Some(error) => Err(error.context("viewer failed to start")),
        None => Ok(()),
    }
}
