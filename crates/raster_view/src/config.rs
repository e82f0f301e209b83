//! Viewer configuration: defaults, then an optional TOML file, then command-line flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use clap::Parser;
use render_protocol::{NanColor, RenderConfig};
use renderer::{COLOR_MAPS, RendererConfig, color_map_index};
use serde::Deserialize;

#[derive(Debug, Parser)]
#[command(name = "raster_view")]
#[command(about = "Multi-resolution tiled image viewer over a synthetic tile store")]
#[command(version)]
pub struct Cli {
    /// TOML file with viewer settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Width of the synthetic image in pixels
    #[arg(long)]
    pub image_width: Option<u32>,

    /// Height of the synthetic image in pixels
    #[arg(long)]
    pub image_height: Option<u32>,

    /// Simulated latency of one tile fetch
    #[arg(long)]
    pub tile_latency_ms: Option<u64>,

    /// Background threads producing tiles
    #[arg(long)]
    pub fetch_workers: Option<usize>,

    /// Layers searched below a missing tile for higher-resolution placeholders
    #[arg(long)]
    pub placeholder_depth: Option<u32>,

    /// Layers of the GPU tile atlas
    #[arg(long)]
    pub atlas_layers: Option<u32>,

    /// Colour map by name, e.g. `gray` or `viridis`
    #[arg(long)]
    pub color_map: Option<String>,

    /// Log filter, e.g. `debug` or `renderer=trace`; overrides RUST_LOG
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub image_width: u32,
    pub image_height: u32,
    pub tile_size: u32,
    pub tile_latency_ms: u64,
    pub fetch_workers: usize,
    /// Decoded tiles the store keeps in memory.
    pub store_cache_tiles: usize,
    pub placeholder_depth: u32,
    pub atlas_tiles_per_row: u32,
    pub atlas_layers: u32,
    pub window_width: u32,
    pub window_height: u32,
    pub log_level: String,
    pub nan_color: String,
    pub nan_alpha: f32,
    /// Colour map by name; takes precedence over `render.color_map`.
    pub color_map_name: Option<String>,
    pub render: RenderConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let renderer = RendererConfig::default();
        Self {
            image_width: 16384,
            image_height: 12288,
            tile_size: renderer.tile_size,
            tile_latency_ms: 40,
            fetch_workers: 4,
            store_cache_tiles: 1024,
            placeholder_depth: renderer.placeholder_depth,
            atlas_tiles_per_row: renderer.atlas_tiles_per_row,
            atlas_layers: renderer.atlas_layers,
            window_width: 1280,
            window_height: 720,
            log_level: "info".to_owned(),
            nan_color: "#137CBD".to_owned(),
            nan_alpha: 1.0,
            color_map_name: None,
            render: RenderConfig {
                scale_min: 0.0,
                scale_max: 1.0,
                color_map: 1,
                ..RenderConfig::default()
            },
        }
    }
}

impl ViewerConfig {
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(cli);
        config.resolve_color_map()?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse configuration file {}", path.display()))
    }

    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(width) = cli.image_width {
            self.image_width = width;
        }
        if let Some(height) = cli.image_height {
            self.image_height = height;
        }
        if let Some(latency) = cli.tile_latency_ms {
            self.tile_latency_ms = latency;
        }
        if let Some(workers) = cli.fetch_workers {
            self.fetch_workers = workers;
        }
        if let Some(depth) = cli.placeholder_depth {
            self.placeholder_depth = depth;
        }
        if let Some(layers) = cli.atlas_layers {
            self.atlas_layers = layers;
        }
        if let Some(level) = &cli.log_level {
            self.log_level.clone_from(level);
        }
        if let Some(name) = &cli.color_map {
            self.color_map_name = Some(name.clone());
        }
    }

    /// Applies `color_map_name`, if set, to `render.color_map`.
    pub fn resolve_color_map(&mut self) -> Result<()> {
        if let Some(name) = &self.color_map_name {
            self.render.color_map = color_map_index(name).with_context(|| {
                let known: Vec<_> = COLOR_MAPS.iter().map(|map| map.name).collect();
                format!("unknown colour map {name:?}, expected one of {}", known.join(", "))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.image_width > 0 && self.image_height > 0,
            "image size must be positive, got {}x{}",
            self.image_width,
            self.image_height
        );
        ensure!(self.tile_size > 0, "tile size must be positive");
        ensure!(self.fetch_workers > 0, "at least one fetch worker is required");
        ensure!(
            self.atlas_layers > 0 && self.atlas_tiles_per_row > 0,
            "tile atlas must hold at least one tile"
        );
        ensure!(
            self.window_width > 0 && self.window_height > 0,
            "window size must be positive"
        );
        ensure!(
            self.render.scale_max >= self.render.scale_min,
            "render.scale_max must not be below render.scale_min"
        );
        self.initial_nan_color()?;
        Ok(())
    }

    pub fn initial_nan_color(&self) -> Result<NanColor> {
        NanColor::from_hex(&self.nan_color, self.nan_alpha)
            .with_context(|| format!("invalid NaN colour {:?}", self.nan_color))
    }

    pub fn renderer_config(&self) -> RendererConfig {
        RendererConfig {
            tile_size: self.tile_size,
            atlas_tiles_per_row: self.atlas_tiles_per_row,
            atlas_layers: self.atlas_layers,
            placeholder_depth: self.placeholder_depth,
            ..RendererConfig::default()
        }
    }
}
