//! A `TileStore` backed by a procedural image.
//!
//! Tiles are produced on worker threads after a configurable delay, standing in for a remote
//! data service. Finished tiles are cached and announced through the availability hub.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use model::{FrameView, ImageLayout, ImageLayoutError, TileCoordinate};
use tiles::{RasterTile, TileAvailabilityHub, TileAvailable, TileRequest, TileStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticImage {
    pub image_id: u32,
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    pub workers: usize,
    pub latency: Duration,
    pub cache_tiles: usize,
}

#[derive(Default)]
struct TileCache {
    tiles: HashMap<TileRequest, (u32, u32, Arc<[f32]>)>,
    order: VecDeque<TileRequest>,
    in_flight: HashSet<TileRequest>,
}

impl TileCache {
    fn insert(&mut self, request: TileRequest, width: u32, height: u32, pixels: Arc<[f32]>, limit: usize) {
        self.in_flight.remove(&request);
        if self.tiles.insert(request, (width, height, pixels)).is_none() && !is_root(&request) {
            self.order.push_back(request);
        }
        while self.tiles.len() > limit.max(1) {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.tiles.remove(&oldest);
        }
    }
}

/// Root tiles never leave the cache.
fn is_root(request: &TileRequest) -> bool {
    request.tile == TileCoordinate::root().encode()
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Layout(#[from] ImageLayoutError),
    #[error("failed to spawn tile fetch worker: {0}")]
    Spawn(#[from] std::io::Error),
}

pub struct SyntheticTileStore {
    image: SyntheticImage,
    layout: ImageLayout,
    cache: Arc<Mutex<TileCache>>,
    hub: TileAvailabilityHub,
    jobs: Option<Sender<TileRequest>>,
    workers: Vec<JoinHandle<()>>,
}

impl SyntheticTileStore {
    pub fn start(image: SyntheticImage, settings: StoreSettings) -> Result<Self, StoreError> {
        let layout = ImageLayout::new(image.width, image.height, image.tile_size)?;
        let cache = Arc::new(Mutex::new(TileCache::default()));
        let hub = TileAvailabilityHub::new();
        let (jobs, job_receiver) = crossbeam_channel::unbounded::<TileRequest>();

        let workers = (0..settings.workers.max(1))
            .map(|index| {
                let job_receiver = job_receiver.clone();
                let cache = Arc::clone(&cache);
                let hub = hub.clone();
                std::thread::Builder::new()
                    .name(format!("tile-fetch-{index}"))
                    .spawn(move || {
                        fetch_worker(image, layout, settings, job_receiver, cache, hub);
                    })
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        log::info!(
            "synthetic image {} is {}x{} px, {} layers of {} px tiles",
            image.image_id,
            image.width,
            image.height,
            layout.max_layer() + 1,
            image.tile_size
        );
        Ok(Self {
            image,
            layout,
            cache,
            hub,
            jobs: Some(jobs),
            workers,
        })
    }

    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    pub fn cached_tiles(&self) -> usize {
        lock(&self.cache).tiles.len()
    }

    fn accepts(&self, request: &TileRequest) -> Option<TileCoordinate> {
        if request.image_id != self.image.image_id || request.channel != 0 || request.polarization != 0
        {
            return None;
        }
        let coordinate = request.tile.decode().ok()?;
        self.layout.contains(coordinate).then_some(coordinate)
    }
}

impl TileStore for SyntheticTileStore {
    fn get_tile(&mut self, request: TileRequest, peek: bool) -> Option<RasterTile> {
        let mut cache = lock(&self.cache);
        if let Some((width, height, pixels)) = cache.tiles.get(&request) {
            return match RasterTile::new(request, *width, *height, pixels.to_vec()) {
                Ok(tile) => Some(tile),
                Err(error) => {
                    log::warn!("cached tile {:?} is malformed: {error}", request.tile);
                    None
                }
            };
        }
        if peek || cache.in_flight.contains(&request) || self.accepts(&request).is_none() {
            return None;
        }
        let jobs = self.jobs.as_ref()?;
        if jobs.send(request).is_ok() {
            cache.in_flight.insert(request);
        }
        None
    }

    fn subscribe(&self) -> Receiver<TileAvailable> {
        self.hub.subscribe()
    }
}

impl Drop for SyntheticTileStore {
    fn drop(&mut self) {
        self.jobs.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("tile fetch worker panicked");
            }
        }
    }
}

fn fetch_worker(
    image: SyntheticImage,
    layout: ImageLayout,
    settings: StoreSettings,
    jobs: Receiver<TileRequest>,
    cache: Arc<Mutex<TileCache>>,
    hub: TileAvailabilityHub,
) {
    for request in jobs.iter() {
        if !settings.latency.is_zero() {
            std::thread::sleep(settings.latency);
        }
        let Some((width, height, pixels)) = request
            .tile
            .decode()
            .ok()
            .and_then(|coordinate| render_tile(&image, &layout, coordinate))
        else {
            lock(&cache).in_flight.remove(&request);
            continue;
        };
        lock(&cache).insert(request, width, height, pixels.into(), settings.cache_tiles);
        log::trace!("tile {:?} of image {} ready", request.tile, image.image_id);
        hub.publish(TileAvailable { request });
    }
}

/// Samples one tile: texel `(i, j)` takes the value at the centre of its `mip x mip` block.
pub fn render_tile(
    image: &SyntheticImage,
    layout: &ImageLayout,
    coordinate: TileCoordinate,
) -> Option<(u32, u32, Vec<f32>)> {
    let rect = layout.tile_pixel_rect(coordinate)?;
    let (width, height) = layout.tile_texel_size(coordinate)?;
    let mip = f64::from(layout.layer_to_mip(coordinate.layer()));
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for j in 0..height {
        let y = f64::from(rect.y_min) + (f64::from(j) + 0.5) * mip;
        for i in 0..width {
            let x = f64::from(rect.x_min) + (f64::from(i) + 0.5) * mip;
            pixels.push(sample_value(image, x, y, 0.0));
        }
    }
    Some((width, height, pixels))
}

/// Full-frame samples of `view` for animation playback, one per `view.mip` block.
pub fn render_view(image: &SyntheticImage, view: &FrameView, phase: f64) -> Arc<[f32]> {
    let (width, height) = view::animation_texture_size(view);
    let mip = view.mip.max(1.0);
    let mut pixels = Vec::with_capacity(width as usize * height as usize);
    for j in 0..height {
        let y = view.y_min + (f64::from(j) + 0.5) * mip;
        for i in 0..width {
            let x = view.x_min + (f64::from(i) + 0.5) * mip;
            let inside = x >= 0.0
                && y >= 0.0
                && x < f64::from(image.width)
                && y < f64::from(image.height);
            pixels.push(if inside {
                sample_value(image, x, y, phase)
            } else {
                f32::NAN
            });
        }
    }
    pixels.into()
}

/// Concentric ripples over a diagonal ramp, with a blanked (NaN) disc near one corner.
pub fn sample_value(image: &SyntheticImage, x: f64, y: f64, phase: f64) -> f32 {
    let width = f64::from(image.width);
    let height = f64::from(image.height);
    let scale = width.min(height);
    let blank = ((x - width * 0.8).powi(2) + (y - height * 0.8).powi(2)).sqrt();
    if blank < scale * 0.05 {
        return f32::NAN;
    }
    let radius = ((x - width * 0.5).powi(2) + (y - height * 0.5).powi(2)).sqrt();
    let ripple = (radius / (scale * 0.01) - phase).sin();
    let ramp = (x / width + y / height) * 0.5;
    (0.5 + 0.25 * ripple + 0.25 * (ramp * 2.0 - 1.0)) as f32
}

fn lock(cache: &Mutex<TileCache>) -> MutexGuard<'_, TileCache> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}
