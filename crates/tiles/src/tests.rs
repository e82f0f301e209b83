use std::collections::{HashMap, HashSet};

use crossbeam_channel::Receiver;
use model::{ImageLayout, TileCoordinate};

use super::*;

#[derive(Default)]
struct FakeStore {
    cached: HashMap<TileRequest, (u32, u32, f32)>,
    fetch_requests: Vec<TileRequest>,
    hub: TileAvailabilityHub,
}

impl FakeStore {
    fn with_tile(mut self, request: TileRequest, width: u32, height: u32, value: f32) -> Self {
        self.cached.insert(request, (width, height, value));
        self
    }
}

impl TileStore for FakeStore {
    fn get_tile(&mut self, request: TileRequest, peek: bool) -> Option<RasterTile> {
        match self.cached.get(&request) {
            Some(&(width, height, value)) => Some(
                RasterTile::new(request, width, height, vec![value; (width * height) as usize])
                    .expect("fake tile shape"),
            ),
            None => {
                if !peek {
                    self.fetch_requests.push(request);
                }
                None
            }
        }
    }

    fn subscribe(&self) -> Receiver<TileAvailable> {
        self.hub.subscribe()
    }
}

#[derive(Default)]
struct RecordingSink {
    writes: Vec<(SlotAddress, u32, u32, f32)>,
}

impl TileTextureSink for RecordingSink {
    fn write_tile(&mut self, address: SlotAddress, width: u32, height: u32, pixels: &[f32]) {
        assert_eq!(pixels.len(), (width * height) as usize);
        self.writes.push((address, width, height, pixels[0]));
    }
}

fn request(layer: u32, x: u32, y: u32) -> TileRequest {
    TileRequest {
        image_id: 1,
        channel: 0,
        polarization: 0,
        tile: TileCoordinate::new(layer, x, y)
            .expect("coordinate")
            .encode(),
    }
}

fn manager(store: FakeStore, layers: u32) -> TileResourceManager<RecordingSink> {
    TileResourceManager::new(
        Box::new(store),
        RecordingSink::default(),
        TileAtlasLayout::square(4, 1, layers).expect("layout"),
    )
}

#[test]
fn store_tile_uploads_once_and_then_reports_resident() {
    let store = FakeStore::default().with_tile(request(1, 0, 1), 4, 3, 2.5);
    let mut manager = manager(store, 2);
    manager.begin_pass();

    let mut tile = manager.get_tile(request(1, 0, 1), false).expect("store hit");
    assert!(tile.has_pixels());
    manager.upload_tile_to_gpu(&mut tile).expect("upload");
    assert!(!tile.has_pixels());
    manager.upload_tile_to_gpu(&mut tile).expect("second upload is a no-op");

    assert_eq!(manager.sink().writes.len(), 1);
    assert_eq!(
        manager.get_tile_texture_parameters(&tile),
        Some(TileTextureParameters {
            atlas_layer: 0,
            texel_origin: [0, 0],
            texel_size: [4, 3],
        })
    );

    let resident = manager.get_tile(request(1, 0, 1), true).expect("resident hit");
    assert!(!resident.has_pixels());
    assert_eq!(manager.stats().resident_hits, 1);
    assert_eq!(manager.stats().store_hits, 1);
}

#[test]
fn peek_miss_does_not_fetch() {
    let mut manager = manager(FakeStore::default(), 1);
    manager.begin_pass();
    assert!(manager.get_tile(request(2, 1, 1), true).is_none());
    assert!(manager.get_tile(request(2, 1, 2), false).is_none());
    assert_eq!(manager.stats().misses, 2);
}

#[test]
fn exhausted_atlas_keeps_pixels_and_reports_failure() {
    let store = FakeStore::default()
        .with_tile(request(1, 0, 0), 4, 4, 1.0)
        .with_tile(request(1, 1, 0), 4, 4, 2.0);
    let mut manager = manager(store, 1);
    manager.begin_pass();

    let mut first = manager.get_tile(request(1, 0, 0), false).expect("first");
    manager.upload_tile_to_gpu(&mut first).expect("upload first");
    let mut second = manager.get_tile(request(1, 1, 0), false).expect("second");

    assert_eq!(
        manager.upload_tile_to_gpu(&mut second),
        Err(AtlasError::Exhausted)
    );
    assert!(second.has_pixels());
    assert_eq!(manager.get_tile_texture_parameters(&second), None);
    assert_eq!(manager.stats().upload_failures, 1);
    assert!(manager.get_tile_texture_parameters(&first).is_some());
}

#[test]
fn next_pass_may_evict_tiles_of_previous_pass() {
    let store = FakeStore::default()
        .with_tile(request(1, 0, 0), 4, 4, 1.0)
        .with_tile(request(1, 1, 0), 4, 4, 2.0);
    let mut manager = manager(store, 1);
    manager.begin_pass();
    let mut first = manager.get_tile(request(1, 0, 0), false).expect("first");
    manager.upload_tile_to_gpu(&mut first).expect("upload first");

    manager.begin_pass();
    let mut second = manager.get_tile(request(1, 1, 0), false).expect("second");
    manager.upload_tile_to_gpu(&mut second).expect("upload evicts first");

    assert_eq!(manager.resident_count(), 1);
    assert!(manager.get_tile_texture_parameters(&first).is_none());
    let writes = &manager.sink().writes;
    assert_eq!(writes[0].0, writes[1].0);
    assert_eq!(writes[1].3, 2.0);
}

#[test]
fn evict_image_drops_only_that_image() {
    let mut other = request(0, 0, 0);
    other.image_id = 2;
    let store = FakeStore::default()
        .with_tile(request(0, 0, 0), 4, 4, 1.0)
        .with_tile(other, 4, 4, 3.0);
    let mut manager = manager(store, 2);
    manager.begin_pass();
    for wanted in [request(0, 0, 0), other] {
        let mut tile = manager.get_tile(wanted, false).expect("tile");
        manager.upload_tile_to_gpu(&mut tile).expect("upload");
    }

    assert_eq!(manager.evict_image(1), 1);
    assert_eq!(manager.resident_count(), 1);
    assert!(!manager.evict(&request(0, 0, 0)));
    assert!(manager.evict(&other));
}

#[test]
fn subscribe_reaches_store_notifications() {
    let store = FakeStore::default();
    let hub = store.hub.clone();
    let manager = manager(store, 1);
    let receiver = manager.subscribe();

    hub.publish(TileAvailable {
        request: request(0, 0, 0),
    });

    assert_eq!(
        receiver.try_recv().map(|notification| notification.request),
        Ok(request(0, 0, 0))
    );
}

#[test]
fn required_tiles_are_addressable_as_requests() {
    let layout = ImageLayout::new(2048, 1024, 256).expect("layout");
    let view = model::FrameView {
        x_min: 0.0,
        x_max: 2048.0,
        y_min: 0.0,
        y_max: 1024.0,
        mip: 2.0,
    };
    let required = required_tiles(&view, &layout);
    let keys: HashSet<_> = required
        .tiles
        .iter()
        .map(|tile| request(tile.layer(), tile.x(), tile.y()))
        .collect();
    assert_eq!(required.layer, 2);
    assert_eq!(keys.len(), 4 * 2);
}

fn create_gpu_context() -> Option<GpuContext> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok()?;
        let limits = adapter.limits();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("tiles tests"),
                required_features: wgpu::Features::empty(),
                required_limits: limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .ok()?;
        Some(GpuContext::new(device, queue))
    })
}

#[test]
fn gpu_atlas_holds_uploaded_texels() {
    let Some(gpu) = create_gpu_context() else {
        eprintln!("no wgpu adapter available; skipping");
        return;
    };
    let layout = TileAtlasLayout::square(64, 2, 2).expect("layout");
    let atlas = TileAtlasGpu::new(&gpu, layout).expect("atlas");
    let store = FakeStore::default()
        .with_tile(request(1, 0, 0), 64, 64, 1.0)
        .with_tile(request(1, 1, 0), 64, 64, 7.5);
    let mut manager = TileResourceManager::new(Box::new(store), atlas, layout);
    manager.begin_pass();
    for wanted in [request(1, 0, 0), request(1, 1, 0)] {
        let mut tile = manager.get_tile(wanted, false).expect("tile");
        manager.upload_tile_to_gpu(&mut tile).expect("upload");
    }

    let row_bytes = 64 * 2 * 4;
    let readback = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("tiles tests readback"),
        size: u64::from(row_bytes * 64),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = gpu
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("tiles tests readback"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: manager.sink().texture(),
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(row_bytes),
                rows_per_image: Some(64),
            },
        },
        wgpu::Extent3d {
            width: 128,
            height: 64,
            depth_or_array_layers: 1,
        },
    );
    gpu.queue.submit(Some(encoder.finish()));

    let slice = readback.slice(..);
    slice.map_async(wgpu::MapMode::Read, |result| {
        result.expect("map readback");
    });
    gpu.device
        .poll(wgpu::PollType::wait_indefinitely())
        .expect("poll device");
    let data = slice.get_mapped_range();
    let texels: &[f32] = bytemuck::cast_slice(&data);
    assert_eq!(texels[0], 1.0);
    assert_eq!(texels[64], 7.5);
    assert_eq!(texels[127 + 63 * 128], 7.5);
}
