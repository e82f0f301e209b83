use crossbeam_channel::Receiver;

use crate::{
    AtlasError, RasterTile, SlotAddress, TileAtlasLayout, TileAvailable, TileRequest,
    TileSlotTable, TileStore,
};

/// Destination of tile pixel uploads.
///
/// Implemented by the GPU atlas; tests substitute a recording sink.
pub trait TileTextureSink {
    fn write_tile(&mut self, address: SlotAddress, width: u32, height: u32, pixels: &[f32]);
}

/// Where a resident tile's texels live inside the atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileTextureParameters {
    pub atlas_layer: u32,
    pub texel_origin: [u32; 2],
    pub texel_size: [u32; 2],
}

/// Counters for the current pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    pub resident_hits: u32,
    pub store_hits: u32,
    pub misses: u32,
    pub uploads: u32,
    pub upload_failures: u32,
}

pub struct TileResourceManager<S> {
    store: Box<dyn TileStore>,
    sink: S,
    slots: TileSlotTable,
    stats: ManagerStats,
}

impl<S: TileTextureSink> TileResourceManager<S> {
    pub fn new(store: Box<dyn TileStore>, sink: S, layout: TileAtlasLayout) -> Self {
        Self {
            store,
            sink,
            slots: TileSlotTable::new(layout),
            stats: ManagerStats::default(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn stats(&self) -> ManagerStats {
        self.stats
    }

    pub fn resident_count(&self) -> usize {
        self.slots.resident_count()
    }

    pub fn subscribe(&self) -> Receiver<TileAvailable> {
        self.store.subscribe()
    }

    /// Starts a render pass. Tiles returned from now on stay resident until the next call.
    pub fn begin_pass(&mut self) {
        self.slots.begin_pass();
        self.stats = ManagerStats::default();
    }

    /// Looks a tile up, GPU-resident tiles first, then the store.
    ///
    /// A resident tile comes back without pixels; a tile from the store carries them and
    /// must go through `upload_tile_to_gpu` before it can be drawn.
    pub fn get_tile(&mut self, request: TileRequest, peek: bool) -> Option<RasterTile> {
        if let Some(slot) = self.slots.lookup(&request) {
            self.stats.resident_hits += 1;
            return Some(RasterTile::resident(request, slot.width, slot.height));
        }
        match self.store.get_tile(request, peek) {
            Some(tile) => {
                self.stats.store_hits += 1;
                Some(tile)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Moves the tile's pixels into an atlas cell and releases the host copy.
    ///
    /// Uploading a tile that no longer holds pixels is a no-op. On failure the tile keeps its
    /// pixels and the caller treats it as not loaded.
    pub fn upload_tile_to_gpu(&mut self, tile: &mut RasterTile) -> Result<(), AtlasError> {
        if !tile.has_pixels() {
            return Ok(());
        }
        let slot = match self.slots.allocate(tile.request(), tile.width(), tile.height()) {
            Ok(slot) => slot,
            Err(error) => {
                self.stats.upload_failures += 1;
                log::warn!(
                    "tile {:?} of image {} not uploaded: {error}",
                    tile.request().tile,
                    tile.request().image_id
                );
                return Err(error);
            }
        };
        let pixels = tile
            .take_pixels()
            .expect("tile pixels checked before allocation");
        self.sink
            .write_tile(slot.address, slot.width, slot.height, &pixels);
        self.stats.uploads += 1;
        Ok(())
    }

    pub fn get_tile_texture_parameters(&self, tile: &RasterTile) -> Option<TileTextureParameters> {
        let slot = self.slots.get(&tile.request())?;
        Some(TileTextureParameters {
            atlas_layer: slot.address.atlas_layer,
            texel_origin: self.slots.layout().texel_origin(slot.address),
            texel_size: [slot.width, slot.height],
        })
    }

    pub fn evict(&mut self, request: &TileRequest) -> bool {
        self.slots.evict(request)
    }

    /// Drops every resident tile of `image_id`, e.g. when the image is closed.
    pub fn evict_image(&mut self, image_id: u32) -> usize {
        let evicted = self
            .slots
            .evict_where(|request| request.image_id == image_id);
        if evicted > 0 {
            log::debug!("evicted {evicted} tiles of closed image {image_id}");
        }
        evicted
    }
}
