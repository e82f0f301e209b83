//! Tile addressing, tile data ownership, and GPU residency for multi-resolution images.
//!
//! - `tiler`: which tiles cover a view at which mip layer.
//! - `raster_tile`: decoded pixel buffers handed over by a `TileStore`.
//! - `store`: the external tile-store boundary and its availability notifications.
//! - `slot_table`: eviction-aware map from tile requests to atlas cells.
//! - `atlas`: the wgpu texture array those cells live in.
//! - `manager`: the resource manager the render loop talks to.

mod atlas;
mod manager;
mod raster_tile;
mod slot_table;
mod store;
mod tiler;

pub use atlas::{GpuContext, TileAtlasGpu};
pub use manager::{ManagerStats, TileResourceManager, TileTextureParameters, TileTextureSink};
pub use raster_tile::{RasterTile, TileDataError, TileRequest};
pub use slot_table::{ResidentSlot, SlotAddress, TileAtlasLayout, TileSlotTable};
pub use store::{TileAvailabilityHub, TileAvailable, TileStore};
pub use tiler::{RequiredTiles, required_tiles};

pub const DEFAULT_ATLAS_TILES_PER_ROW: u32 = 8;
pub const DEFAULT_ATLAS_LAYERS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AtlasError {
    #[error("tile atlas has no slot that is free or unused in the current pass")]
    Exhausted,
    #[error("tile atlas grid must be at least 1x1 with one layer")]
    EmptyGrid,
    #[error("tile atlas grid exceeds the addressable slot range")]
    GridTooLarge,
    #[error("tile atlas needs {layers} layers, device allows {limit}")]
    LayersExceedDeviceLimit { layers: u32, limit: u32 },
    #[error("tile atlas edge of {size} texels exceeds device limit {limit}")]
    SizeExceedsDeviceLimit { size: u32, limit: u32 },
    #[error("tile of {width}x{height} texels does not fit a {tile_size} texel atlas cell")]
    TileTooLarge {
        width: u32,
        height: u32,
        tile_size: u32,
    },
}

#[cfg(test)]
mod tests;
