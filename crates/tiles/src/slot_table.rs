use std::collections::HashMap;

use bitvec::prelude::{BitVec, Lsb0};
use model::TileCoordinate;

use crate::{AtlasError, TileRequest};

/// Position of one atlas cell: array layer plus row-major index within that layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotAddress {
    pub atlas_layer: u32,
    pub tile_index: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileAtlasLayout {
    tile_size: u32,
    tiles_per_row: u32,
    tiles_per_column: u32,
    layers: u32,
    atlas_width: u32,
    atlas_height: u32,
}

impl TileAtlasLayout {
    pub fn new(
        tile_size: u32,
        tiles_per_row: u32,
        tiles_per_column: u32,
        layers: u32,
    ) -> Result<Self, AtlasError> {
        if tile_size == 0 || tiles_per_row == 0 || tiles_per_column == 0 || layers == 0 {
            return Err(AtlasError::EmptyGrid);
        }
        let slots_per_layer = tiles_per_row
            .checked_mul(tiles_per_column)
            .ok_or(AtlasError::GridTooLarge)?;
        let _max_tile_index: u16 = (slots_per_layer - 1)
            .try_into()
            .map_err(|_| AtlasError::GridTooLarge)?;
        let atlas_width = tiles_per_row
            .checked_mul(tile_size)
            .ok_or(AtlasError::GridTooLarge)?;
        let atlas_height = tiles_per_column
            .checked_mul(tile_size)
            .ok_or(AtlasError::GridTooLarge)?;
        Ok(Self {
            tile_size,
            tiles_per_row,
            tiles_per_column,
            layers,
            atlas_width,
            atlas_height,
        })
    }

    /// Square grid of `tiles_per_row x tiles_per_row` cells per layer.
    pub fn square(tile_size: u32, tiles_per_row: u32, layers: u32) -> Result<Self, AtlasError> {
        Self::new(tile_size, tiles_per_row, tiles_per_row, layers)
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn layers(&self) -> u32 {
        self.layers
    }

    pub fn atlas_width(&self) -> u32 {
        self.atlas_width
    }

    pub fn atlas_height(&self) -> u32 {
        self.atlas_height
    }

    pub fn slots_per_layer(&self) -> u32 {
        self.tiles_per_row * self.tiles_per_column
    }

    pub fn capacity(&self) -> usize {
        self.slots_per_layer() as usize * self.layers as usize
    }

    fn address_of(&self, slot: usize) -> SlotAddress {
        let per_layer = self.slots_per_layer() as usize;
        SlotAddress {
            atlas_layer: u32::try_from(slot / per_layer).expect("slot layer fits u32"),
            tile_index: u16::try_from(slot % per_layer).expect("slot index validated at layout"),
        }
    }

    /// Top-left texel of `address` within its array layer.
    pub fn texel_origin(&self, address: SlotAddress) -> [u32; 2] {
        let index = u32::from(address.tile_index);
        [
            (index % self.tiles_per_row) * self.tile_size,
            (index / self.tiles_per_row) * self.tile_size,
        ]
    }
}

/// A tile's cell plus the part of it the tile's texels occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResidentSlot {
    pub address: SlotAddress,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy)]
struct SlotEntry {
    request: TileRequest,
    width: u32,
    height: u32,
    last_used_pass: u64,
}

/// Eviction-aware map from tile requests to atlas cells.
///
/// Cells touched during the current pass are pinned; when the atlas is full, allocation
/// evicts the least recently used unpinned cell. Root tiles are only removed explicitly.
#[derive(Debug)]
pub struct TileSlotTable {
    layout: TileAtlasLayout,
    occupied: BitVec<usize, Lsb0>,
    entries: Vec<Option<SlotEntry>>,
    by_request: HashMap<TileRequest, usize>,
    current_pass: u64,
}

impl TileSlotTable {
    pub fn new(layout: TileAtlasLayout) -> Self {
        let capacity = layout.capacity();
        Self {
            layout,
            occupied: BitVec::repeat(false, capacity),
            entries: vec![None; capacity],
            by_request: HashMap::new(),
            current_pass: 0,
        }
    }

    pub fn layout(&self) -> &TileAtlasLayout {
        &self.layout
    }

    pub fn begin_pass(&mut self) {
        self.current_pass += 1;
    }

    pub fn current_pass(&self) -> u64 {
        self.current_pass
    }

    pub fn resident_count(&self) -> usize {
        self.by_request.len()
    }

    pub fn contains(&self, request: &TileRequest) -> bool {
        self.by_request.contains_key(request)
    }

    /// Cell holding `request`, without pinning it.
    pub fn get(&self, request: &TileRequest) -> Option<ResidentSlot> {
        let slot = *self.by_request.get(request)?;
        let entry = self.entries[slot]
            .as_ref()
            .expect("request map points at an occupied slot");
        Some(ResidentSlot {
            address: self.layout.address_of(slot),
            width: entry.width,
            height: entry.height,
        })
    }

    /// Finds the cell holding `request` and pins it for the current pass.
    pub fn lookup(&mut self, request: &TileRequest) -> Option<ResidentSlot> {
        let slot = *self.by_request.get(request)?;
        let entry = self.entries[slot]
            .as_mut()
            .expect("request map points at an occupied slot");
        entry.last_used_pass = self.current_pass;
        Some(ResidentSlot {
            address: self.layout.address_of(slot),
            width: entry.width,
            height: entry.height,
        })
    }

    /// Assigns a cell to `request`, evicting the least recently used unpinned tile when full.
    ///
    /// Allocating a request that is already resident returns its existing cell.
    pub fn allocate(
        &mut self,
        request: TileRequest,
        width: u32,
        height: u32,
    ) -> Result<ResidentSlot, AtlasError> {
        let tile_size = self.layout.tile_size;
        if width > tile_size || height > tile_size {
            return Err(AtlasError::TileTooLarge {
                width,
                height,
                tile_size,
            });
        }
        if let Some(&slot) = self.by_request.get(&request) {
            let entry = self.entries[slot]
                .as_mut()
                .expect("request map points at an occupied slot");
            entry.width = width;
            entry.height = height;
            entry.last_used_pass = self.current_pass;
            return Ok(ResidentSlot {
                address: self.layout.address_of(slot),
                width,
                height,
            });
        }

        let slot = match self.occupied.first_zero() {
            Some(slot) => slot,
            None => {
                let victim = self.least_recently_used().ok_or(AtlasError::Exhausted)?;
                let evicted = self.release_slot(victim);
                log::debug!(
                    "evicted tile {:?} of image {} from atlas slot {victim}",
                    evicted.tile,
                    evicted.image_id
                );
                victim
            }
        };

        self.occupied.set(slot, true);
        self.entries[slot] = Some(SlotEntry {
            request,
            width,
            height,
            last_used_pass: self.current_pass,
        });
        self.by_request.insert(request, slot);
        Ok(ResidentSlot {
            address: self.layout.address_of(slot),
            width,
            height,
        })
    }

    pub fn evict(&mut self, request: &TileRequest) -> bool {
        match self.by_request.get(request).copied() {
            Some(slot) => {
                self.release_slot(slot);
                true
            }
            None => false,
        }
    }

    /// Evicts every resident tile matching `predicate`; returns how many were freed.
    pub fn evict_where(&mut self, mut predicate: impl FnMut(&TileRequest) -> bool) -> usize {
        let doomed: Vec<usize> = self
            .by_request
            .iter()
            .filter(|(request, _)| predicate(request))
            .map(|(_, &slot)| slot)
            .collect();
        for &slot in &doomed {
            self.release_slot(slot);
        }
        doomed.len()
    }

    /// Never picks a root tile.
    fn least_recently_used(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| entry.as_ref().map(|entry| (slot, entry)))
            .filter(|(_, entry)| !is_root(&entry.request))
            .map(|(slot, entry)| (slot, entry.last_used_pass))
            .filter(|&(_, last_used_pass)| last_used_pass < self.current_pass)
            .min_by_key(|&(_, last_used_pass)| last_used_pass)
            .map(|(slot, _)| slot)
    }

    fn release_slot(&mut self, slot: usize) -> TileRequest {
        let entry = self.entries[slot]
            .take()
            .expect("released slot must be occupied");
        self.occupied.set(slot, false);
        self.by_request.remove(&entry.request);
        entry.request
    }
}

fn is_root(request: &TileRequest) -> bool {
    request.tile == TileCoordinate::root().encode()
}
