//! Tile coordinate encoding scheme.
//!
//! A tile is addressed by `(layer, x, y)` where layer 0 is the coarsest mip level
//! and every layer doubles the grid along both axes. The encoded form is a plain
//! integer used as a map key by caches and the GPU slot table; it never owns anything.

use static_assertions::const_assert;

const X_BITS: u32 = 12;
const Y_BITS: u32 = 12;
const LAYER_BITS: u32 = 8;

const X_SHIFT: u32 = 0;
const Y_SHIFT: u32 = X_BITS;
const LAYER_SHIFT: u32 = X_BITS + Y_BITS;

const X_MASK: u32 = (1 << X_BITS) - 1;
const Y_MASK: u32 = (1 << Y_BITS) - 1;
const LAYER_MASK: u32 = (1 << LAYER_BITS) - 1;

/// Deepest layer whose grid still fits the x/y bit ranges.
pub const MAX_LAYER: u32 = 12;

const_assert!(X_BITS + Y_BITS + LAYER_BITS <= u32::BITS);
const_assert!(MAX_LAYER <= X_BITS && MAX_LAYER <= Y_BITS);
const_assert!(MAX_LAYER <= LAYER_MASK);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TileCoordinateError {
    #[error("tile layer {layer} exceeds maximum supported layer {max}", max = MAX_LAYER)]
    LayerOutOfRange { layer: u32 },
    #[error("tile ({x}, {y}) lies outside the {span}x{span} grid of layer {layer}")]
    PositionOutOfRange { layer: u32, x: u32, y: u32, span: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoordinate {
    layer: u32,
    x: u32,
    y: u32,
}

/// EncodedTile:
/// | unused (0) | layer (8) | y (12) | x (12) |
/// 31            31      24 23   12 11     0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EncodedTile(u32);

impl TileCoordinate {
    pub fn new(layer: u32, x: u32, y: u32) -> Result<Self, TileCoordinateError> {
        if layer > MAX_LAYER {
            return Err(TileCoordinateError::LayerOutOfRange { layer });
        }
        let span = 1u32 << layer;
        if x >= span || y >= span {
            return Err(TileCoordinateError::PositionOutOfRange { layer, x, y, span });
        }
        Ok(Self { layer, x, y })
    }

    /// The single layer-0 tile that covers the whole image.
    pub const fn root() -> Self {
        Self {
            layer: 0,
            x: 0,
            y: 0,
        }
    }

    pub fn layer(&self) -> u32 {
        self.layer
    }

    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    pub fn encode(self) -> EncodedTile {
        EncodedTile(
            (self.layer & LAYER_MASK) << LAYER_SHIFT
                | (self.y & Y_MASK) << Y_SHIFT
                | (self.x & X_MASK) << X_SHIFT,
        )
    }

    /// Coarser tile whose footprint contains this one.
    pub fn parent(&self) -> Option<TileCoordinate> {
        if self.layer == 0 {
            return None;
        }
        Some(Self {
            layer: self.layer - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// The four finer tiles covering this tile's footprint, or `None` at `MAX_LAYER`.
    pub fn children(&self) -> Option<[TileCoordinate; 4]> {
        if self.layer >= MAX_LAYER {
            return None;
        }
        let layer = self.layer + 1;
        let x = self.x * 2;
        let y = self.y * 2;
        Some([
            Self { layer, x, y },
            Self { layer, x: x + 1, y },
            Self { layer, x, y: y + 1 },
            Self {
                layer,
                x: x + 1,
                y: y + 1,
            },
        ])
    }
}

impl EncodedTile {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub fn decode(self) -> Result<TileCoordinate, TileCoordinateError> {
        let layer = (self.0 >> LAYER_SHIFT) & LAYER_MASK;
        let y = (self.0 >> Y_SHIFT) & Y_MASK;
        let x = (self.0 >> X_SHIFT) & X_MASK;
        TileCoordinate::new(layer, x, y)
    }
}

impl From<TileCoordinate> for EncodedTile {
    fn from(value: TileCoordinate) -> Self {
        value.encode()
    }
}

impl TryFrom<EncodedTile> for TileCoordinate {
    type Error = TileCoordinateError;

    fn try_from(value: EncodedTile) -> Result<Self, Self::Error> {
        value.decode()
    }
}
