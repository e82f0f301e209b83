use std::ops::{Add, Mul, Sub};

mod tile_coordinate;

pub use tile_coordinate::{EncodedTile, MAX_LAYER, TileCoordinate, TileCoordinateError};

pub const DEFAULT_TILE_SIZE: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Counter-clockwise rotation about the origin.
    pub fn rotate(self, angle_radians: f64) -> Self {
        let (sine, cosine) = angle_radians.sin_cos();
        Self {
            x: self.x * cosine - self.y * sine,
            y: self.x * sine + self.y * cosine,
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point2D {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2D {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point2D {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// Axis-aligned region of the source image in pixel space plus a resolution factor
/// (`mip` = source pixels per rendered pixel).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameView {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub mip: f64,
}

impl FrameView {
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn is_empty(&self) -> bool {
        !(self.x_max > self.x_min && self.y_max > self.y_min)
    }

    /// Intersection with `[0, width] x [0, height]`; keeps the mip.
    pub fn bounded_to(&self, width: u32, height: u32) -> FrameView {
        FrameView {
            x_min: self.x_min.max(0.0),
            x_max: self.x_max.min(f64::from(width)),
            y_min: self.y_min.max(0.0),
            y_max: self.y_max.min(f64::from(height)),
            mip: self.mip,
        }
    }

    /// Axis-aligned bounds of this view rotated counter-clockwise by `angle_radians` about
    /// `origin`; keeps the mip.
    pub fn rotated_bounds(&self, origin: Point2D, angle_radians: f64) -> FrameView {
        let corners = [
            Point2D::new(self.x_min, self.y_min),
            Point2D::new(self.x_max, self.y_min),
            Point2D::new(self.x_min, self.y_max),
            Point2D::new(self.x_max, self.y_max),
        ]
        .map(|corner| origin + (corner - origin).rotate(angle_radians));
        let mut bounds = FrameView {
            x_min: f64::INFINITY,
            x_max: f64::NEG_INFINITY,
            y_min: f64::INFINITY,
            y_max: f64::NEG_INFINITY,
            mip: self.mip,
        };
        for corner in corners {
            bounds.x_min = bounds.x_min.min(corner.x);
            bounds.x_max = bounds.x_max.max(corner.x);
            bounds.y_min = bounds.y_min.min(corner.y);
            bounds.y_max = bounds.y_max.max(corner.y);
        }
        bounds
    }
}

/// How a secondary image's pixel grid maps onto a reference image's grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialTransform {
    pub translation: Point2D,
    pub origin: Point2D,
    pub rotation: f64,
    pub scale: f64,
}

impl Default for SpatialTransform {
    fn default() -> Self {
        Self {
            translation: Point2D::default(),
            origin: Point2D::default(),
            rotation: 0.0,
            scale: 1.0,
        }
    }
}

/// Pixel rectangle in source-image space, half-open on the max edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl PixelRect {
    pub fn width(&self) -> u32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> u32 {
        self.y_max - self.y_min
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ImageLayoutError {
    #[error("image size must be positive, got {width}x{height}")]
    EmptyImage { width: u32, height: u32 },
    #[error("tile size must be positive")]
    ZeroTileSize,
    #[error("image needs {required} mip layers, only {max} are addressable", max = MAX_LAYER)]
    TooManyLayers { required: u32 },
    #[error("a layer-0 tile of {tile_size} px at mip 2^{max_layer} overflows u32 pixel coordinates")]
    FootprintOverflow { tile_size: u32, max_layer: u32 },
}

/// Mip pyramid layout of one image.
///
/// Layer `max_layer` is full resolution; layer 0 fits the whole image in a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    width: u32,
    height: u32,
    tile_size: u32,
    max_layer: u32,
}

impl ImageLayout {
    pub fn new(width: u32, height: u32, tile_size: u32) -> Result<Self, ImageLayoutError> {
        if width == 0 || height == 0 {
            return Err(ImageLayoutError::EmptyImage { width, height });
        }
        if tile_size == 0 {
            return Err(ImageLayoutError::ZeroTileSize);
        }
        let full_tiles = width.div_ceil(tile_size).max(height.div_ceil(tile_size));
        let max_layer = full_tiles
            .checked_next_power_of_two()
            .map_or(u32::BITS, u32::trailing_zeros);
        if max_layer > MAX_LAYER {
            return Err(ImageLayoutError::TooManyLayers {
                required: max_layer,
            });
        }
        if tile_size.checked_mul(1 << max_layer).is_none() {
            return Err(ImageLayoutError::FootprintOverflow {
                tile_size,
                max_layer,
            });
        }
        Ok(Self {
            width,
            height,
            tile_size,
            max_layer,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn max_layer(&self) -> u32 {
        self.max_layer
    }

    /// Source pixels per texel at `layer`. Layers above `max_layer` clamp to full resolution.
    pub fn layer_to_mip(&self, layer: u32) -> u32 {
        1 << self.max_layer.saturating_sub(layer)
    }

    /// Layer whose resolution is closest to `mip` in log space, clamped to `[0, max_layer]`.
    pub fn mip_to_layer(&self, mip: f64) -> u32 {
        if !mip.is_finite() || mip <= 1.0 {
            return self.max_layer;
        }
        let steps = mip.log2().round();
        if steps >= f64::from(self.max_layer) {
            return 0;
        }
        self.max_layer - steps as u32
    }

    /// Size of the tile grid at `layer`, counting partially filled edge tiles.
    pub fn tiles_at_layer(&self, layer: u32) -> (u32, u32) {
        let footprint = self.tile_footprint(layer);
        (
            self.width.div_ceil(footprint),
            self.height.div_ceil(footprint),
        )
    }

    /// Source pixels covered by one tile edge at `layer`.
    pub fn tile_footprint(&self, layer: u32) -> u32 {
        self.tile_size
            .checked_mul(self.layer_to_mip(layer))
            .expect("root footprint checked in ImageLayout::new")
    }

    pub fn contains(&self, tile: TileCoordinate) -> bool {
        if tile.layer() > self.max_layer {
            return false;
        }
        let (tiles_x, tiles_y) = self.tiles_at_layer(tile.layer());
        tile.x() < tiles_x && tile.y() < tiles_y
    }

    /// Source pixels covered by `tile`, clipped to the image. `None` for tiles outside the image.
    pub fn tile_pixel_rect(&self, tile: TileCoordinate) -> Option<PixelRect> {
        if !self.contains(tile) {
            return None;
        }
        let footprint = self.tile_footprint(tile.layer());
        let x_min = tile.x() * footprint;
        let y_min = tile.y() * footprint;
        Some(PixelRect {
            x_min,
            y_min,
            x_max: x_min.saturating_add(footprint).min(self.width),
            y_max: y_min.saturating_add(footprint).min(self.height),
        })
    }

    /// Decoded sample dimensions of `tile`; edge tiles are narrower than `tile_size`.
    pub fn tile_texel_size(&self, tile: TileCoordinate) -> Option<(u32, u32)> {
        let rect = self.tile_pixel_rect(tile)?;
        let mip = self.layer_to_mip(tile.layer());
        Some((rect.width().div_ceil(mip), rect.height().div_ceil(mip)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_of_square_power_of_two_image() {
        let layout = ImageLayout::new(4096, 4096, 256).expect("layout");
        assert_eq!(layout.max_layer(), 4);
        assert_eq!(layout.layer_to_mip(4), 1);
        assert_eq!(layout.layer_to_mip(0), 16);
        assert_eq!(layout.tiles_at_layer(4), (16, 16));
        assert_eq!(layout.tiles_at_layer(0), (1, 1));
    }

    #[test]
    fn layout_rounds_partial_tiles_up() {
        let layout = ImageLayout::new(1000, 300, 256).expect("layout");
        assert_eq!(layout.max_layer(), 2);
        assert_eq!(layout.tiles_at_layer(2), (4, 2));
        assert_eq!(layout.tiles_at_layer(1), (2, 1));

        let edge = TileCoordinate::new(2, 3, 1).expect("coordinate");
        assert_eq!(
            layout.tile_pixel_rect(edge),
            Some(PixelRect {
                x_min: 768,
                y_min: 256,
                x_max: 1000,
                y_max: 300,
            })
        );
        assert_eq!(layout.tile_texel_size(edge), Some((232, 44)));

        let coarse = TileCoordinate::new(1, 1, 0).expect("coordinate");
        assert_eq!(layout.tile_texel_size(coarse), Some((244, 150)));
    }

    #[test]
    fn tile_outside_image_has_no_rect() {
        let layout = ImageLayout::new(1000, 300, 256).expect("layout");
        let outside = TileCoordinate::new(2, 1, 3).expect("coordinate");
        assert!(!layout.contains(outside));
        assert_eq!(layout.tile_pixel_rect(outside), None);
    }

    #[test]
    fn mip_to_layer_clamps_both_ends() {
        let layout = ImageLayout::new(4096, 4096, 256).expect("layout");
        assert_eq!(layout.mip_to_layer(0.25), 4);
        assert_eq!(layout.mip_to_layer(1.0), 4);
        assert_eq!(layout.mip_to_layer(2.0), 3);
        assert_eq!(layout.mip_to_layer(8.0), 1);
        assert_eq!(layout.mip_to_layer(64.0), 0);
        assert_eq!(layout.mip_to_layer(f64::NAN), 4);
    }

    #[test]
    fn single_tile_image_has_one_layer() {
        let layout = ImageLayout::new(200, 100, 256).expect("layout");
        assert_eq!(layout.max_layer(), 0);
        assert_eq!(layout.layer_to_mip(0), 1);
        assert_eq!(layout.tiles_at_layer(0), (1, 1));
    }

    #[test]
    fn rejects_degenerate_layouts() {
        assert_eq!(
            ImageLayout::new(0, 10, 256),
            Err(ImageLayoutError::EmptyImage {
                width: 0,
                height: 10
            })
        );
        assert_eq!(
            ImageLayout::new(10, 10, 0),
            Err(ImageLayoutError::ZeroTileSize)
        );
        assert_eq!(
            ImageLayout::new(u32::MAX, 16, 16),
            Err(ImageLayoutError::TooManyLayers { required: 28 })
        );
    }

    #[test]
    fn extreme_sizes_are_errors_not_panics() {
        assert_eq!(
            ImageLayout::new(u32::MAX, 1, 1),
            Err(ImageLayoutError::TooManyLayers { required: 32 })
        );
        assert_eq!(
            ImageLayout::new(3_000_000_000, 10, 1 << 20),
            Err(ImageLayoutError::FootprintOverflow {
                tile_size: 1 << 20,
                max_layer: 12
            })
        );

        let wide = ImageLayout::new(2_000_000_000, 10, 1 << 19).expect("layout");
        assert_eq!(wide.max_layer(), 12);
        assert_eq!(wide.tile_footprint(0), 1 << 31);
        assert_eq!(wide.tiles_at_layer(0), (1, 1));
    }

    #[test]
    fn bounded_view_clips_to_image() {
        let view = FrameView {
            x_min: -100.0,
            x_max: 500.0,
            y_min: 20.0,
            y_max: 900.0,
            mip: 2.0,
        };
        let bounded = view.bounded_to(400, 600);
        assert_eq!(bounded.x_min, 0.0);
        assert_eq!(bounded.x_max, 400.0);
        assert_eq!(bounded.y_min, 20.0);
        assert_eq!(bounded.y_max, 600.0);
        assert_eq!(bounded.mip, 2.0);
        assert!(!bounded.is_empty());
    }

    #[test]
    fn rotated_bounds_cover_every_corner() {
        let view = FrameView {
            x_min: 0.0,
            x_max: 200.0,
            y_min: 0.0,
            y_max: 100.0,
            mip: 2.0,
        };
        let origin = Point2D::new(100.0, 50.0);

        let quarter = view.rotated_bounds(origin, std::f64::consts::FRAC_PI_2);
        assert!((quarter.x_min - 50.0).abs() < 1e-9);
        assert!((quarter.x_max - 150.0).abs() < 1e-9);
        assert!((quarter.y_min + 50.0).abs() < 1e-9);
        assert!((quarter.y_max - 150.0).abs() < 1e-9);
        assert_eq!(quarter.mip, 2.0);

        let eighth = view.rotated_bounds(origin, std::f64::consts::FRAC_PI_4);
        assert!(eighth.width() > view.width());
        assert!(eighth.height() > view.height());
        assert_eq!(view.rotated_bounds(origin, 0.0), view);
    }

    #[test]
    fn rotate_quarter_turn() {
        let rotated = Point2D::new(1.0, 0.0).rotate(std::f64::consts::FRAC_PI_2);
        assert!(rotated.x.abs() < 1e-12);
        assert!((rotated.y - 1.0).abs() < 1e-12);
    }
}
