use model::{FrameView, ImageLayout, TileCoordinate};

/// Tiles covering one view, and the mip they were chosen at.
///
/// `mip` can differ from the view's nominal mip: it is always the exact power of two of
/// `layer`, which for a fully zoomed-out view is the mip of the single layer-0 tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredTiles {
    pub layer: u32,
    pub mip: u32,
    pub tiles: Vec<TileCoordinate>,
}

impl RequiredTiles {
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

/// Every tile at the layer matching `view.mip` that intersects the view clipped to the image.
///
/// Tiles come out row-major. A view that lies fully outside the image yields no tiles.
pub fn required_tiles(view: &FrameView, layout: &ImageLayout) -> RequiredTiles {
    let layer = layout.mip_to_layer(view.mip);
    let mip = layout.layer_to_mip(layer);
    let bounded = view.bounded_to(layout.width(), layout.height());
    if bounded.is_empty() {
        return RequiredTiles {
            layer,
            mip,
            tiles: Vec::new(),
        };
    }
    if layer == 0 {
        return RequiredTiles {
            layer,
            mip,
            tiles: vec![TileCoordinate::root()],
        };
    }

    let footprint = f64::from(layout.tile_footprint(layer));
    let (tiles_x, tiles_y) = layout.tiles_at_layer(layer);
    let x_range = cell_range(bounded.x_min, bounded.x_max, footprint, tiles_x);
    let y_range = cell_range(bounded.y_min, bounded.y_max, footprint, tiles_y);

    let mut tiles = Vec::with_capacity(x_range.len() * y_range.len());
    for y in y_range {
        for x in x_range.clone() {
            tiles.push(TileCoordinate::new(layer, x, y).expect("tile inside layer grid"));
        }
    }
    RequiredTiles { layer, mip, tiles }
}

fn cell_range(min: f64, max: f64, footprint: f64, cells: u32) -> std::ops::Range<u32> {
    let start = (min / footprint).floor().max(0.0) as u32;
    let end = ((max / footprint).ceil() as u32).min(cells);
    start.min(end)..end
}
