use model::EncodedTile;

/// Identity of one tile of one image plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRequest {
    pub image_id: u32,
    pub channel: u32,
    pub polarization: u32,
    pub tile: EncodedTile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TileDataError {
    #[error("tile buffer holds {actual} samples, {width}x{height} needs {expected}")]
    ShapeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// A decoded tile.
///
/// The pixel buffer is owned until the GPU upload takes it; afterwards the tile only
/// carries its identity and dimensions, so at most one host copy of the pixels exists.
#[derive(Debug)]
pub struct RasterTile {
    request: TileRequest,
    width: u32,
    height: u32,
    pixels: Option<Box<[f32]>>,
}

impl RasterTile {
    pub fn new(
        request: TileRequest,
        width: u32,
        height: u32,
        pixels: Vec<f32>,
    ) -> Result<Self, TileDataError> {
        let expected = sample_count(width, height);
        if pixels.len() != expected {
            return Err(TileDataError::ShapeMismatch {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            request,
            width,
            height,
            pixels: Some(pixels.into_boxed_slice()),
        })
    }

    /// A tile whose pixels already live on the GPU.
    pub(crate) fn resident(request: TileRequest, width: u32, height: u32) -> Self {
        Self {
            request,
            width,
            height,
            pixels: None,
        }
    }

    pub fn request(&self) -> TileRequest {
        self.request
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn has_pixels(&self) -> bool {
        self.pixels.is_some()
    }

    pub fn pixels(&self) -> Option<&[f32]> {
        self.pixels.as_deref()
    }

    pub(crate) fn take_pixels(&mut self) -> Option<Box<[f32]>> {
        self.pixels.take()
    }
}

pub(crate) fn sample_count(width: u32, height: u32) -> usize {
    usize::try_from(u64::from(width) * u64::from(height)).expect("tile sample count exceeds usize")
}
