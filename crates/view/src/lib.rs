//! Image pixel space to canvas and clip space.
//!
//! Canvas space is measured in device pixels with the origin at the bottom-left corner of
//! the render target and y pointing up, so it maps onto clip space without a flip.

use model::{FrameView, Point2D, SpatialTransform, TileCoordinate};

mod camera;

pub use camera::ViewportCamera;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("zoom level must be finite and positive")]
    InvalidZoom,
    #[error("canvas size must be positive")]
    InvalidCanvas,
    #[error("spatial scale must be finite and positive")]
    InvalidScale,
    #[error("transform input is not finite")]
    NonFiniteValue,
}

/// Rectangle in source-image pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageRect {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

/// Per-tile draw parameters.
///
/// `offset` and `scaling` place the unrotated quad; `rotation_origin`, `rotation_angle` and
/// `scale_adjustment` then apply the spatial registration. `corners` holds the resulting
/// canvas positions in triangle-strip order: bottom-left, bottom-right, top-left, top-right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGeometry {
    pub offset: Point2D,
    pub scaling: f64,
    pub texel_size: [u32; 2],
    pub rotation_origin: Point2D,
    pub rotation_angle: f64,
    pub scale_adjustment: f64,
    pub corners: [Point2D; 4],
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Registration {
    translation: Point2D,
    rotation_origin: Point2D,
    angle: f64,
    scale: f64,
}

/// Mapping for one frame. Built fresh from the current view state every pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTransform {
    view_origin: Point2D,
    zoom: f64,
    canvas_width: f64,
    canvas_height: f64,
    registration: Option<Registration>,
}

impl FrameTransform {
    /// `reference_view` and `zoom` (device pixels per image pixel) come from the image that owns
    /// the canvas; `spatial` maps a registered image onto that reference.
    pub fn new(
        reference_view: &FrameView,
        zoom: f64,
        canvas_width: u32,
        canvas_height: u32,
        spatial: Option<&SpatialTransform>,
    ) -> Result<Self, TransformError> {
        if !zoom.is_finite() || zoom <= 0.0 {
            return Err(TransformError::InvalidZoom);
        }
        if canvas_width == 0 || canvas_height == 0 {
            return Err(TransformError::InvalidCanvas);
        }
        let view_origin = Point2D::new(reference_view.x_min, reference_view.y_min);
        if !view_origin.is_finite() {
            return Err(TransformError::NonFiniteValue);
        }

        let registration = match spatial {
            Some(spatial) => {
                if !spatial.scale.is_finite() || spatial.scale <= 0.0 {
                    return Err(TransformError::InvalidScale);
                }
                if !spatial.translation.is_finite()
                    || !spatial.origin.is_finite()
                    || !spatial.rotation.is_finite()
                {
                    return Err(TransformError::NonFiniteValue);
                }
                Some(Registration {
                    translation: spatial.translation,
                    rotation_origin: (spatial.origin + spatial.translation - view_origin) * zoom,
                    angle: -spatial.rotation,
                    scale: spatial.scale,
                })
            }
            None => None,
        };

        Ok(Self {
            view_origin,
            zoom,
            canvas_width: f64::from(canvas_width),
            canvas_height: f64::from(canvas_height),
            registration,
        })
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn canvas_size(&self) -> (f64, f64) {
        (self.canvas_width, self.canvas_height)
    }

    /// Canvas position of the centre of source pixel `point`.
    pub fn image_to_canvas(&self, point: Point2D) -> Point2D {
        let unrotated = self.unrotated_canvas(point);
        match &self.registration {
            Some(registration) => {
                registration.rotation_origin
                    + (unrotated - registration.rotation_origin).rotate(registration.angle)
                        * registration.scale
            }
            None => unrotated,
        }
    }

    pub fn canvas_to_image(&self, canvas: Point2D) -> Point2D {
        let (unrotated, translation) = match &self.registration {
            Some(registration) => (
                registration.rotation_origin
                    + (canvas - registration.rotation_origin).rotate(-registration.angle)
                        * registration.scale.recip(),
                registration.translation,
            ),
            None => (canvas, Point2D::default()),
        };
        unrotated * self.zoom.recip() - Point2D::new(0.5, 0.5) - translation + self.view_origin
    }

    pub fn canvas_to_clip(&self, canvas: Point2D) -> Point2D {
        Point2D::new(
            canvas.x / self.canvas_width * 2.0 - 1.0,
            canvas.y / self.canvas_height * 2.0 - 1.0,
        )
    }

    /// Canvas rotation origin, rotation angle and scale shared by every tile of the frame.
    /// Identity (`origin`, `0`, `1`) for an unregistered image.
    pub fn registration(&self) -> (Point2D, f64, f64) {
        match &self.registration {
            Some(registration) => (
                registration.rotation_origin,
                registration.angle,
                registration.scale,
            ),
            None => (Point2D::default(), 0.0, 1.0),
        }
    }

    /// Geometry of `tile` drawn at `mip` source pixels per texel, `texel_size` texels large.
    pub fn tile_geometry(
        &self,
        tile: TileCoordinate,
        mip: u32,
        tile_size: u32,
        texel_size: [u32; 2],
    ) -> TileGeometry {
        let mip = f64::from(mip);
        let footprint = mip * f64::from(tile_size);
        let tile_min = Point2D::new(f64::from(tile.x()) * footprint, f64::from(tile.y()) * footprint);
        let extent = Point2D::new(
            f64::from(texel_size[0]) * mip,
            f64::from(texel_size[1]) * mip,
        );
        let corners = [
            tile_min,
            Point2D::new(tile_min.x + extent.x, tile_min.y),
            Point2D::new(tile_min.x, tile_min.y + extent.y),
            tile_min + extent,
        ]
        .map(|corner| self.image_to_canvas(corner));

        let (rotation_origin, rotation_angle, scale_adjustment) = self.registration();

        TileGeometry {
            offset: self.unrotated_canvas(tile_min),
            scaling: mip * self.zoom,
            texel_size,
            rotation_origin,
            rotation_angle,
            scale_adjustment,
            corners,
        }
    }

    /// Source-pixel rectangle a tile geometry was built from.
    pub fn tile_pixel_rect_from_geometry(&self, geometry: &TileGeometry) -> ImageRect {
        let min = self.canvas_to_image(geometry.corners[0]);
        let max = self.canvas_to_image(geometry.corners[3]);
        ImageRect {
            x_min: min.x,
            y_min: min.y,
            x_max: max.x,
            y_max: max.y,
        }
    }

    fn unrotated_canvas(&self, point: Point2D) -> Point2D {
        let translation = self
            .registration
            .as_ref()
            .map_or(Point2D::default(), |registration| registration.translation);
        (point + Point2D::new(0.5, 0.5) + translation - self.view_origin) * self.zoom
    }
}

/// Full-frame texture dimensions for `current`: one texel per `mip` source pixels, rounded up.
pub fn animation_texture_size(current: &FrameView) -> (u32, u32) {
    let mip = current.mip.max(1.0);
    (
        (current.width() / mip).ceil().max(0.0) as u32,
        (current.height() / mip).ceil().max(0.0) as u32,
    )
}

/// Clip-space quad of the full-frame texture, triangle-strip order.
///
/// The texture covers `current` rounded up to whole texels; `full` is the view the canvas
/// spans.
pub fn animation_quad(current: &FrameView, full: &FrameView) -> [Point2D; 4] {
    let mip = current.mip.max(1.0);
    let adjusted_x_max = current.x_min + (current.width() / mip).ceil() * mip;
    let adjusted_y_max = current.y_min + (current.height() / mip).ceil() * mip;
    let to_unit = |x: f64, y: f64| {
        Point2D::new(
            (0.5 + x - full.x_min) / full.width(),
            (0.5 + y - full.y_min) / full.height(),
        )
    };
    let left_top = to_unit(current.x_min, current.y_min);
    let right_bottom = to_unit(adjusted_x_max, adjusted_y_max);
    [
        Point2D::new(left_top.x, left_top.y),
        Point2D::new(right_bottom.x, left_top.y),
        Point2D::new(left_top.x, right_bottom.y),
        Point2D::new(right_bottom.x, right_bottom.y),
    ]
    .map(|unit| Point2D::new(unit.x * 2.0 - 1.0, unit.y * 2.0 - 1.0))
}
