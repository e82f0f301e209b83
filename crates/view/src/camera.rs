use model::{FrameView, Point2D};

use crate::TransformError;

/// Interactive pan/zoom state of one image view.
///
/// `center` is in source-image pixels; `zoom_level` is logical screen pixels per image pixel.
/// Screen coordinates passed in have their origin at the top-left with y pointing down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportCamera {
    center: Point2D,
    zoom_level: f64,
}

impl ViewportCamera {
    pub fn new(center: Point2D, zoom_level: f64) -> Result<Self, TransformError> {
        if !center.is_finite() {
            return Err(TransformError::NonFiniteValue);
        }
        if !zoom_level.is_finite() || zoom_level <= 0.0 {
            return Err(TransformError::InvalidZoom);
        }
        Ok(Self { center, zoom_level })
    }

    /// Centres the image and zooms so it fits inside the render area.
    pub fn fit(
        image_width: u32,
        image_height: u32,
        render_width: f64,
        render_height: f64,
    ) -> Result<Self, TransformError> {
        if image_width == 0 || image_height == 0 {
            return Err(TransformError::InvalidCanvas);
        }
        let zoom_level = (render_width / f64::from(image_width))
            .min(render_height / f64::from(image_height));
        Self::new(
            Point2D::new(f64::from(image_width) / 2.0, f64::from(image_height) / 2.0),
            zoom_level,
        )
    }

    pub fn center(&self) -> Point2D {
        self.center
    }

    pub fn zoom_level(&self) -> f64 {
        self.zoom_level
    }

    pub fn pan_by(&mut self, screen_dx: f64, screen_dy: f64) -> Result<(), TransformError> {
        let dx = checked_mul(screen_dx, self.zoom_level.recip())?;
        let dy = checked_mul(screen_dy, self.zoom_level.recip())?;
        self.center = Point2D::new(
            checked_add(self.center.x, -dx)?,
            checked_add(self.center.y, dy)?,
        );
        Ok(())
    }

    /// Zooms by `zoom_factor` while the image point under `(screen_x, screen_y)` stays put.
    pub fn zoom_about_point(
        &mut self,
        zoom_factor: f64,
        screen_x: f64,
        screen_y: f64,
        render_width: f64,
        render_height: f64,
    ) -> Result<(), TransformError> {
        if !zoom_factor.is_finite() || zoom_factor <= 0.0 {
            return Err(TransformError::InvalidZoom);
        }
        if !screen_x.is_finite() || !screen_y.is_finite() {
            return Err(TransformError::NonFiniteValue);
        }
        let next_zoom = checked_mul(self.zoom_level, zoom_factor)?;
        if next_zoom <= 0.0 {
            return Err(TransformError::InvalidZoom);
        }

        let from_center = Point2D::new(
            screen_x - render_width / 2.0,
            render_height / 2.0 - screen_y,
        );
        let anchor = self.center + from_center * self.zoom_level.recip();
        let next_center = anchor - from_center * next_zoom.recip();
        if !next_center.is_finite() {
            return Err(TransformError::NonFiniteValue);
        }
        self.center = next_center;
        self.zoom_level = next_zoom;
        Ok(())
    }

    /// Image region visible in a `render_width x render_height` logical-pixel area.
    ///
    /// The mip is the power of two closest to the number of image pixels per device pixel,
    /// never below 1.
    pub fn required_view(
        &self,
        render_width: f64,
        render_height: f64,
        device_pixel_ratio: f64,
    ) -> FrameView {
        let half_width = render_width / 2.0 / self.zoom_level;
        let half_height = render_height / 2.0 / self.zoom_level;
        FrameView {
            x_min: self.center.x - half_width,
            x_max: self.center.x + half_width,
            y_min: self.center.y - half_height,
            y_max: self.center.y + half_height,
            mip: mip_for_zoom(self.zoom_level * device_pixel_ratio),
        }
    }
}

fn mip_for_zoom(device_zoom: f64) -> f64 {
    if !device_zoom.is_finite() || device_zoom >= 1.0 {
        return 1.0;
    }
    let steps = device_zoom.recip().log2().round() as i32;
    2f64.powi(steps.max(0))
}

fn checked_add(current: f64, delta: f64) -> Result<f64, TransformError> {
    let next = current + delta;
    if !next.is_finite() {
        return Err(TransformError::NonFiniteValue);
    }
    Ok(next)
}

fn checked_mul(left: f64, right: f64) -> Result<f64, TransformError> {
    let next = left * right;
    if !next.is_finite() {
        return Err(TransformError::NonFiniteValue);
    }
    Ok(next)
}
