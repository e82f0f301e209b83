use std::sync::Arc;

use model::{FrameView, SpatialTransform};
use serde::{Deserialize, Serialize};

/// Per-image render mode decided by the frame-state owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterRenderType {
    #[default]
    None,
    Tiled,
    Animation,
}

/// Intensity scaling applied before colour mapping. Discriminants are the shader's codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum ScalingType {
    #[default]
    Linear = 0,
    Log = 1,
    Sqrt = 2,
    Square = 3,
    Power = 4,
    Gamma = 5,
}

impl ScalingType {
    pub const fn shader_code(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub scale_min: f32,
    pub scale_max: f32,
    pub color_map: u32,
    pub scaling: ScalingType,
    pub bias: f32,
    pub contrast: f32,
    pub gamma: f32,
    pub alpha: f32,
    pub inverted: bool,
    pub visible: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            scale_min: 0.0,
            scale_max: 1.0,
            color_map: 0,
            scaling: ScalingType::Linear,
            bias: 0.0,
            contrast: 1.0,
            gamma: 1.0,
            alpha: 1000.0,
            inverted: false,
            visible: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NanColorError {
    #[error("NaN colour `{0}` is not a #RRGGBB hex string")]
    InvalidHex(String),
    #[error("NaN alpha must be within [0, 1]")]
    InvalidAlpha,
}

/// Colour drawn for NaN samples, normalised RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NanColor(pub [f32; 4]);

impl Default for NanColor {
    fn default() -> Self {
        Self([0x13 as f32 / 255.0, 0x7c as f32 / 255.0, 0xbd as f32 / 255.0, 1.0])
    }
}

impl NanColor {
    pub fn from_hex(hex: &str, alpha: f32) -> Result<Self, NanColorError> {
        if !(0.0..=1.0).contains(&alpha) {
            return Err(NanColorError::InvalidAlpha);
        }
        let invalid = || NanColorError::InvalidHex(hex.to_owned());
        let digits = hex.strip_prefix('#').ok_or_else(invalid)?;
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |range: std::ops::Range<usize>| -> Result<f32, NanColorError> {
            let value = u8::from_str_radix(&digits[range], 16).map_err(|_| invalid())?;
            Ok(f32::from(value) / 255.0)
        };
        Ok(Self([channel(0..2)?, channel(2..4)?, channel(4..6)?, alpha]))
    }

    /// Replaces the colour with a parsed one; an unparsable string keeps the current colour.
    pub fn update_from_hex(&mut self, hex: &str, alpha: f32) -> Result<(), NanColorError> {
        *self = Self::from_hex(hex, alpha)?;
        Ok(())
    }
}

/// Alignment of a registered image onto the image that owns the canvas.
///
/// Geometry is computed in the reference image's frame: its required view and zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialAlignment {
    pub transform: SpatialTransform,
    pub reference_view: FrameView,
    pub reference_zoom: f64,
}

/// What one render pass does with a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePassKind {
    /// Nothing is drawn or cleared; the previous output stays.
    Skip,
    /// The target is cleared and presented without image data.
    ClearOnly,
    Tiled,
    Animation,
}

/// Everything the renderer reads about one image for one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub image_id: u32,
    pub channel: u32,
    pub polarization: u32,
    pub image_width: u32,
    pub image_height: u32,
    pub required_view: FrameView,
    pub current_view: FrameView,
    /// Logical screen pixels per image pixel.
    pub zoom_level: f64,
    pub render_width: u32,
    pub render_height: u32,
    pub device_pixel_ratio: f64,
    pub render_type: RasterRenderType,
    pub is_renderable: bool,
    pub render_config: RenderConfig,
    pub nan_color: NanColor,
    pub spatial: Option<SpatialAlignment>,
    /// Full-frame samples of `current_view`, used in animation mode.
    pub animation_data: Option<Arc<[f32]>>,
}

impl FrameSnapshot {
    pub fn pass_kind(&self) -> FramePassKind {
        if !self.is_renderable {
            return FramePassKind::Skip;
        }
        match self.render_type {
            RasterRenderType::None => FramePassKind::Skip,
            _ if !self.render_config.visible => FramePassKind::ClearOnly,
            RasterRenderType::Tiled => FramePassKind::Tiled,
            RasterRenderType::Animation => FramePassKind::Animation,
        }
    }

    /// Backing surface size in device pixels.
    pub fn surface_size(&self) -> (u32, u32) {
        let ratio = if self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0 {
            self.device_pixel_ratio
        } else {
            1.0
        };
        (
            (f64::from(self.render_width) * ratio).round() as u32,
            (f64::from(self.render_height) * ratio).round() as u32,
        )
    }

    /// View and zoom (device pixels per image pixel) that tile geometry is expressed in.
    pub fn geometry_reference(&self) -> (FrameView, f64) {
        let ratio = self.surface_ratio();
        match &self.spatial {
            Some(alignment) => (alignment.reference_view, alignment.reference_zoom * ratio),
            None => (self.required_view, self.zoom_level * ratio),
        }
    }

    pub fn spatial_transform(&self) -> Option<&SpatialTransform> {
        self.spatial.as_ref().map(|alignment| &alignment.transform)
    }

    fn surface_ratio(&self) -> f64 {
        let (width, _) = self.surface_size();
        if self.render_width == 0 {
            1.0
        } else {
            f64::from(width) / f64::from(self.render_width)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> FrameSnapshot {
        let view = FrameView {
            x_min: 0.0,
            x_max: 1024.0,
            y_min: 0.0,
            y_max: 768.0,
            mip: 1.0,
        };
        FrameSnapshot {
            image_id: 1,
            channel: 0,
            polarization: 0,
            image_width: 4096,
            image_height: 4096,
            required_view: view,
            current_view: view,
            zoom_level: 1.0,
            render_width: 1024,
            render_height: 768,
            device_pixel_ratio: 2.0,
            render_type: RasterRenderType::Tiled,
            is_renderable: true,
            render_config: RenderConfig::default(),
            nan_color: NanColor::default(),
            spatial: None,
            animation_data: None,
        }
    }

    #[test]
    fn pass_kind_follows_render_state() {
        let mut frame = snapshot();
        assert_eq!(frame.pass_kind(), FramePassKind::Tiled);

        frame.render_type = RasterRenderType::Animation;
        assert_eq!(frame.pass_kind(), FramePassKind::Animation);

        frame.render_config.visible = false;
        assert_eq!(frame.pass_kind(), FramePassKind::ClearOnly);

        frame.render_type = RasterRenderType::None;
        assert_eq!(frame.pass_kind(), FramePassKind::Skip);

        frame.render_type = RasterRenderType::Tiled;
        frame.is_renderable = false;
        assert_eq!(frame.pass_kind(), FramePassKind::Skip);
    }

    #[test]
    fn surface_scales_with_device_pixel_ratio() {
        let frame = snapshot();
        assert_eq!(frame.surface_size(), (2048, 1536));
        let (_, zoom) = frame.geometry_reference();
        assert_eq!(zoom, 2.0);
    }

    #[test]
    fn registered_image_uses_reference_geometry() {
        let mut frame = snapshot();
        let reference_view = FrameView {
            x_min: -50.0,
            x_max: 974.0,
            y_min: 10.0,
            y_max: 778.0,
            mip: 1.0,
        };
        frame.spatial = Some(SpatialAlignment {
            transform: SpatialTransform::default(),
            reference_view,
            reference_zoom: 0.5,
        });
        assert_eq!(frame.geometry_reference(), (reference_view, 1.0));
    }

    #[test]
    fn nan_color_parses_hex_and_alpha() {
        let color = NanColor::from_hex("#ff8000", 0.5).expect("valid colour");
        assert_eq!(color.0, [1.0, 128.0 / 255.0, 0.0, 0.5]);
    }

    #[test]
    fn invalid_nan_color_keeps_previous_value() {
        let mut color = NanColor::from_hex("#000000", 1.0).expect("valid colour");
        assert_eq!(
            color.update_from_hex("ff8000", 1.0),
            Err(NanColorError::InvalidHex("ff8000".to_owned()))
        );
        assert!(color.update_from_hex("#12345g", 1.0).is_err());
        assert_eq!(
            color.update_from_hex("#123456", 1.5),
            Err(NanColorError::InvalidAlpha)
        );
        assert_eq!(color.0, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn render_config_reads_partial_toml() {
        let config: RenderConfig = toml::from_str(
            r#"
            scale_max = 250.0
            scaling = "sqrt"
            color_map = 3
            "#,
        )
        .expect("parse render config");
        assert_eq!(config.scale_max, 250.0);
        assert_eq!(config.scaling, ScalingType::Sqrt);
        assert_eq!(config.color_map, 3);
        assert_eq!(config.contrast, 1.0);
        assert!(config.visible);
    }
}
