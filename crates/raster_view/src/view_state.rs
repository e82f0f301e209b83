//! Interactive state of the single image shown by the viewer and the frame snapshots built
//! from it.

use std::sync::Arc;

use model::{FrameView, Point2D, SpatialTransform};
use render_protocol::{
    FrameSnapshot, NanColor, NanColorError, RasterRenderType, RenderConfig, ScalingType,
    SpatialAlignment,
};
use view::{TransformError, ViewportCamera};

use crate::synthetic_store::{SyntheticImage, render_view};

/// Phase advance of the animated image per rendered frame.
const ANIMATION_PHASE_STEP: f64 = 0.15;

const SCALING_CYCLE: [ScalingType; 6] = [
    ScalingType::Linear,
    ScalingType::Log,
    ScalingType::Sqrt,
    ScalingType::Square,
    ScalingType::Power,
    ScalingType::Gamma,
];

pub struct ViewState {
    image: SyntheticImage,
    camera: ViewportCamera,
    rotation: f64,
    render_type: RasterRenderType,
    render_config: RenderConfig,
    nan_color: NanColor,
    physical_size: (u32, u32),
    scale_factor: f64,
    animation_phase: f64,
    animation_frame: Option<AnimationFrame>,
}

struct AnimationFrame {
    view: FrameView,
    phase: f64,
    data: Arc<[f32]>,
}

impl ViewState {
    /// Starts with the whole image fitted into the window.
    pub fn new(
        image: SyntheticImage,
        render_config: RenderConfig,
        nan_color: NanColor,
        physical_size: (u32, u32),
        scale_factor: f64,
    ) -> Result<Self, TransformError> {
        let scale_factor = sanitize_scale_factor(scale_factor);
        let (width, height) = logical(physical_size, scale_factor);
        let camera = ViewportCamera::fit(image.width, image.height, width, height)?;
        Ok(Self {
            image,
            camera,
            rotation: 0.0,
            render_type: RasterRenderType::Tiled,
            render_config,
            nan_color,
            physical_size,
            scale_factor,
            animation_phase: 0.0,
            animation_frame: None,
        })
    }

    pub fn render_type(&self) -> RasterRenderType {
        self.render_type
    }

    pub fn render_config(&self) -> &RenderConfig {
        &self.render_config
    }

    pub fn camera(&self) -> &ViewportCamera {
        &self.camera
    }

    pub fn resize(&mut self, physical_size: (u32, u32), scale_factor: f64) {
        self.physical_size = physical_size;
        self.scale_factor = sanitize_scale_factor(scale_factor);
    }

    /// Drags the image by a cursor movement given in physical pixels.
    pub fn pan(&mut self, delta_x: f64, delta_y: f64) -> Result<(), TransformError> {
        self.camera
            .pan_by(delta_x / self.scale_factor, delta_y / self.scale_factor)
    }

    /// Zooms about a window point given in physical pixels.
    pub fn zoom_about(
        &mut self,
        zoom_factor: f64,
        anchor_x: f64,
        anchor_y: f64,
    ) -> Result<(), TransformError> {
        let (width, height) = logical(self.physical_size, self.scale_factor);
        self.camera.zoom_about_point(
            zoom_factor,
            anchor_x / self.scale_factor,
            anchor_y / self.scale_factor,
            width,
            height,
        )
    }

    pub fn rotate(&mut self, delta_radians: f64) {
        self.rotation = (self.rotation + delta_radians) % std::f64::consts::TAU;
    }

    pub fn toggle_visibility(&mut self) {
        self.render_config.visible = !self.render_config.visible;
    }

    pub fn toggle_animation(&mut self) {
        self.render_type = match self.render_type {
            RasterRenderType::Animation => RasterRenderType::Tiled,
            _ => RasterRenderType::Animation,
        };
        self.animation_frame = None;
    }

    pub fn cycle_color_map(&mut self, color_map_count: u32) {
        self.render_config.color_map = (self.render_config.color_map + 1) % color_map_count.max(1);
    }

    pub fn cycle_scaling(&mut self) {
        let current = SCALING_CYCLE
            .iter()
            .position(|scaling| *scaling == self.render_config.scaling)
            .unwrap_or(0);
        self.render_config.scaling = SCALING_CYCLE[(current + 1) % SCALING_CYCLE.len()];
    }

    pub fn toggle_inverted(&mut self) {
        self.render_config.inverted = !self.render_config.inverted;
    }

    /// Replaces the colour settings. A bad NaN colour leaves everything unchanged.
    pub fn update_display(
        &mut self,
        render_config: RenderConfig,
        nan_hex: &str,
        nan_alpha: f32,
    ) -> Result<(), NanColorError> {
        self.nan_color.update_from_hex(nan_hex, nan_alpha)?;
        self.render_config = render_config;
        Ok(())
    }

    /// Moves the animated image one step forward. Has no effect outside animation mode.
    pub fn advance_animation(&mut self) {
        if self.render_type == RasterRenderType::Animation {
            self.animation_phase += ANIMATION_PHASE_STEP;
        }
    }

    /// Builds the snapshot for the next render pass.
    ///
    /// A rotated tiled image requires every tile under the rotated window, so its required
    /// view is the bounding box of the window turned about the image centre. In animation mode
    /// the frame data is only regenerated when the visible region or the phase changed, so
    /// unchanged frames hand the renderer the same allocation.
    pub fn snapshot(&mut self) -> FrameSnapshot {
        let (width, height) = logical(self.physical_size, self.scale_factor);
        let window_view = self
            .camera
            .required_view(width, height, self.scale_factor);
        let origin = Point2D::new(
            f64::from(self.image.width) / 2.0,
            f64::from(self.image.height) / 2.0,
        );
        let rotated = self.rotation != 0.0;
        let required_view = if rotated && self.render_type != RasterRenderType::Animation {
            window_view.rotated_bounds(origin, self.rotation)
        } else {
            window_view
        };
        let current_view = required_view.bounded_to(self.image.width, self.image.height);
        let spatial = rotated.then(|| SpatialAlignment {
            transform: SpatialTransform {
                origin,
                rotation: self.rotation,
                ..SpatialTransform::default()
            },
            reference_view: window_view,
            reference_zoom: self.camera.zoom_level(),
        });
        let animation_data = (self.render_type == RasterRenderType::Animation)
            .then(|| self.animation_data(&current_view));

        FrameSnapshot {
            image_id: self.image.image_id,
            channel: 0,
            polarization: 0,
            image_width: self.image.width,
            image_height: self.image.height,
            required_view,
            current_view,
            zoom_level: self.camera.zoom_level(),
            render_width: width.round() as u32,
            render_height: height.round() as u32,
            device_pixel_ratio: self.scale_factor,
            render_type: self.render_type,
            is_renderable: self.physical_size.0 > 0 && self.physical_size.1 > 0,
            render_config: self.render_config,
            nan_color: self.nan_color,
            spatial,
            animation_data,
        }
    }

    fn animation_data(&mut self, current_view: &FrameView) -> Arc<[f32]> {
        let reusable = self.animation_frame.as_ref().filter(|frame| {
            frame.view == *current_view && frame.phase == self.animation_phase
        });
        if let Some(frame) = reusable {
            return Arc::clone(&frame.data);
        }
        let data = render_view(&self.image, current_view, self.animation_phase);
        self.animation_frame = Some(AnimationFrame {
            view: *current_view,
            phase: self.animation_phase,
            data: Arc::clone(&data),
        });
        data
    }
}

fn sanitize_scale_factor(scale_factor: f64) -> f64 {
    if scale_factor.is_finite() && scale_factor > 0.0 {
        scale_factor
    } else {
        1.0
    }
}

fn logical(physical_size: (u32, u32), scale_factor: f64) -> (f64, f64) {
    (
        f64::from(physical_size.0) / scale_factor,
        f64::from(physical_size.1) / scale_factor,
    )
}

#[cfg(test)]
mod tests {
    use render_protocol::FramePassKind;

    use super::*;

    const IMAGE: SyntheticImage = SyntheticImage {
        image_id: 1,
        width: 2048,
        height: 1024,
        tile_size: 256,
    };

    fn state(physical: (u32, u32), scale_factor: f64) -> ViewState {
        ViewState::new(
            IMAGE,
            RenderConfig::default(),
            NanColor::default(),
            physical,
            scale_factor,
        )
        .expect("view state")
    }

    #[test]
    fn fitted_view_covers_the_image_at_a_coarse_mip() {
        let mut state = state((1024, 512), 1.0);
        let snapshot = state.snapshot();

        assert_eq!(snapshot.zoom_level, 0.5);
        assert_eq!(snapshot.required_view.x_min, 0.0);
        assert_eq!(snapshot.required_view.x_max, 2048.0);
        assert_eq!(snapshot.required_view.mip, 2.0);
        assert_eq!(snapshot.pass_kind(), FramePassKind::Tiled);
        assert!(snapshot.spatial.is_none());
        assert!(snapshot.animation_data.is_none());
    }

    #[test]
    fn device_pixel_ratio_keeps_logical_size_and_sharpens_mip() {
        let mut state = state((2048, 1024), 2.0);
        let snapshot = state.snapshot();

        assert_eq!((snapshot.render_width, snapshot.render_height), (1024, 512));
        assert_eq!(snapshot.surface_size(), (2048, 1024));
        assert_eq!(snapshot.required_view.mip, 1.0);
    }

    #[test]
    fn panning_converts_physical_pixels() {
        let mut state = state((1024, 512), 2.0);
        let before = state.camera().center();
        // Fitted zoom is 0.25 logical px per image px; 100 physical px are 50 logical px.
        state.pan(100.0, 0.0).expect("pan");
        let after = state.camera().center();
        assert_eq!(before.x - after.x, 50.0 / 0.25);
        assert_eq!(before.y, after.y);
    }

    #[test]
    fn rotation_aligns_the_image_to_its_own_view() {
        let mut state = state((1024, 512), 1.0);
        state.rotate(0.5);
        let snapshot = state.snapshot();

        let alignment = snapshot.spatial.expect("alignment");
        assert_eq!(alignment.transform.rotation, 0.5);
        assert_eq!(alignment.transform.origin, Point2D::new(1024.0, 512.0));
        assert_eq!(alignment.reference_zoom, snapshot.zoom_level);
        assert_eq!(alignment.reference_view, state.camera().required_view(1024.0, 512.0, 1.0));
    }

    #[test]
    fn rotated_window_requires_its_bounding_box() {
        let mut state = state((1024, 512), 1.0);
        state.zoom_about(4.0, 512.0, 256.0).expect("zoom");
        let window = state.snapshot().required_view;

        state.rotate(std::f64::consts::FRAC_PI_4);
        let snapshot = state.snapshot();
        let required = snapshot.required_view;
        let alignment = snapshot.spatial.expect("alignment");

        assert_eq!(alignment.reference_view, window);
        assert_eq!(required.mip, window.mip);
        assert!(required.x_min < window.x_min && required.x_max > window.x_max);
        assert!(required.y_min < window.y_min && required.y_max > window.y_max);
        // Window corners turned about the image centre all land inside the required view.
        let origin = Point2D::new(1024.0, 512.0);
        for corner in [
            Point2D::new(window.x_min, window.y_min),
            Point2D::new(window.x_max, window.y_max),
            Point2D::new(window.x_min, window.y_max),
            Point2D::new(window.x_max, window.y_min),
        ] {
            let turned = origin + (corner - origin).rotate(std::f64::consts::FRAC_PI_4);
            assert!(turned.x >= required.x_min - 1e-9 && turned.x <= required.x_max + 1e-9);
            assert!(turned.y >= required.y_min - 1e-9 && turned.y <= required.y_max + 1e-9);
        }

        state.toggle_animation();
        assert_eq!(state.snapshot().required_view, window);
    }

    #[test]
    fn hidden_image_clears_instead_of_drawing() {
        let mut state = state((1024, 512), 1.0);
        state.toggle_visibility();
        assert_eq!(state.snapshot().pass_kind(), FramePassKind::ClearOnly);
    }

    #[test]
    fn animation_frames_are_shared_until_the_phase_moves() {
        let mut state = state((256, 128), 1.0);
        state.toggle_animation();

        let first = state.snapshot().animation_data.expect("frame");
        let second = state.snapshot().animation_data.expect("frame");
        assert!(Arc::ptr_eq(&first, &second));

        state.advance_animation();
        let third = state.snapshot().animation_data.expect("frame");
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(first.len(), third.len());
    }

    #[test]
    fn controls_cycle_through_their_options() {
        let mut state = state((256, 128), 1.0);
        state.cycle_color_map(2);
        assert_eq!(state.render_config().color_map, 1);
        state.cycle_color_map(2);
        assert_eq!(state.render_config().color_map, 0);

        for _ in 0..SCALING_CYCLE.len() {
            state.cycle_scaling();
        }
        assert_eq!(state.render_config().scaling, ScalingType::Linear);
        state.cycle_scaling();
        assert_eq!(state.render_config().scaling, ScalingType::Log);
    }

    #[test]
    fn display_updates_apply_together_or_not_at_all() {
        let mut state = state((256, 128), 1.0);
        let inverted = RenderConfig {
            inverted: true,
            ..RenderConfig::default()
        };

        assert!(state.update_display(inverted, "not a colour", 1.0).is_err());
        assert!(!state.render_config().inverted);
        assert_eq!(state.snapshot().nan_color, NanColor::default());

        state.update_display(inverted, "#ff0000", 0.5).expect("update");
        let snapshot = state.snapshot();
        assert!(snapshot.render_config.inverted);
        assert_eq!(snapshot.nan_color, NanColor([1.0, 0.0, 0.0, 0.5]));
    }

    #[test]
    fn minimized_window_is_not_renderable() {
        let mut state = state((1024, 512), 1.0);
        state.resize((0, 0), 1.0);
        assert_eq!(state.snapshot().pass_kind(), FramePassKind::Skip);
    }
}
