// ============================================================================
// camera.rs — lifegrid
// View state (zoom + pan over the unit-square render target), the viewport
// uniform handed to the presentation pass, and pointer → cell mapping.
// ============================================================================

use crate::grid::GridDimensions;

/// Smallest zoom the view accepts. Zoom 0 would make `screen_to_cell` divide
/// by zero.
pub const MIN_ZOOM: f32 = 0.01;

/// GPU-side viewport uniforms uploaded every presented frame.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ViewportUniforms {
    pub offset: [f32; 2],
    pub zoom: f32,
    pub _pad: f32,
}

impl Default for ViewportUniforms {
    fn default() -> Self {
        Self {
            offset: [0.0, 0.0],
            zoom: 1.0,
            _pad: 0.0,
        }
    }
}

/// What the window should do with the pointer this frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CursorMode {
    /// Visible and free.
    Free,
    /// Hidden and confined to the window while panning.
    Captured,
}

/// CPU-side view state. Zoom is the fraction of the render target visible on
/// each axis; offset is the top-left corner of the visible window.
/// `offset` always stays within `[0, 1 - zoom]`.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewState {
    zoom: f32,
    offset: [f32; 2],
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            offset: [0.0, 0.0],
        }
    }
}

impl ViewState {
    #[cfg(test)]
    pub fn new(zoom: f32, offset: [f32; 2]) -> Self {
        let mut view = Self { zoom: 1.0, offset };
        view.set_zoom(zoom);
        view
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn offset(&self) -> [f32; 2] {
        self.offset
    }

    fn set_zoom(&mut self, zoom: f32) {
        self.zoom = if zoom.is_nan() {
            1.0
        } else {
            zoom.clamp(MIN_ZOOM, 1.0)
        };
        self.clamp_offset();
    }

    fn clamp_offset(&mut self) {
        let max = 1.0 - self.zoom;
        for axis in &mut self.offset {
            *axis = if axis.is_nan() { 0.0 } else { axis.clamp(0.0, max) };
        }
    }

    /// Scroll-wheel zoom. Positive `delta_y` zooms in.
    pub fn apply_scroll(&mut self, delta_y: f32, dt: f32, speed: f32) {
        self.set_zoom(self.zoom - delta_y * dt * speed);
    }

    /// Drag-to-pan while `held`. Movement is scaled by zoom so the content
    /// tracks the pointer at any magnification.
    pub fn apply_pan(
        &mut self,
        held: bool,
        screen_delta: [f32; 2],
        dt: f32,
        sensitivity: f32,
    ) -> CursorMode {
        if !held {
            return CursorMode::Free;
        }
        for (axis, delta) in self.offset.iter_mut().zip(screen_delta) {
            *axis -= delta * dt * sensitivity * self.zoom;
        }
        self.clamp_offset();
        CursorMode::Captured
    }

    /// Map a pointer position in surface pixels to the grid cell under it.
    /// `viewport_px` is the surface size in pixels.
    pub fn screen_to_cell(
        &self,
        pointer_px: [f32; 2],
        viewport_px: [f32; 2],
        dims: &GridDimensions,
    ) -> [i32; 2] {
        let cell_scale = dims.cell_scale();
        let mut cell = [0i32; 2];
        for axis in 0..2 {
            let ratio = viewport_px[axis] / dims.scale[axis] as f32 / self.zoom;
            let offset_px = self.offset[axis] * viewport_px[axis] / self.zoom;
            cell[axis] =
                ((pointer_px[axis] + offset_px) / (cell_scale[axis] * ratio)).floor() as i32;
        }
        cell
    }

    pub fn uniforms(&self) -> ViewportUniforms {
        ViewportUniforms {
            offset: self.offset,
            zoom: self.zoom,
            _pad: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariant(view: &ViewState) {
        assert!(view.zoom() > 0.0 && view.zoom() <= 1.0, "zoom {}", view.zoom());
        for axis in view.offset() {
            assert!(
                (0.0..=1.0 - view.zoom()).contains(&axis),
                "offset {axis} zoom {}",
                view.zoom()
            );
        }
    }

    #[test]
    fn test_scroll_never_reaches_zero() {
        let mut view = ViewState::default();
        for _ in 0..1000 {
            view.apply_scroll(10.0, 0.1, 5.0);
            assert_invariant(&view);
        }
        assert_eq!(view.zoom(), MIN_ZOOM);

        for _ in 0..1000 {
            view.apply_scroll(-10.0, 0.1, 5.0);
            assert_invariant(&view);
        }
        assert_eq!(view.zoom(), 1.0);
        assert_eq!(view.offset(), [0.0, 0.0]);
    }

    #[test]
    fn test_zoom_out_pulls_offset_back_in_bounds() {
        let mut view = ViewState::new(0.25, [0.75, 0.7]);
        assert_invariant(&view);
        view.apply_scroll(-0.5, 1.0, 1.0);
        assert!((view.zoom() - 0.75).abs() < 1e-6);
        assert_invariant(&view);
        assert!(view.offset()[0] <= 0.25 + 1e-6);
    }

    #[test]
    fn test_pan_only_while_held() {
        let mut view = ViewState::new(0.5, [0.25, 0.25]);
        let mode = view.apply_pan(false, [100.0, 100.0], 0.1, 0.1);
        assert_eq!(mode, CursorMode::Free);
        assert_eq!(view.offset(), [0.25, 0.25]);

        let mode = view.apply_pan(true, [1.0, -1.0], 0.1, 0.1);
        assert_eq!(mode, CursorMode::Captured);
        let [x, y] = view.offset();
        assert!((x - (0.25 - 0.005)).abs() < 1e-6);
        assert!((y - (0.25 + 0.005)).abs() < 1e-6);
    }

    #[test]
    fn test_pan_clamps_to_content() {
        let mut view = ViewState::new(0.5, [0.0, 0.0]);
        view.apply_pan(true, [-1.0e6, 1.0e6], 1.0, 1.0);
        assert_eq!(view.offset(), [0.5, 0.0]);
        assert_invariant(&view);
    }

    #[test]
    fn test_screen_to_cell_closed_form() {
        let dims = GridDimensions::new([10, 10], [100, 100]).unwrap();
        let view = ViewState::new(0.5, [0.25, 0.0]);
        // ratio = 200 / 100 / 0.5 = 4, cell_scale = 10, offset_px = (100, 0)
        // x = floor((50 + 100) / 40) = 3, y = floor(50 / 40) = 1
        let cell = view.screen_to_cell([50.0, 50.0], [200.0, 200.0], &dims);
        assert_eq!(cell, [3, 1]);
        assert_eq!(view.screen_to_cell([50.0, 50.0], [200.0, 200.0], &dims), cell);
    }

    #[test]
    fn test_screen_to_cell_identity_view() {
        let dims = GridDimensions::new([16, 8], [64, 64]).unwrap();
        let view = ViewState::default();
        // 640x320 surface: each cell covers 40x40 pixels.
        assert_eq!(view.screen_to_cell([0.0, 0.0], [640.0, 320.0], &dims), [0, 0]);
        assert_eq!(view.screen_to_cell([39.9, 39.9], [640.0, 320.0], &dims), [0, 0]);
        assert_eq!(view.screen_to_cell([40.0, 40.0], [640.0, 320.0], &dims), [1, 1]);
        assert_eq!(view.screen_to_cell([639.0, 319.0], [640.0, 320.0], &dims), [15, 7]);
        // Floor, not truncation, left of the surface.
        assert_eq!(view.screen_to_cell([-1.0, 0.0], [640.0, 320.0], &dims), [-1, 0]);
    }

    #[test]
    fn test_uniforms_mirror_state() {
        let view = ViewState::new(0.5, [0.1, 0.2]);
        let u = view.uniforms();
        assert_eq!(u.zoom, 0.5);
        assert_eq!(u.offset, [0.1, 0.2]);
        assert_eq!(std::mem::size_of::<ViewportUniforms>(), 16);
    }
}
