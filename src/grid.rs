// ============================================================================
// grid.rs — lifegrid
// Grid dimensions, the host-side grid state (edit radius, paint requests),
// and CellGrid: a host copy of the cells used for seeding and by the CPU
// kernel.
// ============================================================================

use rand::Rng;

use crate::error::{Result, SandboxError};

pub const ALIVE: u32 = 1;
pub const DEAD: u32 = 0;

// ======================== Dimensions ========================

/// Logical cell count (`size`) and device image resolution (`scale`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridDimensions {
    pub size: [u32; 2],
    pub scale: [u32; 2],
}

impl GridDimensions {
    pub fn new(size: [u32; 2], scale: [u32; 2]) -> Result<Self> {
        if size[0] == 0 || size[1] == 0 {
            return Err(SandboxError::InvalidGridSize {
                width: size[0] as i64,
                height: size[1] as i64,
            });
        }
        if scale[0] == 0 || scale[1] == 0 {
            return Err(SandboxError::InvalidTextureScale {
                width: scale[0] as i64,
                height: scale[1] as i64,
            });
        }
        if scale[0] < size[0] || scale[1] < size[1] {
            return Err(SandboxError::ScaleBelowGrid {
                grid_w: size[0],
                grid_h: size[1],
                scale_w: scale[0],
                scale_h: scale[1],
            });
        }
        Ok(Self { size, scale })
    }

    /// Pixels per cell on each axis.
    pub fn cell_scale(&self) -> [f32; 2] {
        [
            self.scale[0] as f32 / self.size[0] as f32,
            self.scale[1] as f32 / self.size[1] as f32,
        ]
    }

    pub fn cell_count(&self) -> usize {
        self.size[0] as usize * self.size[1] as usize
    }

    pub fn with_size(&self, size: [u32; 2]) -> Result<Self> {
        Self::new(size, self.scale)
    }

    pub fn with_scale(&self, scale: [u32; 2]) -> Result<Self> {
        Self::new(self.size, scale)
    }
}

// ======================== Paint ========================

/// A square stamp centred on `center`, `radius` cells in each direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaintRequest {
    pub center: [i32; 2],
    pub radius: i32,
    pub fill: bool,
}

/// Set every in-bounds cell of the stamp window to `value`. Row-major layout.
pub fn stamp(cells: &mut [u32], size: [u32; 2], center: [i32; 2], radius: i32, value: u32) {
    let radius = radius.max(0);
    let (w, h) = (size[0] as i32, size[1] as i32);
    let x0 = center[0].saturating_sub(radius).max(0);
    let x1 = center[0].saturating_add(radius).min(w - 1);
    let y0 = center[1].saturating_sub(radius).max(0);
    let y1 = center[1].saturating_add(radius).min(h - 1);
    for y in y0..=y1 {
        let row = y as usize * w as usize;
        for x in x0..=x1 {
            cells[row + x as usize] = value;
        }
    }
}

// ======================== Grid State ========================

/// Host-owned grid settings. Holds no cell data; the driver owns the device
/// buffers.
#[derive(Clone, Debug)]
pub struct GridState {
    dims: GridDimensions,
    edit_radius: i32,
}

impl GridState {
    pub fn new(dims: GridDimensions, edit_radius: i32) -> Self {
        Self {
            dims,
            edit_radius: edit_radius.max(0),
        }
    }

    pub fn dims(&self) -> GridDimensions {
        self.dims
    }

    pub fn edit_radius(&self) -> i32 {
        self.edit_radius
    }

    /// Change the logical cell count. Invalidates every device resource.
    pub fn resize(&mut self, new_size: [u32; 2]) -> Result<()> {
        self.dims = self.dims.with_size(new_size)?;
        log::info!("Grid resized to {}x{}", new_size[0], new_size[1]);
        Ok(())
    }

    pub fn set_texture_scale(&mut self, scale: [u32; 2]) -> Result<()> {
        self.dims = self.dims.with_scale(scale)?;
        Ok(())
    }

    pub fn adjust_radius(&mut self, delta: i32) {
        self.edit_radius = self.edit_radius.saturating_add(delta).max(0);
    }

    pub fn paint_request(&self, center: [i32; 2], fill: bool) -> PaintRequest {
        PaintRequest {
            center,
            radius: self.edit_radius,
            fill,
        }
    }
}

// ======================== Host Cells ========================

/// Row-major host copy of a cell grid.
#[derive(Clone, Debug, PartialEq)]
pub struct CellGrid {
    size: [u32; 2],
    cells: Vec<u32>,
}

impl CellGrid {
    pub fn new(size: [u32; 2]) -> Self {
        Self {
            size,
            cells: vec![DEAD; size[0] as usize * size[1] as usize],
        }
    }

    /// Random soup with roughly `density` of the cells alive.
    pub fn seeded<R: Rng>(size: [u32; 2], density: f32, rng: &mut R) -> Self {
        let mut grid = Self::new(size);
        let density = density.clamp(0.0, 1.0) as f64;
        if density > 0.0 {
            for cell in &mut grid.cells {
                if rng.gen_bool(density) {
                    *cell = ALIVE;
                }
            }
        }
        grid
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    pub fn cells(&self) -> &[u32] {
        &self.cells
    }

    pub fn paint(&mut self, center: [i32; 2], radius: i32, value: u32) {
        stamp(&mut self.cells, self.size, center, radius, value);
    }

    pub fn live_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c != DEAD).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn at(grid: &CellGrid, x: usize, y: usize) -> u32 {
        grid.cells()[y * grid.size()[0] as usize + x]
    }

    #[test]
    fn test_dimensions_validation() {
        assert!(GridDimensions::new([10, 10], [100, 100]).is_ok());
        assert!(matches!(
            GridDimensions::new([0, 10], [100, 100]),
            Err(SandboxError::InvalidGridSize { .. })
        ));
        assert!(matches!(
            GridDimensions::new([10, 10], [100, 0]),
            Err(SandboxError::InvalidTextureScale { .. })
        ));
        assert!(matches!(
            GridDimensions::new([200, 10], [100, 100]),
            Err(SandboxError::ScaleBelowGrid { .. })
        ));
    }

    #[test]
    fn test_cell_scale() {
        let dims = GridDimensions::new([10, 20], [100, 100]).unwrap();
        assert_eq!(dims.cell_scale(), [10.0, 5.0]);
        assert_eq!(dims.cell_count(), 200);
    }

    #[test]
    fn test_paint_interior_block() {
        let mut grid = CellGrid::new([10, 10]);
        grid.paint([5, 5], 1, ALIVE);
        for y in 0..10 {
            for x in 0..10 {
                let expected = if (4..=6).contains(&x) && (4..=6).contains(&y) {
                    ALIVE
                } else {
                    DEAD
                };
                assert_eq!(at(&grid, x, y), expected, "cell ({x}, {y})");
            }
        }
        assert_eq!(grid.live_count(), 9);
    }

    #[test]
    fn test_paint_clips_at_boundary() {
        let mut grid = CellGrid::new([10, 10]);
        grid.paint([0, 0], 2, ALIVE);
        assert_eq!(grid.live_count(), 9);
        for y in 0..=2 {
            for x in 0..=2 {
                assert_eq!(at(&grid, x, y), ALIVE);
            }
        }

        grid.paint([9, 9], 3, ALIVE);
        assert_eq!(grid.live_count(), 9 + 16);

        // Entirely outside: no-op.
        grid.paint([-10, 50], 2, ALIVE);
        assert_eq!(grid.live_count(), 25);
    }

    #[test]
    fn test_paint_extreme_coordinates_saturate() {
        let mut grid = CellGrid::new([8, 8]);
        grid.paint([i32::MAX, i32::MIN], 4, ALIVE);
        grid.paint([i32::MIN, 3], i32::MAX, ALIVE);
        assert_eq!(grid.live_count(), 0);

        grid.paint([i32::MAX, 0], i32::MAX, ALIVE);
        assert_eq!(grid.live_count(), 64);

        grid.paint([4, 4], i32::MAX, DEAD);
        assert_eq!(grid.live_count(), 0);
    }

    #[test]
    fn test_paint_clear_leaves_others() {
        let mut grid = CellGrid::new([6, 6]);
        grid.paint([3, 3], 10, ALIVE);
        grid.paint([1, 1], 0, DEAD);
        assert_eq!(at(&grid, 1, 1), DEAD);
        assert_eq!(grid.live_count(), 35);
    }

    #[test]
    fn test_radius_clamped_non_negative() {
        let dims = GridDimensions::new([8, 8], [8, 8]).unwrap();
        let mut state = GridState::new(dims, 2);
        state.adjust_radius(-5);
        assert_eq!(state.edit_radius(), 0);
        state.adjust_radius(3);
        let request = state.paint_request([1, 2], false);
        assert_eq!(request.center, [1, 2]);
        assert_eq!(request.radius, 3);
        assert!(!request.fill);
    }

    #[test]
    fn test_resize_keeps_previous_on_error() {
        let dims = GridDimensions::new([8, 8], [64, 64]).unwrap();
        let mut state = GridState::new(dims, 1);
        state.resize([16, 16]).unwrap();
        assert_eq!(state.dims().size, [16, 16]);
        assert!(state.resize([0, 16]).is_err());
        assert!(state.resize([128, 16]).is_err());
        assert_eq!(state.dims().size, [16, 16]);

        state.set_texture_scale([128, 64]).unwrap();
        state.resize([128, 16]).unwrap();
        assert!(state.set_texture_scale([64, 64]).is_err());
        assert_eq!(state.dims().scale, [128, 64]);
    }

    #[test]
    fn test_seeded_density() {
        let mut rng = StdRng::seed_from_u64(7);
        let grid = CellGrid::seeded([100, 100], 0.25, &mut rng);
        let live = grid.live_count();
        assert!((2000..3000).contains(&live), "live = {live}");
        assert_eq!(CellGrid::seeded([4, 4], 0.0, &mut rng).live_count(), 0);
    }
}
