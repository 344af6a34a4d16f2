// ============================================================================
// kernel/mod.rs — lifegrid
// Compute kernel contract: entry points, parameter block, dispatch sizing and
// the backend trait the driver talks to.
// ============================================================================

pub mod cpu;
pub mod gpu;

use bytemuck::{Pod, Zeroable};

use crate::error::{Result, SandboxError};
use crate::grid::{GridDimensions, PaintRequest};

pub const WORKGROUP_X: u32 = 16;
pub const WORKGROUP_Y: u32 = 16;

/// Kernel entry points, addressed by index as in the shader module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    Step = 0,
    Paint = 1,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 2] = [EntryPoint::Step, EntryPoint::Paint];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            EntryPoint::Step => "step",
            EntryPoint::Paint => "paint",
        }
    }

    /// Function name in cells.wgsl.
    pub fn shader_entry(self) -> &'static str {
        match self {
            EntryPoint::Step => "step_generation",
            EntryPoint::Paint => "paint_cells",
        }
    }
}

/// Uniform block shared by both entry points. `fill*` fields are only read by
/// the paint entry point.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct KernelParams {
    pub cell_scale: [f32; 2],
    pub grid_size: [i32; 2],
    pub fill_pos: [i32; 2],
    pub fill_radius: i32,
    pub fill: u32,
}

impl KernelParams {
    /// Static parameters derived from the grid dimensions.
    pub fn for_grid(dims: &GridDimensions) -> Self {
        Self {
            cell_scale: dims.cell_scale(),
            grid_size: [dims.size[0] as i32, dims.size[1] as i32],
            ..Default::default()
        }
    }

    pub fn with_paint(self, request: &PaintRequest) -> Self {
        Self {
            fill_pos: request.center,
            fill_radius: request.radius,
            fill: request.fill as u32,
            ..self
        }
    }
}

/// Workgroup grid covering an image of `size` pixels.
pub fn workgroup_count(size: [u32; 2]) -> [u32; 3] {
    [
        size[0].div_ceil(WORKGROUP_X),
        size[1].div_ceil(WORKGROUP_Y),
        1,
    ]
}

/// Largest resources a backend can allocate and bind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Per-axis texel limit of the render target.
    pub max_texture_dimension: u32,
    /// Largest bindable cell buffer, in bytes.
    pub max_buffer_bytes: u64,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self::UNLIMITED
    }
}

impl DeviceLimits {
    pub const UNLIMITED: DeviceLimits = DeviceLimits {
        max_texture_dimension: u32::MAX,
        max_buffer_bytes: u64::MAX,
    };

    pub fn check(&self, dims: &GridDimensions) -> Result<()> {
        let texture = dims.scale[0].max(dims.scale[1]);
        if texture > self.max_texture_dimension {
            return Err(SandboxError::ExceedsDeviceLimits {
                what: "render target dimension",
                requested: texture as u64,
                limit: self.max_texture_dimension as u64,
            });
        }
        let bytes = dims.cell_count() as u64 * std::mem::size_of::<u32>() as u64;
        if bytes > self.max_buffer_bytes {
            return Err(SandboxError::ExceedsDeviceLimits {
                what: "cell buffer bytes",
                requested: bytes,
                limit: self.max_buffer_bytes,
            });
        }
        Ok(())
    }
}

/// A device that owns cell buffers and a writable image and can run the two
/// kernel entry points over them. Handles are plain owned values; the driver
/// decides when they are released.
pub trait ComputeBackend {
    type Buffer;
    type Image;
    /// Resources bound to one entry point for one buffer rotation:
    /// `Result`, `CellsIn`, `CellsOut`, `CellsSwap`.
    type Binding;

    fn limits(&self) -> DeviceLimits;

    fn create_cell_buffer(&mut self, label: &str, cells: &[u32]) -> Self::Buffer;
    fn write_cells(&mut self, buffer: &Self::Buffer, cells: &[u32]);
    fn read_cells(&mut self, buffer: &Self::Buffer) -> Result<Vec<u32>>;
    /// Length in cells.
    fn cell_buffer_len(&self, buffer: &Self::Buffer) -> usize;
    fn release_buffer(&mut self, buffer: Self::Buffer);

    fn create_render_target(&mut self, scale: [u32; 2]) -> Self::Image;
    fn render_target_size(&self, image: &Self::Image) -> [u32; 2];
    fn release_render_target(&mut self, image: Self::Image);

    fn write_params(&mut self, entry: EntryPoint, params: &KernelParams);
    fn bind(
        &mut self,
        entry: EntryPoint,
        target: &Self::Image,
        cells: [&Self::Buffer; 3],
    ) -> Self::Binding;
    /// Fire-and-forget dispatch of `entry` over `workgroups`.
    fn dispatch(&mut self, entry: EntryPoint, binding: &Self::Binding, workgroups: [u32; 3]);
}
