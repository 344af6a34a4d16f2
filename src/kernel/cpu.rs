// ============================================================================
// kernel/cpu.rs — lifegrid
// Host-memory backend running the same per-pixel kernel as cells.wgsl.
// Used for windowless runs without a GPU and by the driver tests.
// ============================================================================

use std::collections::HashMap;

use super::{ComputeBackend, DeviceLimits, EntryPoint, KernelParams, WORKGROUP_X, WORKGROUP_Y};
use crate::error::{Result, SandboxError};
use crate::grid::{ALIVE, DEAD};

pub const ALIVE_COLOR: [u8; 4] = [235, 235, 235, 255];
pub const DEAD_COLOR: [u8; 4] = [10, 10, 18, 255];

#[derive(Debug, PartialEq, Eq)]
pub struct CpuBuffer {
    id: u64,
    len: usize,
}

#[cfg(test)]
impl CpuBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct CpuImage {
    id: u64,
    size: [u32; 2],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CpuBinding {
    target: u64,
    cells: [u64; 3],
}

#[cfg(test)]
impl CpuBinding {
    /// Buffer ids bound as `CellsIn`, `CellsOut`, `CellsSwap`.
    pub fn cell_ids(&self) -> [u64; 3] {
        self.cells
    }
}

/// One executed dispatch, kept for inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchRecord {
    pub entry: EntryPoint,
    pub binding: CpuBinding,
    pub workgroups: [u32; 3],
}

struct ImageData {
    size: [u32; 2],
    pixels: Vec<[u8; 4]>,
}

#[derive(Default)]
pub struct CpuBackend {
    next_id: u64,
    buffers: HashMap<u64, Vec<u32>>,
    images: HashMap<u64, ImageData>,
    params: [KernelParams; 2],
    history: Vec<DispatchRecord>,
    limits: DeviceLimits,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that refuses resources beyond `limits`, like a real device.
    #[cfg(test)]
    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_images(&self) -> usize {
        self.images.len()
    }

    pub fn history(&self) -> &[DispatchRecord] {
        &self.history
    }

    fn run(&mut self, entry: EntryPoint, binding: &CpuBinding, workgroups: [u32; 3]) {
        let params = self.params[entry.index()];
        let [in_id, out_id, _] = binding.cells;

        let (Some(mut out), Some(mut image)) = (
            self.buffers.remove(&out_id),
            self.images.remove(&binding.target),
        ) else {
            log::warn!("{} dispatch against released resources ignored", entry.name());
            return;
        };
        if !self.buffers.contains_key(&in_id) {
            log::warn!("{} dispatch without an input buffer ignored", entry.name());
            self.buffers.insert(out_id, out);
            self.images.insert(binding.target, image);
            return;
        }
        let cells_in = &self.buffers[&in_id];

        let [image_w, image_h] = image.size;
        let span_x = (workgroups[0] * WORKGROUP_X).min(image_w);
        let span_y = (workgroups[1] * WORKGROUP_Y).min(image_h);
        for py in 0..span_y {
            for px in 0..span_x {
                let cell = [
                    (px as f32 / params.cell_scale[0]).floor() as i32,
                    (py as f32 / params.cell_scale[1]).floor() as i32,
                ];
                if cell[0] >= params.grid_size[0] || cell[1] >= params.grid_size[1] {
                    continue;
                }
                let idx = (cell[1] * params.grid_size[0] + cell[0]) as usize;
                let next = match entry {
                    EntryPoint::Step => step_rule(cells_in, &params, cell),
                    EntryPoint::Paint => paint_rule(cells_in, &params, cell),
                };
                out[idx] = next;
                image.pixels[(py * image_w + px) as usize] =
                    if next == DEAD { DEAD_COLOR } else { ALIVE_COLOR };
            }
        }

        self.buffers.insert(out_id, out);
        self.images.insert(binding.target, image);
    }
}

/// Conway B3/S23 with dead cells beyond the grid edge.
pub fn step_rule(cells: &[u32], params: &KernelParams, cell: [i32; 2]) -> u32 {
    let [w, h] = params.grid_size;
    let mut neighbours = 0;
    for dy in -1..=1 {
        for dx in -1..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let (x, y) = (cell[0] + dx, cell[1] + dy);
            if x < 0 || y < 0 || x >= w || y >= h {
                continue;
            }
            if cells[(y * w + x) as usize] != DEAD {
                neighbours += 1;
            }
        }
    }
    let alive = cells[(cell[1] * w + cell[0]) as usize] != DEAD;
    match (alive, neighbours) {
        (true, 2) | (_, 3) => ALIVE,
        _ => DEAD,
    }
}

/// Copy the input cell, overwritten inside the paint square.
pub fn paint_rule(cells: &[u32], params: &KernelParams, cell: [i32; 2]) -> u32 {
    let inside = params.fill_radius >= 0
        && cell[0].abs_diff(params.fill_pos[0]) <= params.fill_radius as u32
        && cell[1].abs_diff(params.fill_pos[1]) <= params.fill_radius as u32;
    if inside {
        if params.fill != 0 {
            ALIVE
        } else {
            DEAD
        }
    } else {
        cells[(cell[1] * params.grid_size[0] + cell[0]) as usize]
    }
}

impl ComputeBackend for CpuBackend {
    type Buffer = CpuBuffer;
    type Image = CpuImage;
    type Binding = CpuBinding;

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_cell_buffer(&mut self, _label: &str, cells: &[u32]) -> CpuBuffer {
        let id = self.allocate_id();
        self.buffers.insert(id, cells.to_vec());
        CpuBuffer {
            id,
            len: cells.len(),
        }
    }

    fn write_cells(&mut self, buffer: &CpuBuffer, cells: &[u32]) {
        if let Some(data) = self.buffers.get_mut(&buffer.id) {
            let n = data.len().min(cells.len());
            data[..n].copy_from_slice(&cells[..n]);
        }
    }

    fn read_cells(&mut self, buffer: &CpuBuffer) -> Result<Vec<u32>> {
        self.buffers
            .get(&buffer.id)
            .cloned()
            .ok_or(SandboxError::Readback)
    }

    fn cell_buffer_len(&self, buffer: &CpuBuffer) -> usize {
        buffer.len
    }

    fn release_buffer(&mut self, buffer: CpuBuffer) {
        self.buffers.remove(&buffer.id);
    }

    fn create_render_target(&mut self, scale: [u32; 2]) -> CpuImage {
        let id = self.allocate_id();
        self.images.insert(
            id,
            ImageData {
                size: scale,
                pixels: vec![DEAD_COLOR; scale[0] as usize * scale[1] as usize],
            },
        );
        CpuImage { id, size: scale }
    }

    fn render_target_size(&self, image: &CpuImage) -> [u32; 2] {
        image.size
    }

    fn release_render_target(&mut self, image: CpuImage) {
        self.images.remove(&image.id);
    }

    fn write_params(&mut self, entry: EntryPoint, params: &KernelParams) {
        self.params[entry.index()] = *params;
    }

    fn bind(
        &mut self,
        _entry: EntryPoint,
        target: &CpuImage,
        cells: [&CpuBuffer; 3],
    ) -> CpuBinding {
        CpuBinding {
            target: target.id,
            cells: cells.map(|buffer| buffer.id),
        }
    }

    fn dispatch(&mut self, entry: EntryPoint, binding: &CpuBinding, workgroups: [u32; 3]) {
        self.history.push(DispatchRecord {
            entry,
            binding: *binding,
            workgroups,
        });
        self.run(entry, binding, workgroups);
    }
}

#[cfg(test)]
impl CpuBackend {
    pub fn pixel(&self, image: &CpuImage, x: u32, y: u32) -> Option<[u8; 4]> {
        let data = self.images.get(&image.id)?;
        if x >= data.size[0] || y >= data.size[1] {
            return None;
        }
        Some(data.pixels[(y * data.size[0] + x) as usize])
    }
}
