// ============================================================================
// driver.rs — lifegrid
// Simulation/render driver: owns the three rotating cell buffers, the render
// target and the per-rotation kernel bindings, and dispatches the step and
// paint entry points.
// ============================================================================

use crate::error::{Result, SandboxError};
use crate::grid::{CellGrid, GridDimensions, PaintRequest, DEAD};
use crate::kernel::{workgroup_count, ComputeBackend, EntryPoint, KernelParams};

// ======================== Device Slot ========================

/// An owned, optional device handle. Replacing releases the previous handle;
/// releasing an empty slot does nothing.
pub struct DeviceSlot<T> {
    handle: Option<T>,
}

impl<T> Default for DeviceSlot<T> {
    fn default() -> Self {
        Self { handle: None }
    }
}

impl<T> DeviceSlot<T> {
    pub fn get(&self) -> Option<&T> {
        self.handle.as_ref()
    }

    pub fn is_allocated(&self) -> bool {
        self.handle.is_some()
    }

    pub fn replace_with(&mut self, fresh: T, release: impl FnOnce(T)) {
        if let Some(old) = self.handle.replace(fresh) {
            release(old);
        }
    }

    pub fn release_with(&mut self, release: impl FnOnce(T)) {
        if let Some(old) = self.handle.take() {
            release(old);
        }
    }
}

/// Make `slot` hold a cell buffer of exactly `contents.len()` cells, filled
/// with `contents`. Returns true when a new buffer was allocated.
pub fn ensure_capacity<B: ComputeBackend>(
    backend: &mut B,
    slot: &mut DeviceSlot<B::Buffer>,
    label: &str,
    contents: &[u32],
) -> bool {
    if let Some(buffer) = slot.get() {
        if backend.cell_buffer_len(buffer) == contents.len() {
            backend.write_cells(buffer, contents);
            return false;
        }
    }
    let fresh = backend.create_cell_buffer(label, contents);
    slot.replace_with(fresh, |old| backend.release_buffer(old));
    true
}

// ======================== Buffer Ring ========================

/// Rotation over three physical buffers. Roles for offset `o` are
/// `In = o`, `Out = o + 1`, `Swap = o + 2` (mod 3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferRing {
    offset: usize,
}

impl BufferRing {
    pub const LEN: usize = 3;

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Slot indices for `[In, Out, Swap]`.
    pub fn roles(&self) -> [usize; 3] {
        Self::roles_at(self.offset)
    }

    pub fn roles_at(offset: usize) -> [usize; 3] {
        [offset % 3, (offset + 1) % 3, (offset + 2) % 3]
    }

    /// `(In, Out, Swap) → (Out, Swap, In)`.
    pub fn rotate(&mut self) {
        self.offset = (self.offset + 1) % Self::LEN;
    }

    pub fn reset(&mut self) {
        self.offset = 0;
    }
}

// ======================== Driver ========================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverState {
    Uninitialized,
    Ready,
    Dispatching,
    Disposed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched,
    /// Nothing to do: no paint request, or the driver is not ready.
    Skipped,
    /// Bindings did not match the allocated buffers; rebinding is forced.
    Dropped,
}

const CELL_LABELS: [&str; 3] = ["cells_0", "cells_1", "cells_2"];

pub struct Driver<B: ComputeBackend> {
    state: DriverState,
    /// Requested dimensions. Resources follow on the next sync.
    dims: GridDimensions,
    allocated: Option<GridDimensions>,
    target: DeviceSlot<B::Image>,
    cells: [DeviceSlot<B::Buffer>; 3],
    ring: BufferRing,
    /// Per entry point, one binding per ring offset.
    bindings: [Vec<B::Binding>; 2],
    bound_for: Option<GridDimensions>,
    generation: u64,
}

impl<B: ComputeBackend> Driver<B> {
    pub fn new(dims: GridDimensions) -> Self {
        Self {
            state: DriverState::Uninitialized,
            dims,
            allocated: None,
            target: DeviceSlot::default(),
            cells: Default::default(),
            ring: BufferRing::default(),
            bindings: [Vec::new(), Vec::new()],
            bound_for: None,
            generation: 0,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn dims(&self) -> GridDimensions {
        self.dims
    }

    #[cfg(test)]
    pub fn ring(&self) -> BufferRing {
        self.ring
    }

    /// Completed step dispatches since initialization.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn render_target(&self) -> Option<&B::Image> {
        self.target.get()
    }

    /// Buffer currently holding the most recent completed state.
    pub fn current_cells(&self) -> Option<&B::Buffer> {
        self.cells[self.ring.roles()[0]].get()
    }

    /// Allocate the render target and cell buffers, bind both entry points
    /// and upload the static parameters. `seed` becomes the first state when
    /// its size matches the grid.
    pub fn initialize(&mut self, backend: &mut B, seed: &CellGrid) -> Result<()> {
        match self.state {
            DriverState::Disposed => return Err(SandboxError::Disposed),
            DriverState::Ready | DriverState::Dispatching => return Ok(()),
            DriverState::Uninitialized => {}
        }
        // Non-positive or oversized resources never reach the device.
        let dims = GridDimensions::new(self.dims.size, self.dims.scale)?;
        backend.limits().check(&dims)?;

        self.allocate(backend, dims, Some(seed));
        self.rebind(backend);
        self.state = DriverState::Ready;
        log::info!(
            "Driver ready: grid {}x{}, target {}x{}",
            dims.size[0],
            dims.size[1],
            dims.scale[0],
            dims.scale[1]
        );
        self.refresh(backend);
        Ok(())
    }

    /// Request a new logical grid size. Buffers are reallocated and rebound
    /// before the next dispatch.
    pub fn resize(&mut self, backend: &B, size: [u32; 2]) -> Result<()> {
        self.request(backend, |dims| dims.with_size(size))
    }

    /// Request a new render target resolution.
    pub fn set_texture_scale(&mut self, backend: &B, scale: [u32; 2]) -> Result<()> {
        self.request(backend, |dims| dims.with_scale(scale))
    }

    /// Bring device resources in line with the requested dimensions.
    /// Returns true when anything was reallocated.
    pub fn sync(&mut self, backend: &mut B) -> bool {
        if self.state != DriverState::Ready || self.allocated == Some(self.dims) {
            return false;
        }
        let dims = self.dims;
        self.allocate(backend, dims, None);
        self.rebind(backend);
        self.refresh(backend);
        true
    }

    /// Overwrite the current state with `grid`.
    pub fn reload(&mut self, backend: &mut B, grid: &CellGrid) -> Result<()> {
        match self.state {
            DriverState::Uninitialized => return Err(SandboxError::NotInitialized),
            DriverState::Disposed => return Err(SandboxError::Disposed),
            _ => {}
        }
        self.sync(backend);
        if grid.size() != self.dims.size {
            log::warn!(
                "Reload ignored: grid {:?} does not match {:?}",
                grid.size(),
                self.dims.size
            );
            return Ok(());
        }
        if let Some(buffer) = self.cells[self.ring.roles()[0]].get() {
            backend.write_cells(buffer, grid.cells());
        }
        self.refresh(backend);
        Ok(())
    }

    pub fn on_game_tick(&mut self, backend: &mut B) -> DispatchOutcome {
        let outcome = self.run(backend, EntryPoint::Step);
        if outcome == DispatchOutcome::Dispatched {
            self.generation += 1;
        }
        outcome
    }

    pub fn on_input_tick(
        &mut self,
        backend: &mut B,
        request: Option<&PaintRequest>,
    ) -> DispatchOutcome {
        let Some(request) = request else {
            return DispatchOutcome::Skipped;
        };
        if self.state != DriverState::Ready {
            return DispatchOutcome::Skipped;
        }
        self.sync(backend);
        let params = KernelParams::for_grid(&self.dims).with_paint(request);
        backend.write_params(EntryPoint::Paint, &params);
        self.run(backend, EntryPoint::Paint)
    }

    /// Release every device resource. Safe to call repeatedly and before
    /// initialization.
    pub fn teardown(&mut self, backend: &mut B) {
        for slot in &mut self.cells {
            slot.release_with(|buffer| backend.release_buffer(buffer));
        }
        self.target
            .release_with(|image| backend.release_render_target(image));
        for set in &mut self.bindings {
            set.clear();
        }
        self.allocated = None;
        self.bound_for = None;
        if self.state != DriverState::Disposed {
            log::info!("Driver torn down after {} generations", self.generation);
        }
        self.state = DriverState::Disposed;
    }

    pub fn read_current(&self, backend: &mut B) -> Result<Vec<u32>> {
        let buffer = self.current_cells().ok_or(SandboxError::NotInitialized)?;
        backend.read_cells(buffer)
    }

    // ---- internals ----

    fn request(
        &mut self,
        backend: &B,
        change: impl FnOnce(&GridDimensions) -> Result<GridDimensions>,
    ) -> Result<()> {
        if self.state == DriverState::Disposed {
            return Err(SandboxError::Disposed);
        }
        let dims = change(&self.dims)?;
        backend.limits().check(&dims)?;
        self.dims = dims;
        Ok(())
    }

    fn run(&mut self, backend: &mut B, entry: EntryPoint) -> DispatchOutcome {
        if self.state != DriverState::Ready {
            return DispatchOutcome::Skipped;
        }
        self.sync(backend);
        if self.bound_for != Some(self.dims) {
            self.rebind(backend);
        }
        if !self.resources_match(backend) {
            log::warn!(
                "{} dispatch dropped: bindings stale for grid {:?}",
                entry.name(),
                self.dims.size
            );
            self.bound_for = None;
            if !self.buffers_sized(backend) {
                self.allocated = None;
            }
            return DispatchOutcome::Dropped;
        }

        let Some(target) = self.target.get() else {
            return DispatchOutcome::Dropped;
        };
        let workgroups = workgroup_count(backend.render_target_size(target));
        let Some(binding) = self.bindings[entry.index()].get(self.ring.offset()) else {
            self.bound_for = None;
            return DispatchOutcome::Dropped;
        };

        self.state = DriverState::Dispatching;
        backend.dispatch(entry, binding, workgroups);
        self.ring.rotate();
        self.state = DriverState::Ready;
        log::debug!("{} dispatched over {:?}", entry.name(), workgroups);
        DispatchOutcome::Dispatched
    }

    /// Copy the current state through the paint kernel with an empty stamp so
    /// the render target shows it.
    fn refresh(&mut self, backend: &mut B) {
        let blank = PaintRequest {
            center: [0, 0],
            radius: -1,
            fill: false,
        };
        let params = KernelParams::for_grid(&self.dims).with_paint(&blank);
        backend.write_params(EntryPoint::Paint, &params);
        self.run(backend, EntryPoint::Paint);
    }

    fn allocate(&mut self, backend: &mut B, dims: GridDimensions, seed: Option<&CellGrid>) {
        let previous = self.allocated;
        if previous.map(|d| d.scale) != Some(dims.scale) {
            let fresh = backend.create_render_target(dims.scale);
            self.target
                .replace_with(fresh, |old| backend.release_render_target(old));
        }

        let blank = vec![DEAD; dims.cell_count()];
        let first = match seed {
            Some(grid) if grid.size() == dims.size => grid.cells(),
            Some(grid) => {
                log::warn!(
                    "Seed grid {:?} does not match {:?}; starting empty",
                    grid.size(),
                    dims.size
                );
                &blank[..]
            }
            None => &blank[..],
        };
        let size_changed = previous.map(|d| d.size) != Some(dims.size);
        for (i, slot) in self.cells.iter_mut().enumerate() {
            if size_changed || !slot.is_allocated() {
                let contents = if i == 0 { first } else { &blank[..] };
                ensure_capacity(backend, slot, CELL_LABELS[i], contents);
            }
        }
        if size_changed {
            self.ring.reset();
            if previous.is_some() {
                log::info!("Cell buffers reallocated for {}x{}", dims.size[0], dims.size[1]);
            }
        }

        let params = KernelParams::for_grid(&dims);
        for entry in EntryPoint::ALL {
            backend.write_params(entry, &params);
        }
        self.allocated = Some(dims);
        self.bound_for = None;
    }

    fn rebind(&mut self, backend: &mut B) {
        for set in &mut self.bindings {
            set.clear();
        }
        let Some(target) = self.target.get() else {
            return;
        };
        let buffers: Vec<&B::Buffer> = self.cells.iter().filter_map(DeviceSlot::get).collect();
        if buffers.len() != BufferRing::LEN {
            return;
        }
        for entry in EntryPoint::ALL {
            for offset in 0..BufferRing::LEN {
                let [i, o, s] = BufferRing::roles_at(offset);
                let binding = backend.bind(entry, target, [buffers[i], buffers[o], buffers[s]]);
                self.bindings[entry.index()].push(binding);
            }
        }
        self.bound_for = self.allocated;
    }

    fn buffers_sized(&self, backend: &B) -> bool {
        let target_ok = self
            .target
            .get()
            .is_some_and(|target| backend.render_target_size(target) == self.dims.scale);
        let expected = self.dims.cell_count();
        target_ok
            && self.cells.iter().all(|slot| {
                slot.get()
                    .is_some_and(|buffer| backend.cell_buffer_len(buffer) == expected)
            })
    }

    fn resources_match(&self, backend: &B) -> bool {
        self.buffers_sized(backend)
            && self.bound_for == Some(self.dims)
            && self
                .bindings
                .iter()
                .all(|set| set.len() == BufferRing::LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::ALIVE;
    use crate::kernel::cpu::{CpuBackend, CpuBinding, CpuBuffer, CpuImage, ALIVE_COLOR};
    use crate::kernel::DeviceLimits;
    use std::cell::Cell;

    /// CPU backend that reports wrong buffer lengths a set number of times,
    /// as a device would after a resize raced ahead of its bindings.
    #[derive(Default)]
    struct MisreportingBackend {
        inner: CpuBackend,
        misreports: Cell<u32>,
    }

    impl ComputeBackend for MisreportingBackend {
        type Buffer = CpuBuffer;
        type Image = CpuImage;
        type Binding = CpuBinding;

        fn limits(&self) -> DeviceLimits {
            self.inner.limits()
        }

        fn create_cell_buffer(&mut self, label: &str, cells: &[u32]) -> CpuBuffer {
            self.inner.create_cell_buffer(label, cells)
        }

        fn write_cells(&mut self, buffer: &CpuBuffer, cells: &[u32]) {
            self.inner.write_cells(buffer, cells)
        }

        fn read_cells(&mut self, buffer: &CpuBuffer) -> Result<Vec<u32>> {
            self.inner.read_cells(buffer)
        }

        fn cell_buffer_len(&self, buffer: &CpuBuffer) -> usize {
            let len = self.inner.cell_buffer_len(buffer);
            match self.misreports.get() {
                0 => len,
                n => {
                    self.misreports.set(n - 1);
                    len + 1
                }
            }
        }

        fn release_buffer(&mut self, buffer: CpuBuffer) {
            self.inner.release_buffer(buffer)
        }

        fn create_render_target(&mut self, scale: [u32; 2]) -> CpuImage {
            self.inner.create_render_target(scale)
        }

        fn render_target_size(&self, image: &CpuImage) -> [u32; 2] {
            self.inner.render_target_size(image)
        }

        fn release_render_target(&mut self, image: CpuImage) {
            self.inner.release_render_target(image)
        }

        fn write_params(&mut self, entry: EntryPoint, params: &KernelParams) {
            self.inner.write_params(entry, params)
        }

        fn bind(
            &mut self,
            entry: EntryPoint,
            target: &CpuImage,
            cells: [&CpuBuffer; 3],
        ) -> CpuBinding {
            self.inner.bind(entry, target, cells)
        }

        fn dispatch(&mut self, entry: EntryPoint, binding: &CpuBinding, workgroups: [u32; 3]) {
            self.inner.dispatch(entry, binding, workgroups)
        }
    }

    fn ready_driver(size: [u32; 2], scale: [u32; 2]) -> (CpuBackend, Driver<CpuBackend>) {
        let dims = GridDimensions::new(size, scale).unwrap();
        let mut backend = CpuBackend::new();
        let mut driver = Driver::new(dims);
        driver
            .initialize(&mut backend, &CellGrid::new(size))
            .unwrap();
        (backend, driver)
    }

    fn fill_at(center: [i32; 2], radius: i32) -> PaintRequest {
        PaintRequest {
            center,
            radius,
            fill: true,
        }
    }

    #[test]
    fn test_ring_rotation_roles() {
        let mut ring = BufferRing::default();
        assert_eq!(ring.roles(), [0, 1, 2]);
        ring.rotate();
        assert_eq!(ring.roles(), [1, 2, 0]);
        ring.rotate();
        ring.rotate();
        assert_eq!(ring.roles(), [0, 1, 2]);
    }

    #[test]
    fn test_initialize_allocates_everything() {
        let (backend, driver) = ready_driver([8, 8], [32, 32]);
        assert_eq!(driver.state(), DriverState::Ready);
        assert_eq!(backend.live_buffers(), 3);
        assert_eq!(backend.live_images(), 1);
        assert!(driver.render_target().is_some());
    }

    #[test]
    fn test_step_rotation_cycles_mod_three() {
        let (mut backend, mut driver) = ready_driver([8, 8], [32, 32]);
        let start = driver.ring().offset();
        let before = backend.history().len();

        for n in 1..=7 {
            assert_eq!(driver.on_game_tick(&mut backend), DispatchOutcome::Dispatched);
            assert_eq!(driver.ring().offset(), (start + n) % 3);
        }
        assert_eq!(driver.generation(), 7);

        let steps = &backend.history()[before..];
        assert_eq!(steps.len(), 7);
        for record in steps {
            assert_eq!(record.entry, EntryPoint::Step);
            assert_eq!(record.workgroups, [2, 2, 1]);
            let [i, o, s] = record.binding.cell_ids();
            assert!(i != o && o != s && i != s);
        }
        for pair in steps.windows(2) {
            let [_, prev_out, _] = pair[0].binding.cell_ids();
            let [next_in, next_out, _] = pair[1].binding.cell_ids();
            assert_eq!(next_in, prev_out);
            assert_ne!(next_out, prev_out);
        }
    }

    #[test]
    fn test_paint_then_step_sees_painted_state() {
        let (mut backend, mut driver) = ready_driver([10, 10], [40, 40]);
        let outcome = driver.on_input_tick(&mut backend, Some(&fill_at([5, 5], 1)));
        assert_eq!(outcome, DispatchOutcome::Dispatched);

        let cells = driver.read_current(&mut backend).unwrap();
        let mut expected = CellGrid::new([10, 10]);
        expected.paint([5, 5], 1, ALIVE);
        assert_eq!(cells, expected.cells());

        // A full 3x3 block: corners survive, the centre and edges die, and one
        // cell is born beyond each edge.
        driver.on_game_tick(&mut backend);
        let cells = driver.read_current(&mut backend).unwrap();
        let alive: Vec<(usize, usize)> = (0..100)
            .filter(|&i| cells[i] == ALIVE)
            .map(|i| (i % 10, i / 10))
            .collect();
        assert_eq!(
            alive,
            vec![(5, 3), (4, 4), (6, 4), (3, 5), (7, 5), (4, 6), (6, 6), (5, 7)]
        );

        let target = driver.render_target().unwrap();
        assert_eq!(backend.pixel(target, 5 * 4, 3 * 4 + 1), Some(ALIVE_COLOR));
    }

    #[test]
    fn test_input_tick_without_request_does_nothing() {
        let (mut backend, mut driver) = ready_driver([8, 8], [16, 16]);
        let dispatched = backend.history().len();
        let offset = driver.ring().offset();
        assert_eq!(
            driver.on_input_tick(&mut backend, None),
            DispatchOutcome::Skipped
        );
        assert_eq!(backend.history().len(), dispatched);
        assert_eq!(driver.ring().offset(), offset);
    }

    #[test]
    fn test_resize_then_dispatch_uses_fresh_buffers() {
        let (mut backend, mut driver) = ready_driver([8, 8], [64, 64]);
        driver.on_input_tick(&mut backend, Some(&fill_at([3, 3], 2)));

        driver.resize(&backend, [32, 16]).unwrap();
        assert_eq!(driver.on_game_tick(&mut backend), DispatchOutcome::Dispatched);
        assert_eq!(
            driver.on_input_tick(&mut backend, Some(&fill_at([31, 15], 3))),
            DispatchOutcome::Dispatched
        );
        driver.on_game_tick(&mut backend);

        assert_eq!(backend.live_buffers(), 3);
        let cells = driver.read_current(&mut backend).unwrap();
        assert_eq!(cells.len(), 32 * 16);

        // Shrink below the old size as well.
        driver.resize(&backend, [4, 4]).unwrap();
        assert_eq!(driver.on_game_tick(&mut backend), DispatchOutcome::Dispatched);
        assert_eq!(driver.read_current(&mut backend).unwrap().len(), 16);
        assert_eq!(backend.live_buffers(), 3);
    }

    #[test]
    fn test_resize_with_same_cell_count_clears_state() {
        let (mut backend, mut driver) = ready_driver([8, 4], [64, 64]);
        driver.on_input_tick(&mut backend, Some(&fill_at([0, 0], 10)));
        driver.resize(&backend, [4, 8]).unwrap();
        assert!(driver.sync(&mut backend));
        let cells = driver.read_current(&mut backend).unwrap();
        assert!(cells.iter().all(|&c| c == DEAD));
    }

    #[test]
    fn test_invalid_resize_is_rejected() {
        let (mut backend, mut driver) = ready_driver([8, 8], [16, 16]);
        assert!(matches!(
            driver.resize(&backend, [0, 8]),
            Err(SandboxError::InvalidGridSize { .. })
        ));
        assert!(matches!(
            driver.resize(&backend, [32, 8]),
            Err(SandboxError::ScaleBelowGrid { .. })
        ));
        assert_eq!(driver.dims().size, [8, 8]);
        assert_eq!(driver.on_game_tick(&mut backend), DispatchOutcome::Dispatched);
    }

    #[test]
    fn test_texture_scale_change_replaces_target() {
        let (mut backend, mut driver) = ready_driver([8, 8], [16, 16]);
        driver.set_texture_scale(&backend, [48, 40]).unwrap();
        driver.on_game_tick(&mut backend);
        let target = driver.render_target().unwrap();
        assert_eq!(backend.render_target_size(target), [48, 40]);
        assert_eq!(backend.live_images(), 1);
        assert_eq!(backend.history().last().unwrap().workgroups, [3, 3, 1]);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let (mut backend, mut driver) = ready_driver([8, 8], [16, 16]);
        driver.teardown(&mut backend);
        driver.teardown(&mut backend);
        assert_eq!(driver.state(), DriverState::Disposed);
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_images(), 0);

        let dispatched = backend.history().len();
        assert_eq!(driver.on_game_tick(&mut backend), DispatchOutcome::Skipped);
        assert_eq!(
            driver.on_input_tick(&mut backend, Some(&fill_at([1, 1], 1))),
            DispatchOutcome::Skipped
        );
        assert_eq!(backend.history().len(), dispatched);
        assert!(matches!(
            driver.initialize(&mut backend, &CellGrid::new([8, 8])),
            Err(SandboxError::Disposed)
        ));
    }

    #[test]
    fn test_teardown_before_initialize() {
        let dims = GridDimensions::new([4, 4], [4, 4]).unwrap();
        let mut backend = CpuBackend::new();
        let mut driver: Driver<CpuBackend> = Driver::new(dims);
        assert_eq!(driver.on_game_tick(&mut backend), DispatchOutcome::Skipped);
        driver.teardown(&mut backend);
        driver.teardown(&mut backend);
        assert_eq!(driver.state(), DriverState::Disposed);
        assert!(backend.history().is_empty());
    }

    #[test]
    fn test_seed_and_reload() {
        let dims = GridDimensions::new([6, 6], [12, 12]).unwrap();
        let mut seed = CellGrid::new([6, 6]);
        seed.paint([2, 2], 0, ALIVE);
        let mut backend = CpuBackend::new();
        let mut driver = Driver::new(dims);
        assert!(matches!(
            driver.reload(&mut backend, &seed),
            Err(SandboxError::NotInitialized)
        ));
        driver.initialize(&mut backend, &seed).unwrap();
        assert_eq!(driver.read_current(&mut backend).unwrap(), seed.cells());

        let blank = CellGrid::new([6, 6]);
        driver.reload(&mut backend, &blank).unwrap();
        assert_eq!(driver.read_current(&mut backend).unwrap(), blank.cells());

        // Wrong size is ignored.
        driver.reload(&mut backend, &seed).unwrap();
        driver.reload(&mut backend, &CellGrid::new([3, 3])).unwrap();
        assert_eq!(driver.read_current(&mut backend).unwrap(), seed.cells());
    }

    #[test]
    fn test_ensure_capacity_reuses_matching_buffer() {
        let mut backend = CpuBackend::new();
        let mut slot = DeviceSlot::default();
        assert!(ensure_capacity(&mut backend, &mut slot, "a", &[1, 2, 3]));
        let first = slot.get().unwrap().id();
        assert!(!ensure_capacity(&mut backend, &mut slot, "a", &[4, 5, 6]));
        assert_eq!(slot.get().unwrap().id(), first);
        assert_eq!(backend.read_cells(slot.get().unwrap()).unwrap(), vec![4, 5, 6]);
        assert!(ensure_capacity(&mut backend, &mut slot, "a", &[0; 5]));
        assert_ne!(slot.get().unwrap().id(), first);
        assert_eq!(backend.live_buffers(), 1);

        slot.release_with(|b| backend.release_buffer(b));
        slot.release_with(|b| backend.release_buffer(b));
        assert_eq!(backend.live_buffers(), 0);
    }

    #[test]
    fn test_stale_buffer_length_drops_one_dispatch() {
        let dims = GridDimensions::new([5, 5], [20, 20]).unwrap();
        let mut seed = CellGrid::new(dims.size);
        for x in 1..=3 {
            seed.paint([x, 2], 0, ALIVE);
        }
        let mut backend = MisreportingBackend::default();
        let mut driver = Driver::new(dims);
        driver.initialize(&mut backend, &seed).unwrap();

        let offset = driver.ring().offset();
        let dispatched = backend.inner.history().len();
        backend.misreports.set(1);

        assert_eq!(driver.on_game_tick(&mut backend), DispatchOutcome::Dropped);
        assert_eq!(driver.ring().offset(), offset);
        assert_eq!(driver.generation(), 0);
        assert_eq!(backend.inner.history().len(), dispatched);
        assert_eq!(driver.read_current(&mut backend).unwrap(), seed.cells());

        assert_eq!(driver.on_game_tick(&mut backend), DispatchOutcome::Dispatched);
        assert_eq!(driver.ring().offset(), (offset + 1) % BufferRing::LEN);
        assert_eq!(driver.generation(), 1);
        assert_eq!(backend.inner.history().len(), dispatched + 1);
        assert_eq!(backend.inner.live_buffers(), 3);

        let cells = driver.read_current(&mut backend).unwrap();
        assert_eq!(cells.len(), dims.cell_count());
        let alive: Vec<usize> = (0..cells.len()).filter(|&i| cells[i] == ALIVE).collect();
        assert_eq!(alive, vec![7, 12, 17]);
    }

    #[test]
    fn test_initialize_rejects_resources_beyond_device_limits() {
        let dims = GridDimensions::new([8, 8], [256, 256]).unwrap();
        let mut backend = CpuBackend::with_limits(DeviceLimits {
            max_texture_dimension: 128,
            ..DeviceLimits::UNLIMITED
        });
        let mut driver = Driver::new(dims);
        assert!(matches!(
            driver.initialize(&mut backend, &CellGrid::new(dims.size)),
            Err(SandboxError::ExceedsDeviceLimits { requested: 256, limit: 128, .. })
        ));
        assert_eq!(driver.state(), DriverState::Uninitialized);
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_images(), 0);
        assert_eq!(driver.on_game_tick(&mut backend), DispatchOutcome::Skipped);
    }

    #[test]
    fn test_resize_beyond_device_limits_keeps_dims() {
        let dims = GridDimensions::new([8, 8], [64, 64]).unwrap();
        let mut backend = CpuBackend::with_limits(DeviceLimits {
            max_buffer_bytes: 64 * 64 * 4,
            ..DeviceLimits::UNLIMITED
        });
        let mut driver = Driver::new(dims);
        driver
            .initialize(&mut backend, &CellGrid::new(dims.size))
            .unwrap();

        driver.resize(&backend, [64, 64]).unwrap();
        driver.set_texture_scale(&backend, [128, 64]).unwrap();
        assert!(matches!(
            driver.resize(&backend, [128, 64]),
            Err(SandboxError::ExceedsDeviceLimits { limit: 16384, .. })
        ));
        assert_eq!(driver.dims().size, [64, 64]);
        assert_eq!(driver.on_game_tick(&mut backend), DispatchOutcome::Dispatched);
        assert_eq!(driver.read_current(&mut backend).unwrap().len(), 64 * 64);
    }
}
