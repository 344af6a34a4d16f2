// ============================================================================
// sandbox.rs — lifegrid
// Per-frame loop: evaluates both clocks, maps input to view/grid changes and
// paint requests, and drives the simulation/render driver.
// ============================================================================

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::camera::{CursorMode, ViewState, ViewportUniforms};
use crate::clock::Clock;
use crate::config::{ControlSettings, SandboxConfig};
use crate::driver::{DispatchOutcome, Driver};
use crate::error::Result;
use crate::grid::{CellGrid, GridDimensions, GridState};
use crate::input::{Command, FrameInput};
use crate::kernel::ComputeBackend;

/// Density used by reseed when the configuration asks for an empty start.
const DEFAULT_RESEED_FILL: f32 = 0.25;

/// What happened during one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    pub cursor: CursorMode,
    /// `cursor` differs from the previous frame.
    pub cursor_changed: bool,
    pub input: DispatchOutcome,
    pub game: DispatchOutcome,
}

pub struct Sandbox<B: ComputeBackend> {
    grid: GridState,
    view: ViewState,
    game_clock: Clock,
    input_clock: Clock,
    driver: Driver<B>,
    controls: ControlSettings,
    initial_fill: f32,
    rng: StdRng,
    cursor: CursorMode,
}

impl<B: ComputeBackend> Sandbox<B> {
    pub fn new(config: &SandboxConfig) -> Result<Self> {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: &SandboxConfig, rng: StdRng) -> Result<Self> {
        config.validate()?;
        let dims = config.dimensions()?;
        let mut game_clock = Clock::new(config.game_period());
        game_clock.set_paused(config.start_paused);

        Ok(Self {
            grid: GridState::new(dims, config.edit_radius),
            view: ViewState::default(),
            game_clock,
            input_clock: Clock::new(config.input_period()),
            driver: Driver::new(dims),
            controls: config.controls(),
            initial_fill: config.initial_fill,
            rng,
            cursor: CursorMode::Free,
        })
    }

    /// Allocate device resources and upload the initial cells.
    pub fn initialize(&mut self, backend: &mut B) -> Result<()> {
        let seed = CellGrid::seeded(self.grid.dims().size, self.initial_fill, &mut self.rng);
        self.driver.initialize(backend, &seed)?;
        log::info!(
            "Sandbox started with {} live cells{}",
            seed.live_count(),
            if self.game_clock.is_paused() { " (paused)" } else { "" }
        );
        Ok(())
    }

    pub fn grid(&self) -> &GridState {
        &self.grid
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn driver(&self) -> &Driver<B> {
        &self.driver
    }

    pub fn is_paused(&self) -> bool {
        self.game_clock.is_paused()
    }

    /// Render target plus the viewport it should be sampled through.
    pub fn presentation(&self) -> (Option<&B::Image>, ViewportUniforms) {
        (self.driver.render_target(), self.view.uniforms())
    }

    /// Run one frame. `now` is the time since the loop started, `dt` the
    /// previous frame's duration in seconds.
    pub fn on_frame(
        &mut self,
        backend: &mut B,
        now: Duration,
        dt: f32,
        input: &FrameInput,
    ) -> FrameReport {
        if input.pause_toggled {
            let paused = self.game_clock.toggle_paused();
            log::info!("Simulation {}", if paused { "paused" } else { "resumed" });
        }

        for &command in &input.commands {
            self.run_command(backend, command);
        }

        if input.scroll_y != 0.0 {
            if input.modifier {
                self.view
                    .apply_scroll(input.scroll_y, dt, self.controls.zoom_speed);
            } else {
                self.grid.adjust_radius(input.scroll_y.round() as i32);
            }
        }

        let cursor = self.view.apply_pan(
            input.pan,
            input.pointer_delta,
            dt,
            self.controls.pan_sensitivity,
        );
        let cursor_changed = cursor != self.cursor;
        self.cursor = cursor;

        self.driver.sync(backend);

        let mut report = FrameReport {
            cursor,
            cursor_changed,
            input: DispatchOutcome::Skipped,
            game: DispatchOutcome::Skipped,
        };

        if self.input_clock.tick(now) {
            let request = self.paint_target(input).map(|(cell, fill)| {
                self.grid.paint_request(cell, fill)
            });
            report.input = self.driver.on_input_tick(backend, request.as_ref());
        }
        if self.game_clock.tick(now) {
            report.game = self.driver.on_game_tick(backend);
        }
        report
    }

    /// Release all device resources and silence both clocks. Idempotent.
    pub fn teardown(&mut self, backend: &mut B) {
        self.game_clock.detach();
        self.input_clock.detach();
        self.driver.teardown(backend);
    }

    /// Fill wins over clear when both buttons are held.
    fn paint_target(&self, input: &FrameInput) -> Option<([i32; 2], bool)> {
        let fill = if input.fill {
            true
        } else if input.clear {
            false
        } else {
            return None;
        };
        let pointer = input.pointer_px?;
        if input.viewport_px[0] <= 0.0 || input.viewport_px[1] <= 0.0 {
            return None;
        }
        let cell = self
            .view
            .screen_to_cell(pointer, input.viewport_px, &self.grid.dims());
        Some((cell, fill))
    }

    fn run_command(&mut self, backend: &mut B, command: Command) {
        match command {
            Command::ClearGrid => {
                let blank = CellGrid::new(self.grid.dims().size);
                self.reload(backend, &blank);
            }
            Command::Reseed => {
                let density = if self.initial_fill > 0.0 {
                    self.initial_fill
                } else {
                    DEFAULT_RESEED_FILL
                };
                let soup = CellGrid::seeded(self.grid.dims().size, density, &mut self.rng);
                self.reload(backend, &soup);
            }
            Command::GrowGrid => {
                let [w, h] = self.grid.dims().size;
                self.resize(backend, [w.saturating_mul(2), h.saturating_mul(2)]);
            }
            Command::ShrinkGrid => {
                let [w, h] = self.grid.dims().size;
                self.resize(backend, [w / 2, h / 2]);
            }
        }
    }

    fn reload(&mut self, backend: &mut B, grid: &CellGrid) {
        if let Err(err) = self.driver.reload(backend, grid) {
            log::warn!("Reload skipped: {err}");
        }
    }

    fn resize(&mut self, backend: &B, size: [u32; 2]) {
        if let Err(err) = self.try_resize(backend, size) {
            log::warn!("Resize to {}x{} rejected: {err}", size[0], size[1]);
        }
    }

    /// The render target grows with the grid so every cell stays covered; it
    /// never shrinks. The combined shape is checked up front so the driver
    /// and the grid state change together or not at all.
    fn try_resize(&mut self, backend: &B, size: [u32; 2]) -> Result<()> {
        let current = self.driver.dims();
        let scale = [current.scale[0].max(size[0]), current.scale[1].max(size[1])];
        backend.limits().check(&GridDimensions::new(size, scale)?)?;

        if scale != current.scale {
            self.driver.set_texture_scale(backend, scale)?;
            self.grid.set_texture_scale(scale)?;
            log::info!("Render target grown to {}x{}", scale[0], scale[1]);
        }
        self.driver.resize(backend, size)?;
        self.grid.resize(size)
    }
}
