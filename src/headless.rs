// ============================================================================
// headless.rs — lifegrid
// Windowless batch runner: steps the automaton a fixed number of generations
// on the GPU (or the CPU backend) and logs progress.
// ============================================================================

use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::SandboxConfig;
use crate::driver::{DispatchOutcome, Driver};
use crate::error::Result;
use crate::grid::{CellGrid, DEAD};
use crate::kernel::cpu::CpuBackend;
use crate::kernel::gpu::{request_device, GpuBackend};
use crate::kernel::ComputeBackend;

/// Density used when the configuration asks for an empty start, which would
/// otherwise stay empty forever.
const HEADLESS_FILL: f32 = 0.25;

#[derive(Clone, Debug)]
pub struct HeadlessConfig {
    pub ticks: u32,
    pub progress_interval: u32,
    pub use_cpu: bool,
    pub seed: Option<u64>,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            ticks: 1000,
            progress_interval: 100,
            use_cpu: false,
            seed: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeadlessSummary {
    pub generations: u64,
    pub live_cells: usize,
}

pub fn run_headless(sandbox: &SandboxConfig, config: &HeadlessConfig) -> Result<HeadlessSummary> {
    if config.use_cpu {
        log::info!("Headless backend: CPU");
        let mut backend = CpuBackend::new();
        let summary = run_with(&mut backend, sandbox, config)?;
        log::debug!("CPU backend ran {} dispatches", backend.history().len());
        if backend.live_buffers() + backend.live_images() > 0 {
            log::warn!(
                "CPU backend still holds {} buffers and {} images",
                backend.live_buffers(),
                backend.live_images()
            );
        }
        return Ok(summary);
    }

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let (_adapter, device, queue) = pollster::block_on(request_device(&instance, None))?;
    run_with(&mut GpuBackend::new(device, queue), sandbox, config)
}

pub fn run_with<B: ComputeBackend>(
    backend: &mut B,
    sandbox: &SandboxConfig,
    config: &HeadlessConfig,
) -> Result<HeadlessSummary> {
    sandbox.validate()?;
    let dims = sandbox.dimensions()?;
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let fill = if sandbox.initial_fill > 0.0 {
        sandbox.initial_fill
    } else {
        HEADLESS_FILL
    };
    let seed = CellGrid::seeded(dims.size, fill, &mut rng);

    let mut driver = Driver::new(dims);
    driver.initialize(backend, &seed)?;

    log::info!(
        "Headless run started: {} generations on {}x{} ({} live)",
        config.ticks,
        dims.size[0],
        dims.size[1],
        seed.live_count()
    );

    let started = Instant::now();
    let mut last_report = Instant::now();
    let mut last_report_tick = 0u32;

    for tick in 0..config.ticks {
        if driver.on_game_tick(backend) == DispatchOutcome::Dropped {
            log::warn!("Generation {} dropped; retrying on the next tick", tick + 1);
        }

        let done = tick + 1;
        if config.progress_interval > 0 && done % config.progress_interval == 0 {
            let live = live_cells(&driver, backend)?;
            let total_elapsed = started.elapsed().as_secs_f64().max(1e-6);
            let window_elapsed = last_report.elapsed().as_secs_f64().max(1e-6);
            let window_rate = (done - last_report_tick) as f64 / window_elapsed;

            log::info!(
                "Headless progress: {}/{} | live={} | gen/s={:.0} (window {:.0})",
                done,
                config.ticks,
                live,
                done as f64 / total_elapsed,
                window_rate,
            );

            last_report = Instant::now();
            last_report_tick = done;
        }
    }

    let summary = HeadlessSummary {
        generations: driver.generation(),
        live_cells: live_cells(&driver, backend)?,
    };
    log::info!(
        "Headless run finished: {} generations, {} live cells in {:.2}s",
        summary.generations,
        summary.live_cells,
        started.elapsed().as_secs_f64()
    );
    driver.teardown(backend);
    Ok(summary)
}

fn live_cells<B: ComputeBackend>(driver: &Driver<B>, backend: &mut B) -> Result<usize> {
    Ok(driver
        .read_current(backend)?
        .iter()
        .filter(|&&cell| cell != DEAD)
        .count())
}
