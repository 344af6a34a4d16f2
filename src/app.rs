// ============================================================================
// app.rs — lifegrid
// Application state and winit event-loop handler.
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use winit::{
    application::ApplicationHandler,
    event::{DeviceEvent, DeviceId, ElementState, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, NamedKey},
    window::{CursorGrabMode, Window, WindowAttributes},
};

use crate::camera::CursorMode;
use crate::config::SandboxConfig;
use crate::error::{Result, SandboxError};
use crate::input::{Command, InputState, PointerButton};
use crate::kernel::gpu::{request_device, GpuBackend};
use crate::present::Presenter;
use crate::renderer::{HudRenderer, HudStats};
use crate::sandbox::Sandbox;

/// Open a window and run the sandbox until it is closed.
pub fn run(config: SandboxConfig) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

// ======================== Application ========================

pub struct App {
    state: Option<AppState>,
    config: SandboxConfig,
    failure: Option<SandboxError>,
}

struct AppState {
    // GPU
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    backend: GpuBackend,

    // Window
    window: Arc<Window>,

    // Simulation
    sandbox: Sandbox<GpuBackend>,
    input: InputState,

    // Drawing
    presenter: Presenter,
    hud: HudRenderer,

    // Timing
    started: Instant,
    last_redraw: Instant,
    fps: f32,
}

impl App {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            state: None,
            config,
            failure: None,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        match init_state(event_loop, &self.config) {
            Ok(state) => {
                // Initial redraw, required on macOS with winit 0.30
                state.window.request_redraw();
                self.state = Some(state);
            }
            Err(err) => {
                log::error!("Startup failed: {err}");
                self.failure = Some(err);
                event_loop.exit();
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(state) = &mut self.state else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),

            WindowEvent::KeyboardInput { event, .. } => {
                handle_keyboard(state, event_loop, &event);
            }

            WindowEvent::ModifiersChanged(modifiers) => {
                state.input.set_modifier(modifiers.state().shift_key());
            }

            WindowEvent::MouseInput {
                state: button_state,
                button,
                ..
            } => {
                let pointer = match button {
                    MouseButton::Left => PointerButton::Fill,
                    MouseButton::Right => PointerButton::Clear,
                    MouseButton::Middle => PointerButton::Pan,
                    _ => return,
                };
                state
                    .input
                    .button(pointer, button_state == ElementState::Pressed);
            }

            WindowEvent::CursorMoved { position, .. } => {
                state
                    .input
                    .cursor_moved([position.x as f32, position.y as f32]);
            }

            WindowEvent::CursorLeft { .. } => state.input.cursor_left(),

            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match &delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.01,
                };
                state.input.scroll(scroll);
            }

            WindowEvent::Resized(new_size) => {
                if new_size.width > 0 && new_size.height > 0 {
                    state.surface_config.width = new_size.width;
                    state.surface_config.height = new_size.height;
                    state
                        .surface
                        .configure(state.backend.device(), &state.surface_config);
                }
            }

            WindowEvent::RedrawRequested => {
                redraw(state);
            }

            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        let Some(state) = &mut self.state else {
            return;
        };
        // Panning reads raw motion so it keeps working with the cursor grabbed.
        if let DeviceEvent::MouseMotion { delta } = event {
            state
                .input
                .pointer_motion([delta.0 as f32, delta.1 as f32]);
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &mut self.state {
            state.sandbox.teardown(&mut state.backend);
        }
    }
}

// ======================== GPU Initialization ========================

fn init_state(event_loop: &ActiveEventLoop, config: &SandboxConfig) -> Result<AppState> {
    let window_attrs = WindowAttributes::default()
        .with_title("lifegrid")
        .with_inner_size(winit::dpi::LogicalSize::new(1024u32, 1024u32));
    let window = Arc::new(event_loop.create_window(window_attrs)?);

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let surface = instance.create_surface(window.clone())?;
    let (adapter, device, queue) = pollster::block_on(request_device(&instance, Some(&surface)))?;

    let surface_config = surface_config(&surface, &adapter, &window, config.vsync);
    surface.configure(&device, &surface_config);

    let presenter = Presenter::new(&device, surface_config.format);
    let hud = HudRenderer::new(&device, &queue, surface_config.format);
    let mut backend = GpuBackend::new(device, queue);

    let mut sandbox = Sandbox::new(config)?;
    sandbox.initialize(&mut backend)?;

    log::info!(
        "lifegrid initialized: grid {}x{}, texture {}x{}",
        config.grid_size[0],
        config.grid_size[1],
        config.texture_scale[0],
        config.texture_scale[1]
    );

    let now = Instant::now();
    Ok(AppState {
        surface,
        surface_config,
        backend,
        window,
        sandbox,
        input: InputState::default(),
        presenter,
        hud,
        started: now,
        last_redraw: now,
        fps: 0.0,
    })
}

fn surface_config(
    surface: &wgpu::Surface<'_>,
    adapter: &wgpu::Adapter,
    window: &Window,
    vsync: bool,
) -> wgpu::SurfaceConfiguration {
    let size = window.inner_size();
    let surface_caps = surface.get_capabilities(adapter);
    let surface_format = surface_caps
        .formats
        .iter()
        .find(|f| f.is_srgb())
        .copied()
        .unwrap_or(surface_caps.formats[0]);

    // Without vsync prefer Mailbox (no tearing), then Immediate.
    let present_mode = if vsync {
        log::info!("Present mode: Fifo (VSync ON)");
        wgpu::PresentMode::Fifo
    } else if surface_caps.present_modes.contains(&wgpu::PresentMode::Mailbox) {
        log::info!("Present mode: Mailbox (uncapped FPS)");
        wgpu::PresentMode::Mailbox
    } else if surface_caps.present_modes.contains(&wgpu::PresentMode::Immediate) {
        log::info!("Present mode: Immediate (uncapped FPS)");
        wgpu::PresentMode::Immediate
    } else {
        log::info!("Present mode: Fifo (no uncapped mode available)");
        wgpu::PresentMode::Fifo
    };

    wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: surface_format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode,
        alpha_mode: surface_caps.alpha_modes[0],
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    }
}

// ======================== Keyboard Handling ========================

fn handle_keyboard(
    state: &mut AppState,
    event_loop: &ActiveEventLoop,
    event: &winit::event::KeyEvent,
) {
    if !event.state.is_pressed() || event.repeat {
        return;
    }

    match &event.logical_key {
        Key::Named(NamedKey::Escape) => event_loop.exit(),
        Key::Named(NamedKey::Space) => state.input.toggle_pause(),
        Key::Character(c) => match c.as_str() {
            "c" | "C" => state.input.push_command(Command::ClearGrid),
            "r" | "R" => state.input.push_command(Command::Reseed),
            "[" => state.input.push_command(Command::ShrinkGrid),
            "]" => state.input.push_command(Command::GrowGrid),
            _ => {}
        },
        _ => {}
    }
}

fn apply_cursor_mode(window: &Window, mode: CursorMode) {
    match mode {
        CursorMode::Captured => {
            window.set_cursor_visible(false);
            let grabbed = window
                .set_cursor_grab(CursorGrabMode::Confined)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Locked));
            if let Err(err) = grabbed {
                log::warn!("Cursor grab unavailable: {err}");
            }
        }
        CursorMode::Free => {
            window.set_cursor_visible(true);
            if let Err(err) = window.set_cursor_grab(CursorGrabMode::None) {
                log::warn!("Cursor release failed: {err}");
            }
        }
    }
}

// ======================== Frame Rendering ========================

fn redraw(state: &mut AppState) {
    // FPS (exponential moving average)
    let now = Instant::now();
    let dt = now.duration_since(state.last_redraw).as_secs_f32().max(0.0001);
    state.last_redraw = now;
    state.fps = state.fps * 0.95 + (1.0 / dt) * 0.05;

    let win_w = state.surface_config.width;
    let win_h = state.surface_config.height;

    // ---- Simulation ----
    let frame = state.input.take_frame([win_w as f32, win_h as f32]);
    let report = state
        .sandbox
        .on_frame(&mut state.backend, state.started.elapsed(), dt, &frame);
    if report.cursor_changed {
        apply_cursor_mode(&state.window, report.cursor);
    }

    // ---- Prepare presentation + HUD ----
    let (target, viewport) = state.sandbox.presentation();
    state.presenter.prepare(
        state.backend.device(),
        state.backend.queue(),
        target,
        &viewport,
    );

    let stats = HudStats {
        generation: state.sandbox.driver().generation(),
        fps: state.fps,
        paused: state.sandbox.is_paused(),
        zoom: state.sandbox.view().zoom(),
        edit_radius: state.sandbox.grid().edit_radius(),
        grid_size: state.sandbox.grid().dims().size,
    };
    state.hud.prepare(
        state.backend.device(),
        state.backend.queue(),
        &stats,
        win_w,
        win_h,
    );

    // ---- Render pass ----
    let output = match state.surface.get_current_texture() {
        Ok(t) => t,
        Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
            state
                .surface
                .configure(state.backend.device(), &state.surface_config);
            return;
        }
        Err(e) => {
            log::error!("Surface error: {:?}", e);
            return;
        }
    };

    let view = output
        .texture
        .create_view(&wgpu::TextureViewDescriptor::default());

    let mut encoder = state
        .backend
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("render_encoder"),
        });

    {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("render_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color {
                        r: 0.02,
                        g: 0.02,
                        b: 0.05,
                        a: 1.0,
                    }),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        state.presenter.draw(&mut pass);
        state.hud.render(&mut pass);
    }

    state
        .backend
        .queue()
        .submit(std::iter::once(encoder.finish()));
    output.present();
    state.hud.trim();
}
