// ============================================================================
// error.rs — lifegrid
// Error taxonomy: configuration errors are fatal, lifecycle issues are absorbed.
// ============================================================================

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    // ---- Configuration ----
    #[error("grid size must be positive on both axes, got {width}x{height}")]
    InvalidGridSize { width: i64, height: i64 },

    #[error("texture scale must be positive on both axes, got {width}x{height}")]
    InvalidTextureScale { width: i64, height: i64 },

    #[error(
        "texture scale {scale_w}x{scale_h} is smaller than grid {grid_w}x{grid_h}; \
         every cell needs at least one pixel"
    )]
    ScaleBelowGrid {
        grid_w: u32,
        grid_h: u32,
        scale_w: u32,
        scale_h: u32,
    },

    #[error("tick period for the {0} clock must be greater than zero")]
    InvalidPeriod(&'static str),

    #[error("failed to read config {path:?}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path:?}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    // ---- Lifecycle ----
    #[error("driver has not been initialized")]
    NotInitialized,

    #[error("driver has already been torn down")]
    Disposed,

    // ---- Device ----
    #[error("no suitable GPU adapter found (Vulkan, Metal or DX12 required)")]
    NoAdapter,

    #[error("failed to create GPU device")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("failed to create window surface")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("{what} {requested} exceeds the device limit of {limit}")]
    ExceedsDeviceLimits {
        what: &'static str,
        requested: u64,
        limit: u64,
    },

    #[error("GPU buffer readback failed")]
    Readback,

    // ---- Window ----
    #[error("event loop failed")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("failed to create window")]
    CreateWindow(#[from] winit::error::OsError),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
