// ============================================================================
// config.rs — lifegrid
// Sandbox settings loaded from JSON, plus validation of grid/texture sizes.
// ============================================================================

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};
use crate::grid::GridDimensions;

/// Startup settings. Every field has a default so partial JSON files work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Logical cell count.
    pub grid_size: [u32; 2],
    /// Resolution of the cell buffers' render target.
    pub texture_scale: [u32; 2],
    pub game_tick_ms: u64,
    pub input_tick_ms: u64,
    pub edit_radius: i32,
    pub zoom_speed: f32,
    pub pan_sensitivity: f32,
    /// Fraction of cells seeded alive at startup.
    pub initial_fill: f32,
    pub start_paused: bool,
    pub vsync: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            grid_size: [256, 256],
            texture_scale: [1024, 1024],
            game_tick_ms: 100,
            input_tick_ms: 16,
            edit_radius: 1,
            zoom_speed: 2.0,
            pan_sensitivity: 0.05,
            initial_fill: 0.0,
            start_paused: false,
            vsync: true,
        }
    }
}

impl SandboxConfig {
    /// Read settings from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SandboxError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SandboxConfig =
            serde_json::from_str(&text).map_err(|source| SandboxError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.dimensions()?;
        if self.game_tick_ms == 0 {
            return Err(SandboxError::InvalidPeriod("game"));
        }
        if self.input_tick_ms == 0 {
            return Err(SandboxError::InvalidPeriod("input"));
        }
        Ok(())
    }

    pub fn dimensions(&self) -> Result<GridDimensions> {
        GridDimensions::new(self.grid_size, self.texture_scale)
    }

    pub fn game_period(&self) -> Duration {
        Duration::from_millis(self.game_tick_ms)
    }

    pub fn input_period(&self) -> Duration {
        Duration::from_millis(self.input_tick_ms)
    }

    pub fn controls(&self) -> ControlSettings {
        ControlSettings {
            zoom_speed: self.zoom_speed,
            pan_sensitivity: self.pan_sensitivity,
        }
    }
}

/// Scroll/pan gains used by the per-frame input mapping.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlSettings {
    pub zoom_speed: f32,
    pub pan_sensitivity: f32,
}

/// Command-line options. Parsed by hand; the surface is three flags.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LaunchOptions {
    pub config_path: Option<String>,
    pub headless_ticks: Option<u32>,
    pub cpu: bool,
}

impl LaunchOptions {
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> std::result::Result<Self, String> {
        let mut options = LaunchOptions::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    options.config_path =
                        Some(args.next().ok_or("--config expects a file path")?);
                }
                "--headless" => {
                    let ticks = args.next().ok_or("--headless expects a tick count")?;
                    options.headless_ticks = Some(
                        ticks
                            .parse()
                            .map_err(|_| format!("invalid tick count: {ticks}"))?,
                    );
                }
                "--cpu" => options.cpu = true,
                other => return Err(format!("unknown argument: {other}")),
            }
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SandboxConfig =
            serde_json::from_str(r#"{ "grid_size": [64, 32], "start_paused": true }"#).unwrap();
        assert_eq!(config.grid_size, [64, 32]);
        assert!(config.start_paused);
        assert_eq!(config.texture_scale, SandboxConfig::default().texture_scale);
        assert_eq!(config.game_tick_ms, 100);
    }

    #[test]
    fn test_validate_rejects_zero_grid() {
        let config = SandboxConfig {
            grid_size: [0, 16],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SandboxError::InvalidGridSize { width: 0, height: 16 })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_period() {
        let config = SandboxConfig {
            input_tick_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SandboxError::InvalidPeriod("input"))
        ));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = SandboxConfig::load(Path::new("/nonexistent/lifegrid.json")).unwrap_err();
        assert!(matches!(err, SandboxError::ConfigIo { .. }));
    }

    #[test]
    fn test_launch_options() {
        let args = ["--headless", "500", "--cpu", "--config", "grid.json"]
            .into_iter()
            .map(String::from);
        let options = LaunchOptions::parse(args).unwrap();
        assert_eq!(options.headless_ticks, Some(500));
        assert!(options.cpu);
        assert_eq!(options.config_path.as_deref(), Some("grid.json"));

        assert!(LaunchOptions::parse(["--bogus".to_string()]).is_err());
        assert!(LaunchOptions::parse(["--headless".to_string(), "x".to_string()]).is_err());
    }
}
