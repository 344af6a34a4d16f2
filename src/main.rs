// ============================================================================
// main.rs — lifegrid
// Entry point. Initializes logging, reads settings and starts either the
// windowed sandbox or a headless batch run.
// ============================================================================

mod app;
mod camera;
mod clock;
mod config;
mod driver;
mod error;
mod grid;
mod headless;
mod input;
mod kernel;
mod present;
mod renderer;
mod sandbox;

use std::path::Path;

use config::{LaunchOptions, SandboxConfig};
use headless::HeadlessConfig;

fn main() {
    env_logger::init();

    let options = match LaunchOptions::parse(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(message) => {
            log::error!("{message}");
            eprintln!("usage: lifegrid [--config <path>] [--headless <ticks>] [--cpu]");
            std::process::exit(2);
        }
    };

    let config = match &options.config_path {
        Some(path) => SandboxConfig::load(Path::new(path)),
        None => Ok(SandboxConfig::default()),
    };

    let result = config.and_then(|config| match options.headless_ticks {
        Some(ticks) => {
            let headless = HeadlessConfig {
                ticks,
                use_cpu: options.cpu,
                ..Default::default()
            };
            headless::run_headless(&config, &headless).map(|_| ())
        }
        None => app::run(config),
    });

    if let Err(err) = result {
        log::error!("{err}");
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            log::error!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}
