//! field-unit - serves the video, distance and command channels of the robot
//!
//! ```text
//! field-unit [--config <path>]
//! ```
//!
//! Each enabled channel listens on its own port and serves one operator.
//! Ctrl-C shuts every channel down and releases the ports.

use rover_link::config::{Config, parse_config_path};
use rover_link::devices::create_devices;
use rover_link::{Error, FieldUnit, Result, ShutdownSignal};
use std::env;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let config_path = parse_config_path(&args);
    let config = Config::load_or_default(config_path.as_deref())?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("rover-link field unit v{} starting...", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => log::info!("Using config: {}", path),
        None => log::info!("No config given, using defaults"),
    }
    log::info!("Device: {}", config.device.kind);

    let devices = create_devices(&config)?;

    let running = ShutdownSignal::new();
    let stop_requested = running.clone();
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        stop_requested.set();
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let unit = FieldUnit::start(&config, devices)?;
    for (channel, addr) in unit.local_addrs() {
        log::info!("{} channel on {}", channel, addr);
    }
    log::info!("Field unit running. Press Ctrl-C to stop.");

    while !running.is_set() {
        thread::sleep(Duration::from_millis(100));
    }

    log::info!("Shutting down...");
    unit.shutdown()
}
