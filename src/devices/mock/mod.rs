//! Simulated devices for hardware-free runs and tests
//!
//! - [`MockCamera`]: encoder thread emitting H.264-shaped frames at the configured rate
//! - [`MockRangeFinder`]: ultrasonic ranger with Gaussian noise or a scripted sequence
//! - [`RecordingDrive`]: drive that logs and records every command it receives

mod camera;
mod drive;
mod ranger;

pub use camera::MockCamera;
pub use drive::RecordingDrive;
pub use ranger::MockRangeFinder;

use crate::config::Config;
use crate::core::driver::{Actuator, CaptureDevice, RangeSensor};
use crate::devices::Devices;
use crate::error::Result;

/// Build simulated devices for every enabled channel
pub fn create_mock_devices(config: &Config) -> Result<Devices> {
    let mock = &config.device.mock;

    let camera = config
        .channels
        .camera
        .then(|| Box::new(MockCamera::new(config.camera.clone())) as Box<dyn CaptureDevice>);
    let range_sensor = if config.channels.distance_sensor {
        let ranger = MockRangeFinder::new(
            mock.base_distance_cm,
            mock.noise_stddev_cm,
            mock.random_seed,
        )?;
        Some(Box::new(ranger) as Box<dyn RangeSensor>)
    } else {
        None
    };
    let drive = config
        .channels
        .remote_control
        .then(|| Box::new(RecordingDrive::new()) as Box<dyn Actuator>);

    log::info!(
        "Mock devices: camera={}, range_sensor={}, drive={}",
        camera.is_some(),
        range_sensor.is_some(),
        drive.is_some()
    );

    Ok(Devices {
        camera,
        range_sensor,
        drive,
    })
}
