//! Device implementations
//!
//! Physical camera and motor drivers are outside this crate. The factory
//! below builds the simulated devices shipped under the `mock` feature.

#[cfg(feature = "mock")]
pub mod mock;

use crate::config::Config;
use crate::core::driver::{Actuator, CaptureDevice, RangeSensor};
use crate::error::{Error, Result};

/// Hardware handed to the field unit, one device per enabled channel
#[derive(Default)]
pub struct Devices {
    pub camera: Option<Box<dyn CaptureDevice>>,
    pub range_sensor: Option<Box<dyn RangeSensor>>,
    pub drive: Option<Box<dyn Actuator>>,
}

/// Create the devices for every enabled channel based on configuration
pub fn create_devices(config: &Config) -> Result<Devices> {
    match config.device.kind.as_str() {
        #[cfg(feature = "mock")]
        "mock" => mock::create_mock_devices(config),
        other => Err(Error::UnknownDevice(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_device_kind() {
        let mut config = Config::default();
        config.device.kind = "gopigo".to_string();
        assert!(matches!(
            create_devices(&config),
            Err(Error::UnknownDevice(kind)) if kind == "gopigo"
        ));
    }

    #[cfg(feature = "mock")]
    #[test]
    fn test_disabled_channels_get_no_device() {
        let mut config = Config::default();
        config.channels.camera = false;
        let devices = create_devices(&config).unwrap();
        assert!(devices.camera.is_none());
        assert!(devices.range_sensor.is_some());
        assert!(devices.drive.is_some());
    }
}
