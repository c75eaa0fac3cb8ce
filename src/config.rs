//! Configuration for rover-link
//!
//! Loaded from a TOML file. Every field has a default, so a file only needs
//! the values that differ:
//!
//! ```toml
//! [network]
//! robot_address = "192.168.1.107"
//!
//! [camera]
//! framerate = 24
//! ```

use crate::core::types::Channel;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub channels: ChannelsConfig,
    pub camera: CameraConfig,
    pub sensor: SensorConfig,
    pub shutdown: ShutdownConfig,
    pub device: DeviceConfig,
    pub logging: LoggingConfig,
}

/// Addresses and ports of the three channels
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Interface the field unit binds
    pub bind_address: IpAddr,
    /// Field unit address as seen from the operator station
    pub robot_address: IpAddr,
    pub video_port: u16,
    pub sensor_port: u16,
    pub command_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            robot_address: IpAddr::from([192, 168, 1, 107]),
            video_port: Channel::Video.default_port(),
            sensor_port: Channel::DistanceSensor.default_port(),
            command_port: Channel::Command.default_port(),
        }
    }
}

impl NetworkConfig {
    /// Port assigned to `channel`
    pub fn port(&self, channel: Channel) -> u16 {
        match channel {
            Channel::Video => self.video_port,
            Channel::DistanceSensor => self.sensor_port,
            Channel::Command => self.command_port,
        }
    }

    /// Field unit listen address for `channel`
    pub fn bind_addr(&self, channel: Channel) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port(channel))
    }

    /// Operator connect address for `channel`
    pub fn robot_addr(&self, channel: Channel) -> SocketAddr {
        SocketAddr::new(self.robot_address, self.port(channel))
    }
}

/// Which channels run
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub camera: bool,
    pub distance_sensor: bool,
    pub remote_control: bool,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            camera: true,
            distance_sensor: true,
            remote_control: true,
        }
    }
}

impl ChannelsConfig {
    pub fn is_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Video => self.camera,
            Channel::DistanceSensor => self.distance_sensor,
            Channel::Command => self.remote_control,
        }
    }

    /// Enabled channels in startup order
    pub fn enabled(&self) -> Vec<Channel> {
        Channel::ALL
            .into_iter()
            .filter(|c| self.is_enabled(*c))
            .collect()
    }
}

/// Camera capture settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraConfig {
    pub framerate: u32,
    pub width: u32,
    pub height: u32,
    /// Image rotation in degrees
    pub rotation: u16,
    /// Encoder output format
    pub format: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            framerate: 32,
            width: 640,
            height: 480,
            rotation: 180,
            format: "h264".to_string(),
        }
    }
}

/// Distance sensor settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Pause between samples (ms)
    pub sample_interval_ms: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 100,
        }
    }
}

impl SensorConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Shutdown behaviour
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time a worker gets to exit before it is forced (ms)
    pub grace_period_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 3000,
        }
    }
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// Device selection
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device kind; only "mock" ships with this crate
    pub kind: String,
    pub mock: MockDeviceConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            kind: "mock".to_string(),
            mock: MockDeviceConfig::default(),
        }
    }
}

/// Simulated device parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MockDeviceConfig {
    /// Distance the simulated ranger hovers around (cm)
    pub base_distance_cm: i64,
    /// Ranger noise standard deviation (cm)
    pub noise_stddev_cm: f32,
    /// 0 = seed from entropy
    pub random_seed: u64,
}

impl Default for MockDeviceConfig {
    fn default() -> Self {
        Self {
            base_distance_cm: 120,
            noise_stddev_cm: 2.0,
            random_seed: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG wins when set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load `path` when given, otherwise use built-in defaults
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// Parse config path from command line arguments.
///
/// Supports `<bin> <path>`, `<bin> --config <path>` and `<bin> -c <path>`.
pub fn parse_config_path(args: &[String]) -> Option<String> {
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.video_port, 8000);
        assert_eq!(config.network.sensor_port, 8005);
        assert_eq!(config.network.command_port, 8010);
        assert_eq!(config.camera.framerate, 32);
        assert_eq!(config.camera.rotation, 180);
        assert_eq!(config.camera.format, "h264");
        assert_eq!(config.sensor.sample_interval(), Duration::from_millis(100));
        assert_eq!(config.channels.enabled(), Channel::ALL.to_vec());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
[network]
robot_address = "10.42.0.62"
command_port = 9010

[channels]
camera = false

[device.mock]
random_seed = 7
"#,
        )
        .unwrap();

        assert_eq!(
            config.network.robot_addr(Channel::Command),
            "10.42.0.62:9010".parse().unwrap()
        );
        assert_eq!(config.network.video_port, 8000);
        assert!(!config.channels.camera);
        assert_eq!(
            config.channels.enabled(),
            vec![Channel::DistanceSensor, Channel::Command]
        );
        assert_eq!(config.device.kind, "mock");
        assert_eq!(config.device.mock.random_seed, 7);
        approx::assert_relative_eq!(config.device.mock.noise_stddev_cm, 2.0);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("[network]\nvideo_port = \"eight\"").unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[sensor]\nsample_interval_ms = 250").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.sensor.sample_interval_ms, 250);
    }

    #[test]
    fn test_parse_config_path() {
        let args = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(
            parse_config_path(&args(&["bin", "--config", "a.toml"])),
            Some("a.toml".to_string())
        );
        assert_eq!(
            parse_config_path(&args(&["bin", "-c", "b.toml"])),
            Some("b.toml".to_string())
        );
        assert_eq!(
            parse_config_path(&args(&["bin", "c.toml"])),
            Some("c.toml".to_string())
        );
        assert_eq!(parse_config_path(&args(&["bin"])), None);
    }
}
