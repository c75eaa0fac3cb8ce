//! Field unit: every enabled channel served side by side
//!
//! All channels bind first, so a taken port aborts startup before any
//! operator is accepted. Each channel then waits for its operator on its own
//! acceptor thread; a channel nobody connects to never holds up the others.

use crate::config::Config;
use crate::core::signal::ShutdownSignal;
use crate::core::types::Channel;
use crate::devices::Devices;
use crate::error::{Error, Result};
use crate::server::{ChannelWorker, CommandWorker, SensorWorker, ServerManager, VideoWorker};
use std::net::SocketAddr;
use std::thread::{self, JoinHandle};

/// Acceptor thread hands its manager back when it ends
type Acceptor = JoinHandle<(ServerManager, Result<bool>)>;

struct ChannelSlot {
    channel: Channel,
    local_addr: SocketAddr,
    acceptor: Option<Acceptor>,
}

/// Running set of channel servers
pub struct FieldUnit {
    /// Cancels acceptors still waiting for an operator
    stop: ShutdownSignal,
    slots: Vec<ChannelSlot>,
}

impl FieldUnit {
    /// Bind every enabled channel and start accepting operators.
    ///
    /// Fails without leaving anything running if a port is taken or an
    /// enabled channel has no device.
    pub fn start(config: &Config, mut devices: Devices) -> Result<Self> {
        let mut pending: Vec<(ServerManager, Box<dyn ChannelWorker>)> = Vec::new();

        for channel in config.channels.enabled() {
            let worker = build_worker(channel, config, &mut devices)?;
            let mut manager = ServerManager::new(channel, config.network.bind_addr(channel))
                .with_grace_period(config.shutdown.grace_period());
            manager.listen()?;
            pending.push((manager, worker));
        }

        let mut unit = Self {
            stop: ShutdownSignal::new(),
            slots: Vec::with_capacity(pending.len()),
        };

        for (mut manager, worker) in pending {
            let channel = manager.channel();
            let local_addr = manager
                .local_addr()
                .ok_or_else(|| Error::InvalidState(format!("{}: not listening", channel)))?;

            let stop = unit.stop.clone();
            let acceptor = thread::Builder::new()
                .name(format!("{}-acceptor", channel))
                .spawn(move || {
                    let outcome = manager.start_until(worker, &stop);
                    (manager, outcome)
                })
                .map_err(|e| Error::Other(format!("Failed to spawn acceptor: {}", e)))?;

            unit.slots.push(ChannelSlot {
                channel,
                local_addr,
                acceptor: Some(acceptor),
            });
        }

        log::info!("Field unit running {} channel(s)", unit.slots.len());
        Ok(unit)
    }

    /// Bound address of every running channel
    pub fn local_addrs(&self) -> Vec<(Channel, SocketAddr)> {
        self.slots
            .iter()
            .map(|slot| (slot.channel, slot.local_addr))
            .collect()
    }

    /// Bound address of one channel, if it is running
    pub fn local_addr(&self, channel: Channel) -> Option<SocketAddr> {
        self.slots
            .iter()
            .find(|slot| slot.channel == channel)
            .map(|slot| slot.local_addr)
    }

    /// Shut every channel down.
    ///
    /// A failing channel does not stop the others from being released; the
    /// first failure is returned once all are done.
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown_all()
    }

    fn shutdown_all(&mut self) -> Result<()> {
        self.stop.set();

        let mut first_error = None;
        for slot in &mut self.slots {
            let Some(acceptor) = slot.acceptor.take() else {
                continue;
            };
            if let Err(e) = shutdown_channel(slot.channel, acceptor) {
                log::error!("{}: {}", slot.channel, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                log::info!("Field unit stopped");
                Ok(())
            }
        }
    }
}

impl Drop for FieldUnit {
    fn drop(&mut self) {
        // Errors were logged per channel
        let _ = self.shutdown_all();
    }
}

fn shutdown_channel(channel: Channel, acceptor: Acceptor) -> Result<()> {
    let (mut manager, outcome) = acceptor.join().map_err(|_| Error::ThreadPanic)?;

    match outcome {
        Ok(true) => {}
        Ok(false) => log::info!("{}: no operator connected", channel),
        Err(e) => log::warn!("{}: accept failed: {}", channel, e),
    }

    manager.shutdown()
}

fn build_worker(
    channel: Channel,
    config: &Config,
    devices: &mut Devices,
) -> Result<Box<dyn ChannelWorker>> {
    let missing = || Error::InvalidState(format!("{}: channel enabled but no device", channel));

    let worker: Box<dyn ChannelWorker> = match channel {
        Channel::Video => {
            let camera = devices.camera.take().ok_or_else(missing)?;
            Box::new(VideoWorker::new(camera))
        }
        Channel::DistanceSensor => {
            let sensor = devices.range_sensor.take().ok_or_else(missing)?;
            Box::new(SensorWorker::new(sensor).with_interval(config.sensor.sample_interval()))
        }
        Channel::Command => {
            let drive = devices.drive.take().ok_or_else(missing)?;
            Box::new(CommandWorker::new(drive))
        }
    };
    Ok(worker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, TcpListener};

    fn loopback_config() -> Config {
        let mut config = Config::default();
        config.network.bind_address = IpAddr::from([127, 0, 0, 1]);
        config.network.video_port = 0;
        config.network.sensor_port = 0;
        config.network.command_port = 0;
        config
    }

    #[test]
    fn test_missing_device_is_rejected() {
        let config = loopback_config();
        let result = FieldUnit::start(&config, Devices::default());
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_no_enabled_channels() {
        let mut config = loopback_config();
        config.channels.camera = false;
        config.channels.distance_sensor = false;
        config.channels.remote_control = false;

        let unit = FieldUnit::start(&config, Devices::default()).unwrap();
        assert!(unit.local_addrs().is_empty());
        unit.shutdown().unwrap();
    }

    #[cfg(feature = "mock")]
    #[test]
    fn test_shutdown_without_operator_frees_ports() {
        let config = loopback_config();
        let devices = crate::devices::create_devices(&config).unwrap();

        let unit = FieldUnit::start(&config, devices).unwrap();
        let addrs = unit.local_addrs();
        assert_eq!(addrs.len(), 3);
        assert!(unit.local_addr(Channel::Command).is_some());

        unit.shutdown().unwrap();
        for (_, addr) in addrs {
            TcpListener::bind(addr).unwrap();
        }
    }

    #[cfg(feature = "mock")]
    #[test]
    fn test_taken_port_aborts_startup() {
        let blocker = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut config = loopback_config();
        config.network.sensor_port = blocker.local_addr().unwrap().port();
        let devices = crate::devices::create_devices(&config).unwrap();

        assert!(matches!(
            FieldUnit::start(&config, devices),
            Err(Error::AddressInUse(_))
        ));
    }
}
