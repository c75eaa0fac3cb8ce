//! Distance sensor channel worker
//!
//! Sends one decimal sample per message at a fixed rate. Freshness over
//! reliability: nothing is acknowledged and nothing is retried.

use crate::core::driver::RangeSensor;
use crate::core::signal::ShutdownSignal;
use crate::core::types::{Channel, DistanceSample};
use crate::error::Result;
use crate::server::worker::{ChannelWorker, Step};
use crate::transport::send_message;
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

/// Default pause between samples
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Pushes range samples to the operator
pub struct SensorWorker {
    sensor: Box<dyn RangeSensor>,
    interval: Duration,
    sent: u64,
}

impl SensorWorker {
    pub fn new(sensor: Box<dyn RangeSensor>) -> Self {
        Self {
            sensor,
            interval: SAMPLE_INTERVAL,
            sent: 0,
        }
    }

    /// Override the sample interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl ChannelWorker for SensorWorker {
    fn channel(&self) -> Channel {
        Channel::DistanceSensor
    }

    fn step(&mut self, conn: &mut TcpStream, _signal: &ShutdownSignal) -> Result<Step> {
        match self.sensor.read_distance() {
            Ok(distance) => {
                send_message(conn, &DistanceSample(distance).to_wire())?;
                self.sent += 1;
                log::trace!("sensor: sent {} (#{})", distance, self.sent);
            }
            // A missed reading only costs one sample
            Err(e) => log::warn!("sensor: read failed, skipping sample: {}", e),
        }

        thread::sleep(self.interval);
        Ok(Step::Continue)
    }

    fn release(&mut self) -> Result<()> {
        log::info!("sensor: {} samples sent", self.sent);
        Ok(())
    }
}
