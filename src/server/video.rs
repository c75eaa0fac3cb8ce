//! Video channel worker
//!
//! Streams the camera's encoded output straight into the connection. There
//! is no per-frame acknowledgement and no framing; the elementary stream is
//! the wire format.

use crate::core::driver::CaptureDevice;
use crate::core::signal::ShutdownSignal;
use crate::core::types::Channel;
use crate::error::Result;
use crate::server::worker::{ChannelWorker, Step};
use std::net::TcpStream;
use std::time::Duration;

/// How long each step waits on the encoder before re-checking shutdown
pub const VIDEO_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Pushes the camera stream to the operator
pub struct VideoWorker {
    camera: Box<dyn CaptureDevice>,
    poll_interval: Duration,
}

impl VideoWorker {
    pub fn new(camera: Box<dyn CaptureDevice>) -> Self {
        Self {
            camera,
            poll_interval: VIDEO_POLL_INTERVAL,
        }
    }

    /// Override the encoder wait per step
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl ChannelWorker for VideoWorker {
    fn channel(&self) -> Channel {
        Channel::Video
    }

    fn prepare(&mut self, conn: &mut TcpStream) -> Result<()> {
        let sink = conn.try_clone()?;
        self.camera.start_recording(Box::new(sink))?;
        log::info!("video: recording started");
        Ok(())
    }

    fn step(&mut self, _conn: &mut TcpStream, _signal: &ShutdownSignal) -> Result<Step> {
        self.camera.wait_recording(self.poll_interval)?;
        Ok(Step::Continue)
    }

    fn release(&mut self) -> Result<()> {
        self.camera.close()
    }
}
