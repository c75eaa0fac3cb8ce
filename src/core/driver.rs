//! Hardware collaborator traits
//!
//! The transport layer only ever talks to the robot through these. Real
//! camera and motor drivers live outside this crate; the `mock` feature
//! provides simulated implementations.

use crate::core::types::Command;
use crate::error::Result;
use std::io::Write;
use std::time::Duration;

/// Byte sink the encoder writes the elementary stream into
pub type VideoSink = Box<dyn Write + Send>;

/// Camera with a built-in encoder
pub trait CaptureDevice: Send {
    /// Begin continuous encoding into `sink`. No framing is added: the
    /// encoded stream itself is the wire format.
    fn start_recording(&mut self, sink: VideoSink) -> Result<()>;

    /// Wait up to `timeout` for the encoder to make progress.
    ///
    /// Returns an error once the encoder has failed, e.g. because the
    /// sink's peer went away.
    fn wait_recording(&mut self, timeout: Duration) -> Result<()>;

    /// Stop encoding and release the device. Must be idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Range finder returning one instantaneous distance per call
pub trait RangeSensor: Send {
    fn read_distance(&mut self) -> Result<i64>;
}

/// Drive that executes motion commands
pub trait Actuator: Send {
    fn actuate(&mut self, command: Command) -> Result<()>;
}
