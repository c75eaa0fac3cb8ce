//! Core data types for channels, commands and payloads.
//!
//! Key types:
//! - [`Channel`]: The three logical data flows and their default ports
//! - [`Command`]: Motion commands and their wire mnemonics
//! - [`Frame`]: Opaque chunk of the encoded video stream
//! - [`DistanceSample`]: One range reading from the distance sensor

use std::fmt;
use std::sync::Arc;

/// Logical data flow between field unit and operator station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Encoded camera stream, robot → operator
    Video,
    /// Ultrasonic range samples, robot → operator
    DistanceSensor,
    /// Motion commands, operator → robot
    Command,
}

impl Channel {
    /// All channels in startup order
    pub const ALL: [Channel; 3] = [Channel::Video, Channel::DistanceSensor, Channel::Command];

    /// Default TCP port for this channel
    pub const fn default_port(self) -> u16 {
        match self {
            Channel::Video => 8000,
            Channel::DistanceSensor => 8005,
            Channel::Command => 8010,
        }
    }

    /// Short name used for thread names and log lines
    pub const fn name(self) -> &'static str {
        match self {
            Channel::Video => "video",
            Channel::DistanceSensor => "sensor",
            Channel::Command => "command",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle of one channel's server side
///
/// ```text
/// Idle ──listen──▶ Listening ──accept──▶ Connected ──shutdown──▶ ShuttingDown ──join──▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Constructed, nothing bound
    Idle,
    /// Bound and listening for the single client
    Listening,
    /// Client accepted, worker running
    Connected,
    /// Shutdown signal raised, waiting for the worker
    ShuttingDown,
    /// Worker gone, connection and listener released
    Closed,
}

/// Motion command for the drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Forward,
    Backward,
    Left,
    Right,
    RotateLeft,
    RotateRight,
    Stop,
}

impl Command {
    /// The fixed command table. Mnemonics are prefix-free so that
    /// back-to-back messages can be split without a delimiter.
    pub const ALL: [Command; 7] = [
        Command::Forward,
        Command::Backward,
        Command::Left,
        Command::Right,
        Command::RotateLeft,
        Command::RotateRight,
        Command::Stop,
    ];

    /// Wire mnemonic
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Command::Forward => "fwd",
            Command::Backward => "bwd",
            Command::Left => "left",
            Command::Right => "right",
            Command::RotateLeft => "lrot",
            Command::RotateRight => "rrot",
            Command::Stop => "stop",
        }
    }

    /// Look up a complete mnemonic in the command table
    pub fn from_mnemonic(text: &str) -> Option<Command> {
        Self::ALL.into_iter().find(|c| c.mnemonic() == text)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// One instantaneous range reading, in the sensor's native unit (centimetres)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DistanceSample(pub i64);

impl DistanceSample {
    /// Decimal text carried on the wire
    pub fn to_wire(self) -> String {
        self.0.to_string()
    }

    /// Parse one wire message
    pub fn parse(text: &str) -> Option<Self> {
        text.trim().parse::<i64>().ok().map(DistanceSample)
    }
}

/// Opaque chunk of the encoded video stream.
///
/// Nothing but the bytes travel on the wire; `index` is assigned locally by
/// the reader in arrival order. Cloning shares the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    index: u64,
    data: Arc<[u8]>,
}

impl Frame {
    /// Wrap a payload with its arrival index
    pub fn new(index: u64, data: Vec<u8>) -> Self {
        Self {
            index,
            data: data.into(),
        }
    }

    /// Arrival position, starting at 0
    #[inline]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Raw payload
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
