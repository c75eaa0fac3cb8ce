//! Error types for rover-link

use crate::core::types::Channel;
use std::net::SocketAddr;
use std::time::Duration;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// rover-link error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel port already bound by another socket
    #[error("Address already in use: {0}")]
    AddressInUse(SocketAddr),

    /// Peer closed or reset the connection
    #[error("Peer disconnected")]
    PeerDisconnected,

    /// Command channel received text outside the command table
    #[error("Unknown command: {0:?}")]
    UnknownCommand(String),

    /// Distance channel received text that is not a decimal integer
    #[error("Malformed distance sample: {0:?}")]
    MalformedSample(String),

    /// Capture source could not be opened or produced no frame
    #[error("Capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// Worker did not exit within the shutdown grace period
    #[error("{channel} worker did not stop within {grace:?}")]
    ShutdownTimeout {
        /// Channel whose worker overran
        channel: Channel,
        /// Grace period that elapsed
        grace: Duration,
    },

    /// Operation not valid in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Device kind not known to the device factory
    #[error("Unknown device kind: {0}")]
    UnknownDevice(String),

    /// A worker thread panicked
    #[error("Thread panicked")]
    ThreadPanic,

    /// Read timed out before any data arrived
    #[error("Timed out")]
    Timeout,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl Error {
    /// True for errors that mean the peer went away rather than a fault.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::PeerDisconnected => true,
            Error::Io(e) => is_disconnect_kind(e.kind()),
            _ => false,
        }
    }
}

/// I/O error kinds produced when the remote end closes or resets a stream.
pub(crate) fn is_disconnect_kind(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind;
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
    )
}
