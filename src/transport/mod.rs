//! Transport layer: listening endpoints and message-level socket I/O

mod endpoint;
mod message;

pub use endpoint::{EndpointCloser, TransportEndpoint};
pub use message::{MAX_MESSAGE_LEN, Received, recv_message, send_message, send_sentinel};

use std::net::{Shutdown, TcpStream};

/// Half-close then close a connection.
///
/// The half-close lets the peer observe a clean end of stream instead of a
/// reset. Failures are expected when the peer already left and are only
/// logged.
pub fn close_connection(stream: TcpStream, label: &str) {
    if let Err(e) = stream.shutdown(Shutdown::Both) {
        log::debug!("{}: connection already shut down: {}", label, e);
    }
    drop(stream);
}
