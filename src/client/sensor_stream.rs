//! Distance sample stream for direct consumption by the control loop

use crate::core::types::DistanceSample;
use crate::error::{Error, Result};
use crate::transport::{MAX_MESSAGE_LEN, Received, close_connection, recv_message};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

/// Reader for the distance sensor channel
///
/// Each message is one decimal sample. An empty message (end of stream)
/// ends the iteration.
pub struct DistanceStream {
    stream: Option<TcpStream>,
    buffer: [u8; MAX_MESSAGE_LEN],
    received: u64,
}

impl DistanceStream {
    /// Connect to the distance sensor channel at `addr`
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        log::info!("Distance channel connected to {}", addr);
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
            buffer: [0u8; MAX_MESSAGE_LEN],
            received: 0,
        }
    }

    /// Set read timeout. `None` blocks until data or end of stream.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        if let Some(stream) = &self.stream {
            stream.set_read_timeout(timeout)?;
        }
        Ok(())
    }

    /// Receive the next sample.
    ///
    /// - `Ok(Some(sample))`: one sample
    /// - `Ok(None)`: the field unit ended the stream
    /// - `Err(Error::Timeout)`: nothing within the read timeout
    /// - `Err(Error::MalformedSample)`: message was not a decimal integer; the
    ///   stream stays usable
    pub fn recv(&mut self) -> Result<Option<DistanceSample>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        match recv_message(stream, &mut self.buffer)? {
            Received::Message(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                let sample =
                    DistanceSample::parse(&text).ok_or_else(|| Error::MalformedSample(text.to_string()))?;
                self.received += 1;
                Ok(Some(sample))
            }
            Received::Idle => Err(Error::Timeout),
            Received::Ended => {
                log::info!("Distance stream ended after {} samples", self.received);
                self.close();
                Ok(None)
            }
        }
    }

    /// Samples received so far
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Close the connection. Idempotent.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            close_connection(stream, "sensor");
        }
    }
}

impl Iterator for DistanceStream {
    type Item = Result<DistanceSample>;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv().transpose()
    }
}

impl Drop for DistanceStream {
    fn drop(&mut self) {
        self.close();
    }
}
