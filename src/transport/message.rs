//! Message-level I/O for the sensor and command channels
//!
//! # Wire Format
//!
//! There is no framing: one message is whatever a single send call wrote.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │ UTF-8 text (≤ 1024 bytes)    │   e.g. "fwd", "stop", "57"
//! └──────────────────────────────┘
//! ```
//!
//! The empty message is the end-of-stream sentinel. On TCP a zero-length
//! send carries nothing, so the sentinel is a write half-close, which the
//! receiver observes as a zero-length read.

use crate::error::{Result, is_disconnect_kind};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};

/// Receive buffer size; larger messages are split across reads
pub const MAX_MESSAGE_LEN: usize = 1024;

/// Outcome of one receive call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Bytes delivered by one read
    Message(Vec<u8>),
    /// Empty message: the peer finished or went away
    Ended,
    /// Read timeout elapsed with nothing to read
    Idle,
}

/// Send one message
pub fn send_message<W: Write>(stream: &mut W, payload: &str) -> Result<()> {
    stream.write_all(payload.as_bytes())?;
    stream.flush()?;
    Ok(())
}

/// Send the empty sentinel by half-closing the write side
pub fn send_sentinel(stream: &TcpStream) -> Result<()> {
    match stream.shutdown(Shutdown::Write) {
        Ok(()) => Ok(()),
        // Peer already gone: it has seen the end anyway
        Err(e) if is_disconnect_kind(e.kind()) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Receive one message.
///
/// A reset or aborted connection is reported as [`Received::Ended`]: losing
/// the peer is a normal end of stream, not an error.
pub fn recv_message<R: Read>(stream: &mut R, buf: &mut [u8]) -> Result<Received> {
    loop {
        match stream.read(buf) {
            Ok(0) => return Ok(Received::Ended),
            Ok(n) => return Ok(Received::Message(buf[..n].to_vec())),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Ok(Received::Idle);
            }
            Err(e) if is_disconnect_kind(e.kind()) => {
                log::debug!("Peer disconnected: {}", e);
                return Ok(Received::Ended);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    #[test]
    fn test_recv_empty_reader_is_ended() {
        let mut buf = [0u8; MAX_MESSAGE_LEN];
        let mut empty = Cursor::new(Vec::<u8>::new());
        assert_eq!(recv_message(&mut empty, &mut buf).unwrap(), Received::Ended);
    }

    #[test]
    fn test_sentinel_ends_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let sender = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            send_message(&mut stream, "stop").unwrap();
            send_sentinel(&stream).unwrap();
        });

        let (mut conn, _) = listener.accept().unwrap();
        sender.join().unwrap();

        let mut buf = [0u8; MAX_MESSAGE_LEN];
        assert_eq!(
            recv_message(&mut conn, &mut buf).unwrap(),
            Received::Message(b"stop".to_vec())
        );
        assert_eq!(recv_message(&mut conn, &mut buf).unwrap(), Received::Ended);
    }
}
