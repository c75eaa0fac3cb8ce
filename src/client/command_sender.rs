//! Non-blocking motion command sender
//!
//! The control loop enqueues commands; a background thread drains the
//! queue onto the command channel, one message per command, in FIFO order.
//! The queue is unbounded: command volume is human-paced, and a command is
//! never dropped once enqueued.

use crate::core::signal::ShutdownSignal;
use crate::core::types::Command;
use crate::error::{Error, Result};
use crate::transport::{close_connection, send_message, send_sentinel};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::net::{SocketAddr, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Bounded dequeue wait so the sender re-checks shutdown while idle
pub const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(500);

/// Queue entry
#[derive(Debug)]
enum Outbound {
    Command(Command),
    /// Empty message: tells the field unit we are done
    Sentinel,
}

/// Motion command client for the command channel
pub struct ClientCommandSender {
    queue: Sender<Outbound>,
    signal: ShutdownSignal,
    thread: Option<JoinHandle<()>>,
    stream: Option<TcpStream>,
}

impl ClientCommandSender {
    /// Connect to the command channel at `addr`
    pub fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        log::info!("Command channel connected to {}", addr);
        Self::from_stream(stream)
    }

    /// Drive an already connected stream
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        if let Err(e) = stream.set_nodelay(true) {
            log::warn!("Failed to set TCP_NODELAY: {}", e);
        }
        let writer = stream.try_clone()?;
        let (queue, pending) = unbounded();
        let signal = ShutdownSignal::new();

        let sender_signal = signal.clone();
        let thread = thread::Builder::new()
            .name("command-sender".to_string())
            .spawn(move || send_loop(writer, pending, sender_signal))
            .map_err(|e| Error::Other(format!("Failed to spawn command sender: {}", e)))?;

        Ok(Self {
            queue,
            signal,
            thread: Some(thread),
            stream: Some(stream),
        })
    }

    /// Enqueue any command. Never blocks.
    pub fn send(&self, command: Command) {
        if self.queue.send(Outbound::Command(command)).is_err() {
            log::warn!("Command sender stopped, dropping {}", command);
        }
    }

    pub fn forward(&self) {
        self.send(Command::Forward);
    }

    pub fn backward(&self) {
        self.send(Command::Backward);
    }

    pub fn left(&self) {
        self.send(Command::Left);
    }

    pub fn right(&self) {
        self.send(Command::Right);
    }

    pub fn rotate_left(&self) {
        self.send(Command::RotateLeft);
    }

    pub fn rotate_right(&self) {
        self.send(Command::RotateRight);
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Commands waiting to be written
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Whether the sender thread is still running
    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Flush queued commands, send the sentinel and close the connection.
    ///
    /// The sentinel goes through the queue, so it reaches the field unit
    /// after every command enqueued before this call.
    pub fn shutdown(mut self) -> Result<()> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        // Fails only if the thread already exited; nothing left to flush then
        let _ = self.queue.send(Outbound::Sentinel);
        self.signal.set();

        let joined = thread.join().map_err(|_| Error::ThreadPanic);
        if let Some(stream) = self.stream.take() {
            close_connection(stream, "command");
        }
        log::info!("Command channel closed");
        joined
    }
}

impl Drop for ClientCommandSender {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_inner() {
            log::warn!("Command sender shutdown failed: {}", e);
        }
    }
}

fn send_loop(mut writer: TcpStream, pending: Receiver<Outbound>, signal: ShutdownSignal) {
    let mut sent = 0u64;

    loop {
        match pending.recv_timeout(DEQUEUE_TIMEOUT) {
            Ok(Outbound::Command(command)) => {
                if let Err(e) = send_message(&mut writer, command.mnemonic()) {
                    log::error!("Failed to send {}: {}", command, e);
                    break;
                }
                sent += 1;
                log::debug!("Sent {}", command);
            }
            Ok(Outbound::Sentinel) => {
                if let Err(e) = send_sentinel(&writer) {
                    log::warn!("Failed to send end-of-stream: {}", e);
                }
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                if signal.is_set() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    log::debug!("Command sender exiting ({} commands sent)", sent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MAX_MESSAGE_LEN, Received, recv_message};
    use std::net::TcpListener;

    #[test]
    fn test_fifo_then_sentinel() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let sender = ClientCommandSender::connect(addr).unwrap();
        let (mut conn, _) = listener.accept().unwrap();

        sender.forward();
        sender.left();
        sender.rotate_right();
        sender.stop();
        sender.shutdown().unwrap();

        // Everything up to the sentinel, however TCP chunked it
        let mut received = Vec::new();
        let mut buf = [0u8; MAX_MESSAGE_LEN];
        loop {
            match recv_message(&mut conn, &mut buf).unwrap() {
                Received::Message(bytes) => received.extend_from_slice(&bytes),
                Received::Ended => break,
                Received::Idle => {}
            }
        }
        assert_eq!(String::from_utf8(received).unwrap(), "fwdleftrrotstop");
    }

    #[test]
    fn test_enqueue_after_peer_left_does_not_block() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let sender = ClientCommandSender::connect(addr).unwrap();
        let (conn, _) = listener.accept().unwrap();
        drop(conn);
        drop(listener);

        for _ in 0..100 {
            sender.forward();
        }
        sender.shutdown().unwrap();
    }
}
