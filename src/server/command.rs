//! Command channel worker
//!
//! Receives motion mnemonics and drives the actuator. A mnemonic outside
//! the command table is reported and skipped; it never ends the session.
//!
//! # Message Splitting
//!
//! Commands carry no delimiter, and TCP is free to merge two sends into one
//! read (`"fwdstop"`) or split one send across two (`"st"` + `"op"`). The
//! mnemonic set is prefix-free, so [`CommandDecoder`] can cut a read into
//! consecutive mnemonics and keep a trailing partial one for the next read.
//! A read that does not split exactly into mnemonics is rejected whole:
//! `"leftturn"` moves nothing.

use crate::core::driver::Actuator;
use crate::core::signal::ShutdownSignal;
use crate::core::types::{Channel, Command};
use crate::error::{Error, Result};
use crate::server::worker::{ChannelWorker, Step};
use crate::transport::{MAX_MESSAGE_LEN, Received, recv_message};
use std::net::TcpStream;
use std::time::Duration;

/// Read timeout so the loop re-checks the shutdown signal while idle
pub const COMMAND_RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Splits received bytes into commands
#[derive(Debug, Default)]
pub struct CommandDecoder {
    pending: String,
}

impl CommandDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one read.
    ///
    /// A read (with any carried-over partial mnemonic in front) that is not
    /// made entirely of mnemonics comes back as a single
    /// [`Error::UnknownCommand`], and none of it is dispatched.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<Command>> {
        let mut text = std::mem::take(&mut self.pending);
        text.push_str(&String::from_utf8_lossy(bytes));

        let mut decoded = Vec::new();
        let mut rest = text.as_str();

        while !rest.is_empty() {
            if let Some(cmd) = Command::ALL
                .into_iter()
                .find(|c| rest.starts_with(c.mnemonic()))
            {
                decoded.push(Ok(cmd));
                rest = &rest[cmd.mnemonic().len()..];
            } else if Command::ALL
                .iter()
                .any(|c| c.mnemonic().starts_with(rest))
            {
                // Tail of the read is the start of a mnemonic
                self.pending = rest.to_string();
                break;
            } else {
                return vec![Err(Error::UnknownCommand(text))];
            }
        }

        decoded
    }

    /// Report a partial mnemonic left over when the stream ends
    pub fn finish(&mut self) -> Option<Error> {
        if self.pending.is_empty() {
            None
        } else {
            Some(Error::UnknownCommand(std::mem::take(&mut self.pending)))
        }
    }
}

/// Pulls motion commands from the operator and actuates them
pub struct CommandWorker {
    actuator: Box<dyn Actuator>,
    decoder: CommandDecoder,
    read_buffer: Vec<u8>,
    dispatched: u64,
    rejected: u64,
}

impl CommandWorker {
    pub fn new(actuator: Box<dyn Actuator>) -> Self {
        Self {
            actuator,
            decoder: CommandDecoder::new(),
            read_buffer: vec![0u8; MAX_MESSAGE_LEN],
            dispatched: 0,
            rejected: 0,
        }
    }

    fn dispatch(&mut self, item: Result<Command>) {
        match item {
            Ok(cmd) => {
                log::info!("command: {}", cmd);
                match self.actuator.actuate(cmd) {
                    Ok(()) => self.dispatched += 1,
                    Err(e) => log::error!("command: actuating {} failed: {}", cmd, e),
                }
            }
            Err(e) => {
                self.rejected += 1;
                log::warn!("command: {}, ignoring", e);
            }
        }
    }
}

impl ChannelWorker for CommandWorker {
    fn channel(&self) -> Channel {
        Channel::Command
    }

    fn prepare(&mut self, conn: &mut TcpStream) -> Result<()> {
        if let Err(e) = conn.set_read_timeout(Some(COMMAND_RECV_TIMEOUT)) {
            log::warn!("command: failed to set read timeout: {}", e);
        }
        Ok(())
    }

    fn step(&mut self, conn: &mut TcpStream, _signal: &ShutdownSignal) -> Result<Step> {
        match recv_message(conn, &mut self.read_buffer)? {
            Received::Message(bytes) => {
                for item in self.decoder.feed(&bytes) {
                    self.dispatch(item);
                }
                Ok(Step::Continue)
            }
            Received::Idle => Ok(Step::Continue),
            Received::Ended => {
                if let Some(e) = self.decoder.finish() {
                    self.dispatch(Err(e));
                }
                Ok(Step::Finished)
            }
        }
    }

    fn release(&mut self) -> Result<()> {
        log::info!(
            "command: {} dispatched, {} rejected",
            self.dispatched,
            self.rejected
        );
        Ok(())
    }
}
