//! Channel worker contract and the shared worker loop
//!
//! Every channel runs the same outer loop on its own thread:
//!
//! ```text
//! prepare ──▶ while !signal { step } ──▶ finalizer
//!                                        1. release channel resource
//!                                        2. half-close + close connection
//!                                        3. half-close + close listener
//! ```
//!
//! The finalizer lives in a drop guard, so it runs on a normal sentinel
//! exit, on an error, on the shutdown signal and on a panic alike. Each of
//! its steps is guarded independently.

use crate::core::signal::ShutdownSignal;
use crate::core::types::Channel;
use crate::error::Result;
use crate::transport::{EndpointCloser, close_connection};
use std::net::TcpStream;

/// What the worker loop should do after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep going
    Continue,
    /// Stream ended cleanly (sentinel or peer gone)
    Finished,
}

/// Per-channel behaviour plugged into the worker loop
pub trait ChannelWorker: Send {
    /// Channel this worker serves
    fn channel(&self) -> Channel;

    /// Acquire the channel resource once the client is connected
    fn prepare(&mut self, _conn: &mut TcpStream) -> Result<()> {
        Ok(())
    }

    /// One iteration of the worker loop
    fn step(&mut self, conn: &mut TcpStream, signal: &ShutdownSignal) -> Result<Step>;

    /// Release the channel resource. Called exactly once, even after errors.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Drop guard performing the finalizer sequence
struct Finalizer {
    worker: Box<dyn ChannelWorker>,
    conn: Option<TcpStream>,
    listener: EndpointCloser,
}

impl Drop for Finalizer {
    fn drop(&mut self) {
        let channel = self.worker.channel();

        if let Err(e) = self.worker.release() {
            log::warn!("{}: failed to release channel resource: {}", channel, e);
        }
        if let Some(conn) = self.conn.take() {
            close_connection(conn, channel.name());
        }
        self.listener.close();

        log::debug!("{}: worker finalized", channel);
    }
}

/// Run a worker to completion on the current thread
pub(crate) fn run_worker(
    worker: Box<dyn ChannelWorker>,
    conn: TcpStream,
    signal: ShutdownSignal,
    listener: EndpointCloser,
) -> Result<()> {
    let mut guard = Finalizer {
        worker,
        conn: Some(conn),
        listener,
    };
    let channel = guard.worker.channel();
    let Finalizer { worker, conn, .. } = &mut guard;
    let Some(conn) = conn.as_mut() else {
        return Ok(());
    };

    log::info!("{}: worker started", channel);
    worker.prepare(conn)?;

    while !signal.is_set() {
        match worker.step(conn, &signal) {
            Ok(Step::Continue) => {}
            Ok(Step::Finished) => {
                log::info!("{}: stream ended by peer", channel);
                return Ok(());
            }
            Err(e) if e.is_disconnect() => {
                log::info!("{}: peer disconnected", channel);
                return Ok(());
            }
            Err(e) => {
                log::error!("{}: worker failed: {}", channel, e);
                return Err(e);
            }
        }
    }

    log::info!("{}: shutdown requested", channel);
    Ok(())
}
