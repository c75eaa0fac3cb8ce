//! Field unit side: one lifecycle manager per channel
//!
//! # Connection Lifecycle
//!
//! ```text
//! 1. Manager binds the channel port (SO_REUSEADDR, backlog 0)
//! 2. Manager accepts the single operator connection (blocking)
//! 3. Worker thread is spawned with the connection and a fresh shutdown signal
//! 4. shutdown(): raise signal, join worker within the grace period,
//!    close connection and listener as a backstop
//! ```
//!
//! After `shutdown()` returns the port can be bound again and no worker
//! activity remains.

mod command;
mod sensor;
mod video;
mod worker;

pub use command::{COMMAND_RECV_TIMEOUT, CommandDecoder, CommandWorker};
pub use sensor::{SAMPLE_INTERVAL, SensorWorker};
pub use video::{VIDEO_POLL_INTERVAL, VideoWorker};
pub use worker::{ChannelWorker, Step};

use crate::core::signal::ShutdownSignal;
use crate::core::types::{Channel, ServerState};
use crate::error::{Error, Result};
use crate::transport::{TransportEndpoint, close_connection};
use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Default time a worker gets to exit after the shutdown signal
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(3);

/// Extra wait after forcing the connection closed on a stuck worker
const FORCED_RELEASE_WAIT: Duration = Duration::from_millis(500);

/// Backlog for channel listeners: one pending client at most
const LISTEN_BACKLOG: i32 = 0;

/// Running worker thread
struct WorkerHandle {
    thread: JoinHandle<Result<()>>,
    /// Disconnects when the worker thread ends, panics included
    done: Receiver<()>,
}

impl WorkerHandle {
    fn wait(&self, timeout: Duration) -> bool {
        matches!(
            self.done.recv_timeout(timeout),
            Ok(()) | Err(RecvTimeoutError::Disconnected)
        )
    }

    fn join(self) -> Result<()> {
        match self.thread.join() {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::ThreadPanic),
        }
    }
}

/// Owns one channel's endpoint, connection and worker
pub struct ServerManager {
    channel: Channel,
    bind_addr: SocketAddr,
    grace_period: Duration,
    state: ServerState,
    endpoint: Option<TransportEndpoint>,
    connection: Option<TcpStream>,
    peer: Option<SocketAddr>,
    signal: ShutdownSignal,
    worker: Option<WorkerHandle>,
}

impl ServerManager {
    /// Create an idle manager for `channel` on `bind_addr`
    pub fn new(channel: Channel, bind_addr: SocketAddr) -> Self {
        Self {
            channel,
            bind_addr,
            grace_period: DEFAULT_GRACE_PERIOD,
            state: ServerState::Idle,
            endpoint: None,
            connection: None,
            peer: None,
            signal: ShutdownSignal::new(),
            worker: None,
        }
    }

    /// Override the shutdown grace period
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Address of the connected operator, once accepted
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Bound address, once listening
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint.as_ref().map(TransportEndpoint::local_addr)
    }

    /// Bind and listen without accepting yet. Returns the bound address.
    ///
    /// `start` does this itself when needed; calling it first lets the
    /// caller learn the real port of a port-0 bind.
    pub fn listen(&mut self) -> Result<SocketAddr> {
        if self.state != ServerState::Idle {
            return Err(Error::InvalidState(format!(
                "{}: listen in state {:?}",
                self.channel, self.state
            )));
        }

        let endpoint = TransportEndpoint::bind(self.bind_addr)?;
        endpoint.listen(LISTEN_BACKLOG)?;
        let local_addr = endpoint.local_addr();

        self.endpoint = Some(endpoint);
        self.state = ServerState::Listening;
        log::info!("{}: listening on {}", self.channel, local_addr);
        Ok(local_addr)
    }

    /// Accept the operator (blocking) and launch `worker` on its own thread.
    ///
    /// Returns once the worker is launched.
    pub fn start(&mut self, worker: Box<dyn ChannelWorker>) -> Result<()> {
        self.check_worker(worker.as_ref())?;
        if self.state == ServerState::Idle {
            self.listen()?;
        }
        let endpoint = self.listening_endpoint()?;

        log::info!("{}: waiting for operator...", self.channel);
        let (conn, peer) = endpoint.accept()?;
        self.launch(worker, conn, peer)
    }

    /// Like [`start`](Self::start), but gives up waiting for the operator
    /// once `stop` is raised. Returns whether a worker was launched.
    pub fn start_until(
        &mut self,
        worker: Box<dyn ChannelWorker>,
        stop: &ShutdownSignal,
    ) -> Result<bool> {
        self.check_worker(worker.as_ref())?;
        if self.state == ServerState::Idle {
            self.listen()?;
        }
        let endpoint = self.listening_endpoint()?;

        log::info!("{}: waiting for operator...", self.channel);
        match endpoint.accept_until(stop)? {
            Some((conn, peer)) => {
                self.launch(worker, conn, peer)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether the worker thread has exited on its own (sentinel, error)
    pub fn is_worker_finished(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| w.thread.is_finished())
    }

    /// Stop the worker and release the channel.
    ///
    /// Never hangs: a worker that overruns the grace period gets its
    /// connection force-closed and [`Error::ShutdownTimeout`] is returned
    /// after the listener has still been released.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == ServerState::Closed {
            return Ok(());
        }

        log::info!("{}: shutting down", self.channel);
        self.state = ServerState::ShuttingDown;
        self.signal.set();

        let outcome = match self.worker.take() {
            Some(worker) => self.stop_worker(worker),
            None => Ok(()),
        };

        // Backstop, idempotent with the worker's own finalizer
        if let Some(conn) = self.connection.take() {
            close_connection(conn, self.channel.name());
        }
        if let Some(endpoint) = self.endpoint.take() {
            endpoint.close();
        }

        self.state = ServerState::Closed;
        log::info!("{}: closed", self.channel);
        outcome
    }

    fn stop_worker(&mut self, worker: WorkerHandle) -> Result<()> {
        if worker.wait(self.grace_period) {
            return worker.join();
        }

        log::warn!(
            "{}: worker still running after {:?}, forcing connection closed",
            self.channel,
            self.grace_period
        );
        if let Some(conn) = self.connection.as_ref()
            && let Err(e) = conn.shutdown(Shutdown::Both)
        {
            log::debug!("{}: forced shutdown: {}", self.channel, e);
        }

        if worker.wait(FORCED_RELEASE_WAIT) {
            worker.join()?;
        } else {
            log::warn!("{}: abandoning unresponsive worker thread", self.channel);
        }

        Err(Error::ShutdownTimeout {
            channel: self.channel,
            grace: self.grace_period,
        })
    }

    fn launch(
        &mut self,
        worker: Box<dyn ChannelWorker>,
        conn: TcpStream,
        peer: SocketAddr,
    ) -> Result<()> {
        log::info!("{}: operator connected from {}", self.channel, peer);

        let endpoint = self.listening_endpoint()?;
        let closer = endpoint.closer();
        let worker_conn = conn.try_clone()?;

        // Fresh signal per session
        self.signal = ShutdownSignal::new();
        let signal = self.signal.clone();

        let (done_tx, done_rx) = bounded::<()>(1);
        let thread = thread::Builder::new()
            .name(format!("{}-worker", self.channel))
            .spawn(move || {
                let _done = done_tx;
                worker::run_worker(worker, worker_conn, signal, closer)
            })
            .map_err(|e| Error::Other(format!("Failed to spawn worker thread: {}", e)))?;

        self.connection = Some(conn);
        self.peer = Some(peer);
        self.worker = Some(WorkerHandle {
            thread,
            done: done_rx,
        });
        self.state = ServerState::Connected;
        Ok(())
    }

    fn listening_endpoint(&self) -> Result<&TransportEndpoint> {
        match (&self.endpoint, self.state) {
            (Some(endpoint), ServerState::Listening) => Ok(endpoint),
            _ => Err(Error::InvalidState(format!(
                "{}: cannot accept in state {:?}",
                self.channel, self.state
            ))),
        }
    }

    fn check_worker(&self, worker: &dyn ChannelWorker) -> Result<()> {
        if worker.channel() != self.channel {
            return Err(Error::InvalidState(format!(
                "{} worker handed to {} manager",
                worker.channel(),
                self.channel
            )));
        }
        Ok(())
    }
}

impl Drop for ServerManager {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("{}: shutdown on drop: {}", self.channel, e);
        }
    }
}
