//! Listening TCP endpoint for a single channel
//!
//! Each channel binds one port and accepts exactly one client. The backlog
//! is 0: the design expects exactly one pending connection at a time.
//! Accepting a second client while the first is still connected is
//! not supported and not guarded against.

use crate::core::signal::ShutdownSignal;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Poll interval for cancellable accepts
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Slot holding the listening socket until someone closes it
type SocketSlot = Arc<Mutex<Option<Socket>>>;

/// A bound TCP socket that accepts one connection per channel
pub struct TransportEndpoint {
    socket: SocketSlot,
    local_addr: SocketAddr,
}

impl TransportEndpoint {
    /// Reserve `addr` with SO_REUSEADDR enabled.
    ///
    /// Address reuse lets a channel rebind its port right after a previous
    /// session while old connections sit in TIME_WAIT. A port held by a
    /// live listener still fails with [`Error::AddressInUse`].
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into()).map_err(|e| {
            if e.kind() == ErrorKind::AddrInUse {
                Error::AddressInUse(addr)
            } else {
                Error::Io(e)
            }
        })?;

        // Port 0 binds resolve to the real port here
        let local_addr = socket
            .local_addr()?
            .as_socket()
            .ok_or_else(|| Error::Other(format!("{} is not an inet address", addr)))?;

        log::debug!("Bound endpoint {}", local_addr);
        Ok(Self {
            socket: Arc::new(Mutex::new(Some(socket))),
            local_addr,
        })
    }

    /// Start listening
    pub fn listen(&self, backlog: i32) -> Result<()> {
        let guard = self.socket.lock();
        let socket = guard.as_ref().ok_or_else(closed_error)?;
        socket.listen(backlog)?;
        log::debug!("Listening on {} (backlog {})", self.local_addr, backlog);
        Ok(())
    }

    /// Address actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Block until one client connects
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let listener = self.listener_handle()?;
        listener.set_nonblocking(false)?;
        let (conn, peer) = listener.accept()?;
        into_connection(conn, peer.as_socket())
    }

    /// Wait for one client, giving up once `stop` is raised.
    ///
    /// Returns `Ok(None)` when cancelled.
    pub fn accept_until(&self, stop: &ShutdownSignal) -> Result<Option<(TcpStream, SocketAddr)>> {
        let listener = self.listener_handle()?;
        listener.set_nonblocking(true)?;

        while !stop.is_set() {
            match listener.accept() {
                Ok((conn, peer)) => {
                    // Accepted sockets may inherit non-blocking mode on some platforms
                    conn.set_nonblocking(false)?;
                    return into_connection(conn, peer.as_socket()).map(Some);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }

        log::debug!("Accept on {} cancelled", self.local_addr);
        Ok(None)
    }

    /// Close-only handle for whoever has to release the listener later
    pub fn closer(&self) -> EndpointCloser {
        EndpointCloser {
            socket: Arc::clone(&self.socket),
            local_addr: self.local_addr,
        }
    }

    /// Half-close then close the listener. Idempotent.
    pub fn close(&self) {
        close_slot(&self.socket, self.local_addr);
    }

    /// Whether the listener has been released
    pub fn is_closed(&self) -> bool {
        self.socket.lock().is_none()
    }

    /// Duplicate the listening socket so accept can block without holding the slot lock
    fn listener_handle(&self) -> Result<Socket> {
        let guard = self.socket.lock();
        let socket = guard.as_ref().ok_or_else(closed_error)?;
        Ok(socket.try_clone()?)
    }
}

impl Drop for TransportEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

/// Capability to release a listener without being able to accept on it
#[derive(Clone)]
pub struct EndpointCloser {
    socket: SocketSlot,
    local_addr: SocketAddr,
}

impl EndpointCloser {
    /// Half-close then close the listener. Idempotent.
    pub fn close(&self) {
        close_slot(&self.socket, self.local_addr);
    }
}

fn close_slot(slot: &SocketSlot, local_addr: SocketAddr) {
    if let Some(socket) = slot.lock().take() {
        // Listening sockets usually report ENOTCONN here
        if let Err(e) = socket.shutdown(Shutdown::Both) {
            log::trace!("Listener {} shutdown: {}", local_addr, e);
        }
        drop(socket);
        log::debug!("Closed endpoint {}", local_addr);
    }
}

fn into_connection(conn: Socket, peer: Option<SocketAddr>) -> Result<(TcpStream, SocketAddr)> {
    let peer = peer.ok_or_else(|| Error::Other("peer is not an inet address".to_string()))?;
    let stream: TcpStream = conn.into();
    // Messages are tiny and latency matters more than throughput
    if let Err(e) = stream.set_nodelay(true) {
        log::warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
    }
    Ok((stream, peer))
}

fn closed_error() -> Error {
    Error::InvalidState("endpoint is closed".to_string())
}
