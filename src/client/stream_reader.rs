//! Video stream reader with a single-slot latest-frame cell
//!
//! A background thread keeps pulling from the frame source and overwrites
//! the cell; the control loop picks up whatever is newest. Frames are never
//! queued: staleness is worse than a skipped frame.
//!
//! ```text
//! FrameSource ──▶ [stream-reader thread] ──▶ LatestFrame cell ──▶ read()
//!                   overwrites older frame       (mutex)         non-blocking
//! ```

use crate::core::signal::ShutdownSignal;
use crate::core::types::Frame;
use crate::error::{Error, Result};
use crate::transport::close_connection;
use parking_lot::Mutex;
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long construction waits for the first frame
pub const FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Read timeout for the TCP source so the reader can notice release()
const SOURCE_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Largest chunk the TCP source hands out as one frame
const SOURCE_CHUNK_SIZE: usize = 64 * 1024;

/// Outcome of pulling from a frame source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameRead {
    /// Next payload
    Data(Vec<u8>),
    /// Nothing yet, ask again
    Pending,
    /// Source finished
    Ended,
}

/// Producer of encoded video frames
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<FrameRead>;

    /// Release the underlying transport. Must be idempotent.
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Video channel as a frame source.
///
/// The channel carries an unframed elementary stream, so each frame is
/// simply the bytes one read returned. Consumers must feed them to a decoder
/// that tolerates partial buffers.
pub struct TcpFrameSource {
    stream: Option<TcpStream>,
    buffer: Vec<u8>,
}

impl TcpFrameSource {
    pub fn new(stream: TcpStream) -> Result<Self> {
        stream.set_read_timeout(Some(SOURCE_READ_TIMEOUT))?;
        Ok(Self {
            stream: Some(stream),
            buffer: vec![0u8; SOURCE_CHUNK_SIZE],
        })
    }
}

/// Open the video channel at `addr`.
///
/// Fails with [`Error::CaptureUnavailable`] when nothing is listening.
pub fn open_capture(addr: SocketAddr) -> Result<TcpFrameSource> {
    let stream = TcpStream::connect(addr)
        .map_err(|e| Error::CaptureUnavailable(format!("cannot connect to {}: {}", addr, e)))?;
    log::info!("Video channel connected to {}", addr);
    TcpFrameSource::new(stream)
}

impl FrameSource for TcpFrameSource {
    fn next_frame(&mut self) -> Result<FrameRead> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(FrameRead::Ended);
        };

        match stream.read(&mut self.buffer) {
            Ok(0) => Ok(FrameRead::Ended),
            Ok(n) => Ok(FrameRead::Data(self.buffer[..n].to_vec())),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(FrameRead::Pending)
            }
            Err(e) if crate::error::is_disconnect_kind(e.kind()) => Ok(FrameRead::Ended),
            Err(e) => Err(e.into()),
        }
    }

    fn release(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            close_connection(stream, "video");
        }
        Ok(())
    }
}

/// Latest frame and whether the source is still producing
struct LatestFrame {
    frame: Frame,
    live: bool,
}

/// Background video reader
pub struct ClientStreamReader {
    cell: Arc<Mutex<LatestFrame>>,
    stop: ShutdownSignal,
    thread: Option<JoinHandle<Box<dyn FrameSource>>>,
}

impl ClientStreamReader {
    /// Connect to the video channel and start reading
    pub fn open(addr: SocketAddr) -> Result<Self> {
        Self::new(Box::new(open_capture(addr)?))
    }

    /// Start reading from `source`.
    ///
    /// Blocks until the first frame arrives; a source that ends, fails or
    /// stays silent for [`FIRST_FRAME_TIMEOUT`] is [`Error::CaptureUnavailable`].
    pub fn new(source: Box<dyn FrameSource>) -> Result<Self> {
        Self::with_first_frame_timeout(source, FIRST_FRAME_TIMEOUT)
    }

    pub fn with_first_frame_timeout(
        mut source: Box<dyn FrameSource>,
        timeout: Duration,
    ) -> Result<Self> {
        let first = match first_frame(source.as_mut(), timeout) {
            Ok(data) => data,
            Err(e) => {
                let _ = source.release();
                return Err(e);
            }
        };

        let cell = Arc::new(Mutex::new(LatestFrame {
            frame: Frame::new(0, first),
            live: true,
        }));
        let stop = ShutdownSignal::new();

        let reader_cell = Arc::clone(&cell);
        let reader_stop = stop.clone();
        let thread = thread::Builder::new()
            .name("stream-reader".to_string())
            .spawn(move || reader_loop(source, reader_cell, reader_stop))
            .map_err(|e| Error::Other(format!("Failed to spawn stream reader: {}", e)))?;

        log::info!("Video stream started");
        Ok(Self {
            cell,
            stop,
            thread: Some(thread),
        })
    }

    /// Latest frame and liveness flag. Never blocks on the network.
    ///
    /// The same frame comes back until a newer one arrives; compare
    /// [`Frame::index`] to detect novelty.
    pub fn read(&self) -> (Frame, bool) {
        let latest = self.cell.lock();
        (latest.frame.clone(), latest.live)
    }

    /// Whether the source is still producing
    pub fn is_live(&self) -> bool {
        self.cell.lock().live
    }

    /// Stop the reader thread and release the source. Idempotent.
    pub fn release(&mut self) -> Result<()> {
        self.stop.set();
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        let mut source = thread.join().map_err(|_| Error::ThreadPanic)?;
        self.cell.lock().live = false;
        source.release()?;
        log::info!("Video stream released");
        Ok(())
    }
}

impl Drop for ClientStreamReader {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Video stream release failed: {}", e);
        }
    }
}

fn first_frame(source: &mut dyn FrameSource, timeout: Duration) -> Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    loop {
        match source.next_frame() {
            Ok(FrameRead::Data(data)) => return Ok(data),
            Ok(FrameRead::Pending) if Instant::now() < deadline => {}
            Ok(FrameRead::Pending) => {
                return Err(Error::CaptureUnavailable(format!(
                    "no frame within {:?}",
                    timeout
                )));
            }
            Ok(FrameRead::Ended) => {
                return Err(Error::CaptureUnavailable(
                    "stream ended before the first frame".to_string(),
                ));
            }
            Err(e) => return Err(Error::CaptureUnavailable(e.to_string())),
        }
    }
}

fn reader_loop(
    mut source: Box<dyn FrameSource>,
    cell: Arc<Mutex<LatestFrame>>,
    stop: ShutdownSignal,
) -> Box<dyn FrameSource> {
    let mut index = 0u64;

    while !stop.is_set() {
        match source.next_frame() {
            Ok(FrameRead::Data(data)) => {
                index += 1;
                let mut latest = cell.lock();
                latest.frame = Frame::new(index, data);
            }
            Ok(FrameRead::Pending) => {}
            Ok(FrameRead::Ended) => {
                log::info!("Video stream ended after {} frames", index + 1);
                break;
            }
            Err(e) => {
                log::warn!("Video stream read failed: {}", e);
                break;
            }
        }
    }

    cell.lock().live = false;
    source
}
