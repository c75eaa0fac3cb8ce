//! Mock camera with a simulated encoder
//!
//! The encoder thread writes one synthetic access unit per frame period:
//!
//! ```text
//! ┌──────────────┬──────────┬────────────────┬─────────────────────┐
//! │ 00 00 00 01  │ NAL type │ Frame counter  │ Filler              │
//! │ start code   │ 65 / 41  │ u32 big-endian │ width*height/64 B   │
//! └──────────────┴──────────┴────────────────┴─────────────────────┘
//! ```
//!
//! NAL type 0x65 (IDR) opens every group of `framerate` frames, 0x41
//! otherwise, which is enough for a tolerant decoder or a byte counter.

use crate::config::CameraConfig;
use crate::core::driver::{CaptureDevice, VideoSink};
use crate::core::signal::ShutdownSignal;
use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::io::Write;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];
const NAL_IDR: u8 = 0x65;
const NAL_NON_IDR: u8 = 0x41;

/// Simulated camera + encoder
pub struct MockCamera {
    config: CameraConfig,
    encoder: Option<Encoder>,
}

/// Running encoder thread
struct Encoder {
    stop: ShutdownSignal,
    thread: JoinHandle<()>,
    /// Receives the encoder's write failure, disconnects when it exits
    failure: Receiver<Error>,
}

impl MockCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            encoder: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.encoder.is_some()
    }
}

impl CaptureDevice for MockCamera {
    fn start_recording(&mut self, sink: VideoSink) -> Result<()> {
        if self.encoder.is_some() {
            return Err(Error::InvalidState("camera already recording".to_string()));
        }
        if self.config.framerate == 0 {
            return Err(Error::CaptureUnavailable("framerate must be > 0".to_string()));
        }

        let stop = ShutdownSignal::new();
        let (failure_tx, failure_rx) = bounded(1);
        let config = self.config.clone();
        let encoder_stop = stop.clone();

        let thread = thread::Builder::new()
            .name("mock-encoder".to_string())
            .spawn(move || encoder_loop(config, sink, encoder_stop, failure_tx))
            .map_err(|e| Error::Other(format!("Failed to spawn encoder thread: {}", e)))?;

        log::info!(
            "Mock camera recording {}x{} @ {} fps ({}, rotation {})",
            self.config.width,
            self.config.height,
            self.config.framerate,
            self.config.format,
            self.config.rotation
        );

        self.encoder = Some(Encoder {
            stop,
            thread,
            failure: failure_rx,
        });
        Ok(())
    }

    fn wait_recording(&mut self, timeout: Duration) -> Result<()> {
        let encoder = self
            .encoder
            .as_ref()
            .ok_or_else(|| Error::InvalidState("camera not recording".to_string()))?;

        match encoder.failure.recv_timeout(timeout) {
            Ok(e) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::Other("encoder stopped unexpectedly".to_string()))
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Some(encoder) = self.encoder.take() {
            encoder.stop.set();
            encoder.thread.join().map_err(|_| Error::ThreadPanic)?;
            log::info!("Mock camera closed");
        }
        Ok(())
    }
}

impl Drop for MockCamera {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn encoder_loop(
    config: CameraConfig,
    mut sink: VideoSink,
    stop: ShutdownSignal,
    failure: Sender<Error>,
) {
    let period = Duration::from_secs_f64(1.0 / f64::from(config.framerate));
    let filler_len = (config.width as usize * config.height as usize / 64).max(1);
    let mut frame = Vec::with_capacity(START_CODE.len() + 5 + filler_len);
    let mut counter: u32 = 0;

    while !stop.is_set() {
        let started = Instant::now();

        frame.clear();
        frame.extend_from_slice(&START_CODE);
        frame.push(if counter % config.framerate == 0 {
            NAL_IDR
        } else {
            NAL_NON_IDR
        });
        frame.extend_from_slice(&counter.to_be_bytes());
        frame.resize(frame.len() + filler_len, (counter & 0x7f) as u8 | 0x80);

        if let Err(e) = sink.write_all(&frame).and_then(|_| sink.flush()) {
            log::debug!("Mock encoder write failed after {} frames: {}", counter, e);
            let _ = failure.try_send(Error::Io(e));
            return;
        }
        counter = counter.wrapping_add(1);

        if let Some(rest) = period.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }

    log::debug!("Mock encoder stopped after {} frames", counter);
}
