//! Frame throughput measurement
//!
//! ```ignore
//! let mut timer = FpsTimer::new();
//! timer.start();
//! for frame in frames {
//!     timer.update();
//! }
//! timer.stop();
//! log::info!("{:.1} fps", timer.fps().unwrap_or(0.0));
//! ```

use std::time::{Duration, Instant};

/// Elapsed-time and frame-count accumulator
#[derive(Debug, Clone, Default)]
pub struct FpsTimer {
    started: Option<Instant>,
    stopped: Option<Instant>,
    frames: u64,
}

impl FpsTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a measurement. Resets the frame count.
    pub fn start(&mut self) -> &mut Self {
        self.started = Some(Instant::now());
        self.stopped = None;
        self.frames = 0;
        self
    }

    /// Count one frame
    pub fn update(&mut self) {
        self.frames += 1;
    }

    /// End the measurement. Ignored before `start()`.
    pub fn stop(&mut self) {
        if self.started.is_some() {
            self.stopped = Some(Instant::now());
        }
    }

    /// Frames counted since `start()`
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Time between `start()` and `stop()`; `None` until both happened
    pub fn elapsed(&self) -> Option<Duration> {
        match (self.started, self.stopped) {
            (Some(start), Some(end)) => Some(end.duration_since(start)),
            _ => None,
        }
    }

    /// Frames per second over the measured interval
    pub fn fps(&self) -> Option<f64> {
        let secs = self.elapsed()?.as_secs_f64();
        if secs > 0.0 {
            Some(self.frames as f64 / secs)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_out_of_sequence_is_none() {
        let mut timer = FpsTimer::new();
        assert!(timer.fps().is_none());
        timer.stop();
        assert!(timer.elapsed().is_none());

        timer.start();
        timer.update();
        assert!(timer.elapsed().is_none());
        assert!(timer.fps().is_none());
    }

    #[test]
    fn test_fps_over_interval() {
        let mut timer = FpsTimer::new();
        timer.start();
        for _ in 0..10 {
            timer.update();
        }
        thread::sleep(Duration::from_millis(100));
        timer.stop();

        assert_eq!(timer.frames(), 10);
        let elapsed = timer.elapsed().unwrap();
        assert!(elapsed >= Duration::from_millis(100));

        let fps = timer.fps().unwrap();
        approx::assert_relative_eq!(fps, 10.0 / elapsed.as_secs_f64(), max_relative = 1e-9);
        assert!(fps <= 100.0);
    }

    #[test]
    fn test_restart_resets() {
        let mut timer = FpsTimer::new();
        timer.start().update();
        timer.stop();
        timer.start();
        assert_eq!(timer.frames(), 0);
        assert!(timer.elapsed().is_none());
    }
}
