//! Mock drive for testing

use crate::core::driver::Actuator;
use crate::core::types::Command;
use crate::error::Result;
use parking_lot::Mutex;
use std::sync::Arc;

/// Drive that records commands instead of moving motors.
///
/// Clones share the same log, so a test can keep one handle while the
/// command worker owns another.
#[derive(Clone, Default)]
pub struct RecordingDrive {
    log: Arc<Mutex<Vec<Command>>>,
}

impl RecordingDrive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands received so far, in dispatch order
    pub fn commands(&self) -> Vec<Command> {
        self.log.lock().clone()
    }

    /// Most recent command
    pub fn last(&self) -> Option<Command> {
        self.log.lock().last().copied()
    }
}

impl Actuator for RecordingDrive {
    fn actuate(&mut self, command: Command) -> Result<()> {
        log::debug!("Mock drive: {:?}", command);
        self.log.lock().push(command);
        Ok(())
    }
}
