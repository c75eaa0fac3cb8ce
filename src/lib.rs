//! rover-link - streaming and control transport for a field robot
//!
//! The field unit exposes three independent TCP channels, one worker thread each:
//!
//! | Channel | Port | Direction | Payload |
//! |---------|------|-----------|---------|
//! | Video | 8000 | robot → operator | raw encoded elementary stream |
//! | Distance sensor | 8005 | robot → operator | decimal distance text |
//! | Command | 8010 | operator → robot | motion mnemonic (`fwd`, `stop`, ...) |
//!
//! The operator station consumes them through [`client::ClientStreamReader`],
//! [`client::DistanceStream`] and [`client::ClientCommandSender`].
//!
//! ## Features
//!
//! - `mock`: Simulated camera, ranger and drive for hardware-free testing (default)

pub mod client;
pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod field;
pub mod server;
pub mod timing;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use crate::core::signal::ShutdownSignal;
pub use crate::core::types::{Channel, Command, DistanceSample, Frame, ServerState};
pub use error::{Error, Result};
pub use field::FieldUnit;
pub use server::ServerManager;
pub use timing::FpsTimer;
