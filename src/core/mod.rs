//! Core abstractions shared by both ends of the link.
//!
//! - [`driver`]: Traits the robot hardware (or its simulation) implements
//! - [`signal`]: Per-session cooperative shutdown flag
//! - [`types`]: Channels, commands, frames and samples

pub mod driver;
pub mod signal;
pub mod types;
