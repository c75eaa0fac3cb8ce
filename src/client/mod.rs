//! Operator station side of the three channels
//!
//! - [`ClientStreamReader`]: background video reader with a latest-frame cell
//! - [`ClientCommandSender`]: non-blocking command queue drained by a sender thread
//! - [`DistanceStream`]: direct, blocking consumption of distance samples

mod command_sender;
mod sensor_stream;
mod stream_reader;

pub use command_sender::{ClientCommandSender, DEQUEUE_TIMEOUT};
pub use sensor_stream::DistanceStream;
pub use stream_reader::{
    ClientStreamReader, FIRST_FRAME_TIMEOUT, FrameRead, FrameSource, TcpFrameSource, open_capture,
};
