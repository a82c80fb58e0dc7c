//! Point-to-point serial link to the remote sensor modules.
//!
//! The wire format is newline-terminated text: either a heartbeat marker or
//! a `(<module_id>,<lat>,<lon>)` position report. Everything else is noise
//! and is logged and dropped, never escalated.

pub mod errors;
pub mod port;
pub mod protocol;
pub mod registry;

pub use errors::LinkError;
pub use port::SerialLink;
pub use protocol::{HEARTBEAT_ACK, SerialEvent, parse_line};
pub use registry::{ModulePosition, ModuleRegistry};
