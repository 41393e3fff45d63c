//! Cube serial protocol.
//!
//! The protocol is lock-step: every unit sent by either side is acknowledged
//! with [`layout::ACK`] before the next unit goes out. There are no framing
//! bytes beyond fixed lengths and positions, so the module is split the same
//! way on both directions:
//! - `layout`: command bytes, marker values, and unit lengths
//! - `codec`: exact-length packing of counts, durations, and pixel payloads
//! - `engine`: the session state machine for probe, download, upload, clear
//! - `error`: abort reasons, tagged with the protocol step that failed
//! - `notify`: the sink told about failures by the notifying operations
//!
//! Any violation aborts the whole operation. The engine never retries and
//! never tries to resynchronize the device afterwards.

pub mod codec;
pub mod engine;
pub mod error;
pub mod layout;
pub mod notify;

pub use engine::Session;
pub use error::{ProtocolError, Step};
pub use notify::{LogNotifier, Notifier};
