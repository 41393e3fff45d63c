//! Cubesync core library: animation sync with an LED cube over a serial link.
//!
//! The host side of a lock-step byte protocol. A [`Session`] owns the link to
//! one cube and runs the four operations the firmware understands: probe,
//! download of every stored animation, upload of a full [`AnimationSet`]
//! replacing the device contents, and clearing the device memory.
//!
//! Layers, bottom-up:
//! - `link`: the [`Transport`] seam, a serial port implementation, a
//!   simulated cube, and [`BoundedIo`](link::BoundedIo) which bounds every
//!   read and write by a per-byte deadline
//! - `protocol`: wire layout, codec, error taxonomy and the session engine
//! - `model`: frames, animations and animation sets, bounded by the wire
//!   encoding
//! - `document`: the versioned JSON form used by the CLI
//!
//! Invariants:
//! - An operation either completes or reports exactly one failure; a failed
//!   download never yields partial data.
//! - No link call blocks past its deadline; a late reply from an abandoned
//!   request is never mistaken for the reply to a later one.
//!
//! # Examples
//! ```
//! use cubesync_core::{Animation, AnimationSet, Frame, LinkConfig, Session, SimulatedCube};
//!
//! let cube = SimulatedCube::new();
//! let mut session = Session::new(cube.clone(), &LinkConfig::default())?;
//!
//! let mut animation = Animation::new();
//! animation.push(Frame::from_array(5, [0x81; 64]))?;
//! let set = AnimationSet::from_animations(vec![animation])?;
//!
//! session.try_upload(&set)?;
//! assert_eq!(session.try_download()?, set);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod document;
pub mod link;
mod model;
pub mod protocol;

pub use document::{
    AnimationDocument, DEFAULT_GENERATED_AT, DOCUMENT_VERSION, DocumentError, ToolInfo,
    load_document, make_document, parse_document,
};
pub use link::{Fault, LinkConfig, LinkError, SerialTransport, SimulatedCube, Transport};
pub use model::{
    Animation, AnimationSet, Frame, MAX_ANIMATIONS, MAX_FRAMES, ModelError, PIXELS_PER_FRAME,
};
pub use protocol::notify::{ERROR_TITLE, Notification};
pub use protocol::{LogNotifier, Notifier, ProtocolError, Session, Step};
