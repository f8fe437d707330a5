//! Capture subsystem.
//!
//! Runs the external capture tool once per [`Feed`] and turns its standard
//! output into [`PacketRecord`]s.
//!
//! Re-exports:
//! - [`PacketFramer`]: splits raw stdout chunks into hex-encoded records.
//! - [`CaptureSession`], [`SessionHandle`]: one capture subprocess and its shared state.
//! - [`Feed`], [`PacketRecord`]: core types.

pub mod capture_session;
pub mod framer;
pub mod types;

pub use capture_session::{CaptureSession, SessionHandle};
pub use framer::PacketFramer;
pub use types::{Feed, PacketRecord};
