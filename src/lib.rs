pub mod configuration;
pub mod controller;
pub mod data_capture;
pub mod dispatch;
pub mod error_handling;
pub mod protocol;

pub use controller::{CaptureOrchestrator, ShutdownReport};
pub use data_capture::{Feed, PacketRecord};
pub use dispatch::{Dispatcher, HandlerRegistry};
pub use protocol::{DecodedEvent, EventKind, SignatureDecoder};
