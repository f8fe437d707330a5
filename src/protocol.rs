//! Known protocol signatures and the decoders extracting fields behind them.

pub mod decoder;
pub mod signature;

pub use decoder::{DecodedEvent, SignatureDecoder, SignatureMatch};
pub use signature::{EventKind, Signature, SIGNATURES};
