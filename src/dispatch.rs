//! Hand-off point between decoded events and whatever reacts to them.
//!
//! The orchestrator only talks to the [`Dispatcher`] trait; [`HandlerRegistry`]
//! is a minimal in-process implementation.

pub mod registry;

pub use registry::{Dispatcher, EventHandler, HandlerRegistry};
