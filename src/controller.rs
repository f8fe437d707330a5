//! Coordination of both capture feeds.
//!
//! [`CaptureOrchestrator`] starts one capture session per feed, gates their
//! consumers on a shared readiness signal, forwards decoded events to a
//! [`Dispatcher`](crate::dispatch::Dispatcher) and folds every feed failure
//! into a single [`ShutdownReport`].
//!
//! Example (non-running):
//! ```ignore
//! use std::sync::Arc;
//! use mouselounge::configuration::Config;
//! use mouselounge::controller::CaptureOrchestrator;
//! use mouselounge::dispatch::HandlerRegistry;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.add("play_vid_tribehouse", |event| println!("{:?}", event.fields()));
//! let mut orchestrator = CaptureOrchestrator::new(Config::default(), Arc::new(registry));
//! let report = orchestrator.run(tokio::signal::ctrl_c()).await?;
//! std::process::exit(report.exit_code());
//! ```

pub mod orchestrator;
pub mod ready_gate;
pub mod types;

#[cfg(test)]
mod integration_tests;

pub use orchestrator::CaptureOrchestrator;
pub use ready_gate::{GateWaiter, ReadyGate};
pub use types::{FeedFailure, OrchestratorState, ShutdownReport};
