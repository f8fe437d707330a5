use std::fmt;

use crate::data_capture::types::Feed;

/// Lifecycle of a [`CaptureOrchestrator`](super::CaptureOrchestrator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Created,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrchestratorState::Created => "CREATED",
            OrchestratorState::Starting => "STARTING",
            OrchestratorState::Running => "RUNNING",
            OrchestratorState::Stopping => "STOPPING",
            OrchestratorState::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// A feed that ended with a capture error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFailure {
    pub feed: Feed,
    pub message: String,
}

/// Outcome of a full orchestrator run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    failures: Vec<FeedFailure>,
}

impl ShutdownReport {
    pub fn new(failures: Vec<FeedFailure>) -> Self {
        Self { failures }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[FeedFailure] {
        &self.failures
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for ShutdownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for failure in &self.failures {
            writeln!(f, "{} capture returned: {}", failure.feed, failure.message)?;
        }
        Ok(())
    }
}
