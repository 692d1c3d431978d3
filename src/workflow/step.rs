//! Typed per-step results

use serde::Serialize;
use std::fmt;

/// Control status of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// A chunk was accumulated and rows remain
    Continuing,
    /// A read found no rows left
    EndOfFile,
    /// A chunk was accumulated and it was the last one
    Complete,
    /// The chunk held no valid keywords
    Skipped,
    /// The chunk was lost to a model or write failure
    Error,
}

impl StepStatus {
    /// True for the statuses that end the loop.
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::EndOfFile | StepStatus::Complete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Continuing => "continuing",
            StepStatus::EndOfFile => "end_of_file",
            StepStatus::Complete => "complete",
            StepStatus::Skipped => "skipped",
            StepStatus::Error => "error",
        }
    }
}

/// Result of one loop iteration: a status plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutput {
    pub status: StepStatus,
    pub message: String,
}

impl StepOutput {
    pub fn new(status: StepStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn continuing(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Continuing, message)
    }

    pub fn end_of_file(message: impl Into<String>) -> Self {
        Self::new(StepStatus::EndOfFile, message)
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Complete, message)
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Skipped, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(StepStatus::Error, message)
    }
}

impl fmt::Display for StepOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status.as_str(), self.message)
    }
}
