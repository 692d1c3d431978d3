//! The chunk-process-accumulate loop
//!
//! Stages, in the order one iteration runs them:
//!
//! - chunk reading ([`crate::table`])
//! - prompt formatting ([`format_chunk`])
//! - model invocation ([`crate::agent::Agent::analyze`])
//! - accumulation into the session artifact ([`Accumulator`])
//! - termination ([`LoopController`])
//!
//! Once the loop stops, [`finalize`] summarizes the session.
//! [`WorkflowRunner`] wires the stages together.

mod accumulator;
mod controller;
mod finalizer;
mod formatter;
pub mod input;
mod runner;
mod step;

pub use accumulator::{
    read_artifact, write_artifact, Absorbed, Accumulated, Accumulator, ArtifactError, Upstream, OUTPUT_COLUMNS,
    OUTPUT_SHEET,
};
pub use controller::{LoopController, LoopState, StopReason, DEFAULT_MAX_ITERATIONS};
pub use finalizer::{finalize, SessionSummary};
pub use formatter::format_chunk;
pub use input::{decode_payload, materialize, InputError};
pub use runner::{
    progress_message, RunStatus, WorkflowConfig, WorkflowError, WorkflowReport, WorkflowRunner, DEFAULT_CHUNK_SIZE,
};
pub use step::{StepOutput, StepStatus};
