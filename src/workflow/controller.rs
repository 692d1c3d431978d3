//! Loop termination

use super::step::{StepOutput, StepStatus};
use serde::Serialize;

/// Iteration cap applied when none is configured.
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Whether the loop asks for another iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Running,
    Done,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A read found no rows left
    EndOfFile,
    /// The last chunk was accumulated
    Complete,
    /// The iteration cap was hit before the input ran out
    IterationCap,
}

/// Tracks loop outputs and decides when the loop is done.
///
/// The controller starts `Running`. After each recorded output it moves to
/// `Done` when the output is terminal or the iteration count reaches the cap.
/// `Done` is final: later outputs are ignored.
#[derive(Debug, Clone)]
pub struct LoopController {
    max_iterations: usize,
    outputs: Vec<StepOutput>,
    stop_reason: Option<StopReason>,
}

impl LoopController {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
            outputs: Vec::new(),
            stop_reason: None,
        }
    }

    /// Record one iteration's output and return the resulting state.
    pub fn record(&mut self, output: StepOutput) -> LoopState {
        if self.stop_reason.is_some() {
            return LoopState::Done;
        }

        let status = output.status;
        self.outputs.push(output);

        self.stop_reason = match status {
            StepStatus::EndOfFile => Some(StopReason::EndOfFile),
            StepStatus::Complete => Some(StopReason::Complete),
            _ if self.outputs.len() >= self.max_iterations => Some(StopReason::IterationCap),
            _ => None,
        };
        self.state()
    }

    pub fn state(&self) -> LoopState {
        if self.stop_reason.is_some() {
            LoopState::Done
        } else {
            LoopState::Running
        }
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn iterations(&self) -> usize {
        self.outputs.len()
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn outputs(&self) -> &[StepOutput] {
        &self.outputs
    }

    pub fn into_outputs(self) -> Vec<StepOutput> {
        self.outputs
    }
}

impl Default for LoopController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed outputs until the controller stops; return the iteration it stopped at.
    fn run_until_done(controller: &mut LoopController, outputs: impl IntoIterator<Item = StepOutput>) -> Option<usize> {
        for output in outputs {
            if controller.record(output) == LoopState::Done {
                return Some(controller.iterations());
            }
        }
        None
    }

    #[test]
    fn starts_running() {
        let controller = LoopController::default();
        assert_eq!(controller.state(), LoopState::Running);
        assert_eq!(controller.max_iterations(), 50);
    }

    #[test]
    fn stops_exactly_at_end_of_file() {
        for k in [1usize, 2, 17, 50] {
            let mut controller = LoopController::default();
            let outputs = (1..k)
                .map(|i| StepOutput::continuing(format!("chunk {i}")))
                .chain(std::iter::once(StepOutput::end_of_file("no more rows")))
                .chain(std::iter::repeat(StepOutput::continuing("never seen")).take(10));
            assert_eq!(run_until_done(&mut controller, outputs), Some(k), "k={k}");
            assert_eq!(controller.stop_reason(), Some(StopReason::EndOfFile));
        }
    }

    #[test]
    fn complete_stops_the_loop() {
        let mut controller = LoopController::default();
        controller.record(StepOutput::continuing("1"));
        assert_eq!(controller.record(StepOutput::complete("last chunk")), LoopState::Done);
        assert_eq!(controller.stop_reason(), Some(StopReason::Complete));
    }

    #[test]
    fn stops_at_cap_without_end_of_file() {
        let mut controller = LoopController::default();
        let outputs = std::iter::repeat(StepOutput::continuing("more")).take(200);
        assert_eq!(run_until_done(&mut controller, outputs), Some(50));
        assert_eq!(controller.stop_reason(), Some(StopReason::IterationCap));
    }

    #[test]
    fn skips_and_errors_keep_running() {
        let mut controller = LoopController::new(10);
        assert_eq!(controller.record(StepOutput::skipped("no keywords")), LoopState::Running);
        assert_eq!(controller.record(StepOutput::error("model failed")), LoopState::Running);
    }

    #[test]
    fn done_is_final() {
        let mut controller = LoopController::new(3);
        controller.record(StepOutput::end_of_file("eof"));
        assert_eq!(controller.record(StepOutput::continuing("late")), LoopState::Done);
        assert_eq!(controller.iterations(), 1);
    }
}
