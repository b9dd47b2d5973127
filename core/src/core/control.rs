// core/src/core/control.rs

//! Flow control signals returned by handlers, and the outcome of a whole run.

/// Returned by every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineControl {
  /// Proceed with the remaining handlers and steps.
  Continue,
  /// End the run now. Later handlers of the same step do not run either.
  Stop,
}

/// Outcome of `Pipeline::run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineResult {
  /// Every step ran (or was skipped) without a handler asking to stop.
  Completed,
  /// A handler of `step` returned `PipelineControl::Stop`.
  Stopped { step: String },
}

impl PipelineResult {
  pub fn is_completed(&self) -> bool {
    matches!(self, PipelineResult::Completed)
  }

  /// Name of the step that halted the run, if any.
  pub fn stopped_at(&self) -> Option<&str> {
    match self {
      PipelineResult::Completed => None,
      PipelineResult::Stopped { step } => Some(step.as_str()),
    }
  }
}
