// core/src/pipeline/execution.rs

//! `Pipeline::run`: walks the steps in order and runs each phase's handlers.

use crate::core::context_data::ContextData;
use crate::core::control::{PipelineControl, PipelineResult};
use crate::error::FlowError;
use crate::pipeline::definition::{Phase, Pipeline};
use tracing::{event, instrument, span, Instrument, Level};

/// What a phase asked the run to do next.
enum PhaseOutcome {
  Proceed,
  Halt,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Runs every step against `ctx_data`.
  ///
  /// Returns `PipelineResult::Stopped` naming the step whose handler returned
  /// `PipelineControl::Stop`, or the first handler error unchanged. A
  /// non-optional step with no handlers at all fails with
  /// `FlowError::HandlerMissing`.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(pipeline = %self.name, num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    event!(Level::DEBUG, "Pipeline execution starting.");

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();

      if step_def.should_skip(&ctx_data) {
        event!(Level::DEBUG, step = step_name, "Step skipped by its skip_if condition.");
        continue;
      }

      let has_handlers = [Phase::Before, Phase::On, Phase::After]
        .iter()
        .any(|phase| !self.handlers_for(step_name, *phase).is_empty());

      if !has_handlers {
        if step_def.optional {
          event!(Level::DEBUG, step = step_name, "Optional step has no handlers, skipping.");
          continue;
        }
        event!(Level::ERROR, step = step_name, "Non-optional step has no handlers.");
        return Err(Err::from(FlowError::HandlerMissing {
          step_name: step_def.name.clone(),
        }));
      }

      let step_span = span!(Level::INFO, "pipeline_step", step = step_name, step_index = step_idx);
      for phase in [Phase::Before, Phase::On, Phase::After] {
        let outcome = self
          .run_phase(step_name, phase, &ctx_data)
          .instrument(step_span.clone())
          .await?;
        if let PhaseOutcome::Halt = outcome {
          event!(Level::INFO, step = step_name, phase = phase.label(), "Pipeline stopped by handler.");
          return Ok(PipelineResult::Stopped {
            step: step_def.name.clone(),
          });
        }
      }
    }

    event!(Level::DEBUG, "Pipeline execution completed.");
    Ok(PipelineResult::Completed)
  }

  async fn run_phase(&self, step_name: &str, phase: Phase, ctx_data: &ContextData<TData>) -> Result<PhaseOutcome, Err> {
    for (handler_idx, handler_fn) in self.handlers_for(step_name, phase).iter().enumerate() {
      match handler_fn(ctx_data.clone()).await {
        Ok(PipelineControl::Continue) => {}
        Ok(PipelineControl::Stop) => return Ok(PhaseOutcome::Halt),
        Err(e) => {
          event!(
            Level::WARN,
            step = step_name,
            phase = phase.label(),
            handler_index = handler_idx,
            error = %e,
            "Handler failed."
          );
          return Err(e);
        }
      }
    }
    Ok(PhaseOutcome::Proceed)
  }
}
