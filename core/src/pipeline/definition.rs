// core/src/pipeline/definition.rs

use crate::core::handler::Handler;
use crate::core::step::{SkipCondition, StepDef};
use crate::error::FlowError;
use std::collections::HashMap;

/// Which handler list of a step a handler belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Phase {
  Before,
  On,
  After,
}

impl Phase {
  pub(crate) fn label(self) -> &'static str {
    match self {
      Phase::Before => "before",
      Phase::On => "on",
      Phase::After => "after",
    }
  }
}

/// An ordered list of named steps over the context data `TData`.
///
/// Handlers return `Result<PipelineControl, Err>`; framework failures (a
/// required step without handlers) are converted into `Err` through
/// `From<FlowError>`.
pub struct Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) name: String,
  pub(crate) steps: Vec<StepDef<TData>>,
  pub(crate) handlers: HashMap<(String, Phase), Vec<Handler<TData, Err>>>,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Creates a pipeline from `(step name, optional, skip_if)` tuples.
  pub fn new(step_defs: &[(&str, bool, Option<SkipCondition<TData>>)]) -> Self {
    let steps = step_defs
      .iter()
      .map(|(name, optional, skip_if)| StepDef::new(*name, *optional, skip_if.clone()))
      .collect();

    Self {
      name: std::any::type_name::<TData>().to_string(),
      steps,
      handlers: HashMap::new(),
    }
  }

  /// Names the pipeline for log output (defaults to the context type name).
  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  fn position(&self, step_name: &str) -> Result<usize, FlowError> {
    self
      .steps
      .iter()
      .position(|s| s.name == step_name)
      .ok_or_else(|| FlowError::StepNotFound {
        step_name: step_name.to_string(),
      })
  }

  /// Panics on unknown step names: registering against a typo is a wiring bug
  /// that must surface at startup, not on the first request.
  pub(crate) fn ensure_step_exists(&self, step_name: &str) {
    if let Err(e) = self.position(step_name) {
      panic!("Pipeline '{}' setup error: {}", self.name, e);
    }
  }

  pub fn insert_after_step(
    &mut self,
    existing_step_name: &str,
    new_step_name: &str,
    optional: bool,
    skip_if: Option<SkipCondition<TData>>,
  ) -> Result<(), FlowError> {
    let idx = self.position(existing_step_name)?;
    if self.position(new_step_name).is_ok() {
      panic!(
        "Pipeline '{}' setup error: step '{}' already exists",
        self.name, new_step_name
      );
    }
    self
      .steps
      .insert(idx + 1, StepDef::new(new_step_name, optional, skip_if));
    Ok(())
  }

  /// Removes a step and every handler registered for it.
  pub fn remove_step(&mut self, step_name: &str) -> Result<(), FlowError> {
    let idx = self.position(step_name)?;
    self.steps.remove(idx);
    self.handlers.retain(|(name, _), _| name != step_name);
    Ok(())
  }

  pub(crate) fn handlers_for(&self, step_name: &str, phase: Phase) -> &[Handler<TData, Err>] {
    self
      .handlers
      .get(&(step_name.to_string(), phase))
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }
}
