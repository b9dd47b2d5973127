// core/src/registry.rs

//! `Registry<E>`: pipelines keyed by their context data type.
//!
//! Callers build a context, hand it to `Registry::run`, and the pipeline
//! registered for that context type executes it. `E` is the error type the
//! caller wants back; pipeline errors and framework errors both convert into it.

use crate::core::context_data::ContextData;
use crate::core::control::PipelineResult;
use crate::error::FlowError;
use crate::pipeline::Pipeline;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{event, Level};

#[async_trait]
trait ErasedPipeline<E>: Send + Sync
where
  E: std::error::Error + Send + Sync + 'static,
{
  /// `ctx` holds a `ContextData<TData>` for the pipeline's own `TData`.
  async fn run_erased(&self, ctx: Box<dyn Any + Send>) -> Result<PipelineResult, E>;
}

struct Registered<TData, PErr>
where
  TData: 'static + Send + Sync,
  PErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pipeline: Arc<Pipeline<TData, PErr>>,
}

#[async_trait]
impl<TData, PErr, E> ErasedPipeline<E> for Registered<TData, PErr>
where
  TData: 'static + Send + Sync,
  PErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
  E: std::error::Error + From<PErr> + From<FlowError> + Send + Sync + 'static,
{
  async fn run_erased(&self, ctx: Box<dyn Any + Send>) -> Result<PipelineResult, E> {
    let ctx_data = ctx.downcast::<ContextData<TData>>().map_err(|_| {
      E::from(FlowError::TypeMismatch {
        expected_type: std::any::type_name::<ContextData<TData>>().to_string(),
      })
    })?;
    self.pipeline.run(*ctx_data).await.map_err(E::from)
  }
}

pub struct Registry<E = FlowError>
where
  E: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pipelines: RwLock<HashMap<TypeId, Arc<dyn ErasedPipeline<E>>>>,
  _error: PhantomData<E>,
}

impl<E> Default for Registry<E>
where
  E: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<E> Registry<E>
where
  E: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      pipelines: RwLock::new(HashMap::new()),
      _error: PhantomData,
    }
  }

  /// Registers `pipeline` for its context type, replacing any earlier one.
  pub fn register_pipeline<TData, PErr>(&self, pipeline: Pipeline<TData, PErr>)
  where
    TData: 'static + Send + Sync,
    PErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
    E: From<PErr>,
  {
    event!(Level::DEBUG, pipeline = %pipeline.name(), "Registering pipeline.");
    let entry: Arc<dyn ErasedPipeline<E>> = Arc::new(Registered {
      pipeline: Arc::new(pipeline),
    });
    self.pipelines.write().insert(TypeId::of::<TData>(), entry);
  }

  pub fn is_registered<TData: 'static + Send + Sync>(&self) -> bool {
    self.pipelines.read().contains_key(&TypeId::of::<TData>())
  }

  /// Runs the pipeline registered for `TData`.
  pub async fn run<TData>(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, E>
  where
    TData: 'static + Send + Sync,
  {
    let entry = self.pipelines.read().get(&TypeId::of::<TData>()).cloned();
    let Some(entry) = entry else {
      let context_type = std::any::type_name::<TData>().to_string();
      event!(Level::ERROR, %context_type, "No pipeline registered.");
      return Err(E::from(FlowError::PipelineNotRegistered { context_type }));
    };
    entry.run_erased(Box::new(ctx_data)).await
  }
}
