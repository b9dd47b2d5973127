// core/src/lib.rs

//! parcelpay_flow: the step pipeline engine behind parcelpay's payment and
//! fulfilment flows.
//!
//! A flow is a `Pipeline<T, Err>`: an ordered list of named steps, each with
//! `before`, `on` and `after` handlers that share one lockable context
//! (`ContextData<T>`). Handlers return `PipelineControl::Continue` to move on or
//! `PipelineControl::Stop` to end the run early, and the run reports which step
//! halted it. A `Registry` keyed by context type dispatches a context to the
//! pipeline registered for it, so HTTP handlers never hold pipeline references.

pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use crate::core::context_data::ContextData;
pub use crate::core::control::{PipelineControl, PipelineResult};
pub use crate::core::handler::Handler;
pub use crate::core::step::{SkipCondition, StepDef};

pub use crate::pipeline::Pipeline;

pub use crate::error::{FlowError, FlowResult};

pub use crate::registry::Registry;
