//! Flow Execution Module
//!
//! Provides the orchestration engine and the components it drives for
//! each sequence of a flow instance.
//!
//! # Architecture
//!
//! - [`preparer`]: Missing-field detection and value collection
//! - [`step`]: Handler registry and concurrent step dispatch
//! - [`handlers`]: Built-in handlers for every step kind
//! - [`resolver`]: Next-sequence lookup
//! - [`engine`]: Start/process orchestration and the progression loop

pub mod engine;
pub mod handlers;
pub mod preparer;
pub mod resolver;
pub mod step;

pub use engine::{FlowEngine, Outcome};
pub use preparer::{PrepareResult, RequiredField, SequencePreparer};
pub use resolver::NextSequenceResolver;
pub use step::{HandlerRegistry, StepContext, StepDispatcher, StepHandler};
