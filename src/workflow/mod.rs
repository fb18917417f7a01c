//! Workflow Definition Module
//!
//! Provides the static catalog (fields, steps, sequences, flow types) and
//! the mutable per-instance records the engine progresses.
//!
//! # Structure
//!
//! - [`model`]: Catalog data structures
//! - [`parser`]: YAML loading and saving
//! - [`validator`]: Referential-integrity checks
//! - [`state`]: Instance status and collected field values

pub mod model;
pub mod parser;
pub mod state;
pub mod validator;

pub use model::{
    Catalog, FieldDefinition, FieldId, FlowTypeDefinition, FlowTypeId, InstanceId,
    SequenceDefinition, SequenceId, StepDefinition, StepId, StepKind,
};
pub use parser::{load_catalog, parse_catalog, save_catalog};
pub use state::{FieldValue, FlowInstance, FlowStatus};
pub use validator::validate_catalog;
