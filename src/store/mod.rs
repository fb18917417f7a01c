//! Persistence Contracts
//!
//! The engine reads definitions and mutates instances exclusively through
//! these traits, so the backing technology is pluggable.
//!
//! - [`CatalogStore`]: read-only definition lookups
//! - [`InstanceStore`]: instance creation and mutation
//! - [`FieldValueStore`]: collected answers per instance
//! - [`memory`]: in-process implementation of all three

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::FlowResult;
use crate::workflow::{
    FieldDefinition, FieldId, FlowInstance, FlowStatus, FlowTypeDefinition, FlowTypeId,
    InstanceId, SequenceDefinition, SequenceId, StepDefinition, StepId,
};

pub mod memory;

pub use memory::MemoryStore;

/// Read-only lookups over the catalog.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn flow_type(&self, id: FlowTypeId) -> FlowResult<Option<FlowTypeDefinition>>;
    async fn sequence(&self, id: SequenceId) -> FlowResult<Option<SequenceDefinition>>;
    async fn step(&self, id: StepId) -> FlowResult<Option<StepDefinition>>;

    /// Returns the steps that exist among `ids`, in the order of `ids`.
    async fn steps(&self, ids: &[StepId]) -> FlowResult<Vec<StepDefinition>>;

    /// Returns the fields that exist among `ids`, in the order of `ids`.
    async fn fields(&self, ids: &[FieldId]) -> FlowResult<Vec<FieldDefinition>>;
}

/// Instance creation and mutation.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Creates a `Started` instance pointing at `start_sequence`.
    async fn create_instance(
        &self,
        flow_type_id: FlowTypeId,
        start_sequence: SequenceId,
    ) -> FlowResult<FlowInstance>;

    async fn instance(&self, id: InstanceId) -> FlowResult<Option<FlowInstance>>;

    /// Fetches an instance together with its flow type.
    async fn instance_with_flow_type(
        &self,
        id: InstanceId,
    ) -> FlowResult<Option<(FlowInstance, FlowTypeDefinition)>>;

    /// Updates the status; becoming `Completed` stamps the completion time.
    async fn update_status(&self, id: InstanceId, status: FlowStatus) -> FlowResult<()>;

    async fn update_current_sequence(
        &self,
        id: InstanceId,
        sequence_id: SequenceId,
    ) -> FlowResult<()>;
}

/// Collected answers, unique per (instance, field).
#[async_trait]
pub trait FieldValueStore: Send + Sync {
    /// Values stored for `instance_id`, restricted to `field_ids`.
    async fn field_values(
        &self,
        instance_id: InstanceId,
        field_ids: &[FieldId],
    ) -> FlowResult<HashMap<FieldId, String>>;

    /// Writes a batch of new values atomically: either every row is stored
    /// or none is. Returns the number of rows written.
    async fn insert_field_values(
        &self,
        instance_id: InstanceId,
        values: Vec<(FieldId, String)>,
    ) -> FlowResult<usize>;
}

/// Everything the engine needs from persistence.
pub trait FlowStore: CatalogStore + InstanceStore + FieldValueStore {}

impl<T> FlowStore for T where T: CatalogStore + InstanceStore + FieldValueStore {}
