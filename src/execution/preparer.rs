//! Sequence Preparation
//!
//! Decides whether a sequence has every field value it needs. Submitted
//! values for still-missing fields are persisted along the way; values for
//! fields that are already satisfied, or not required at all, are ignored.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, FlowResult};
use crate::store::FlowStore;
use crate::workflow::{FieldDefinition, FieldId, InstanceId, SequenceId, StepId};

/// Message returned while a sequence still lacks values.
pub const MISSING_DATA_MESSAGE: &str = "additional data required";

/// Message returned once a sequence can run.
pub const READY_MESSAGE: &str = "sequence ready";

/// Descriptor of a field the caller still has to supply.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RequiredField {
    pub id: FieldId,
    pub message: String,
    pub client_pattern: String,
    pub data_type: String,
    pub internal: bool,
}

impl From<&FieldDefinition> for RequiredField {
    fn from(field: &FieldDefinition) -> Self {
        Self {
            id: field.id,
            message: field.message.clone(),
            client_pattern: field.client_pattern.clone(),
            data_type: field.data_type.clone(),
            internal: field.internal,
        }
    }
}

/// Result of preparing one sequence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrepareResult {
    pub ready: bool,

    /// Steps to dispatch; empty unless ready
    pub step_ids: Vec<StepId>,

    /// Every value available for the sequence; empty unless ready
    pub merged_values: HashMap<FieldId, String>,

    /// Fields still lacking a value, in requirement order
    pub missing_fields: Vec<RequiredField>,

    pub message: String,
}

/// Checks sequences for missing data and records submitted answers.
pub struct SequencePreparer {
    store: Arc<dyn FlowStore>,
}

impl SequencePreparer {
    pub fn new(store: Arc<dyn FlowStore>) -> Self {
        Self { store }
    }

    /// Prepares `sequence_id` for `instance_id`.
    ///
    /// # Errors
    ///
    /// * `NotFound` - the sequence or one of its steps is not defined
    /// * `InvalidState` - the sequence has no steps, or a step has no fields
    pub async fn prepare(
        &self,
        sequence_id: SequenceId,
        submitted: &HashMap<FieldId, String>,
        instance_id: InstanceId,
    ) -> FlowResult<PrepareResult> {
        let sequence = self
            .store
            .sequence(sequence_id)
            .await?
            .ok_or_else(|| FlowError::not_found("sequence", sequence_id))?;

        if sequence.steps.is_empty() {
            return Err(FlowError::InvalidState(format!(
                "sequence {} has no steps",
                sequence_id
            )));
        }

        let steps = self.store.steps(&sequence.steps).await?;
        if let Some(missing) = sequence
            .steps
            .iter()
            .find(|id| !steps.iter().any(|s| s.id == **id))
        {
            return Err(FlowError::not_found("step", *missing));
        }

        let mut required: Vec<FieldId> = Vec::new();
        for step in &steps {
            if step.fields.is_empty() {
                return Err(FlowError::InvalidState(format!(
                    "step {} has no fields",
                    step.id
                )));
            }
            for field_id in &step.fields {
                if !required.contains(field_id) {
                    required.push(*field_id);
                }
            }
        }

        let mut values = self.store.field_values(instance_id, &required).await?;

        if !submitted.is_empty() {
            let new_values: Vec<(FieldId, String)> = required
                .iter()
                .filter(|id| !values.contains_key(*id))
                .filter_map(|id| submitted.get(id).map(|value| (*id, value.clone())))
                .collect();

            if !new_values.is_empty() {
                self.store
                    .insert_field_values(instance_id, new_values.clone())
                    .await?;
                info!(
                    "Stored {} new values for instance {}",
                    new_values.len(),
                    instance_id
                );
                values.extend(new_values);
            }
        }

        let missing: Vec<FieldId> = required
            .iter()
            .filter(|id| !values.contains_key(*id))
            .copied()
            .collect();

        if missing.is_empty() {
            debug!(
                "Sequence {} ready for instance {} ({} values)",
                sequence_id,
                instance_id,
                values.len()
            );
            return Ok(PrepareResult {
                ready: true,
                step_ids: sequence.steps,
                merged_values: values,
                missing_fields: Vec::new(),
                message: READY_MESSAGE.to_string(),
            });
        }

        let definitions = self.store.fields(&missing).await?;
        let missing_fields: Vec<RequiredField> =
            definitions.iter().map(RequiredField::from).collect();

        debug!(
            "Sequence {} waiting on fields {:?} for instance {}",
            sequence_id, missing, instance_id
        );

        Ok(PrepareResult {
            ready: false,
            step_ids: Vec::new(),
            merged_values: HashMap::new(),
            missing_fields,
            message: MISSING_DATA_MESSAGE.to_string(),
        })
    }
}
