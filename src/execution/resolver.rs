//! Next-Sequence Resolution

use std::sync::Arc;

use log::debug;

use crate::error::{FlowError, FlowResult};
use crate::store::FlowStore;
use crate::workflow::{InstanceId, SequenceId};

/// Returns the sequence following `current` in `order`, or `None` when
/// `current` is the last one.
///
/// # Errors
///
/// `InvalidState` if `order` is empty or does not contain `current`.
pub fn next_in_order(order: &[SequenceId], current: SequenceId) -> FlowResult<Option<SequenceId>> {
    if order.is_empty() {
        return Err(FlowError::InvalidState(
            "flow type has no sequence order".to_string(),
        ));
    }

    let position = order.iter().position(|id| *id == current).ok_or_else(|| {
        FlowError::InvalidState(format!(
            "current sequence {} is not part of the flow order",
            current
        ))
    })?;

    Ok(order.get(position + 1).copied())
}

/// Finds where an instance goes after its current sequence.
pub struct NextSequenceResolver {
    store: Arc<dyn FlowStore>,
}

impl NextSequenceResolver {
    pub fn new(store: Arc<dyn FlowStore>) -> Self {
        Self { store }
    }

    pub async fn resolve_next(&self, instance_id: InstanceId) -> FlowResult<Option<SequenceId>> {
        let (instance, flow_type) = match self.store.instance_with_flow_type(instance_id).await? {
            Some(pair) => pair,
            None => {
                return Err(match self.store.instance(instance_id).await? {
                    Some(instance) => FlowError::not_found("flow type", instance.flow_type_id),
                    None => FlowError::not_found("instance", instance_id),
                })
            }
        };

        let next = next_in_order(&flow_type.sequences, instance.current_sequence)?;
        debug!(
            "Instance {}: sequence {} -> {:?}",
            instance_id, instance.current_sequence, next
        );
        Ok(next)
    }
}
