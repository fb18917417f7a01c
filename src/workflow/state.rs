//! Flow Instance State
//!
//! Mutable per-instance records: the lifecycle status, the current-sequence
//! pointer, and the field values collected so far.
//!
//! Lifecycle:
//!
//! ```text
//! Started -> InProgress -> { WaitingForData <-> InProgress } -> { Completed | Cancelled }
//! ```
//!
//! `Failed` can be entered from any non-terminal status.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, FlowResult};

use super::model::{FieldId, FlowTypeId, InstanceId, SequenceId};

/// Lifecycle status of a flow instance.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Started,
    InProgress,
    WaitingForData,
    Failed,
    Completed,
    Cancelled,
}

impl FlowStatus {
    /// Numeric code used by external records.
    pub fn code(&self) -> u8 {
        match self {
            Self::Started => 1,
            Self::InProgress => 2,
            Self::WaitingForData => 3,
            Self::Failed => 4,
            Self::Completed => 5,
            Self::Cancelled => 6,
        }
    }

    /// Completed and cancelled instances never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Returns true if an instance may move from `self` to `next`.
    pub fn can_transition_to(&self, next: FlowStatus) -> bool {
        !self.is_terminal() && next != Self::Started
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Started => "started",
            Self::InProgress => "in progress",
            Self::WaitingForData => "waiting for data",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// One running or finished execution of a flow type.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FlowInstance {
    pub id: InstanceId,
    pub flow_type_id: FlowTypeId,
    pub current_sequence: SequenceId,
    pub status: FlowStatus,
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl FlowInstance {
    /// Creates a freshly started instance.
    pub fn new(id: InstanceId, flow_type_id: FlowTypeId, start_sequence: SequenceId) -> Self {
        Self {
            id,
            flow_type_id,
            current_sequence: start_sequence,
            status: FlowStatus::Started,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Applies a status change, stamping the completion time when the
    /// instance becomes `Completed`.
    pub fn set_status(&mut self, status: FlowStatus) -> FlowResult<()> {
        if !self.status.can_transition_to(status) {
            return Err(FlowError::InvalidState(format!(
                "instance {} cannot move from {} to {}",
                self.id, self.status, status
            )));
        }

        self.status = status;
        if status == FlowStatus::Completed {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Moves the current-sequence pointer.
    pub fn advance_to(&mut self, sequence_id: SequenceId) -> FlowResult<()> {
        if self.status.is_terminal() {
            return Err(FlowError::InvalidState(format!(
                "instance {} is {} and cannot advance",
                self.id, self.status
            )));
        }
        self.current_sequence = sequence_id;
        Ok(())
    }
}

/// One persisted answer for an instance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    pub instance_id: InstanceId,
    pub field_id: FieldId,
    pub value: String,
}

impl FieldValue {
    pub fn new(instance_id: InstanceId, field_id: FieldId, value: impl Into<String>) -> Self {
        Self {
            instance_id,
            field_id,
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_creation() {
        let instance = FlowInstance::new(1, 2, 5);
        assert_eq!(instance.status, FlowStatus::Started);
        assert_eq!(instance.current_sequence, 5);
        assert!(instance.completed_at.is_none());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(FlowStatus::Started.code(), 1);
        assert_eq!(FlowStatus::WaitingForData.code(), 3);
        assert_eq!(FlowStatus::Cancelled.code(), 6);
    }

    #[test]
    fn test_waiting_in_progress_cycle() {
        let mut instance = FlowInstance::new(1, 1, 1);
        instance.set_status(FlowStatus::WaitingForData).unwrap();
        instance.set_status(FlowStatus::InProgress).unwrap();
        instance.set_status(FlowStatus::WaitingForData).unwrap();
        instance.set_status(FlowStatus::InProgress).unwrap();
        assert_eq!(instance.status, FlowStatus::InProgress);
    }

    #[test]
    fn test_completion_stamps_timestamp() {
        let mut instance = FlowInstance::new(1, 1, 1);
        instance.set_status(FlowStatus::InProgress).unwrap();
        instance.set_status(FlowStatus::Completed).unwrap();

        let completed_at = instance.completed_at.expect("completion time");
        assert!(completed_at >= instance.created_at);
    }

    #[test]
    fn test_terminal_statuses_are_final() {
        let mut instance = FlowInstance::new(1, 1, 1);
        instance.set_status(FlowStatus::Cancelled).unwrap();

        assert!(instance.set_status(FlowStatus::InProgress).is_err());
        assert!(instance.advance_to(2).is_err());
        assert_eq!(instance.status, FlowStatus::Cancelled);
    }

    #[test]
    fn test_no_return_to_started() {
        let mut instance = FlowInstance::new(1, 1, 1);
        instance.set_status(FlowStatus::InProgress).unwrap();
        assert!(instance.set_status(FlowStatus::Started).is_err());
    }

    #[test]
    fn test_failed_is_resumable() {
        assert!(FlowStatus::InProgress.can_transition_to(FlowStatus::Failed));
        assert!(FlowStatus::Failed.can_transition_to(FlowStatus::InProgress));
        assert!(!FlowStatus::Completed.can_transition_to(FlowStatus::Failed));
    }

    #[test]
    fn test_instance_serialization_roundtrip() {
        let mut instance = FlowInstance::new(3, 1, 2);
        instance.set_status(FlowStatus::WaitingForData).unwrap();

        let json = serde_json::to_string(&instance).unwrap();
        assert!(json.contains("waiting_for_data"));

        let loaded: FlowInstance = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, instance);
    }
}
