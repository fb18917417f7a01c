//! Catalog Validation
//!
//! Referential-integrity checks run once when a catalog is loaded:
//! - Unique ids within each section
//! - Non-empty step, sequence, and order lists
//! - Every referenced field, step, and sequence exists
//! - Start/end sequences belong to the flow type's order

use std::collections::HashSet;

use log::{debug, info, warn};

use super::model::{Catalog, FlowTypeDefinition};

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyCatalog,
    DuplicateId { section: &'static str, id: i64 },
    NonPositiveId { section: &'static str, id: i64 },
    EmptyStepFields(i64),
    EmptySequence(i64),
    EmptyOrder(i64),
    UnknownField { step: i64, field: i64 },
    UnknownStep { sequence: i64, step: i64 },
    UnknownSequence { flow_type: i64, sequence: i64 },
    RepeatedSequence { flow_type: i64, sequence: i64 },
    StartNotInOrder { flow_type: i64, sequence: i64 },
    EndNotInOrder { flow_type: i64, sequence: i64 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCatalog => write!(f, "Catalog defines no flow types"),
            Self::DuplicateId { section, id } => write!(f, "Duplicate {} id: {}", section, id),
            Self::NonPositiveId { section, id } => {
                write!(f, "{} id must be positive, got {}", section, id)
            }
            Self::EmptyStepFields(id) => write!(f, "Step {} requires no fields", id),
            Self::EmptySequence(id) => write!(f, "Sequence {} has no steps", id),
            Self::EmptyOrder(id) => write!(f, "Flow type {} has no sequence order", id),
            Self::UnknownField { step, field } => {
                write!(f, "Step {} references unknown field {}", step, field)
            }
            Self::UnknownStep { sequence, step } => {
                write!(f, "Sequence {} references unknown step {}", sequence, step)
            }
            Self::UnknownSequence {
                flow_type,
                sequence,
            } => write!(
                f,
                "Flow type {} references unknown sequence {}",
                flow_type, sequence
            ),
            Self::RepeatedSequence {
                flow_type,
                sequence,
            } => write!(
                f,
                "Flow type {} lists sequence {} more than once",
                flow_type, sequence
            ),
            Self::StartNotInOrder {
                flow_type,
                sequence,
            } => write!(
                f,
                "Flow type {}: start sequence {} is not in its order",
                flow_type, sequence
            ),
            Self::EndNotInOrder {
                flow_type,
                sequence,
            } => write!(
                f,
                "Flow type {}: end sequence {} is not in its order",
                flow_type, sequence
            ),
        }
    }
}

/// Collects ids of one section, recording duplicates and non-positive ids.
fn collect_ids(
    section: &'static str,
    ids: impl Iterator<Item = i64>,
    errors: &mut Vec<ValidationError>,
) -> HashSet<i64> {
    let mut seen = HashSet::new();
    for id in ids {
        if id <= 0 {
            errors.push(ValidationError::NonPositiveId { section, id });
        }
        if !seen.insert(id) {
            errors.push(ValidationError::DuplicateId { section, id });
        }
    }
    seen
}

/// Checks one flow type's order against the known sequences.
fn validate_flow_type(
    flow_type: &FlowTypeDefinition,
    sequence_ids: &HashSet<i64>,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let id = flow_type.id;

    if flow_type.sequences.is_empty() {
        errors.push(ValidationError::EmptyOrder(id));
        return errors;
    }

    let mut in_order = HashSet::new();
    for sequence in &flow_type.sequences {
        if !sequence_ids.contains(sequence) {
            errors.push(ValidationError::UnknownSequence {
                flow_type: id,
                sequence: *sequence,
            });
        }
        if !in_order.insert(*sequence) {
            errors.push(ValidationError::RepeatedSequence {
                flow_type: id,
                sequence: *sequence,
            });
        }
    }

    if !in_order.contains(&flow_type.start_sequence) {
        errors.push(ValidationError::StartNotInOrder {
            flow_type: id,
            sequence: flow_type.start_sequence,
        });
    }

    if !in_order.contains(&flow_type.end_sequence) {
        errors.push(ValidationError::EndNotInOrder {
            flow_type: id,
            sequence: flow_type.end_sequence,
        });
    }

    // Reachable at runtime as an "inconsistent state" halt, so only warn.
    if flow_type.sequences.last() != Some(&flow_type.end_sequence) {
        warn!(
            "Flow type {}: last sequence in order ({:?}) differs from declared end sequence {}",
            id,
            flow_type.sequences.last(),
            flow_type.end_sequence
        );
    }

    if flow_type.sequences.first() != Some(&flow_type.start_sequence) {
        debug!(
            "Flow type {} starts mid-order at sequence {}",
            id, flow_type.start_sequence
        );
    }

    errors
}

/// Validates the entire catalog.
///
/// Performs the following checks:
/// 1. At least one flow type exists
/// 2. No duplicate or non-positive ids in any section
/// 3. Every step requires at least one known field
/// 4. Every sequence has at least one known step
/// 5. Every flow type has a non-repeating order of known sequences
///    containing its start and end sequences
///
/// All problems are reported together, one per line.
pub fn validate_catalog(catalog: &Catalog) -> Result<(), String> {
    info!(
        "Validating catalog: {} fields, {} steps, {} sequences, {} flow types",
        catalog.fields.len(),
        catalog.steps.len(),
        catalog.sequences.len(),
        catalog.flow_types.len()
    );

    if catalog.is_empty() {
        return Err(ValidationError::EmptyCatalog.to_string());
    }

    let mut all_errors = Vec::new();

    let field_ids = collect_ids("field", catalog.fields.iter().map(|f| f.id), &mut all_errors);
    let step_ids = collect_ids("step", catalog.steps.iter().map(|s| s.id), &mut all_errors);
    let sequence_ids = collect_ids(
        "sequence",
        catalog.sequences.iter().map(|s| s.id),
        &mut all_errors,
    );
    collect_ids(
        "flow type",
        catalog.flow_types.iter().map(|f| f.id),
        &mut all_errors,
    );

    for step in &catalog.steps {
        if step.fields.is_empty() {
            all_errors.push(ValidationError::EmptyStepFields(step.id));
        }
        for field in &step.fields {
            if !field_ids.contains(field) {
                all_errors.push(ValidationError::UnknownField {
                    step: step.id,
                    field: *field,
                });
            }
        }
    }

    for sequence in &catalog.sequences {
        if sequence.steps.is_empty() {
            all_errors.push(ValidationError::EmptySequence(sequence.id));
        }
        for step in &sequence.steps {
            if !step_ids.contains(step) {
                all_errors.push(ValidationError::UnknownStep {
                    sequence: sequence.id,
                    step: *step,
                });
            }
        }
    }

    for flow_type in &catalog.flow_types {
        all_errors.extend(validate_flow_type(flow_type, &sequence_ids));
    }

    if !all_errors.is_empty() {
        let error_messages: Vec<String> = all_errors.iter().map(|e| e.to_string()).collect();
        return Err(error_messages.join("\n"));
    }

    info!("Catalog validated: {} flow types", catalog.flow_types.len());
    Ok(())
}
