//! Catalog Data Model
//!
//! Static definitions that describe what a flow looks like: fields, steps,
//! sequences, and flow types. Catalogs are loaded once and shared read-only.
//!
//! # Example YAML Format
//!
//! ```yaml
//! fields:
//!   - id: 1
//!     message: Enter your full name
//!     client_pattern: "^[a-zA-Z ]{2,50}$"
//!     data_type: string
//!
//! steps:
//!   - id: 1
//!     kind: data_form
//!     fields: [1]
//!
//! sequences:
//!   - id: 1
//!     steps: [1]
//!
//! flow_types:
//!   - id: 1
//!     name: Basic
//!     sequences: [1]
//!     start_sequence: 1
//!     end_sequence: 1
//! ```
//!
//! Id lists may also be written as a comma-separated string (`"1,2,3"`);
//! they are parsed into integer lists once, at load time.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

pub type FieldId = i64;
pub type StepId = i64;
pub type SequenceId = i64;
pub type FlowTypeId = i64;
pub type InstanceId = i64;

/// Kind of work a step performs. Each kind is bound to exactly one handler.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    UserRegistration,
    DataForm,
    SendEmail,
    EmailConfirmation,
    DocumentUpload,
    ThirdPartyLookup,
    ExternalService,
}

impl StepKind {
    /// All kinds, in declaration order.
    pub const ALL: [StepKind; 7] = [
        StepKind::UserRegistration,
        StepKind::DataForm,
        StepKind::SendEmail,
        StepKind::EmailConfirmation,
        StepKind::DocumentUpload,
        StepKind::ThirdPartyLookup,
        StepKind::ExternalService,
    ];

    /// Tag used in catalogs and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserRegistration => "user_registration",
            Self::DataForm => "data_form",
            Self::SendEmail => "send_email",
            Self::EmailConfirmation => "email_confirmation",
            Self::DocumentUpload => "document_upload",
            Self::ThirdPartyLookup => "third_party_lookup",
            Self::ExternalService => "external_service",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One answerable datum.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub id: FieldId,

    /// Prompt shown to whoever supplies the value
    #[serde(default)]
    pub message: String,

    /// Validation pattern handed to clients
    #[serde(default)]
    pub client_pattern: String,

    /// Validation pattern for server-side checks
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_pattern: String,

    /// Data-type tag (e.g. "string", "email", "date")
    #[serde(default = "default_data_type")]
    pub data_type: String,

    /// Internal fields are generated by the system, not asked of the user
    #[serde(default)]
    pub internal: bool,
}

fn default_data_type() -> String {
    "string".to_string()
}

impl FieldDefinition {
    pub fn new(id: FieldId, message: impl Into<String>) -> Self {
        Self {
            id,
            message: message.into(),
            client_pattern: String::new(),
            server_pattern: String::new(),
            data_type: default_data_type(),
            internal: false,
        }
    }

    /// Sets the client pattern and, when unset, the server pattern too.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.client_pattern = pattern.into();
        if self.server_pattern.is_empty() {
            self.server_pattern = self.client_pattern.clone();
        }
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = data_type.into();
        self
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }
}

/// One unit of work.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StepDefinition {
    pub id: StepId,
    pub kind: StepKind,

    /// Ordered ids of the fields this step requires
    #[serde(deserialize_with = "id_list")]
    pub fields: Vec<FieldId>,
}

impl StepDefinition {
    pub fn new(id: StepId, kind: StepKind) -> Self {
        Self {
            id,
            kind,
            fields: Vec::new(),
        }
    }

    /// Adds a required field.
    pub fn requires(mut self, field_id: FieldId) -> Self {
        self.fields.push(field_id);
        self
    }
}

/// A group of steps executed together.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SequenceDefinition {
    pub id: SequenceId,

    #[serde(deserialize_with = "id_list")]
    pub steps: Vec<StepId>,
}

impl SequenceDefinition {
    pub fn new(id: SequenceId, steps: Vec<StepId>) -> Self {
        Self { id, steps }
    }
}

/// A workflow template.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FlowTypeDefinition {
    pub id: FlowTypeId,

    #[serde(default)]
    pub name: String,

    /// Execution order of sequences
    #[serde(deserialize_with = "id_list")]
    pub sequences: Vec<SequenceId>,

    pub start_sequence: SequenceId,
    pub end_sequence: SequenceId,
}

impl FlowTypeDefinition {
    /// Creates a flow type whose start and end are the ends of `sequences`.
    pub fn linear(id: FlowTypeId, name: impl Into<String>, sequences: Vec<SequenceId>) -> Self {
        let start_sequence = sequences.first().copied().unwrap_or_default();
        let end_sequence = sequences.last().copied().unwrap_or_default();
        Self {
            id,
            name: name.into(),
            sequences,
            start_sequence,
            end_sequence,
        }
    }

    /// Overrides the declared end sequence.
    pub fn with_end(mut self, end_sequence: SequenceId) -> Self {
        self.end_sequence = end_sequence;
        self
    }

    /// Position of a sequence in the execution order.
    pub fn position_of(&self, sequence_id: SequenceId) -> Option<usize> {
        self.sequences.iter().position(|id| *id == sequence_id)
    }
}

/// Deserializes an id list from either a sequence of integers or a
/// comma-separated string such as `"4,5,6"`.
fn id_list<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = Value::deserialize(deserializer)?;
    match val {
        Value::Null => Ok(Vec::new()),
        Value::Number(n) => n
            .as_i64()
            .map(|id| vec![id])
            .ok_or_else(|| de::Error::custom("Expected integer id")),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<i64>()
                    .map_err(|_| de::Error::custom(format!("Invalid id '{}' in list", part)))
            })
            .collect(),
        Value::Array(arr) => arr
            .into_iter()
            .map(|v| match v {
                Value::Number(n) => n
                    .as_i64()
                    .ok_or_else(|| de::Error::custom("Expected integer id in array")),
                _ => Err(de::Error::custom("Expected integer id in array")),
            })
            .collect(),
        _ => Err(de::Error::custom("Expected id list or comma-separated string")),
    }
}

/// The complete set of static definitions.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,

    #[serde(default)]
    pub steps: Vec<StepDefinition>,

    #[serde(default)]
    pub sequences: Vec<SequenceDefinition>,

    #[serde(default)]
    pub flow_types: Vec<FlowTypeDefinition>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_sequence(mut self, sequence: SequenceDefinition) -> Self {
        self.sequences.push(sequence);
        self
    }

    pub fn with_flow_type(mut self, flow_type: FlowTypeDefinition) -> Self {
        self.flow_types.push(flow_type);
        self
    }

    pub fn field(&self, id: FieldId) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn step(&self, id: StepId) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn sequence(&self, id: SequenceId) -> Option<&SequenceDefinition> {
        self.sequences.iter().find(|s| s.id == id)
    }

    pub fn flow_type(&self, id: FlowTypeId) -> Option<&FlowTypeDefinition> {
        self.flow_types.iter().find(|f| f.id == id)
    }

    /// Step kinds referenced anywhere in the catalog, sorted and unique.
    pub fn step_kinds(&self) -> Vec<StepKind> {
        let kinds: HashSet<StepKind> = self.steps.iter().map(|s| s.kind).collect();
        let mut kinds: Vec<StepKind> = kinds.into_iter().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// Returns true if the catalog defines no flow types.
    pub fn is_empty(&self) -> bool {
        self.flow_types.is_empty()
    }
}
