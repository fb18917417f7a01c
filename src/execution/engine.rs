//! Flow Orchestration Engine
//!
//! The engine that drives instances through their flow type:
//! - Starting new instances at the flow's start sequence
//! - Resuming instances with newly submitted field values
//! - The progression loop shared by both
//! - Per-instance exclusion so one instance progresses at a time
//!
//! Every public operation returns an [`Outcome`]; errors never escape the
//! engine as panics or raw error values.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::config::{EngineConfig, Latency};
use crate::error::{FlowError, FlowResult};
use crate::store::FlowStore;
use crate::workflow::{FieldId, FlowInstance, FlowStatus, FlowTypeId, InstanceId, SequenceId};

use super::preparer::{RequiredField, SequencePreparer};
use super::resolver::NextSequenceResolver;
use super::step::{HandlerRegistry, StepDispatcher};

/// Message returned when an instance reaches its end sequence.
pub const COMPLETED_MESSAGE: &str = "flow completed";

/// Message returned when the order tail differs from the declared end.
pub const INCONSISTENT_STATE_MESSAGE: &str = "inconsistent state";

/// Message returned for failures whose details stay in the logs.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal error";

pub const CANCELLED_MESSAGE: &str = "flow cancelled";

/// Structured result of every engine operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Outcome {
    pub success: bool,

    /// Instance the outcome refers to; 0 when none was created
    pub instance_id: InstanceId,

    pub complete: bool,

    /// Fields the caller must supply before the flow can continue
    pub required_fields: Vec<RequiredField>,

    pub message: String,
}

impl Outcome {
    /// The instance is blocked on missing data.
    pub fn waiting(
        instance_id: InstanceId,
        required_fields: Vec<RequiredField>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            success: true,
            instance_id,
            complete: false,
            required_fields,
            message: message.into(),
        }
    }

    pub fn completed(instance_id: InstanceId) -> Self {
        Self {
            success: true,
            instance_id,
            complete: true,
            required_fields: Vec::new(),
            message: COMPLETED_MESSAGE.to_string(),
        }
    }

    pub fn cancelled(instance_id: InstanceId) -> Self {
        Self {
            success: true,
            instance_id,
            complete: false,
            required_fields: Vec::new(),
            message: CANCELLED_MESSAGE.to_string(),
        }
    }

    pub fn failure(instance_id: InstanceId, message: impl Into<String>) -> Self {
        Self {
            success: false,
            instance_id,
            complete: false,
            required_fields: Vec::new(),
            message: message.into(),
        }
    }
}

/// Text of an error as shown to callers.
fn public_message(err: &FlowError) -> String {
    if err.is_caller_visible() {
        err.to_string()
    } else {
        INTERNAL_ERROR_MESSAGE.to_string()
    }
}

/// One async mutex per instance id, created on demand and pruned when idle.
#[derive(Default)]
struct InstanceLocks {
    slots: Mutex<HashMap<InstanceId, Arc<AsyncMutex<()>>>>,
}

impl InstanceLocks {
    async fn acquire(&self, id: InstanceId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.entry(id).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Releases `guard` and drops the slot if nobody else holds or awaits it.
    fn release(&self, id: InstanceId, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots
            .get(&id)
            .map_or(false, |slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&id);
        }
    }

    fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Flow orchestration engine.
///
/// # Example
///
/// ```rust,no_run
/// use std::collections::HashMap;
/// use std::sync::Arc;
///
/// use flowgate::config::Latency;
/// use flowgate::execution::{FlowEngine, HandlerRegistry};
/// use flowgate::store::MemoryStore;
/// use flowgate::workflow::load_catalog;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let catalog = load_catalog("demos/onboarding.yaml")?;
///     let store = Arc::new(MemoryStore::new(catalog));
///     let engine = FlowEngine::new(store, HandlerRegistry::builtin(Latency::None));
///
///     let outcome = engine.start(1).await;
///     let values = HashMap::from([(1, "Ana".to_string())]);
///     let outcome = engine.process(outcome.instance_id, values).await;
///     println!("{}", outcome.message);
///     Ok(())
/// }
/// ```
pub struct FlowEngine {
    store: Arc<dyn FlowStore>,
    preparer: SequencePreparer,
    dispatcher: StepDispatcher,
    resolver: NextSequenceResolver,
    locks: InstanceLocks,
}

impl FlowEngine {
    /// Creates an engine over `store`, dispatching through `registry`.
    pub fn new(store: Arc<dyn FlowStore>, registry: HandlerRegistry) -> Self {
        let registry = Arc::new(registry);
        Self {
            preparer: SequencePreparer::new(store.clone()),
            dispatcher: StepDispatcher::new(store.clone(), registry),
            resolver: NextSequenceResolver::new(store.clone()),
            locks: InstanceLocks::default(),
            store,
        }
    }

    /// Creates an engine with the built-in handlers configured by `config`.
    pub fn from_config(store: Arc<dyn FlowStore>, config: &EngineConfig) -> Self {
        Self::new(store, HandlerRegistry::builtin(config.latency))
    }

    /// Creates an engine with built-in handlers and no simulated latency.
    pub fn with_builtin_handlers(store: Arc<dyn FlowStore>) -> Self {
        Self::new(store, HandlerRegistry::builtin(Latency::None))
    }

    pub fn store(&self) -> &Arc<dyn FlowStore> {
        &self.store
    }

    /// Number of instances currently holding or awaiting their lock.
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    /// Creates an instance of `flow_type_id` and progresses it as far as
    /// the available data allows.
    pub async fn start(&self, flow_type_id: FlowTypeId) -> Outcome {
        if flow_type_id <= 0 {
            let err = FlowError::InvalidInput(format!("invalid flow type id {}", flow_type_id));
            warn!("Rejected start: {}", err);
            return Outcome::failure(0, public_message(&err));
        }

        let instance = match self.create_instance(flow_type_id).await {
            Ok(instance) => instance,
            Err(e) => {
                if e.is_caller_visible() {
                    warn!("Could not start flow type {}: {}", flow_type_id, e);
                } else {
                    error!("Could not start flow type {}: {}", flow_type_id, e);
                }
                return Outcome::failure(0, public_message(&e));
            }
        };

        info!(
            "Started instance {} of flow type {} at sequence {}",
            instance.id, flow_type_id, instance.current_sequence
        );

        let guard = self.locks.acquire(instance.id).await;
        let outcome = self
            .progress(instance.id, instance.current_sequence, HashMap::new())
            .await;
        self.locks.release(instance.id, guard);
        outcome
    }

    /// Resumes `instance_id` with newly submitted field values.
    pub async fn process(
        &self,
        instance_id: InstanceId,
        submitted: HashMap<FieldId, String>,
    ) -> Outcome {
        if instance_id <= 0 {
            let err = FlowError::InvalidInput(format!("invalid instance id {}", instance_id));
            warn!("Rejected process: {}", err);
            return Outcome::failure(instance_id, public_message(&err));
        }

        if let Some(field_id) = submitted.keys().find(|id| **id <= 0) {
            let err = FlowError::InvalidInput(format!("invalid field id {}", field_id));
            warn!("Rejected process for instance {}: {}", instance_id, err);
            return Outcome::failure(instance_id, public_message(&err));
        }

        let guard = self.locks.acquire(instance_id).await;
        let outcome = self.process_locked(instance_id, submitted).await;
        self.locks.release(instance_id, guard);
        outcome
    }

    /// Current record of `instance_id`.
    pub async fn status(&self, instance_id: InstanceId) -> FlowResult<FlowInstance> {
        if instance_id <= 0 {
            return Err(FlowError::InvalidInput(format!(
                "invalid instance id {}",
                instance_id
            )));
        }

        self.store
            .instance(instance_id)
            .await?
            .ok_or_else(|| FlowError::not_found("instance", instance_id))
    }

    /// Moves a non-terminal instance to `Cancelled`.
    pub async fn cancel(&self, instance_id: InstanceId) -> Outcome {
        let guard = self.locks.acquire(instance_id).await;
        let result = self.cancel_locked(instance_id).await;
        self.locks.release(instance_id, guard);

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Could not cancel instance {}: {}", instance_id, e);
                Outcome::failure(instance_id, public_message(&e))
            }
        }
    }

    async fn create_instance(&self, flow_type_id: FlowTypeId) -> FlowResult<FlowInstance> {
        let flow_type = self
            .store
            .flow_type(flow_type_id)
            .await?
            .ok_or_else(|| FlowError::not_found("flow type", flow_type_id))?;

        self.store
            .create_instance(flow_type.id, flow_type.start_sequence)
            .await
    }

    async fn process_locked(
        &self,
        instance_id: InstanceId,
        submitted: HashMap<FieldId, String>,
    ) -> Outcome {
        let instance = match self.status(instance_id).await {
            Ok(instance) => instance,
            Err(e) => {
                warn!("Cannot process instance {}: {}", instance_id, e);
                return Outcome::failure(instance_id, public_message(&e));
            }
        };

        if instance.status.is_terminal() {
            info!(
                "Instance {} is already {}, nothing to do",
                instance_id, instance.status
            );
            let mut outcome = Outcome::failure(
                instance_id,
                format!("instance {} is already {}", instance_id, instance.status),
            );
            outcome.complete = instance.status == FlowStatus::Completed;
            return outcome;
        }

        debug!(
            "Resuming instance {} at sequence {} with {} submitted values",
            instance_id,
            instance.current_sequence,
            submitted.len()
        );
        self.progress(instance_id, instance.current_sequence, submitted)
            .await
    }

    async fn cancel_locked(&self, instance_id: InstanceId) -> FlowResult<Outcome> {
        let instance = self.status(instance_id).await?;

        if instance.status.is_terminal() {
            return Ok(Outcome::failure(
                instance_id,
                format!("instance {} is already {}", instance_id, instance.status),
            ));
        }

        self.store
            .update_status(instance_id, FlowStatus::Cancelled)
            .await?;
        info!("Cancelled instance {}", instance_id);

        Ok(Outcome::cancelled(instance_id))
    }

    /// Runs the progression loop and turns any error into an outcome.
    async fn progress(
        &self,
        instance_id: InstanceId,
        sequence_id: SequenceId,
        submitted: HashMap<FieldId, String>,
    ) -> Outcome {
        match self.run_loop(instance_id, sequence_id, submitted).await {
            Ok(outcome) => outcome,
            Err(e) => self.conclude_with_error(instance_id, e).await,
        }
    }

    async fn conclude_with_error(&self, instance_id: InstanceId, err: FlowError) -> Outcome {
        if err.is_dispatch_failure() {
            error!(
                "Step dispatch failed for instance {}, status left unchanged: {}",
                instance_id, err
            );
        } else if let FlowError::Internal(_) = err {
            error!("Instance {} failed: {}", instance_id, err);
            if let Err(e) = self
                .store
                .update_status(instance_id, FlowStatus::Failed)
                .await
            {
                error!("Could not mark instance {} as failed: {}", instance_id, e);
            }
        } else {
            warn!("Instance {} halted: {}", instance_id, err);
        }

        Outcome::failure(instance_id, public_message(&err))
    }

    async fn run_loop(
        &self,
        instance_id: InstanceId,
        mut sequence_id: SequenceId,
        mut submitted: HashMap<FieldId, String>,
    ) -> FlowResult<Outcome> {
        loop {
            let prepared = self
                .preparer
                .prepare(sequence_id, &submitted, instance_id)
                .await?;

            if !prepared.ready {
                if prepared.missing_fields.is_empty() {
                    return Err(FlowError::InvalidState(format!(
                        "sequence {} requires undefined fields",
                        sequence_id
                    )));
                }

                self.store
                    .update_status(instance_id, FlowStatus::WaitingForData)
                    .await?;
                info!(
                    "Instance {} waiting for {} fields at sequence {}",
                    instance_id,
                    prepared.missing_fields.len(),
                    sequence_id
                );
                return Ok(Outcome::waiting(
                    instance_id,
                    prepared.missing_fields,
                    prepared.message,
                ));
            }

            self.dispatcher
                .dispatch(&prepared.step_ids, &prepared.merged_values)
                .await?;
            self.store
                .update_status(instance_id, FlowStatus::InProgress)
                .await?;

            match self.resolver.resolve_next(instance_id).await? {
                Some(next) => {
                    self.store
                        .update_current_sequence(instance_id, next)
                        .await?;
                    debug!(
                        "Instance {} advanced from sequence {} to {}",
                        instance_id, sequence_id, next
                    );
                    sequence_id = next;
                    submitted.clear();
                }
                None => return self.finish(instance_id, sequence_id).await,
            }
        }
    }

    /// Completes the instance if `last_sequence` is the declared end.
    async fn finish(
        &self,
        instance_id: InstanceId,
        last_sequence: SequenceId,
    ) -> FlowResult<Outcome> {
        let (_, flow_type) = self
            .store
            .instance_with_flow_type(instance_id)
            .await?
            .ok_or_else(|| FlowError::not_found("instance", instance_id))?;

        if last_sequence != flow_type.end_sequence {
            warn!(
                "Instance {} ran out of sequences at {} but flow type {} ends at {}",
                instance_id, last_sequence, flow_type.id, flow_type.end_sequence
            );
            return Ok(Outcome::failure(instance_id, INCONSISTENT_STATE_MESSAGE));
        }

        self.store
            .update_status(instance_id, FlowStatus::Completed)
            .await?;
        info!("Instance {} completed", instance_id);
        Ok(Outcome::completed(instance_id))
    }
}
