//! Step Execution
//!
//! Handles running the steps of one sequence:
//! - Kind-to-handler resolution through a table built once
//! - Restricting available values to each step's own fields
//! - Concurrent fan-out with a fan-in barrier
//!
//! Steps in one batch are independent side effects. When one fails, the
//! others still run to completion and nothing is rolled back.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, error, info, warn};

use crate::config::Latency;
use crate::error::{FlowError, FlowResult};
use crate::store::FlowStore;
use crate::workflow::{FieldId, StepId, StepKind};

use super::handlers::SimulatedHandler;

/// Input handed to a step handler.
#[derive(Debug, Clone, PartialEq)]
pub struct StepContext {
    pub step_id: StepId,
    pub kind: StepKind,

    /// Values for the step's own required fields only
    pub values: HashMap<FieldId, String>,
}

impl StepContext {
    /// Renders values as `id:value` pairs sorted by field id.
    pub fn describe_values(&self) -> String {
        let mut pairs: Vec<_> = self.values.iter().collect();
        pairs.sort_by_key(|(id, _)| **id);
        pairs
            .iter()
            .map(|(id, value)| format!("{}:{}", id, value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Executable behavior bound to a step kind.
#[async_trait]
pub trait StepHandler: Send + Sync {
    async fn execute(&self, ctx: &StepContext) -> FlowResult<()>;
}

/// Static mapping from step kind to its single handler.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<StepKind, Arc<dyn StepHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with one built-in handler per step kind.
    pub fn builtin(latency: Latency) -> Self {
        let mut registry = Self::new();
        for kind in StepKind::ALL {
            registry.register(kind, SimulatedHandler::new(kind, latency));
        }
        registry
    }

    /// Binds `handler` to `kind`, replacing any previous binding.
    pub fn register(&mut self, kind: StepKind, handler: impl StepHandler + 'static) {
        self.register_shared(kind, Arc::new(handler));
    }

    pub fn register_shared(&mut self, kind: StepKind, handler: Arc<dyn StepHandler>) {
        if self.handlers.insert(kind, handler).is_some() {
            warn!("Replacing handler for step kind '{}'", kind);
        }
    }

    /// Looks up the handler for `kind`.
    pub fn resolve(&self, kind: StepKind) -> FlowResult<Arc<dyn StepHandler>> {
        self.handlers
            .get(&kind)
            .cloned()
            .ok_or_else(|| FlowError::Unsupported(format!("no handler for step kind '{}'", kind)))
    }

    pub fn contains(&self, kind: StepKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Runs the steps of a ready sequence.
pub struct StepDispatcher {
    store: Arc<dyn FlowStore>,
    registry: Arc<HandlerRegistry>,
}

impl StepDispatcher {
    pub fn new(store: Arc<dyn FlowStore>, registry: Arc<HandlerRegistry>) -> Self {
        Self { store, registry }
    }

    /// Dispatches every step in `step_ids` concurrently.
    ///
    /// All handlers are resolved before any step runs. Once running, the
    /// call waits for every step; the first failure in step order is then
    /// returned.
    ///
    /// # Errors
    ///
    /// * `InvalidState` - `step_ids` is empty or an id is not defined
    /// * `Unsupported` - a step kind has no handler
    /// * `StepFailed` - a handler reported a failure
    pub async fn dispatch(
        &self,
        step_ids: &[StepId],
        values: &HashMap<FieldId, String>,
    ) -> FlowResult<()> {
        if step_ids.is_empty() {
            return Err(FlowError::InvalidState("no steps to dispatch".to_string()));
        }

        let steps = self.store.steps(step_ids).await?;

        let mut batch = Vec::with_capacity(step_ids.len());
        for step_id in step_ids {
            let step = steps.iter().find(|s| s.id == *step_id).ok_or_else(|| {
                FlowError::InvalidState(format!("step {} cannot be resolved", step_id))
            })?;
            let handler = self.registry.resolve(step.kind)?;

            let ctx = StepContext {
                step_id: step.id,
                kind: step.kind,
                values: values
                    .iter()
                    .filter(|(id, _)| step.fields.contains(*id))
                    .map(|(id, value)| (*id, value.clone()))
                    .collect(),
            };
            batch.push((ctx, handler));
        }

        debug!("Dispatching {} steps concurrently", batch.len());

        let results = join_all(batch.iter().map(|(ctx, handler)| async move {
            info!("Executing step {} ({})", ctx.step_id, ctx.kind);
            let result = handler.execute(ctx).await;
            (ctx, result)
        }))
        .await;

        let mut first_failure = None;
        for (ctx, result) in results {
            match result {
                Ok(()) => debug!("Step {} completed", ctx.step_id),
                Err(e) => {
                    error!("Step {} ({}) failed: {}", ctx.step_id, ctx.kind, e);
                    if first_failure.is_none() {
                        first_failure = Some(into_step_failure(ctx.step_id, e));
                    }
                }
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => {
                info!("All {} steps completed", step_ids.len());
                Ok(())
            }
        }
    }
}

fn into_step_failure(step_id: StepId, err: FlowError) -> FlowError {
    if err.is_dispatch_failure() {
        err
    } else {
        FlowError::StepFailed {
            step_id,
            reason: err.to_string(),
        }
    }
}
