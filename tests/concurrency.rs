//! Concurrent access and partial-failure behavior.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use flowgate::config::Latency;
use flowgate::execution::{StepContext, StepHandler};
use flowgate::store::{FieldValueStore, InstanceStore, MemoryStore};
use flowgate::workflow::{
    Catalog, FieldDefinition, FlowTypeDefinition, SequenceDefinition, StepDefinition,
};
use flowgate::{FlowEngine, FlowError, FlowResult, FlowStatus, HandlerRegistry, StepKind};

/// Counts executions and takes a while, to widen race windows.
#[derive(Default)]
struct SlowCounter {
    runs: AtomicUsize,
}

#[async_trait]
impl StepHandler for SlowCounter {
    async fn execute(&self, _ctx: &StepContext) -> FlowResult<()> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct AlwaysFails;

#[async_trait]
impl StepHandler for AlwaysFails {
    async fn execute(&self, ctx: &StepContext) -> FlowResult<()> {
        Err(FlowError::StepFailed {
            step_id: ctx.step_id,
            reason: "remote service unavailable".into(),
        })
    }
}

fn catalog() -> Catalog {
    Catalog::new()
        .with_field(FieldDefinition::new(1, "Name"))
        .with_field(FieldDefinition::new(2, "Document"))
        .with_step(StepDefinition::new(1, StepKind::DataForm).requires(1))
        .with_step(StepDefinition::new(2, StepKind::ExternalService).requires(1))
        .with_step(StepDefinition::new(3, StepKind::DocumentUpload).requires(2))
        .with_sequence(SequenceDefinition::new(1, vec![1]))
        .with_sequence(SequenceDefinition::new(2, vec![1, 2]))
        .with_sequence(SequenceDefinition::new(3, vec![3]))
        .with_flow_type(FlowTypeDefinition::linear(1, "Single", vec![1]))
        .with_flow_type(FlowTypeDefinition::linear(2, "Mixed", vec![2, 3]))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_process_progresses_once() {
    let store = Arc::new(MemoryStore::new(catalog()));
    let counter = Arc::new(SlowCounter::default());
    let mut registry = HandlerRegistry::builtin(Latency::None);
    registry.register_shared(StepKind::DataForm, counter.clone());
    let engine = Arc::new(FlowEngine::new(store.clone(), registry));

    let started = engine.start(1).await;
    let id = started.instance_id;

    let calls = (0..8).map(|n| {
        let engine = engine.clone();
        tokio::spawn(async move {
            let values = HashMap::from([(1, format!("caller {}", n))]);
            engine.process(id, values).await
        })
    });
    let outcomes: Vec<_> = futures::future::join_all(calls)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let completed = outcomes.iter().filter(|o| o.success && o.complete).count();
    let rejected = outcomes.iter().filter(|o| !o.success).count();
    assert_eq!(completed, 1);
    assert_eq!(rejected, 7);
    assert_eq!(counter.runs.load(Ordering::SeqCst), 1);

    let instance = store.instance(id).await.unwrap().unwrap();
    assert_eq!(instance.status, FlowStatus::Completed);
    assert_eq!(engine.active_locks(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_instances_progress_independently() {
    let store = Arc::new(MemoryStore::new(catalog()));
    let engine = Arc::new(FlowEngine::with_builtin_handlers(store.clone()));

    let mut ids = Vec::new();
    for _ in 0..5 {
        ids.push(engine.start(1).await.instance_id);
    }

    let calls = ids.iter().map(|id| {
        let engine = engine.clone();
        let id = *id;
        tokio::spawn(async move { engine.process(id, HashMap::from([(1, "Ana".to_string())])).await })
    });
    for joined in futures::future::join_all(calls).await {
        let outcome = joined.unwrap();
        assert!(outcome.success);
        assert!(outcome.complete);
    }

    for id in ids {
        let instance = store.instance(id).await.unwrap().unwrap();
        assert_eq!(instance.status, FlowStatus::Completed);
    }
}

#[tokio::test]
async fn test_failed_step_does_not_roll_back_siblings() {
    let store = Arc::new(MemoryStore::new(catalog()));
    let counter = Arc::new(SlowCounter::default());
    let mut registry = HandlerRegistry::builtin(Latency::None);
    registry.register_shared(StepKind::DataForm, counter.clone());
    registry.register(StepKind::ExternalService, AlwaysFails);
    let engine = FlowEngine::new(store.clone(), registry);

    let started = engine.start(2).await;
    let id = started.instance_id;
    let outcome = engine
        .process(id, HashMap::from([(1, "Ana".to_string())]))
        .await;

    assert!(!outcome.success);
    assert!(!outcome.message.contains("remote service"));

    // The sibling step ran to completion and the submitted value stays stored.
    assert_eq!(counter.runs.load(Ordering::SeqCst), 1);
    let stored = store.field_values(id, &[1]).await.unwrap();
    assert_eq!(stored.len(), 1);

    let instance = store.instance(id).await.unwrap().unwrap();
    assert_eq!(instance.status, FlowStatus::WaitingForData);
    assert_eq!(instance.current_sequence, 2);

    // A retry re-runs the whole sequence without new input.
    let retry = engine.process(id, HashMap::new()).await;
    assert!(!retry.success);
    assert_eq!(counter.runs.load(Ordering::SeqCst), 2);
}
