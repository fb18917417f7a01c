//! In-Memory Store
//!
//! Implements every persistence contract over process memory. Instances and
//! field values can be snapshotted to a JSON file and loaded back, which is
//! how the CLI resumes flows across invocations.

use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{FlowError, FlowResult};
use crate::workflow::{
    Catalog, FieldDefinition, FieldId, FieldValue, FlowInstance, FlowStatus, FlowTypeDefinition,
    FlowTypeId, InstanceId, SequenceDefinition, SequenceId, StepDefinition, StepId,
};

use super::{CatalogStore, FieldValueStore, InstanceStore};

/// Serializable image of all mutable state.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Snapshot {
    pub next_instance_id: InstanceId,
    pub instances: Vec<FlowInstance>,
    pub field_values: Vec<FieldValue>,
}

#[derive(Debug, Default)]
struct Records {
    next_instance_id: InstanceId,
    instances: HashMap<InstanceId, FlowInstance>,
    field_values: HashMap<(InstanceId, FieldId), String>,
}

/// Store backed by process memory.
pub struct MemoryStore {
    catalog: Arc<Catalog>,
    records: RwLock<Records>,
}

fn lock_error(e: impl std::fmt::Display) -> FlowError {
    FlowError::Internal(format!("store lock poisoned: {}", e))
}

impl MemoryStore {
    /// Creates an empty store over a catalog.
    pub fn new(catalog: Catalog) -> Self {
        Self::with_shared_catalog(Arc::new(catalog))
    }

    pub fn with_shared_catalog(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            records: RwLock::new(Records {
                next_instance_id: 1,
                ..Records::default()
            }),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Captures the current instances and values.
    pub fn snapshot(&self) -> FlowResult<Snapshot> {
        let records = self.records.read().map_err(lock_error)?;

        let mut instances: Vec<FlowInstance> = records.instances.values().cloned().collect();
        instances.sort_by_key(|i| i.id);

        let mut field_values: Vec<FieldValue> = records
            .field_values
            .iter()
            .map(|((instance_id, field_id), value)| FieldValue::new(*instance_id, *field_id, value))
            .collect();
        field_values.sort_by_key(|v| (v.instance_id, v.field_id));

        Ok(Snapshot {
            next_instance_id: records.next_instance_id,
            instances,
            field_values,
        })
    }

    /// Rebuilds a store from a snapshot.
    pub fn from_snapshot(catalog: Catalog, snapshot: Snapshot) -> Self {
        let max_id = snapshot.instances.iter().map(|i| i.id).max().unwrap_or(0);
        let records = Records {
            next_instance_id: snapshot.next_instance_id.max(max_id + 1),
            instances: snapshot
                .instances
                .into_iter()
                .map(|i| (i.id, i))
                .collect(),
            field_values: snapshot
                .field_values
                .into_iter()
                .map(|v| ((v.instance_id, v.field_id), v.value))
                .collect(),
        };

        Self {
            catalog: Arc::new(catalog),
            records: RwLock::new(records),
        }
    }

    /// Writes a JSON snapshot, creating parent directories as needed.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let snapshot = self.snapshot()?;
        let json = serde_json::to_string_pretty(&snapshot)?;
        fs::write(path, json)?;

        info!(
            "Saved {} instances to {}",
            snapshot.instances.len(),
            path.display()
        );
        Ok(())
    }

    /// Loads a store from a JSON snapshot; a missing file yields an empty store.
    pub fn load_snapshot(catalog: Catalog, path: &Path) -> Result<Self, Box<dyn Error>> {
        if !path.exists() {
            info!("No state file at {}, starting empty", path.display());
            return Ok(Self::new(catalog));
        }

        let content = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;

        info!(
            "Loaded {} instances from {}",
            snapshot.instances.len(),
            path.display()
        );
        Ok(Self::from_snapshot(catalog, snapshot))
    }

    fn with_instance<T>(
        &self,
        id: InstanceId,
        f: impl FnOnce(&mut FlowInstance) -> FlowResult<T>,
    ) -> FlowResult<T> {
        let mut records = self.records.write().map_err(lock_error)?;
        let instance = records
            .instances
            .get_mut(&id)
            .ok_or_else(|| FlowError::not_found("instance", id))?;
        f(instance)
    }
}

/// Collects catalog entries for `ids` in request order, skipping unknown ids.
fn pick<'a, T: Clone + 'a>(
    ids: &[i64],
    lookup: impl Fn(i64) -> Option<&'a T>,
) -> Vec<T> {
    ids.iter().filter_map(|id| lookup(*id).cloned()).collect()
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn flow_type(&self, id: FlowTypeId) -> FlowResult<Option<FlowTypeDefinition>> {
        Ok(self.catalog.flow_type(id).cloned())
    }

    async fn sequence(&self, id: SequenceId) -> FlowResult<Option<SequenceDefinition>> {
        Ok(self.catalog.sequence(id).cloned())
    }

    async fn step(&self, id: StepId) -> FlowResult<Option<StepDefinition>> {
        Ok(self.catalog.step(id).cloned())
    }

    async fn steps(&self, ids: &[StepId]) -> FlowResult<Vec<StepDefinition>> {
        Ok(pick(ids, |id| self.catalog.step(id)))
    }

    async fn fields(&self, ids: &[FieldId]) -> FlowResult<Vec<FieldDefinition>> {
        Ok(pick(ids, |id| self.catalog.field(id)))
    }
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn create_instance(
        &self,
        flow_type_id: FlowTypeId,
        start_sequence: SequenceId,
    ) -> FlowResult<FlowInstance> {
        let mut records = self.records.write().map_err(lock_error)?;

        let id = records.next_instance_id;
        records.next_instance_id += 1;

        let instance = FlowInstance::new(id, flow_type_id, start_sequence);
        records.instances.insert(id, instance.clone());

        debug!("Created instance {} of flow type {}", id, flow_type_id);
        Ok(instance)
    }

    async fn instance(&self, id: InstanceId) -> FlowResult<Option<FlowInstance>> {
        let records = self.records.read().map_err(lock_error)?;
        Ok(records.instances.get(&id).cloned())
    }

    async fn instance_with_flow_type(
        &self,
        id: InstanceId,
    ) -> FlowResult<Option<(FlowInstance, FlowTypeDefinition)>> {
        let instance = match self.instance(id).await? {
            Some(instance) => instance,
            None => return Ok(None),
        };

        Ok(self
            .catalog
            .flow_type(instance.flow_type_id)
            .cloned()
            .map(|flow_type| (instance, flow_type)))
    }

    async fn update_status(&self, id: InstanceId, status: FlowStatus) -> FlowResult<()> {
        self.with_instance(id, |instance| instance.set_status(status))
    }

    async fn update_current_sequence(
        &self,
        id: InstanceId,
        sequence_id: SequenceId,
    ) -> FlowResult<()> {
        self.with_instance(id, |instance| instance.advance_to(sequence_id))
    }
}

#[async_trait]
impl FieldValueStore for MemoryStore {
    async fn field_values(
        &self,
        instance_id: InstanceId,
        field_ids: &[FieldId],
    ) -> FlowResult<HashMap<FieldId, String>> {
        let records = self.records.read().map_err(lock_error)?;
        Ok(field_ids
            .iter()
            .filter_map(|field_id| {
                records
                    .field_values
                    .get(&(instance_id, *field_id))
                    .map(|value| (*field_id, value.clone()))
            })
            .collect())
    }

    async fn insert_field_values(
        &self,
        instance_id: InstanceId,
        values: Vec<(FieldId, String)>,
    ) -> FlowResult<usize> {
        let mut records = self.records.write().map_err(lock_error)?;

        if !records.instances.contains_key(&instance_id) {
            return Err(FlowError::not_found("instance", instance_id));
        }

        // Reject the whole batch before touching anything.
        let mut batch_keys = Vec::with_capacity(values.len());
        for (field_id, _) in &values {
            let key = (instance_id, *field_id);
            if records.field_values.contains_key(&key) || batch_keys.contains(&key) {
                return Err(FlowError::InvalidState(format!(
                    "field {} already has a value for instance {}",
                    field_id, instance_id
                )));
            }
            batch_keys.push(key);
        }

        let written = values.len();
        for (field_id, value) in values {
            records.field_values.insert((instance_id, field_id), value);
        }

        debug!("Stored {} field values for instance {}", written, instance_id);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::StepKind;
    use tempfile::tempdir;

    fn catalog() -> Catalog {
        Catalog::new()
            .with_field(FieldDefinition::new(1, "Name"))
            .with_field(FieldDefinition::new(2, "Email"))
            .with_step(StepDefinition::new(1, StepKind::DataForm).requires(1).requires(2))
            .with_sequence(SequenceDefinition::new(1, vec![1]))
            .with_flow_type(FlowTypeDefinition::linear(1, "Basic", vec![1]))
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let store = MemoryStore::new(catalog());
        let first = store.create_instance(1, 1).await.unwrap();
        let second = store.create_instance(1, 1).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.status, FlowStatus::Started);
    }

    #[tokio::test]
    async fn test_catalog_batch_lookups_keep_order() {
        let store = MemoryStore::new(catalog());
        let fields = store.fields(&[2, 99, 1]).await.unwrap();
        let ids: Vec<_> = fields.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![2, 1]);

        assert!(store.steps(&[5]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_instance_with_flow_type() {
        let store = MemoryStore::new(catalog());
        let created = store.create_instance(1, 1).await.unwrap();

        let (instance, flow_type) = store
            .instance_with_flow_type(created.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(instance, created);
        assert_eq!(flow_type.name, "Basic");

        assert!(store.instance_with_flow_type(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_status_stamps_completion() {
        let store = MemoryStore::new(catalog());
        let instance = store.create_instance(1, 1).await.unwrap();

        store.update_status(instance.id, FlowStatus::InProgress).await.unwrap();
        store.update_status(instance.id, FlowStatus::Completed).await.unwrap();

        let stored = store.instance(instance.id).await.unwrap().unwrap();
        assert_eq!(stored.status, FlowStatus::Completed);
        assert!(stored.completed_at.is_some());

        let err = store
            .update_status(instance.id, FlowStatus::InProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_update_unknown_instance() {
        let store = MemoryStore::new(catalog());
        let err = store.update_current_sequence(9, 1).await.unwrap_err();
        assert_eq!(err, FlowError::not_found("instance", 9));
    }

    #[tokio::test]
    async fn test_field_values_restricted_to_requested_ids() {
        let store = MemoryStore::new(catalog());
        let instance = store.create_instance(1, 1).await.unwrap();
        store
            .insert_field_values(instance.id, vec![(1, "Ana".into()), (2, "a@b.co".into())])
            .await
            .unwrap();

        let values = store.field_values(instance.id, &[1]).await.unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values.get(&1).map(String::as_str), Some("Ana"));
    }

    #[tokio::test]
    async fn test_insert_batch_is_all_or_nothing() {
        let store = MemoryStore::new(catalog());
        let instance = store.create_instance(1, 1).await.unwrap();
        store
            .insert_field_values(instance.id, vec![(1, "Ana".into())])
            .await
            .unwrap();

        let result = store
            .insert_field_values(instance.id, vec![(2, "a@b.co".into()), (1, "Eve".into())])
            .await;
        assert!(result.is_err());

        let values = store.field_values(instance.id, &[1, 2]).await.unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values.get(&1).map(String::as_str), Some("Ana"));
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates_within_batch() {
        let store = MemoryStore::new(catalog());
        let instance = store.create_instance(1, 1).await.unwrap();
        let result = store
            .insert_field_values(instance.id, vec![(1, "A".into()), (1, "B".into())])
            .await;
        assert!(result.is_err());
        assert!(store.field_values(instance.id, &[1]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_file_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("state").join("instances.json");

        let store = MemoryStore::new(catalog());
        let instance = store.create_instance(1, 1).await.unwrap();
        store
            .insert_field_values(instance.id, vec![(1, "Ana".into())])
            .await
            .unwrap();
        store
            .update_status(instance.id, FlowStatus::WaitingForData)
            .await
            .unwrap();
        store.save_snapshot(&path).unwrap();

        let reloaded = MemoryStore::load_snapshot(catalog(), &path).unwrap();
        let stored = reloaded.instance(instance.id).await.unwrap().unwrap();
        assert_eq!(stored.status, FlowStatus::WaitingForData);

        let values = reloaded.field_values(instance.id, &[1]).await.unwrap();
        assert_eq!(values.get(&1).map(String::as_str), Some("Ana"));

        let next = reloaded.create_instance(1, 1).await.unwrap();
        assert_eq!(next.id, 2);
    }

    #[test]
    fn test_load_snapshot_missing_file_is_empty() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("missing.json");

        let store = MemoryStore::load_snapshot(catalog(), &path).unwrap();
        assert!(store.snapshot().unwrap().instances.is_empty());
    }
}
