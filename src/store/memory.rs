//! In-memory object store.
//!
//! Mirrors the API server semantics the operator depends on: resource
//! versions with optimistic concurrency, `AlreadyExists` on duplicate
//! creates, and deletion that waits for finalizers to drain.

use super::{to_dynamic, ObjectKey, ObjectStore, ResourceKind, StoreError, StoredResource};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::core::DynamicObject;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Store operation, used to target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    List,
    Create,
    Update,
    Delete,
}

#[derive(Debug)]
struct InjectedFailure {
    op: StoreOp,
    kind: ResourceKind,
    error: StoreError,
    remaining: usize,
}

/// Thread-safe in-memory object store
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeMap<ObjectKey, DynamicObject>>,
    failures: Mutex<Vec<InjectedFailure>>,
    resource_version: AtomicU64,
    writes: AtomicUsize,
}

impl InMemoryObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a write
    pub fn insert(&self, kind: ResourceKind, mut obj: DynamicObject) -> Result<DynamicObject, StoreError> {
        let key = ObjectKey::of(kind, &obj)?;
        obj.types = Some(kind.type_meta());
        obj.metadata.resource_version = Some(self.next_resource_version());
        let mut objects = self.lock_objects()?;
        objects.insert(key, obj.clone());
        Ok(obj)
    }

    /// Seed a typed object without counting it as a write
    pub fn insert_typed<K: StoredResource>(&self, obj: &K) -> Result<DynamicObject, StoreError> {
        self.insert(K::KIND, to_dynamic(obj)?)
    }

    /// Make the next `times` calls of `op` on `kind` fail with `error`
    pub fn inject_failure(&self, op: StoreOp, kind: ResourceKind, error: StoreError, times: usize) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(InjectedFailure {
                op,
                kind,
                error,
                remaining: times,
            });
        }
    }

    /// Drop every pending injected failure
    pub fn clear_failures(&self) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.clear();
        }
    }

    /// Number of successful create, update and delete calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_write_count(&self) {
        self.writes.store(0, Ordering::SeqCst);
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.lock_objects()
            .map(|objects| objects.contains_key(key))
            .unwrap_or(false)
    }

    /// Keys of every stored object of `kind`
    pub fn keys(&self, kind: ResourceKind) -> Vec<ObjectKey> {
        self.lock_objects()
            .map(|objects| objects.keys().filter(|k| k.kind == kind).cloned().collect())
            .unwrap_or_default()
    }

    fn next_resource_version(&self) -> String {
        (self.resource_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn lock_objects(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<ObjectKey, DynamicObject>>, StoreError> {
        self.objects
            .lock()
            .map_err(|e| StoreError::Transport(format!("object map poisoned: {e}")))
    }

    fn take_failure(&self, op: StoreOp, kind: ResourceKind) -> Result<(), StoreError> {
        let Ok(mut failures) = self.failures.lock() else {
            return Ok(());
        };
        let Some(pos) = failures
            .iter()
            .position(|f| f.op == op && f.kind == kind && f.remaining > 0)
        else {
            return Ok(());
        };
        let failure = &mut failures[pos];
        failure.remaining -= 1;
        let error = failure.error.clone();
        if failure.remaining == 0 {
            failures.remove(pos);
        }
        Err(error)
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

fn has_finalizers(obj: &DynamicObject) -> bool {
    obj.metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| !f.is_empty())
}

fn now() -> Option<Time> {
    let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    serde_json::from_value(serde_json::Value::String(stamp)).ok()
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, key: &ObjectKey) -> Result<DynamicObject, StoreError> {
        self.take_failure(StoreOp::Get, key.kind)?;
        self.lock_objects()?
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        self.take_failure(StoreOp::List, kind)?;
        Ok(self
            .lock_objects()?
            .iter()
            .filter(|(k, _)| k.kind == kind && k.namespace == namespace)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn create(
        &self,
        kind: ResourceKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        self.take_failure(StoreOp::Create, kind)?;
        let key = ObjectKey::of(kind, obj)?;
        let mut objects = self.lock_objects()?;
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key));
        }
        let mut stored = obj.clone();
        stored.types = Some(kind.type_meta());
        stored.metadata.resource_version = Some(self.next_resource_version());
        stored.metadata.deletion_timestamp = None;
        objects.insert(key, stored.clone());
        self.record_write();
        Ok(stored)
    }

    async fn update(
        &self,
        kind: ResourceKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        self.take_failure(StoreOp::Update, kind)?;
        let key = ObjectKey::of(kind, obj)?;
        let mut objects = self.lock_objects()?;
        let Some(current) = objects.get(&key) else {
            return Err(StoreError::NotFound(key));
        };
        if let Some(expected) = obj.metadata.resource_version.as_deref() {
            if current.metadata.resource_version.as_deref() != Some(expected) {
                return Err(StoreError::Conflict(key));
            }
        }
        let mut stored = obj.clone();
        stored.types = Some(kind.type_meta());
        stored.metadata.deletion_timestamp = current.metadata.deletion_timestamp.clone();
        stored.metadata.resource_version = Some(self.next_resource_version());
        self.record_write();
        if stored.metadata.deletion_timestamp.is_some() && !has_finalizers(&stored) {
            objects.remove(&key);
        } else {
            objects.insert(key, stored.clone());
        }
        Ok(stored)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.take_failure(StoreOp::Delete, key.kind)?;
        let mut objects = self.lock_objects()?;
        let Some(current) = objects.get_mut(key) else {
            return Err(StoreError::NotFound(key.clone()));
        };
        if has_finalizers(current) {
            if current.metadata.deletion_timestamp.is_none() {
                current.metadata.deletion_timestamp = now();
                current.metadata.resource_version = Some(self.next_resource_version());
            }
        } else {
            objects.remove(key);
        }
        self.record_write();
        Ok(())
    }
}
