//! # Object Store
//!
//! Key/value view of the Kubernetes API used by every write path of the operator.
//!
//! Objects travel as [`DynamicObject`] so that a read-modify-write never drops
//! fields the operator does not model. Typed helpers convert through serde.
//!
//! ## Implementations
//!
//! - [`KubeObjectStore`] - backed by `kube::Api<DynamicObject>`, every call bounded by a timeout
//! - [`InMemoryObjectStore`] - resource-versioned map with failure injection

mod kube_store;
mod memory;

pub use kube_store::KubeObjectStore;
pub use memory::{InMemoryObjectStore, StoreOp};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use kube::api::ApiResource;
use kube::core::{DynamicObject, GroupVersionKind, TypeMeta};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Kinds of objects the operator reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Cluster,
    Service,
    App,
    ConfigMap,
    Secret,
}

impl ResourceKind {
    /// Group, version and kind of the resource
    #[must_use]
    pub fn gvk(self) -> GroupVersionKind {
        let (group, version, kind) = match self {
            Self::Cluster => ("cluster.x-k8s.io", "v1beta1", "Cluster"),
            Self::Service => ("", "v1", "Service"),
            Self::App => ("application.giantswarm.io", "v1alpha1", "App"),
            Self::ConfigMap => ("", "v1", "ConfigMap"),
            Self::Secret => ("", "v1", "Secret"),
        };
        GroupVersionKind {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        }
    }

    /// API resource used to build dynamic clients
    #[must_use]
    pub fn api_resource(self) -> ApiResource {
        ApiResource::from_gvk(&self.gvk())
    }

    /// `apiVersion`/`kind` pair stamped on objects of this kind
    #[must_use]
    pub fn type_meta(self) -> TypeMeta {
        let ar = self.api_resource();
        TypeMeta {
            api_version: ar.api_version,
            kind: ar.kind,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cluster => "Cluster",
            Self::Service => "Service",
            Self::App => "App",
            Self::ConfigMap => "ConfigMap",
            Self::Secret => "Secret",
        };
        f.write_str(name)
    }
}

/// Namespaced name of an object of a given kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of an already materialized object
    pub fn of(kind: ResourceKind, obj: &DynamicObject) -> Result<Self, StoreError> {
        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| StoreError::Invalid(format!("{kind} without metadata.name")))?;
        let namespace = obj
            .metadata
            .namespace
            .clone()
            .ok_or_else(|| StoreError::Invalid(format!("{kind} {name} without metadata.namespace")))?;
        Ok(Self::new(kind, namespace, name))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Object store errors
///
/// `NotFound` is always distinguishable from the other variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(ObjectKey),
    #[error("{0} already exists")]
    AlreadyExists(ObjectKey),
    #[error("conflict writing {0}: object changed since it was read")]
    Conflict(ObjectKey),
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid object: {0}")]
    Invalid(String),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Optimistic-concurrency collisions, retried by re-reading
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::AlreadyExists(_))
    }

    /// Errors worth retrying with backoff
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport(_) | Self::Conflict(_) => true,
            Self::Api { code, .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// Classify a kube error for the object it concerns
    pub fn from_kube(key: &ObjectKey, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(api_err) => {
                Self::from_api_status(key, api_err.code, &api_err.reason, api_err.message)
            }
            kube::Error::SerdeError(e) => Self::Serialization(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }

    /// Classify an API server failure status
    pub fn from_api_status(key: &ObjectKey, code: u16, reason: &str, message: String) -> Self {
        match code {
            404 => Self::NotFound(key.clone()),
            409 if reason == "AlreadyExists" => Self::AlreadyExists(key.clone()),
            409 => Self::Conflict(key.clone()),
            _ => Self::Api { code, message },
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Get/list/create/update/delete of namespaced objects
///
/// `update` is an optimistic-concurrency write: it fails with
/// [`StoreError::Conflict`] when `metadata.resourceVersion` is stale.
#[async_trait]
pub trait ObjectStore: Send + Sync + fmt::Debug {
    async fn get(&self, key: &ObjectKey) -> Result<DynamicObject, StoreError>;

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, StoreError>;

    async fn create(
        &self,
        kind: ResourceKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    async fn update(
        &self,
        kind: ResourceKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError>;

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError>;
}

/// Typed objects that live in the store
pub trait StoredResource: Serialize + DeserializeOwned + Send + Sync {
    const KIND: ResourceKind;
}

impl StoredResource for crate::crd::Cluster {
    const KIND: ResourceKind = ResourceKind::Cluster;
}

impl StoredResource for crate::crd::App {
    const KIND: ResourceKind = ResourceKind::App;
}

impl StoredResource for Service {
    const KIND: ResourceKind = ResourceKind::Service;
}

impl StoredResource for ConfigMap {
    const KIND: ResourceKind = ResourceKind::ConfigMap;
}

impl StoredResource for Secret {
    const KIND: ResourceKind = ResourceKind::Secret;
}

/// Convert a typed object into its dynamic representation
pub fn to_dynamic<K: StoredResource>(obj: &K) -> Result<DynamicObject, StoreError> {
    let mut dynamic: DynamicObject = serde_json::from_value(serde_json::to_value(obj)?)?;
    dynamic.types = Some(K::KIND.type_meta());
    Ok(dynamic)
}

/// Convert a dynamic object into a typed one
pub fn from_dynamic<K: StoredResource>(mut obj: DynamicObject) -> Result<K, StoreError> {
    if obj.types.is_none() {
        obj.types = Some(K::KIND.type_meta());
    }
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

pub async fn get_typed<K: StoredResource>(
    store: &dyn ObjectStore,
    namespace: &str,
    name: &str,
) -> Result<K, StoreError> {
    let obj = store
        .get(&ObjectKey::new(K::KIND, namespace, name))
        .await?;
    from_dynamic(obj)
}

pub async fn create_typed<K: StoredResource>(
    store: &dyn ObjectStore,
    obj: &K,
) -> Result<K, StoreError> {
    let created = store.create(K::KIND, &to_dynamic(obj)?).await?;
    from_dynamic(created)
}

pub async fn update_typed<K: StoredResource>(
    store: &dyn ObjectStore,
    obj: &K,
) -> Result<K, StoreError> {
    let updated = store.update(K::KIND, &to_dynamic(obj)?).await?;
    from_dynamic(updated)
}

/// Turn `NotFound` into `None`
pub fn optional<T>(result: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Delete an object, treating an already missing object as success.
///
/// Returns true when something was deleted.
pub async fn delete_if_exists(store: &dyn ObjectStore, key: &ObjectKey) -> Result<bool, StoreError> {
    match store.delete(key).await {
        Ok(()) => Ok(true),
        Err(StoreError::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Errors that can signal an optimistic-concurrency collision
pub trait ConflictAware: fmt::Display {
    fn is_conflict(&self) -> bool;
}

impl ConflictAware for StoreError {
    fn is_conflict(&self) -> bool {
        StoreError::is_conflict(self)
    }
}

/// Run a read-modify-write operation, re-running it on optimistic-concurrency
/// collisions up to `attempts` times.
///
/// The last collision is returned when every attempt collided.
pub async fn retry_on_conflict<T, E, F, Fut>(
    operation: &str,
    attempts: u32,
    mut op: F,
) -> Result<T, E>
where
    E: ConflictAware,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_conflict() && attempt < attempts => {
                debug!(
                    operation = operation,
                    attempt = attempt,
                    error = %e,
                    "Write collided, retrying with a fresh read"
                );
                crate::observability::metrics::increment_conflict_retries(operation);
                attempt += 1;
            }
            result => return result,
        }
    }
}
