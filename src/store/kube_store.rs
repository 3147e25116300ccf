//! Kubernetes API backed object store.

use super::{ObjectKey, ObjectStore, ResourceKind, StoreError};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::core::DynamicObject;
use kube::Client;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Object store talking to the Kubernetes API server
///
/// Every call is bounded by `call_timeout`; expiry yields [`StoreError::Timeout`].
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
    call_timeout: Duration,
}

impl std::fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore")
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl KubeObjectStore {
    #[must_use]
    pub fn new(client: Client, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    fn api(&self, kind: ResourceKind, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &kind.api_resource())
    }

    async fn bounded<T, Fut>(&self, operation: &str, key: &ObjectKey, fut: Fut) -> Result<T, StoreError>
    where
        Fut: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result.map_err(|e| StoreError::from_kube(key, e)),
            Err(_elapsed) => Err(StoreError::Timeout {
                operation: format!("{operation} {key}"),
                timeout: self.call_timeout,
            }),
        }
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(&self, key: &ObjectKey) -> Result<DynamicObject, StoreError> {
        debug!(resource = %key, "store.get");
        let api = self.api(key.kind, &key.namespace);
        let mut obj = self.bounded("get", key, api.get(&key.name)).await?;
        if obj.types.is_none() {
            obj.types = Some(key.kind.type_meta());
        }
        Ok(obj)
    }

    async fn list(
        &self,
        kind: ResourceKind,
        namespace: &str,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        debug!(kind = %kind, namespace = namespace, "store.list");
        let api = self.api(kind, namespace);
        let key = ObjectKey::new(kind, namespace, "*");
        let list = self.bounded("list", &key, api.list(&ListParams::default())).await?;
        Ok(list
            .items
            .into_iter()
            .map(|mut obj| {
                if obj.types.is_none() {
                    obj.types = Some(kind.type_meta());
                }
                obj
            })
            .collect())
    }

    async fn create(
        &self,
        kind: ResourceKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = ObjectKey::of(kind, obj)?;
        debug!(resource = %key, "store.create");
        let api = self.api(kind, &key.namespace);
        self.bounded("create", &key, api.create(&PostParams::default(), obj))
            .await
    }

    async fn update(
        &self,
        kind: ResourceKind,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, StoreError> {
        let key = ObjectKey::of(kind, obj)?;
        debug!(
            resource = %key,
            resource_version = obj.metadata.resource_version.as_deref().unwrap_or(""),
            "store.update"
        );
        let api = self.api(kind, &key.namespace);
        self.bounded(
            "update",
            &key,
            api.replace(&key.name, &PostParams::default(), obj),
        )
        .await
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        debug!(resource = %key, "store.delete");
        let api = self.api(key.kind, &key.namespace);
        self.bounded("delete", key, api.delete(&key.name, &DeleteParams::default()))
            .await
            .map(|_| ())
    }
}
