//! # Finalizer
//!
//! Adds and removes the logging finalizer with optimistic-concurrency
//! read-modify-write, so finalizers owned by other controllers survive.

use super::ReconcilerError;
use crate::observability;
use crate::store::{retry_on_conflict, ObjectKey, ObjectStore, StoreError};
use kube::api::DynamicObject;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FinalizerOp {
    Add,
    Remove,
}

impl FinalizerOp {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

fn has_finalizer(obj: &DynamicObject, finalizer: &str) -> bool {
    obj.metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Apply `op` to the object at `key`.
///
/// Returns true when the object was written. Removing from an object that no
/// longer exists is a no-op.
pub(crate) async fn patch_finalizer(
    store: &dyn ObjectStore,
    key: &ObjectKey,
    finalizer: &str,
    op: FinalizerOp,
    conflict_attempts: u32,
) -> Result<bool, ReconcilerError> {
    let (written, obj) = retry_on_conflict::<_, StoreError, _, _>(
        "finalizer",
        conflict_attempts,
        || async {
            let mut obj = match store.get(key).await {
                Ok(obj) => obj,
                Err(e) if e.is_not_found() && op == FinalizerOp::Remove => return Ok((false, None)),
                Err(e) => return Err(e),
            };
            let finalizers = obj.metadata.finalizers.get_or_insert_with(Vec::new);
            let changed = match op {
                FinalizerOp::Add if finalizers.iter().any(|f| f == finalizer) => false,
                FinalizerOp::Add => {
                    finalizers.push(finalizer.to_string());
                    true
                }
                FinalizerOp::Remove => {
                    let before = finalizers.len();
                    finalizers.retain(|f| f != finalizer);
                    finalizers.len() != before
                }
            };
            if !changed {
                return Ok((false, Some(obj)));
            }
            let updated = store.update(key.kind, &obj).await?;
            Ok((true, Some(updated)))
        },
    )
    .await?;

    if let Some(obj) = obj {
        let present = has_finalizer(&obj, finalizer);
        if present != (op == FinalizerOp::Add) {
            return Err(ReconcilerError::InvariantViolation(format!(
                "finalizer {op} on {key} returned an object {state} the finalizer",
                op = op.as_str(),
                state = if present { "still carrying" } else { "without" },
            )));
        }
    }

    if written {
        observability::metrics::increment_finalizer_operations(op.as_str());
        info!(object = %key, operation = op.as_str(), "Finalizer updated");
    } else {
        debug!(object = %key, operation = op.as_str(), "Finalizer already in place");
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::LOGGING_FINALIZER;
    use crate::crd::{Cluster, ClusterSpec};
    use crate::store::{InMemoryObjectStore, ResourceKind, StoreOp};
    use async_trait::async_trait;

    fn cluster_key() -> ObjectKey {
        ObjectKey::new(ResourceKind::Cluster, "org-acme", "alpha")
    }

    fn store_with_cluster(finalizers: &[&str]) -> InMemoryObjectStore {
        let store = InMemoryObjectStore::new();
        let mut cluster = Cluster::new("alpha", ClusterSpec::default());
        cluster.metadata.namespace = Some("org-acme".to_string());
        cluster.metadata.finalizers = Some(finalizers.iter().map(ToString::to_string).collect());
        store.insert_typed(&cluster).unwrap();
        store
    }

    async fn finalizers(store: &InMemoryObjectStore) -> Vec<String> {
        store
            .get(&cluster_key())
            .await
            .unwrap()
            .metadata
            .finalizers
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_add_keeps_foreign_finalizers() {
        let store = store_with_cluster(&["other.io/finalizer"]);
        let written = patch_finalizer(&store, &cluster_key(), LOGGING_FINALIZER, FinalizerOp::Add, 5)
            .await
            .unwrap();
        assert!(written);
        assert_eq!(
            finalizers(&store).await,
            vec!["other.io/finalizer".to_string(), LOGGING_FINALIZER.to_string()]
        );

        let written = patch_finalizer(&store, &cluster_key(), LOGGING_FINALIZER, FinalizerOp::Add, 5)
            .await
            .unwrap();
        assert!(!written);
    }

    #[tokio::test]
    async fn test_remove_keeps_foreign_finalizers() {
        let store = store_with_cluster(&[LOGGING_FINALIZER, "other.io/finalizer"]);
        patch_finalizer(&store, &cluster_key(), LOGGING_FINALIZER, FinalizerOp::Remove, 5)
            .await
            .unwrap();
        assert_eq!(finalizers(&store).await, vec!["other.io/finalizer".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_from_missing_object_is_noop() {
        let store = InMemoryObjectStore::new();
        let written =
            patch_finalizer(&store, &cluster_key(), LOGGING_FINALIZER, FinalizerOp::Remove, 5)
                .await
                .unwrap();
        assert!(!written);
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let store = store_with_cluster(&[]);
        store.inject_failure(
            StoreOp::Update,
            ResourceKind::Cluster,
            StoreError::Conflict(cluster_key()),
            2,
        );
        patch_finalizer(&store, &cluster_key(), LOGGING_FINALIZER, FinalizerOp::Add, 5)
            .await
            .unwrap();
        assert_eq!(finalizers(&store).await, vec![LOGGING_FINALIZER.to_string()]);
    }

    #[tokio::test]
    async fn test_persistent_conflict_surfaces() {
        let store = store_with_cluster(&[]);
        store.inject_failure(
            StoreOp::Update,
            ResourceKind::Cluster,
            StoreError::Conflict(cluster_key()),
            10,
        );
        let err = patch_finalizer(&store, &cluster_key(), LOGGING_FINALIZER, FinalizerOp::Add, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcilerError::Store(StoreError::Conflict(_))));
    }

    /// Store whose updates silently drop every finalizer
    #[derive(Debug)]
    struct FinalizerDroppingStore(InMemoryObjectStore);

    #[async_trait]
    impl ObjectStore for FinalizerDroppingStore {
        async fn get(&self, key: &ObjectKey) -> Result<DynamicObject, StoreError> {
            self.0.get(key).await
        }

        async fn list(
            &self,
            kind: ResourceKind,
            namespace: &str,
        ) -> Result<Vec<DynamicObject>, StoreError> {
            self.0.list(kind, namespace).await
        }

        async fn create(
            &self,
            kind: ResourceKind,
            obj: &DynamicObject,
        ) -> Result<DynamicObject, StoreError> {
            self.0.create(kind, obj).await
        }

        async fn update(
            &self,
            kind: ResourceKind,
            obj: &DynamicObject,
        ) -> Result<DynamicObject, StoreError> {
            let mut stripped = obj.clone();
            stripped.metadata.finalizers = None;
            self.0.update(kind, &stripped).await
        }

        async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
            self.0.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_contradicting_write_is_an_invariant_violation() {
        let store = FinalizerDroppingStore(store_with_cluster(&[]));
        let err = patch_finalizer(&store, &cluster_key(), LOGGING_FINALIZER, FinalizerOp::Add, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcilerError::InvariantViolation(_)));
    }
}
