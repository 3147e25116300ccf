//! # Logging Wiring
//!
//! Makes the observability bundle app consume the agents toggle config map.
//! How the reference is expressed depends on the cluster flavor.

use super::{DeletePhase, PreFetched, ReconcileOutcome, SubReconciler};
use crate::config::ControllerConfig;
use crate::controller::reconciler::ReconcilerError;
use crate::logged_cluster::{fetch_observability_bundle, LoggedCluster};
use crate::store::{retry_on_conflict, update_typed, ObjectStore, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Wire,
    Unwire,
}

/// Owns the reference from the bundle app to the agents toggle config map
#[derive(Debug)]
pub struct LoggingWiring {
    store: Arc<dyn ObjectStore>,
    conflict_attempts: u32,
    bundle_not_found_requeue: Duration,
}

impl LoggingWiring {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, config: &ControllerConfig) -> Self {
        Self {
            store,
            conflict_attempts: config.conflict_retry_attempts,
            bundle_not_found_requeue: config.bundle_not_found_requeue(),
        }
    }

    /// Apply `direction` to the bundle app.
    ///
    /// Returns `None` when the app does not exist.
    async fn rewire(
        &self,
        cluster: &dyn LoggedCluster,
        direction: Direction,
    ) -> Result<Option<bool>, ReconcilerError> {
        let config_map = cluster.observability_bundle_config_map_key();
        let store = self.store.as_ref();
        let changed = retry_on_conflict::<_, StoreError, _, _>(
            "logging_wiring",
            self.conflict_attempts,
            || async {
                let Some(mut app) = fetch_observability_bundle(store, cluster).await? else {
                    return Ok(None);
                };
                let changed = match direction {
                    Direction::Wire => cluster.wire_logging(&mut app.spec, &config_map),
                    Direction::Unwire => cluster.unwire_logging(&mut app.spec, &config_map),
                };
                if changed {
                    update_typed(store, &app).await?;
                }
                Ok(Some(changed))
            },
        )
        .await?;
        Ok(changed)
    }
}

#[async_trait]
impl SubReconciler for LoggingWiring {
    fn name(&self) -> &'static str {
        "logging-wiring"
    }

    fn delete_phase(&self) -> DeletePhase {
        DeletePhase::Unwire
    }

    async fn reconcile_create(
        &self,
        cluster: &dyn LoggedCluster,
        _prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        match self.rewire(cluster, Direction::Wire).await? {
            None => {
                info!(
                    cluster = %cluster.identity(),
                    app = %cluster.observability_bundle_app(),
                    "Observability bundle app not found, requeuing"
                );
                Ok(ReconcileOutcome::RequeueAfter(self.bundle_not_found_requeue))
            }
            Some(true) => {
                info!(cluster = %cluster.identity(), "Logging config wired into observability bundle");
                Ok(ReconcileOutcome::Done)
            }
            Some(false) => {
                debug!(cluster = %cluster.identity(), "Logging wiring up to date");
                Ok(ReconcileOutcome::Done)
            }
        }
    }

    async fn reconcile_delete(
        &self,
        cluster: &dyn LoggedCluster,
        _prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        match self.rewire(cluster, Direction::Unwire).await? {
            None => debug!(
                cluster = %cluster.identity(),
                "Observability bundle app not found, nothing to unwire"
            ),
            Some(true) => info!(
                cluster = %cluster.identity(),
                "Logging config unwired from observability bundle"
            ),
            Some(false) => {}
        }
        Ok(ReconcileOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{App, AppExtraConfig};
    use crate::resources::test_support::{bundle_app, capi_cluster, prefetched};
    use crate::store::{get_typed, InMemoryObjectStore, ResourceKind, StoreOp};

    fn wiring(store: &Arc<InMemoryObjectStore>) -> LoggingWiring {
        LoggingWiring::new(
            Arc::clone(store) as Arc<dyn ObjectStore>,
            &ControllerConfig::default(),
        )
    }

    async fn stored_app(store: &InMemoryObjectStore, cluster: &dyn LoggedCluster) -> App {
        let key = cluster.observability_bundle_app();
        get_typed(store, &key.namespace, &key.name).await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_app_requeues_on_create() {
        let store = Arc::new(InMemoryObjectStore::new());
        let cluster = capi_cluster("alpha");
        let outcome = wiring(&store)
            .reconcile_create(&cluster, &PreFetched::default())
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::RequeueAfter(Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn test_missing_app_is_fine_on_delete() {
        let store = Arc::new(InMemoryObjectStore::new());
        let cluster = capi_cluster("alpha");
        let outcome = wiring(&store)
            .reconcile_delete(&cluster, &PreFetched::default())
            .await
            .unwrap();
        assert!(outcome.is_done());
    }

    #[tokio::test]
    async fn test_wire_and_unwire_extra_config() {
        let store = Arc::new(InMemoryObjectStore::new());
        let cluster = capi_cluster("alpha");
        store.insert_typed(&bundle_app(&cluster, "1.9.0")).unwrap();
        let wiring = wiring(&store);

        wiring
            .reconcile_create(&cluster, &prefetched("1.9.0"))
            .await
            .unwrap();
        wiring
            .reconcile_create(&cluster, &prefetched("1.9.0"))
            .await
            .unwrap();
        assert_eq!(store.write_count(), 1);
        assert_eq!(
            stored_app(&store, &cluster).await.spec.extra_configs,
            vec![AppExtraConfig {
                kind: "configMap".to_string(),
                name: "alpha-observability-bundle-logging-extraconfig".to_string(),
                namespace: "org-acme".to_string(),
                priority: 25,
            }]
        );

        wiring
            .reconcile_delete(&cluster, &prefetched("1.9.0"))
            .await
            .unwrap();
        assert!(stored_app(&store, &cluster).await.spec.extra_configs.is_empty());
    }

    #[tokio::test]
    async fn test_conflicting_app_update_is_retried() {
        let store = Arc::new(InMemoryObjectStore::new());
        let cluster = capi_cluster("alpha");
        store.insert_typed(&bundle_app(&cluster, "1.9.0")).unwrap();
        store.inject_failure(
            StoreOp::Update,
            ResourceKind::App,
            StoreError::Conflict(cluster.observability_bundle_app()),
            1,
        );

        let outcome = wiring(&store)
            .reconcile_create(&cluster, &prefetched("1.9.0"))
            .await
            .unwrap();
        assert!(outcome.is_done());
        assert_eq!(stored_app(&store, &cluster).await.spec.extra_configs.len(), 1);
    }
}
