//! # Vintage Installation Integration Tests
//!
//! The installation itself is reconciled through its `default/kubernetes`
//! Service. Its bundle lives in the `giantswarm` namespace and is wired
//! through user values.
//!
//! Workload clusters keep their apps in a namespace named after the cluster
//! and are only handled from release 19.1.0 on. Their bundle is wired by
//! cluster-operator, so the extra config list is never touched.

use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use logging_operator::constants::{
    BUNDLE_EXTRA_CONFIG_MAP, BUNDLE_USER_VALUES_CONFIG_MAP, CREDENTIALS_NAMESPACE,
    LOGGING_CREDENTIALS_SECRET, LOGGING_FINALIZER, RELEASE_VERSION_LABEL, VINTAGE_APPS_NAMESPACE,
};
use logging_operator::prelude::*;
use logging_operator::store::{get_typed, update_typed, InMemoryObjectStore};
use std::sync::Arc;

fn seed(store: &InMemoryObjectStore) {
    let service = Service {
        metadata: ObjectMeta {
            name: Some("kubernetes".to_string()),
            namespace: Some("default".to_string()),
            ..ObjectMeta::default()
        },
        ..Service::default()
    };
    store.insert_typed(&service).unwrap();

    let mut app = App::new(
        "observability-bundle",
        AppSpec {
            name: "observability-bundle".to_string(),
            namespace: "kube-system".to_string(),
            version: "1.9.0".to_string(),
            catalog: "default".to_string(),
            ..AppSpec::default()
        },
    );
    app.metadata.namespace = Some(VINTAGE_APPS_NAMESPACE.to_string());
    store.insert_typed(&app).unwrap();
}

fn reconciler(store: &Arc<InMemoryObjectStore>, enable_logging: bool) -> LoggingReconciler {
    LoggingReconciler::new(
        Arc::clone(store) as Arc<dyn ObjectStore>,
        ControllerConfig {
            enable_logging,
            vintage_mode: true,
            installation_name: "golem".to_string(),
            ingress_auth_hash_cost: 4,
            ..ControllerConfig::default()
        },
    )
}

async fn reconcile(reconciler: &LoggingReconciler) -> ReconcileOutcome {
    reconciler
        .reconcile(
            ClusterFlavor::VintageManagement,
            &ClusterIdentity::new("default", "kubernetes"),
        )
        .await
        .unwrap()
}

async fn service_finalizers(store: &InMemoryObjectStore) -> Vec<String> {
    let service: Service = get_typed(store, "default", "kubernetes").await.unwrap();
    service.metadata.finalizers.unwrap_or_default()
}

#[tokio::test]
async fn test_management_cluster_is_wired_through_user_values() {
    let store = Arc::new(InMemoryObjectStore::new());
    seed(&store);

    assert_eq!(reconcile(&reconciler(&store, true)).await, ReconcileOutcome::Done);

    assert_eq!(service_finalizers(&store).await, vec![LOGGING_FINALIZER.to_string()]);
    let config_map: ConfigMap =
        get_typed(store.as_ref(), VINTAGE_APPS_NAMESPACE, BUNDLE_USER_VALUES_CONFIG_MAP)
            .await
            .unwrap();
    assert!(config_map.data.unwrap()["values"].contains("alloyLogs"));

    let app: App = get_typed(store.as_ref(), VINTAGE_APPS_NAMESPACE, "observability-bundle")
        .await
        .unwrap();
    let user_config_map = app.spec.user_config.and_then(|u| u.config_map).unwrap();
    assert_eq!(user_config_map.name, BUNDLE_USER_VALUES_CONFIG_MAP);
    assert!(app.spec.extra_configs.is_empty());

    // The installation name doubles as user and tenant
    let credentials: Secret =
        get_typed(store.as_ref(), CREDENTIALS_NAMESPACE, LOGGING_CREDENTIALS_SECRET)
            .await
            .unwrap();
    assert!(credentials.data.unwrap().contains_key("golem"));
}

#[tokio::test]
async fn test_installation_switch_cleans_up_management_cluster() {
    let store = Arc::new(InMemoryObjectStore::new());
    seed(&store);
    reconcile(&reconciler(&store, true)).await;

    assert_eq!(reconcile(&reconciler(&store, false)).await, ReconcileOutcome::Done);

    assert!(service_finalizers(&store).await.is_empty());
    assert!(!store.contains(&ObjectKey::new(
        ResourceKind::ConfigMap,
        VINTAGE_APPS_NAMESPACE,
        BUNDLE_USER_VALUES_CONFIG_MAP
    )));
    let app: App = get_typed(store.as_ref(), VINTAGE_APPS_NAMESPACE, "observability-bundle")
        .await
        .unwrap();
    assert!(app.spec.user_config.and_then(|u| u.config_map).is_none());
}

const ORGANIZATION_NAMESPACE: &str = "org-acme";
const WORKLOAD_CLUSTER: &str = "x7k2p";

/// Seed a vintage workload cluster on `release` together with its bundle app
fn seed_workload_cluster(store: &InMemoryObjectStore, release: &str) {
    let mut cluster = Cluster::new(WORKLOAD_CLUSTER, ClusterSpec::default());
    cluster.metadata.namespace = Some(ORGANIZATION_NAMESPACE.to_string());
    cluster.metadata.labels = Some(
        [(RELEASE_VERSION_LABEL.to_string(), release.to_string())]
            .into_iter()
            .collect(),
    );
    store.insert_typed(&cluster).unwrap();

    let mut app = App::new(
        &format!("{WORKLOAD_CLUSTER}-observability-bundle"),
        AppSpec {
            name: "observability-bundle".to_string(),
            namespace: "kube-system".to_string(),
            version: "1.9.0".to_string(),
            catalog: "default".to_string(),
            ..AppSpec::default()
        },
    );
    app.metadata.namespace = Some(WORKLOAD_CLUSTER.to_string());
    store.insert_typed(&app).unwrap();
}

async fn reconcile_workload_cluster(reconciler: &LoggingReconciler) -> ReconcileOutcome {
    reconciler
        .reconcile(
            ClusterFlavor::VintageWorkload,
            &ClusterIdentity::new(ORGANIZATION_NAMESPACE, WORKLOAD_CLUSTER),
        )
        .await
        .unwrap()
}

async fn workload_cluster_finalizers(store: &InMemoryObjectStore) -> Vec<String> {
    let cluster: Cluster = get_typed(store, ORGANIZATION_NAMESPACE, WORKLOAD_CLUSTER)
        .await
        .unwrap();
    cluster.metadata.finalizers.unwrap_or_default()
}

fn extra_config_key() -> ObjectKey {
    ObjectKey::new(ResourceKind::ConfigMap, WORKLOAD_CLUSTER, BUNDLE_EXTRA_CONFIG_MAP)
}

#[tokio::test]
async fn test_workload_cluster_before_minimum_release_stays_inactive() {
    let store = Arc::new(InMemoryObjectStore::new());
    seed_workload_cluster(&store, "19.0.4");
    store.reset_write_count();

    let outcome = reconcile_workload_cluster(&reconciler(&store, true)).await;

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert!(workload_cluster_finalizers(&store).await.is_empty());
    assert!(!store.contains(&extra_config_key()));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_workload_cluster_is_activated_without_wiring() {
    let store = Arc::new(InMemoryObjectStore::new());
    seed_workload_cluster(&store, "19.1.0");

    let outcome = reconcile_workload_cluster(&reconciler(&store, true)).await;

    assert_eq!(outcome, ReconcileOutcome::Done);
    assert_eq!(
        workload_cluster_finalizers(&store).await,
        vec![LOGGING_FINALIZER.to_string()]
    );
    let config_map: ConfigMap =
        get_typed(store.as_ref(), WORKLOAD_CLUSTER, BUNDLE_EXTRA_CONFIG_MAP)
            .await
            .unwrap();
    assert!(config_map.data.unwrap()["values"].contains("alloyLogs"));

    // cluster-operator owns the wiring
    let app: App = get_typed(
        store.as_ref(),
        WORKLOAD_CLUSTER,
        &format!("{WORKLOAD_CLUSTER}-observability-bundle"),
    )
    .await
    .unwrap();
    assert!(app.spec.extra_configs.is_empty());
    assert!(app.spec.user_config.is_none());

    // The cluster name doubles as user and tenant
    let credentials: Secret =
        get_typed(store.as_ref(), CREDENTIALS_NAMESPACE, LOGGING_CREDENTIALS_SECRET)
            .await
            .unwrap();
    assert!(credentials.data.unwrap().contains_key(WORKLOAD_CLUSTER));
}

#[tokio::test]
async fn test_workload_cluster_upgrade_activates_logging() {
    let store = Arc::new(InMemoryObjectStore::new());
    seed_workload_cluster(&store, "19.0.4");
    let reconciler = reconciler(&store, true);
    reconcile_workload_cluster(&reconciler).await;
    assert!(workload_cluster_finalizers(&store).await.is_empty());

    let mut cluster: Cluster =
        get_typed(store.as_ref(), ORGANIZATION_NAMESPACE, WORKLOAD_CLUSTER)
            .await
            .unwrap();
    cluster
        .metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(RELEASE_VERSION_LABEL.to_string(), "v20.0.0".to_string());
    update_typed(store.as_ref(), &cluster).await.unwrap();

    assert_eq!(reconcile_workload_cluster(&reconciler).await, ReconcileOutcome::Done);

    assert_eq!(
        workload_cluster_finalizers(&store).await,
        vec![LOGGING_FINALIZER.to_string()]
    );
    assert!(store.contains(&extra_config_key()));
}
