//! # Resources
//!
//! Sub-reconcilers owning the per-cluster logging resources.
//!
//! Every sub-reconciler ensures one resource matches the state derived from a
//! [`LoggedCluster`]. They are idempotent and safe to re-invoke after a
//! partially successful cycle, so the orchestrator can simply restart the
//! fan-out from the top on the next cycle.
//!
//! ## Order
//!
//! Create-side work runs in declaration order:
//!
//! 1. [`AgentsToggle`] - bundle config map selecting the agents
//! 2. [`LoggingWiring`] - reference to that config map on the bundle app
//! 3. [`LoggingCredentials`] - write credentials in the shared secrets
//! 4. [`IngressAuthSecret::loki`] - basic-auth map of the log store write path
//! 5. [`IngressAuthSecret::tempo`] - basic-auth map of the trace store write path
//! 6. [`LoggingSecret`] - agent secret carrying the write credentials
//! 7. [`EventsLoggerSecret`] - events logger secret carrying the write credentials
//! 8. [`TracingSecret`] - trace store endpoint and tracing credentials
//!
//! Delete-side work runs in declaration order stably sorted by [`DeletePhase`]:
//! consumers are unwired first, owned objects removed next, credentials released last.
//! The ingress maps are re-derived after the credentials were released.

mod agents_toggle;
mod events_logger_secret;
mod ingress_auth_secret;
mod logging_credentials;
mod logging_secret;
mod logging_wiring;
mod tracing_secret;

pub use agents_toggle::AgentsToggle;
pub use events_logger_secret::EventsLoggerSecret;
pub use ingress_auth_secret::IngressAuthSecret;
pub use logging_credentials::LoggingCredentials;
pub use logging_secret::LoggingSecret;
pub use logging_wiring::LoggingWiring;
pub use tracing_secret::TracingSecret;

use crate::config::ControllerConfig;
use crate::constants::{MANAGED_BY_LABEL, MANAGED_BY_VALUE};
use crate::controller::reconciler::ReconcilerError;
use crate::credentials::CredentialStore;
use crate::logged_cluster::LoggedCluster;
use crate::store::{
    create_typed, get_typed, optional, retry_on_conflict, update_typed, ObjectStore,
    StoredResource, StoreError,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use semver::Version;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Result of one sub-reconciler step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Step converged, continue with the next sub-reconciler
    Done,
    /// Stop the fan-out here and try again after the delay
    RequeueAfter(Duration),
}

impl ReconcileOutcome {
    #[must_use]
    pub fn is_done(self) -> bool {
        matches!(self, Self::Done)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::RequeueAfter(_) => "requeue",
        }
    }
}

/// Coarse dependency class used to order delete-side work
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeletePhase {
    /// Drop references held by shared objects
    Unwire,
    /// Delete objects owned by the cluster
    Remove,
    /// Release material other objects were consuming
    Release,
}

/// Values gathered once per cycle, before the fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreFetched {
    /// Version of the observability bundle app, when it exists
    pub bundle_version: Option<Version>,
}

/// Contract every sub-reconciler implements
#[async_trait]
pub trait SubReconciler: Send + Sync + fmt::Debug {
    /// Stable name used in logs and metrics
    fn name(&self) -> &'static str;

    fn delete_phase(&self) -> DeletePhase;

    async fn reconcile_create(
        &self,
        cluster: &dyn LoggedCluster,
        prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError>;

    async fn reconcile_delete(
        &self,
        cluster: &dyn LoggedCluster,
        prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError>;
}

/// Ordered sub-reconcilers driven by the orchestrator
#[derive(Debug, Clone)]
pub struct SubReconcilerSet {
    reconcilers: Vec<Arc<dyn SubReconciler>>,
}

impl SubReconcilerSet {
    #[must_use]
    pub fn new(reconcilers: Vec<Arc<dyn SubReconciler>>) -> Self {
        Self { reconcilers }
    }

    /// The logging resources managed for every cluster
    #[must_use]
    pub fn standard(
        store: &Arc<dyn ObjectStore>,
        credentials: &CredentialStore,
        config: &ControllerConfig,
    ) -> Self {
        Self::new(vec![
            Arc::new(AgentsToggle::new(Arc::clone(store), config)),
            Arc::new(LoggingWiring::new(Arc::clone(store), config)),
            Arc::new(LoggingCredentials::new(credentials.clone(), config)),
            Arc::new(IngressAuthSecret::loki(
                Arc::clone(store),
                credentials.clone(),
                config,
            )),
            Arc::new(IngressAuthSecret::tempo(
                Arc::clone(store),
                credentials.clone(),
                config,
            )),
            Arc::new(LoggingSecret::new(
                Arc::clone(store),
                credentials.clone(),
                config,
            )),
            Arc::new(EventsLoggerSecret::new(
                Arc::clone(store),
                credentials.clone(),
                config,
            )),
            Arc::new(TracingSecret::new(
                Arc::clone(store),
                credentials.clone(),
                config,
            )),
        ])
    }

    /// Declaration order
    #[must_use]
    pub fn create_order(&self) -> &[Arc<dyn SubReconciler>] {
        &self.reconcilers
    }

    /// Declaration order stably sorted by delete phase
    #[must_use]
    pub fn delete_order(&self) -> Vec<Arc<dyn SubReconciler>> {
        let mut ordered = self.reconcilers.clone();
        ordered.sort_by_key(|r| r.delete_phase());
        ordered
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.reconcilers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reconcilers.is_empty()
    }
}

/// Labels put on every object written by the operator
#[must_use]
pub fn common_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string())])
}

/// Objects whose content is fully owned by a sub-reconciler
pub(crate) trait OwnedObject: StoredResource + Clone + kube::Resource<DynamicType = ()> {
    /// Whether `self` already carries the content of `desired`
    fn matches(&self, desired: &Self) -> bool;

    /// Copy the content of `desired` into `self`, keeping server-managed metadata
    fn adopt(&mut self, desired: &Self);
}

fn labels_include(current: &ObjectMeta, desired: &ObjectMeta) -> bool {
    let current = current.labels.clone().unwrap_or_default();
    desired
        .labels
        .iter()
        .flatten()
        .all(|(k, v)| current.get(k) == Some(v))
}

fn adopt_labels(current: &mut ObjectMeta, desired: &ObjectMeta) {
    if let Some(labels) = &desired.labels {
        current
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(labels.clone());
    }
}

impl OwnedObject for ConfigMap {
    fn matches(&self, desired: &Self) -> bool {
        self.data == desired.data && labels_include(&self.metadata, &desired.metadata)
    }

    fn adopt(&mut self, desired: &Self) {
        self.data.clone_from(&desired.data);
        adopt_labels(&mut self.metadata, &desired.metadata);
    }
}

impl OwnedObject for Secret {
    fn matches(&self, desired: &Self) -> bool {
        self.data == desired.data && labels_include(&self.metadata, &desired.metadata)
    }

    fn adopt(&mut self, desired: &Self) {
        self.data.clone_from(&desired.data);
        adopt_labels(&mut self.metadata, &desired.metadata);
    }
}

/// Create `desired` or bring the stored object in line with it.
///
/// Returns true when a write happened.
pub(crate) async fn ensure_object<K: OwnedObject>(
    store: &dyn ObjectStore,
    desired: &K,
    conflict_attempts: u32,
) -> Result<bool, StoreError> {
    let meta = desired.meta();
    let namespace = meta.namespace.clone().unwrap_or_default();
    let name = meta.name.clone().unwrap_or_default();
    let kind = K::KIND;
    retry_on_conflict("ensure_object", conflict_attempts, || async {
        match optional(get_typed::<K>(store, &namespace, &name).await)? {
            None => {
                create_typed(store, desired).await?;
                debug!(kind = %kind, namespace = %namespace, name = %name, "Created");
                Ok(true)
            }
            Some(current) if current.matches(desired) => Ok(false),
            Some(mut current) => {
                current.adopt(desired);
                update_typed(store, &current).await?;
                debug!(kind = %kind, namespace = %namespace, name = %name, "Updated");
                Ok(true)
            }
        }
    })
    .await
}
