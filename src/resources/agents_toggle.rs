//! # Agents Toggle
//!
//! Config map plugged into the observability bundle that switches on exactly
//! one logging agent and one events logger.
//!
//! ```yaml
//! apps:
//!   alloyEvents:
//!     enabled: true
//!   alloyLogs:
//!     enabled: true
//!     namespace: kube-system
//!   grafanaAgent:
//!     enabled: false
//!   promtail:
//!     enabled: false
//! ```

use super::{
    common_labels, ensure_object, DeletePhase, PreFetched, ReconcileOutcome, SubReconciler,
};
use crate::config::ControllerConfig;
use crate::constants::{APP_NAME_LABEL, OBSERVABILITY_BUNDLE_APP};
use crate::controller::reconciler::ReconcilerError;
use crate::logged_cluster::{AgentSelection, EventsLogger, LoggedCluster, LoggingAgent};
use crate::store::{delete_if_exists, ObjectStore};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Namespace alloy runs in when it ships logs
const ALLOY_LOGS_NAMESPACE: &str = "kube-system";

#[derive(Debug, Serialize)]
struct BundleValues {
    apps: BTreeMap<&'static str, AppToggle>,
}

#[derive(Debug, Serialize)]
struct AppToggle {
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'static str>,
}

impl AppToggle {
    fn on() -> Self {
        Self {
            enabled: true,
            namespace: None,
        }
    }

    fn off() -> Self {
        Self {
            enabled: false,
            namespace: None,
        }
    }
}

/// Render the bundle values enabling `selection`
pub(crate) fn render_values(selection: AgentSelection) -> Result<String, ReconcilerError> {
    let mut apps = BTreeMap::new();
    match selection.logging_agent {
        LoggingAgent::Promtail => {
            apps.insert("promtail", AppToggle::on());
            apps.insert("alloyLogs", AppToggle::off());
        }
        LoggingAgent::Alloy => {
            apps.insert("promtail", AppToggle::off());
            apps.insert(
                "alloyLogs",
                AppToggle {
                    enabled: true,
                    namespace: Some(ALLOY_LOGS_NAMESPACE),
                },
            );
        }
    }
    match selection.events_logger {
        EventsLogger::GrafanaAgent => {
            apps.insert("grafanaAgent", AppToggle::on());
            apps.insert("alloyEvents", AppToggle::off());
        }
        EventsLogger::Alloy => {
            apps.insert("grafanaAgent", AppToggle::off());
            apps.insert("alloyEvents", AppToggle::on());
        }
    }
    serde_yaml::to_string(&BundleValues { apps }).map_err(|e| ReconcilerError::Render {
        resource: "agents-toggle",
        reason: e.to_string(),
    })
}

/// Owns the agents toggle config map
#[derive(Debug)]
pub struct AgentsToggle {
    store: Arc<dyn ObjectStore>,
    conflict_attempts: u32,
}

impl AgentsToggle {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, config: &ControllerConfig) -> Self {
        Self {
            store,
            conflict_attempts: config.conflict_retry_attempts,
        }
    }

    fn desired(cluster: &dyn LoggedCluster) -> Result<ConfigMap, ReconcilerError> {
        let key = cluster.observability_bundle_config_map_key();
        let mut labels = common_labels();
        labels.insert(
            APP_NAME_LABEL.to_string(),
            cluster.config_map_label_name(OBSERVABILITY_BUNDLE_APP),
        );
        Ok(ConfigMap {
            metadata: ObjectMeta {
                name: Some(key.name),
                namespace: Some(key.namespace),
                labels: Some(labels),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                "values".to_string(),
                render_values(cluster.agent_selection())?,
            )])),
            ..ConfigMap::default()
        })
    }
}

#[async_trait]
impl SubReconciler for AgentsToggle {
    fn name(&self) -> &'static str {
        "agents-toggle"
    }

    fn delete_phase(&self) -> DeletePhase {
        DeletePhase::Remove
    }

    async fn reconcile_create(
        &self,
        cluster: &dyn LoggedCluster,
        _prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let desired = Self::desired(cluster)?;
        if ensure_object(self.store.as_ref(), &desired, self.conflict_attempts).await? {
            let selection = cluster.agent_selection();
            info!(
                cluster = %cluster.identity(),
                logging_agent = %selection.logging_agent,
                events_logger = %selection.events_logger,
                "Agents toggle up to date"
            );
        }
        Ok(ReconcileOutcome::Done)
    }

    async fn reconcile_delete(
        &self,
        cluster: &dyn LoggedCluster,
        _prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let key = cluster.observability_bundle_config_map_key();
        if delete_if_exists(self.store.as_ref(), &key).await? {
            info!(cluster = %cluster.identity(), object = %key, "Agents toggle deleted");
        }
        Ok(ReconcileOutcome::Done)
    }
}
