//! # Logged Cluster
//!
//! Uniform view over the three kinds of clusters whose logging stack the
//! operator manages:
//!
//! - [`CapiCluster`] - Cluster API `Cluster`
//! - [`VintageManagementCluster`] - the installation itself, backed by the `default/kubernetes` Service
//! - [`VintageWorkloadCluster`] - release-labelled `Cluster` of a vintage installation
//!
//! A facade is built once per reconciliation from an already fetched object.
//! It performs no I/O; the only mutable state is the in-memory agent selection
//! written by capability negotiation.

mod capi;
mod vintage_mc;
mod vintage_wc;

pub use capi::CapiCluster;
pub use vintage_mc::VintageManagementCluster;
pub use vintage_wc::VintageWorkloadCluster;

use crate::config::controller::parse_bool_flag;
use crate::config::ControllerConfig;
use crate::constants::{LOGGING_LABEL, OBSERVABILITY_BUNDLE_APP};
use crate::crd::{App, AppSpec, Cluster};
use crate::store::{get_typed, ObjectKey, ObjectStore, ResourceKind, StoreError};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Agent shipping pod logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoggingAgent {
    Promtail,
    Alloy,
}

impl LoggingAgent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Promtail => "promtail",
            Self::Alloy => "alloy",
        }
    }
}

impl fmt::Display for LoggingAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoggingAgent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "promtail" => Ok(Self::Promtail),
            "alloy" => Ok(Self::Alloy),
            other => Err(format!("unknown logging agent {other:?}")),
        }
    }
}

/// Agent shipping Kubernetes events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventsLogger {
    GrafanaAgent,
    Alloy,
}

impl EventsLogger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GrafanaAgent => "grafana-agent",
            Self::Alloy => "alloy",
        }
    }
}

impl fmt::Display for EventsLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventsLogger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "grafana-agent" | "grafanaagent" => Ok(Self::GrafanaAgent),
            "alloy" => Ok(Self::Alloy),
            other => Err(format!("unknown events logger {other:?}")),
        }
    }
}

/// Logging agent and events logger used by one cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AgentSelection {
    pub logging_agent: LoggingAgent,
    pub events_logger: EventsLogger,
}

/// Namespaced name of the resource under reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterIdentity {
    pub namespace: String,
    pub name: String,
}

impl ClusterIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ClusterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Kind of cluster behind a facade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterFlavor {
    Capi,
    VintageManagement,
    VintageWorkload,
}

impl ClusterFlavor {
    /// Kind of the object backing this flavor
    #[must_use]
    pub fn backing_kind(self) -> ResourceKind {
        match self {
            Self::Capi | Self::VintageWorkload => ResourceKind::Cluster,
            Self::VintageManagement => ResourceKind::Service,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Capi => "capi",
            Self::VintageManagement => "vintage-mc",
            Self::VintageWorkload => "vintage-wc",
        }
    }
}

impl fmt::Display for ClusterFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Installation-wide settings every facade needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterOptions {
    pub enable_logging: bool,
    pub installation_name: String,
    pub insecure_ca: bool,
    pub requested: AgentSelection,
}

impl From<&ControllerConfig> for ClusterOptions {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            enable_logging: config.enable_logging,
            installation_name: config.installation_name.clone(),
            insecure_ca: config.insecure_ca,
            requested: AgentSelection {
                logging_agent: config.logging_agent,
                events_logger: config.events_logger,
            },
        }
    }
}

/// State shared by every flavor
#[derive(Debug, Clone)]
pub struct ClusterBase {
    identity: ClusterIdentity,
    metadata: ObjectMeta,
    options: ClusterOptions,
    selection: AgentSelection,
}

impl ClusterBase {
    fn new(metadata: ObjectMeta, options: ClusterOptions) -> Self {
        let identity = ClusterIdentity::new(
            metadata.namespace.clone().unwrap_or_default(),
            metadata.name.clone().unwrap_or_default(),
        );
        let selection = options.requested;
        Self {
            identity,
            metadata,
            options,
            selection,
        }
    }

    /// Value of the logging label; absent or unparseable means enabled
    fn logging_label_enabled(&self) -> bool {
        self.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(LOGGING_LABEL))
            .and_then(|value| parse_bool_flag(value))
            .unwrap_or(true)
    }
}

/// Capability surface of a cluster whose logging stack is managed
pub trait LoggedCluster: Send + Sync + fmt::Debug {
    fn base(&self) -> &ClusterBase;

    fn base_mut(&mut self) -> &mut ClusterBase;

    fn flavor(&self) -> ClusterFlavor;

    /// Whether logging should be enabled for this cluster
    fn is_enabled(&self) -> bool;

    /// Namespace holding the cluster's apps and their configuration
    fn apps_namespace(&self) -> String;

    /// Name of the object configuring `app` for this cluster
    fn app_config_name(&self, app: &str) -> String;

    /// Value of `app.kubernetes.io/name` on the bundle config map
    fn config_map_label_name(&self, component: &str) -> String;

    /// Base name of the config map plugged into the observability bundle
    fn observability_bundle_config_map(&self) -> &'static str;

    /// Tenant the cluster writes its logs to
    fn tenant(&self) -> String;

    /// Name identifying the cluster towards the log store
    fn cluster_name(&self) -> String {
        self.identity().name.clone()
    }

    /// Reference the logging config map from the bundle app.
    ///
    /// Returns true when the spec changed.
    fn wire_logging(&self, bundle: &mut AppSpec, config_map: &ObjectKey) -> bool;

    /// Drop the reference added by [`LoggedCluster::wire_logging`].
    ///
    /// Returns true when the spec changed.
    fn unwire_logging(&self, bundle: &mut AppSpec, config_map: &ObjectKey) -> bool;

    fn identity(&self) -> &ClusterIdentity {
        &self.base().identity
    }

    /// Key of the object backing this facade
    fn object_key(&self) -> ObjectKey {
        let identity = self.identity();
        ObjectKey::new(
            self.flavor().backing_kind(),
            identity.namespace.clone(),
            identity.name.clone(),
        )
    }

    fn metadata(&self) -> &ObjectMeta {
        &self.base().metadata
    }

    fn labels(&self) -> BTreeMap<String, String> {
        self.metadata().labels.clone().unwrap_or_default()
    }

    fn is_being_deleted(&self) -> bool {
        self.metadata().deletion_timestamp.is_some()
    }

    fn has_finalizer(&self, finalizer: &str) -> bool {
        self.metadata()
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|x| x == finalizer))
    }

    fn installation_name(&self) -> &str {
        &self.base().options.installation_name
    }

    fn insecure_ca(&self) -> bool {
        self.base().options.insecure_ca
    }

    fn agent_selection(&self) -> AgentSelection {
        self.base().selection
    }

    fn set_agent_selection(&mut self, selection: AgentSelection) {
        self.base_mut().selection = selection;
    }

    /// Key of the observability bundle app of this cluster
    fn observability_bundle_app(&self) -> ObjectKey {
        ObjectKey::new(
            ResourceKind::App,
            self.apps_namespace(),
            self.app_config_name(OBSERVABILITY_BUNDLE_APP),
        )
    }

    /// Key of the config map holding the agents toggle values
    fn observability_bundle_config_map_key(&self) -> ObjectKey {
        ObjectKey::new(
            ResourceKind::ConfigMap,
            self.apps_namespace(),
            self.app_config_name(self.observability_bundle_config_map()),
        )
    }
}

/// Fetch the backing object of `identity` and build its facade.
///
/// Returns `None` when the object no longer exists.
pub async fn load(
    store: &dyn ObjectStore,
    flavor: ClusterFlavor,
    identity: &ClusterIdentity,
    options: ClusterOptions,
) -> Result<Option<Box<dyn LoggedCluster>>, StoreError> {
    let cluster: Box<dyn LoggedCluster> = match flavor {
        ClusterFlavor::Capi => {
            let Some(cluster) = fetch::<Cluster>(store, identity).await? else {
                return Ok(None);
            };
            Box::new(CapiCluster::new(cluster, options))
        }
        ClusterFlavor::VintageWorkload => {
            let Some(cluster) = fetch::<Cluster>(store, identity).await? else {
                return Ok(None);
            };
            Box::new(VintageWorkloadCluster::new(cluster, options))
        }
        ClusterFlavor::VintageManagement => {
            let Some(service) = fetch::<Service>(store, identity).await? else {
                return Ok(None);
            };
            Box::new(VintageManagementCluster::new(service, options))
        }
    };
    Ok(Some(cluster))
}

async fn fetch<K: crate::store::StoredResource>(
    store: &dyn ObjectStore,
    identity: &ClusterIdentity,
) -> Result<Option<K>, StoreError> {
    crate::store::optional(get_typed::<K>(store, &identity.namespace, &identity.name).await)
}

/// Bundle app lookup shared by the pre-fetch step and the wiring reconciler
pub async fn fetch_observability_bundle(
    store: &dyn ObjectStore,
    cluster: &dyn LoggedCluster,
) -> Result<Option<App>, StoreError> {
    let key = cluster.observability_bundle_app();
    crate::store::optional(get_typed::<App>(store, &key.namespace, &key.name).await)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn options() -> ClusterOptions {
        ClusterOptions {
            enable_logging: true,
            installation_name: "gauss".to_string(),
            insecure_ca: false,
            requested: AgentSelection {
                logging_agent: LoggingAgent::Alloy,
                events_logger: EventsLogger::Alloy,
            },
        }
    }

    pub fn metadata(namespace: &str, name: &str, labels: &[(&str, &str)]) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            ..ObjectMeta::default()
        }
    }

    pub fn deletion_timestamp() -> Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::Time> {
        serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z")).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_names_parse_both_ways() {
        for agent in [LoggingAgent::Promtail, LoggingAgent::Alloy] {
            assert_eq!(agent.as_str().parse::<LoggingAgent>().unwrap(), agent);
        }
        for logger in [EventsLogger::GrafanaAgent, EventsLogger::Alloy] {
            assert_eq!(logger.as_str().parse::<EventsLogger>().unwrap(), logger);
        }
        assert!("fluentbit".parse::<LoggingAgent>().is_err());
    }

    #[test]
    fn test_options_from_config() {
        let config = ControllerConfig {
            logging_agent: LoggingAgent::Promtail,
            installation_name: "gauss".to_string(),
            ..ControllerConfig::default()
        };
        let options = ClusterOptions::from(&config);
        assert_eq!(options.requested.logging_agent, LoggingAgent::Promtail);
        assert_eq!(options.requested.events_logger, EventsLogger::Alloy);
        assert_eq!(options.installation_name, "gauss");
    }
}
