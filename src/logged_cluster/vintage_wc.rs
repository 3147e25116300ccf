//! Vintage workload cluster.

use super::{ClusterBase, ClusterFlavor, ClusterOptions, LoggedCluster};
use crate::constants::{
    BUNDLE_EXTRA_CONFIG_MAP, MIN_VINTAGE_RELEASE, OBSERVABILITY_BUNDLE_APP, RELEASE_VERSION_LABEL,
};
use crate::crd::{AppSpec, Cluster};
use crate::store::ObjectKey;
use semver::Version;

/// Workload cluster of a vintage installation
///
/// Apps live in a namespace named after the cluster. Wiring of the bundle
/// extra config is done by cluster-operator, so it is a no-op here.
#[derive(Debug, Clone)]
pub struct VintageWorkloadCluster {
    base: ClusterBase,
}

impl VintageWorkloadCluster {
    #[must_use]
    pub fn new(cluster: Cluster, options: ClusterOptions) -> Self {
        Self {
            base: ClusterBase::new(cluster.metadata, options),
        }
    }

    /// Release of the cluster, if labelled with a readable version
    pub fn release(&self) -> Option<Version> {
        self.base
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(RELEASE_VERSION_LABEL))
            .and_then(|raw| parse_release(raw))
    }
}

/// Parse `MAJOR[.MINOR[.PATCH]]`, with an optional `v` prefix
fn parse_release(raw: &str) -> Option<Version> {
    let raw = raw.trim();
    let raw = raw.strip_prefix('v').unwrap_or(raw);
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }
    let mut parts = raw.split('.').map(str::parse::<u64>);
    let major = parts.next()?.ok()?;
    let minor = parts.next().transpose().ok()?.unwrap_or(0);
    let patch = parts.next().transpose().ok()?.unwrap_or(0);
    if parts.next().is_some() {
        return None;
    }
    Some(Version::new(major, minor, patch))
}

impl LoggedCluster for VintageWorkloadCluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ClusterBase {
        &mut self.base
    }

    fn flavor(&self) -> ClusterFlavor {
        ClusterFlavor::VintageWorkload
    }

    fn is_enabled(&self) -> bool {
        // Older releases do not ship a bundle able to run the agents
        let release_supported = self
            .release()
            .is_some_and(|release| release >= MIN_VINTAGE_RELEASE);
        self.base.options.enable_logging
            && release_supported
            && self.base.logging_label_enabled()
            && !self.is_being_deleted()
    }

    fn apps_namespace(&self) -> String {
        self.identity().name.clone()
    }

    fn app_config_name(&self, app: &str) -> String {
        if app == OBSERVABILITY_BUNDLE_APP {
            format!("{}-{}", self.identity().name, app)
        } else {
            app.to_string()
        }
    }

    fn config_map_label_name(&self, component: &str) -> String {
        component.to_string()
    }

    fn observability_bundle_config_map(&self) -> &'static str {
        BUNDLE_EXTRA_CONFIG_MAP
    }

    fn tenant(&self) -> String {
        self.cluster_name()
    }

    fn wire_logging(&self, _bundle: &mut AppSpec, _config_map: &ObjectKey) -> bool {
        false
    }

    fn unwire_logging(&self, _bundle: &mut AppSpec, _config_map: &ObjectKey) -> bool {
        false
    }
}
