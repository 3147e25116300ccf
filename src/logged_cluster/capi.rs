//! Cluster API managed cluster.

use super::{ClusterBase, ClusterFlavor, ClusterOptions, LoggedCluster};
use crate::constants::{BUNDLE_EXTRA_CONFIG_MAP, BUNDLE_EXTRA_CONFIG_PRIORITY, DEFAULT_WRITE_TENANT};
use crate::crd::{AppExtraConfig, AppSpec, Cluster};
use crate::store::ObjectKey;

/// Cluster API cluster
///
/// Apps live next to the cluster object and every per-cluster object name is
/// prefixed with the cluster name.
#[derive(Debug, Clone)]
pub struct CapiCluster {
    base: ClusterBase,
}

impl CapiCluster {
    #[must_use]
    pub fn new(cluster: Cluster, options: ClusterOptions) -> Self {
        Self {
            base: ClusterBase::new(cluster.metadata, options),
        }
    }
}

fn wired_extra_config(config_map: &ObjectKey) -> AppExtraConfig {
    AppExtraConfig {
        kind: "configMap".to_string(),
        name: config_map.name.clone(),
        namespace: config_map.namespace.clone(),
        priority: BUNDLE_EXTRA_CONFIG_PRIORITY,
    }
}

impl LoggedCluster for CapiCluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ClusterBase {
        &mut self.base
    }

    fn flavor(&self) -> ClusterFlavor {
        ClusterFlavor::Capi
    }

    fn is_enabled(&self) -> bool {
        self.base.options.enable_logging
            && self.base.logging_label_enabled()
            && !self.is_being_deleted()
    }

    fn apps_namespace(&self) -> String {
        self.identity().namespace.clone()
    }

    fn app_config_name(&self, app: &str) -> String {
        format!("{}-{}", self.identity().name, app)
    }

    fn config_map_label_name(&self, component: &str) -> String {
        component.to_string()
    }

    fn observability_bundle_config_map(&self) -> &'static str {
        BUNDLE_EXTRA_CONFIG_MAP
    }

    fn tenant(&self) -> String {
        DEFAULT_WRITE_TENANT.to_string()
    }

    fn wire_logging(&self, bundle: &mut AppSpec, config_map: &ObjectKey) -> bool {
        bundle.add_extra_config(wired_extra_config(config_map))
    }

    fn unwire_logging(&self, bundle: &mut AppSpec, config_map: &ObjectKey) -> bool {
        bundle.remove_extra_config("configMap", &config_map.name, &config_map.namespace)
    }
}
