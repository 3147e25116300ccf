//! Vintage management cluster.

use super::{ClusterBase, ClusterFlavor, ClusterOptions, LoggedCluster};
use crate::constants::{BUNDLE_USER_VALUES_CONFIG_MAP, VINTAGE_APPS_NAMESPACE};
use crate::crd::AppSpec;
use crate::store::ObjectKey;
use k8s_openapi::api::core::v1::Service;

/// The installation itself, represented by its `default/kubernetes` Service
///
/// There is no logging label on that Service, so only the installation-wide
/// switch decides. The bundle does not support extra configs here and is
/// wired through its user values instead.
#[derive(Debug, Clone)]
pub struct VintageManagementCluster {
    base: ClusterBase,
}

impl VintageManagementCluster {
    #[must_use]
    pub fn new(service: Service, options: ClusterOptions) -> Self {
        Self {
            base: ClusterBase::new(service.metadata, options),
        }
    }
}

impl LoggedCluster for VintageManagementCluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ClusterBase {
        &mut self.base
    }

    fn flavor(&self) -> ClusterFlavor {
        ClusterFlavor::VintageManagement
    }

    fn is_enabled(&self) -> bool {
        self.base.options.enable_logging && !self.is_being_deleted()
    }

    fn apps_namespace(&self) -> String {
        VINTAGE_APPS_NAMESPACE.to_string()
    }

    fn app_config_name(&self, app: &str) -> String {
        app.to_string()
    }

    fn config_map_label_name(&self, component: &str) -> String {
        component.to_string()
    }

    fn observability_bundle_config_map(&self) -> &'static str {
        BUNDLE_USER_VALUES_CONFIG_MAP
    }

    fn cluster_name(&self) -> String {
        self.installation_name().to_string()
    }

    fn tenant(&self) -> String {
        self.cluster_name()
    }

    fn wire_logging(&self, bundle: &mut AppSpec, config_map: &ObjectKey) -> bool {
        bundle.set_user_config_map(&config_map.name, &config_map.namespace)
    }

    fn unwire_logging(&self, bundle: &mut AppSpec, config_map: &ObjectKey) -> bool {
        bundle.clear_user_config_map(&config_map.name, &config_map.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::LOGGING_LABEL;
    use crate::logged_cluster::test_support::{metadata, options};

    fn management_cluster(enable_logging: bool) -> VintageManagementCluster {
        let service = Service {
            metadata: metadata("default", "kubernetes", &[(LOGGING_LABEL, "false")]),
            ..Service::default()
        };
        let mut opts = options();
        opts.enable_logging = enable_logging;
        VintageManagementCluster::new(service, opts)
    }

    #[test]
    fn test_only_installation_flag_matters() {
        assert!(management_cluster(true).is_enabled());
        assert!(!management_cluster(false).is_enabled());
    }

    #[test]
    fn test_naming_uses_installation() {
        let mc = management_cluster(true);
        assert_eq!(mc.cluster_name(), "gauss");
        assert_eq!(mc.tenant(), "gauss");
        assert_eq!(mc.apps_namespace(), "giantswarm");
        assert_eq!(mc.app_config_name("observability-bundle"), "observability-bundle");
        assert_eq!(
            mc.observability_bundle_config_map_key(),
            ObjectKey::new(
                crate::store::ResourceKind::ConfigMap,
                "giantswarm",
                "observability-bundle-user-values"
            )
        );
    }

    #[test]
    fn test_wiring_uses_user_values() {
        let mc = management_cluster(true);
        let key = mc.observability_bundle_config_map_key();
        let mut spec = AppSpec::default();
        assert!(mc.wire_logging(&mut spec, &key));
        let reference = spec.user_config.as_ref().and_then(|u| u.config_map.as_ref()).unwrap();
        assert_eq!(reference.name, "observability-bundle-user-values");
        assert!(mc.unwire_logging(&mut spec, &key));
        assert!(spec.user_config.is_none());
    }
}
