//! # App
//!
//! Typed view of `application.giantswarm.io/v1alpha1` `App` plus the small
//! set of spec mutations used to wire the logging configuration into the
//! observability bundle.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Giant Swarm managed application
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "application.giantswarm.io",
    version = "v1alpha1",
    kind = "App",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct AppSpec {
    /// Chart name
    #[serde(default)]
    pub name: String,
    /// Target namespace of the chart
    #[serde(default)]
    pub namespace: String,
    /// Chart version (semantic version, optionally prefixed with `v`)
    #[serde(default)]
    pub version: String,
    /// Catalog the chart comes from
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub catalog: String,
    /// Ordered list of additional value sources
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_configs: Vec<AppExtraConfig>,
    /// User level values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_config: Option<AppUserConfig>,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

/// Entry of `spec.extraConfigs`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppExtraConfig {
    /// `configMap` or `secret`
    pub kind: String,
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub priority: i64,
}

/// `spec.userConfig`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppUserConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<AppConfigRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<AppConfigRef>,
}

/// Reference to a config map or secret
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct AppConfigRef {
    pub name: String,
    pub namespace: String,
}

impl App {
    /// Parse the chart version as a semantic version
    pub fn semver(&self) -> Result<semver::Version, semver::Error> {
        let raw = self.spec.version.trim();
        semver::Version::parse(raw.strip_prefix('v').unwrap_or(raw))
    }
}

impl AppSpec {
    /// Add an extra config entry unless one with the same kind, name and namespace exists.
    ///
    /// Returns true when the spec changed.
    pub fn add_extra_config(&mut self, entry: AppExtraConfig) -> bool {
        match self.extra_configs.iter_mut().find(|existing| {
            existing.kind == entry.kind
                && existing.name == entry.name
                && existing.namespace == entry.namespace
        }) {
            Some(existing) if existing.priority == entry.priority => false,
            Some(existing) => {
                existing.priority = entry.priority;
                true
            }
            None => {
                self.extra_configs.push(entry);
                true
            }
        }
    }

    /// Remove every extra config entry of the given kind, name and namespace.
    ///
    /// Returns true when the spec changed.
    pub fn remove_extra_config(&mut self, kind: &str, name: &str, namespace: &str) -> bool {
        let before = self.extra_configs.len();
        self.extra_configs.retain(|existing| {
            !(existing.kind == kind && existing.name == name && existing.namespace == namespace)
        });
        before != self.extra_configs.len()
    }

    /// Point `userConfig.configMap` at the given config map.
    ///
    /// Returns true when the spec changed.
    pub fn set_user_config_map(&mut self, name: &str, namespace: &str) -> bool {
        let desired = AppConfigRef {
            name: name.to_string(),
            namespace: namespace.to_string(),
        };
        let user_config = self.user_config.get_or_insert_with(AppUserConfig::default);
        if user_config.config_map.as_ref() == Some(&desired) {
            return false;
        }
        user_config.config_map = Some(desired);
        true
    }

    /// Clear `userConfig.configMap` if it points at the given config map.
    ///
    /// Returns true when the spec changed.
    pub fn clear_user_config_map(&mut self, name: &str, namespace: &str) -> bool {
        let Some(user_config) = self.user_config.as_mut() else {
            return false;
        };
        let points_here = user_config
            .config_map
            .as_ref()
            .is_some_and(|r| r.name == name && r.namespace == namespace);
        if !points_here {
            return false;
        }
        user_config.config_map = None;
        if user_config.secret.is_none() {
            self.user_config = None;
        }
        true
    }
}
