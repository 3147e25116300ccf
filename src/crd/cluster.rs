//! # Cluster
//!
//! Minimal typed view of `cluster.x-k8s.io/v1beta1` `Cluster`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cluster API cluster
///
/// Only the fields the operator reads are modelled; the rest of the spec is
/// carried through `other`.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    kind = "Cluster",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Reconciliation of paused clusters is left to their owners
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub paused: bool,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}
