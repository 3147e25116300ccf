//! # Reconciler
//!
//! Reconciliation of the logging stack of every cluster.
//!
//! ## Reconciliation Flow
//!
//! 1. Load the [`LoggedCluster`](crate::logged_cluster::LoggedCluster) facade of the resource
//! 2. Derive the lifecycle state from finalizer presence and the enable condition
//! 3. Add the finalizer before any create-side work
//! 4. Pre-fetch the observability bundle version and negotiate the agent selection
//! 5. Fan out to the sub-reconcilers, stopping at the first error or requeue
//! 6. Remove the finalizer once every delete-side step has converged

mod finalizer;
mod orchestrator;
mod prefetch;
mod types;

pub use orchestrator::LifecycleState;
pub use types::{BackoffState, LoggingReconciler, ReconcilerError};

use crate::crd::Cluster;
use crate::logged_cluster::{ClusterFlavor, ClusterIdentity};
use crate::resources::ReconcileOutcome;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;

/// Scheduler action for a cycle outcome
#[must_use]
pub fn to_action(outcome: ReconcileOutcome) -> Action {
    match outcome {
        ReconcileOutcome::Done => Action::await_change(),
        ReconcileOutcome::RequeueAfter(delay) => Action::requeue(delay),
    }
}

fn identity_of<K: ResourceExt>(obj: &K) -> ClusterIdentity {
    ClusterIdentity::new(obj.namespace().unwrap_or_default(), obj.name_any())
}

/// Entry point for `Cluster` resources
///
/// Clusters are CAPI clusters, or vintage workload clusters when running in vintage mode.
pub async fn reconcile_cluster(
    obj: Arc<Cluster>,
    ctx: Arc<LoggingReconciler>,
) -> Result<Action, ReconcilerError> {
    let flavor = if ctx.config.vintage_mode {
        ClusterFlavor::VintageWorkload
    } else {
        ClusterFlavor::Capi
    };
    let outcome = ctx.reconcile(flavor, &identity_of(obj.as_ref())).await?;
    Ok(to_action(outcome))
}

/// Entry point for the Service backing a vintage management cluster
pub async fn reconcile_management_cluster(
    obj: Arc<Service>,
    ctx: Arc<LoggingReconciler>,
) -> Result<Action, ReconcilerError> {
    let outcome = ctx
        .reconcile(ClusterFlavor::VintageManagement, &identity_of(obj.as_ref()))
        .await?;
    Ok(to_action(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_outcome_to_action() {
        assert_eq!(to_action(ReconcileOutcome::Done), Action::await_change());
        assert_eq!(
            to_action(ReconcileOutcome::RequeueAfter(Duration::from_secs(300))),
            Action::requeue(Duration::from_secs(300))
        );
    }
}
