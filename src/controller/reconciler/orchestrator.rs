//! # Orchestrator
//!
//! Finalizer state machine and sub-reconciler fan-out.
//!
//! | Finalizer | Enabled | State        | Work                                            |
//! |-----------|---------|--------------|-------------------------------------------------|
//! | absent    | false   | Inactive     | nothing                                         |
//! | absent    | true    | Activating   | add finalizer, then continue as Active          |
//! | present   | true    | Active       | negotiate agents, create-side fan-out           |
//! | present   | false   | Deactivating | delete-side fan-out, then remove the finalizer  |
//!
//! The fan-out stops at the first sub-reconciler that errors or asks for a
//! requeue. The next cycle starts again from the first sub-reconciler.

use super::finalizer::{patch_finalizer, FinalizerOp};
use super::{prefetch, LoggingReconciler, ReconcilerError};
use crate::constants::LOGGING_FINALIZER;
use crate::logged_cluster::{self, ClusterFlavor, ClusterIdentity, ClusterOptions, LoggedCluster};
use crate::observability;
use crate::resources::{PreFetched, ReconcileOutcome, SubReconciler};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn, Instrument};

/// Lifecycle state derived from finalizer presence and the enable condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No finalizer and logging disabled; covers never-enabled and fully cleaned up clusters
    Inactive,
    Activating,
    Active,
    Deactivating,
}

impl LifecycleState {
    #[must_use]
    pub fn of(has_finalizer: bool, enabled: bool) -> Self {
        match (has_finalizer, enabled) {
            (false, false) => Self::Inactive,
            (false, true) => Self::Activating,
            (true, true) => Self::Active,
            (true, false) => Self::Deactivating,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Deactivating => "deactivating",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum FanOut {
    Create,
    Delete,
}

impl FanOut {
    fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }
}

impl LoggingReconciler {
    /// Run one reconciliation cycle for `identity`.
    ///
    /// The cycle is bounded by the configured reconcile timeout; expiry yields a
    /// transient [`ReconcilerError::Timeout`].
    pub async fn reconcile(
        &self,
        flavor: ClusterFlavor,
        identity: &ClusterIdentity,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let span = tracing::info_span!(
            "logging.reconcile",
            resource.name = identity.name.as_str(),
            resource.namespace = identity.namespace.as_str(),
            flavor = flavor.as_str(),
        );
        let start = Instant::now();
        observability::metrics::increment_reconciliations();

        let deadline = self.config.reconcile_timeout();
        let result = match tokio::time::timeout(deadline, self.run_cycle(flavor, identity))
            .instrument(span)
            .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    resource.name = identity.name.as_str(),
                    resource.namespace = identity.namespace.as_str(),
                    timeout = ?deadline,
                    "Reconciliation deadline exceeded"
                );
                Err(ReconcilerError::Timeout(deadline))
            }
        };

        observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        if result.is_ok() {
            self.reset_backoff(&identity.namespace, &identity.name);
        }
        result
    }

    async fn run_cycle(
        &self,
        flavor: ClusterFlavor,
        identity: &ClusterIdentity,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let options = ClusterOptions::from(self.config.as_ref());
        let Some(mut cluster) =
            logged_cluster::load(self.store.as_ref(), flavor, identity, options).await?
        else {
            debug!("Resource no longer exists, nothing to do");
            return Ok(ReconcileOutcome::Done);
        };

        let state = LifecycleState::of(cluster.has_finalizer(LOGGING_FINALIZER), cluster.is_enabled());
        debug!(state = state.as_str(), "Evaluated lifecycle state");

        match state {
            LifecycleState::Inactive => {
                debug!("Logging disabled and nothing to clean up");
                Ok(ReconcileOutcome::Done)
            }
            LifecycleState::Activating => {
                patch_finalizer(
                    self.store.as_ref(),
                    &cluster.object_key(),
                    LOGGING_FINALIZER,
                    FinalizerOp::Add,
                    self.config.conflict_retry_attempts,
                )
                .await?;
                self.activate(cluster.as_mut()).await
            }
            LifecycleState::Active => self.activate(cluster.as_mut()).await,
            LifecycleState::Deactivating => self.deactivate(cluster.as_ref()).await,
        }
    }

    async fn activate(
        &self,
        cluster: &mut dyn LoggedCluster,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let Some(prefetched) = prefetch::for_create(self.store.as_ref(), cluster).await? else {
            info!(
                app = %cluster.observability_bundle_app(),
                "Observability bundle app not found, requeuing"
            );
            observability::metrics::increment_requeues_total("bundle-not-found");
            return Ok(ReconcileOutcome::RequeueAfter(
                self.config.bundle_not_found_requeue(),
            ));
        };

        if let Some(version) = &prefetched.bundle_version {
            self.negotiate(cluster, version);
        }

        let reconcilers = self.sub_reconcilers.create_order().to_vec();
        self.fan_out(FanOut::Create, &reconcilers, cluster, &prefetched)
            .await
    }

    fn negotiate(&self, cluster: &mut dyn LoggedCluster, version: &semver::Version) {
        let requested = cluster.agent_selection();
        let negotiated = self.negotiator.negotiate(requested, version);
        if negotiated.logging_agent != requested.logging_agent {
            observability::metrics::increment_agent_downgrades("logging-agent");
        }
        if negotiated.events_logger != requested.events_logger {
            observability::metrics::increment_agent_downgrades("events-logger");
        }
        if negotiated != requested {
            info!(
                bundle_version = %version,
                requested_logging_agent = %requested.logging_agent,
                logging_agent = %negotiated.logging_agent,
                requested_events_logger = %requested.events_logger,
                events_logger = %negotiated.events_logger,
                "Agent selection downgraded to match the observability bundle"
            );
        }
        cluster.set_agent_selection(negotiated);
    }

    async fn deactivate(
        &self,
        cluster: &dyn LoggedCluster,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let prefetched = prefetch::for_delete(self.store.as_ref(), cluster).await?;
        let reconcilers = self.sub_reconcilers.delete_order();
        let outcome = self
            .fan_out(FanOut::Delete, &reconcilers, cluster, &prefetched)
            .await?;
        if !outcome.is_done() {
            return Ok(outcome);
        }

        match patch_finalizer(
            self.store.as_ref(),
            &cluster.object_key(),
            LOGGING_FINALIZER,
            FinalizerOp::Remove,
            self.config.conflict_retry_attempts,
        )
        .await
        {
            Ok(_) => {
                info!("Logging resources cleaned up");
                Ok(ReconcileOutcome::Done)
            }
            Err(e @ ReconcilerError::InvariantViolation(_)) => Err(e),
            Err(e) => {
                let delay = self.config.finalizer_removal_requeue();
                warn!(error = %e, retry_in = ?delay, "Failed to remove finalizer, requeuing");
                observability::metrics::increment_requeues_total("finalizer-removal");
                Ok(ReconcileOutcome::RequeueAfter(delay))
            }
        }
    }

    async fn fan_out(
        &self,
        direction: FanOut,
        reconcilers: &[Arc<dyn SubReconciler>],
        cluster: &dyn LoggedCluster,
        prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        for reconciler in reconcilers {
            let name = reconciler.name();
            let result = match direction {
                FanOut::Create => reconciler.reconcile_create(cluster, prefetched).await,
                FanOut::Delete => reconciler.reconcile_delete(cluster, prefetched).await,
            };
            match result {
                Ok(ReconcileOutcome::Done) => {
                    observability::metrics::record_subreconciler_outcome(
                        name,
                        direction.as_str(),
                        "done",
                    );
                }
                Ok(outcome @ ReconcileOutcome::RequeueAfter(delay)) => {
                    observability::metrics::record_subreconciler_outcome(
                        name,
                        direction.as_str(),
                        outcome.as_str(),
                    );
                    observability::metrics::increment_requeues_total(name);
                    info!(
                        reconciler = name,
                        phase = direction.as_str(),
                        retry_in = ?delay,
                        "Sub-reconciler requested a requeue, stopping here"
                    );
                    return Ok(outcome);
                }
                Err(e) => {
                    observability::metrics::record_subreconciler_outcome(
                        name,
                        direction.as_str(),
                        "error",
                    );
                    error!(
                        reconciler = name,
                        phase = direction.as_str(),
                        error = %e,
                        "Sub-reconciler failed, stopping here"
                    );
                    return Err(e);
                }
            }
        }
        Ok(ReconcileOutcome::Done)
    }
}
