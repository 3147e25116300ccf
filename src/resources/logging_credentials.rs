//! # Logging Credentials
//!
//! Write credentials of the cluster in the shared credential secrets.
//!
//! The logging scope always carries the cluster identity plus the fixed
//! [`READ_USER`] identity. The tracing scope is only populated when tracing
//! is enabled, but the cluster entry is released from both scopes on delete so
//! that flipping the tracing switch off does not leak entries.

use super::{DeletePhase, PreFetched, ReconcileOutcome, SubReconciler};
use crate::config::ControllerConfig;
use crate::constants::READ_USER;
use crate::controller::reconciler::ReconcilerError;
use crate::credentials::{CredentialScope, CredentialStore};
use crate::logged_cluster::LoggedCluster;
use async_trait::async_trait;
use tracing::{debug, info};

/// Owns the entries of one cluster in the shared credential secrets
#[derive(Debug)]
pub struct LoggingCredentials {
    credentials: CredentialStore,
    enable_tracing: bool,
}

impl LoggingCredentials {
    #[must_use]
    pub fn new(credentials: CredentialStore, config: &ControllerConfig) -> Self {
        Self {
            credentials,
            enable_tracing: config.enable_tracing,
        }
    }
}

#[async_trait]
impl SubReconciler for LoggingCredentials {
    fn name(&self) -> &'static str {
        "logging-credentials"
    }

    fn delete_phase(&self) -> DeletePhase {
        DeletePhase::Release
    }

    async fn reconcile_create(
        &self,
        cluster: &dyn LoggedCluster,
        _prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let identity = cluster.cluster_name();
        let mut updated = self
            .credentials
            .ensure_credentials_for(CredentialScope::Logging, &[READ_USER, &identity])
            .await?;
        if self.enable_tracing {
            updated |= self
                .credentials
                .ensure_credentials(CredentialScope::Tracing, &identity)
                .await?;
        }

        if updated {
            info!(cluster = %cluster.identity(), identity = %identity, "Credentials ensured");
        } else {
            debug!(cluster = %cluster.identity(), identity = %identity, "Credentials up to date");
        }
        Ok(ReconcileOutcome::Done)
    }

    async fn reconcile_delete(
        &self,
        cluster: &dyn LoggedCluster,
        _prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let identity = cluster.cluster_name();
        for scope in [CredentialScope::Logging, CredentialScope::Tracing] {
            if self.credentials.remove_credentials(scope, &identity).await? {
                info!(cluster = %cluster.identity(), scope = %scope, "Credentials released");
            }
        }
        Ok(ReconcileOutcome::Done)
    }
}
