//! # Tracing Secret
//!
//! Secret handing the trace store endpoint and the tracing write credentials
//! of a cluster to alloy. Only kept while tracing is enabled; switching
//! tracing off removes it on the next create cycle.

use super::logging_secret::{credentials_pending, values_secret};
use super::{ensure_object, DeletePhase, PreFetched, ReconcileOutcome, SubReconciler};
use crate::config::ControllerConfig;
use crate::constants::TRACING_SECRET_COMPONENT;
use crate::controller::reconciler::ReconcilerError;
use crate::credentials::{CredentialScope, CredentialStore};
use crate::logged_cluster::LoggedCluster;
use crate::store::{delete_if_exists, ObjectKey, ObjectStore, ResourceKind};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct TracingValues {
    alloy: TracingSecretEnv,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TracingSecretEnv {
    extra_secret_env: BTreeMap<&'static str, String>,
}

fn render(endpoint: &str, username: &str, password: &str) -> Result<String, ReconcilerError> {
    let values = TracingValues {
        alloy: TracingSecretEnv {
            extra_secret_env: BTreeMap::from([
                ("TRACING_ENDPOINT", endpoint.to_string()),
                ("TRACING_USERNAME", username.to_string()),
                ("TRACING_PASSWORD", password.to_string()),
            ]),
        },
    };
    serde_yaml::to_string(&values).map_err(|e| ReconcilerError::Render {
        resource: "tracing-secret",
        reason: e.to_string(),
    })
}

/// Owns the tracing secret of one cluster
#[derive(Debug)]
pub struct TracingSecret {
    store: Arc<dyn ObjectStore>,
    credentials: CredentialStore,
    conflict_attempts: u32,
    tempo_url: String,
    enable_tracing: bool,
}

impl TracingSecret {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        credentials: CredentialStore,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            store,
            credentials,
            conflict_attempts: config.conflict_retry_attempts,
            tempo_url: config.tempo_url.clone(),
            enable_tracing: config.enable_tracing,
        }
    }

    fn key(cluster: &dyn LoggedCluster) -> ObjectKey {
        ObjectKey::new(
            ResourceKind::Secret,
            cluster.apps_namespace(),
            cluster.app_config_name(TRACING_SECRET_COMPONENT),
        )
    }

    async fn delete(&self, cluster: &dyn LoggedCluster) -> Result<(), ReconcilerError> {
        let key = Self::key(cluster);
        if delete_if_exists(self.store.as_ref(), &key).await? {
            info!(cluster = %cluster.identity(), object = %key, "Tracing secret deleted");
        }
        Ok(())
    }
}

#[async_trait]
impl SubReconciler for TracingSecret {
    fn name(&self) -> &'static str {
        "tracing-secret"
    }

    fn delete_phase(&self) -> DeletePhase {
        DeletePhase::Remove
    }

    async fn reconcile_create(
        &self,
        cluster: &dyn LoggedCluster,
        _prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        if !self.enable_tracing {
            self.delete(cluster).await?;
            return Ok(ReconcileOutcome::Done);
        }

        let username = cluster.cluster_name();
        let password = match self
            .credentials
            .get_password(CredentialScope::Tracing, &username)
            .await
        {
            Ok(password) => password,
            Err(e) if e.is_not_found() => {
                info!(
                    cluster = %cluster.identity(),
                    error = %e,
                    "Tracing credentials not available yet, requeuing"
                );
                return Ok(credentials_pending());
            }
            Err(e) => return Err(e.into()),
        };

        let key = Self::key(cluster);
        let desired = values_secret(&key, render(&self.tempo_url, &username, &password)?);
        if ensure_object(self.store.as_ref(), &desired, self.conflict_attempts).await? {
            info!(cluster = %cluster.identity(), object = %key, "Tracing secret up to date");
        } else {
            debug!(cluster = %cluster.identity(), object = %key, "Tracing secret unchanged");
        }
        Ok(ReconcileOutcome::Done)
    }

    async fn reconcile_delete(
        &self,
        cluster: &dyn LoggedCluster,
        _prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        self.delete(cluster).await?;
        Ok(ReconcileOutcome::Done)
    }
}
