//! # Events Logger Secret
//!
//! Write credentials of the agent shipping kubernetes events. The secret name
//! and layout follow the negotiated events logger:
//!
//! - alloy: `<cluster>-events-logger-secret`, same `alloy.extraSecretEnv`
//!   values as the logging secret
//! - grafana-agent: `<cluster>-grafana-agent-secret`, an `extraSecret` the
//!   chart turns into a secret of its own
//!
//! Bundles older than 0.9.0 ship no events logger and are left alone.

use super::logging_secret::{
    credentials_pending, render_values, values_secret, WriteCredentialSource, WriteCredentials,
};
use super::{ensure_object, DeletePhase, PreFetched, ReconcileOutcome, SubReconciler};
use crate::config::ControllerConfig;
use crate::constants::{
    EVENTS_LOGGER_MIN_BUNDLE_VERSION, EVENTS_LOGGER_SECRET_COMPONENT,
    GRAFANA_AGENT_EXTRA_SECRET_COMPONENT, GRAFANA_AGENT_SECRET_COMPONENT,
};
use crate::controller::reconciler::ReconcilerError;
use crate::credentials::CredentialStore;
use crate::logged_cluster::{EventsLogger, LoggedCluster, LoggingAgent};
use crate::store::{delete_if_exists, ObjectKey, ObjectStore, ResourceKind};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GrafanaAgentValues {
    extra_secret: ExtraSecret,
}

#[derive(Debug, Serialize)]
struct ExtraSecret {
    name: String,
    data: BTreeMap<&'static str, String>,
}

fn grafana_agent_values(
    cluster: &dyn LoggedCluster,
    credentials: &WriteCredentials,
) -> GrafanaAgentValues {
    GrafanaAgentValues {
        extra_secret: ExtraSecret {
            name: cluster.app_config_name(GRAFANA_AGENT_EXTRA_SECRET_COMPONENT),
            data: BTreeMap::from([
                ("LOGGING_URL", credentials.push_url()),
                ("LOGGING_TENANT_ID", credentials.tenant.clone()),
                ("LOGGING_USERNAME", credentials.username.clone()),
                ("LOGGING_PASSWORD", credentials.password.clone()),
            ]),
        },
    }
}

fn render(
    logger: EventsLogger,
    cluster: &dyn LoggedCluster,
    credentials: &WriteCredentials,
) -> Result<String, ReconcilerError> {
    match logger {
        EventsLogger::Alloy => render_values(LoggingAgent::Alloy, credentials),
        EventsLogger::GrafanaAgent => {
            serde_yaml::to_string(&grafana_agent_values(cluster, credentials)).map_err(|e| {
                ReconcilerError::Render {
                    resource: "events-logger-secret",
                    reason: e.to_string(),
                }
            })
        }
    }
}

fn component(logger: EventsLogger) -> &'static str {
    match logger {
        EventsLogger::Alloy => EVENTS_LOGGER_SECRET_COMPONENT,
        EventsLogger::GrafanaAgent => GRAFANA_AGENT_SECRET_COMPONENT,
    }
}

/// Owns the events logger secret of one cluster
#[derive(Debug)]
pub struct EventsLoggerSecret {
    store: Arc<dyn ObjectStore>,
    source: WriteCredentialSource,
    conflict_attempts: u32,
}

impl EventsLoggerSecret {
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        credentials: CredentialStore,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            store,
            source: WriteCredentialSource::new(credentials, config),
            conflict_attempts: config.conflict_retry_attempts,
        }
    }

    fn key(cluster: &dyn LoggedCluster, logger: EventsLogger) -> ObjectKey {
        ObjectKey::new(
            ResourceKind::Secret,
            cluster.apps_namespace(),
            cluster.app_config_name(component(logger)),
        )
    }

    async fn delete(
        &self,
        cluster: &dyn LoggedCluster,
        logger: EventsLogger,
    ) -> Result<(), ReconcilerError> {
        let key = Self::key(cluster, logger);
        if delete_if_exists(self.store.as_ref(), &key).await? {
            info!(cluster = %cluster.identity(), object = %key, "Events logger secret deleted");
        }
        Ok(())
    }
}

#[async_trait]
impl SubReconciler for EventsLoggerSecret {
    fn name(&self) -> &'static str {
        "events-logger-secret"
    }

    fn delete_phase(&self) -> DeletePhase {
        DeletePhase::Remove
    }

    async fn reconcile_create(
        &self,
        cluster: &dyn LoggedCluster,
        prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let supported = prefetched
            .bundle_version
            .as_ref()
            .is_some_and(|version| *version >= EVENTS_LOGGER_MIN_BUNDLE_VERSION);
        if !supported {
            debug!(cluster = %cluster.identity(), "Bundle ships no events logger, skipping");
            return Ok(ReconcileOutcome::Done);
        }

        let Some(credentials) = self.source.load(cluster).await? else {
            return Ok(credentials_pending());
        };

        let logger = cluster.agent_selection().events_logger;
        let key = Self::key(cluster, logger);
        let desired = values_secret(&key, render(logger, cluster, &credentials)?);
        if ensure_object(self.store.as_ref(), &desired, self.conflict_attempts).await? {
            info!(cluster = %cluster.identity(), object = %key, logger = %logger, "Events logger secret up to date");
        } else {
            debug!(cluster = %cluster.identity(), object = %key, "Events logger secret unchanged");
        }

        // The other layout is left over from a previous selection
        let stale = match logger {
            EventsLogger::Alloy => EventsLogger::GrafanaAgent,
            EventsLogger::GrafanaAgent => EventsLogger::Alloy,
        };
        self.delete(cluster, stale).await?;
        Ok(ReconcileOutcome::Done)
    }

    async fn reconcile_delete(
        &self,
        cluster: &dyn LoggedCluster,
        _prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        for logger in [EventsLogger::Alloy, EventsLogger::GrafanaAgent] {
            self.delete(cluster, logger).await?;
        }
        Ok(ReconcileOutcome::Done)
    }
}
