//! # Logging Secret
//!
//! Secret consumed by the logging agent of a cluster. It carries the push
//! URL, tenant and write credentials, laid out the way the negotiated agent
//! expects them:
//!
//! - alloy reads environment variables from `alloy.extraSecretEnv`
//! - promtail reads a list of clients from `promtail.config.clients`

use super::{
    common_labels, ensure_object, DeletePhase, PreFetched, ReconcileOutcome, SubReconciler,
};
use crate::config::ControllerConfig;
use crate::constants::{
    CREDENTIALS_NOT_FOUND_REQUEUE_SECS, LOGGING_SECRET_COMPONENT, LOKI_MAX_BACKOFF_PERIOD,
    LOKI_REMOTE_TIMEOUT,
};
use crate::controller::reconciler::ReconcilerError;
use crate::credentials::{CredentialError, CredentialScope, CredentialStore};
use crate::logged_cluster::{LoggedCluster, LoggingAgent};
use crate::store::{delete_if_exists, ObjectKey, ObjectStore, ResourceKind};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Everything the agent needs to push logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WriteCredentials {
    pub loki_url: String,
    pub tenant: String,
    pub username: String,
    pub password: String,
    pub installation: String,
    pub insecure_ca: bool,
    /// Password of the tracing scope, when tracing is enabled
    pub tracing_password: Option<String>,
}

impl WriteCredentials {
    pub(crate) fn push_url(&self) -> String {
        format!("{}/loki/api/v1/push", self.loki_url.trim_end_matches('/'))
    }

    fn ruler_url(&self) -> String {
        self.loki_url.trim_end_matches('/').to_string()
    }
}

#[derive(Debug, Serialize)]
struct AlloyValues {
    alloy: AlloySecretEnv,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AlloySecretEnv {
    extra_secret_env: BTreeMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
struct PromtailValues {
    promtail: PromtailSection,
}

#[derive(Debug, Serialize)]
struct PromtailSection {
    config: PromtailConfig,
}

#[derive(Debug, Serialize)]
struct PromtailConfig {
    clients: Vec<PromtailClient>,
}

#[derive(Debug, Serialize)]
struct PromtailClient {
    url: String,
    tenant_id: String,
    basic_auth: BasicAuth,
    backoff_config: BackoffConfig,
    external_labels: ExternalLabels,
    tls_config: TlsConfig,
    timeout: &'static str,
}

#[derive(Debug, Serialize)]
struct BasicAuth {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct BackoffConfig {
    max_period: &'static str,
}

#[derive(Debug, Serialize)]
struct ExternalLabels {
    installation: String,
    cluster_id: String,
}

#[derive(Debug, Serialize)]
struct TlsConfig {
    insecure_skip_verify: bool,
}

fn alloy_values(credentials: &WriteCredentials) -> AlloyValues {
    let mut env = BTreeMap::from([
        ("LOGGING_URL", credentials.push_url()),
        ("LOGGING_TENANT_ID", credentials.tenant.clone()),
        ("LOGGING_USERNAME", credentials.username.clone()),
        ("LOGGING_PASSWORD", credentials.password.clone()),
        ("LOKI_RULER_API_URL", credentials.ruler_url()),
    ]);
    if let Some(password) = &credentials.tracing_password {
        env.insert("TRACING_USERNAME", credentials.username.clone());
        env.insert("TRACING_PASSWORD", password.clone());
    }
    AlloyValues {
        alloy: AlloySecretEnv {
            extra_secret_env: env,
        },
    }
}

fn promtail_values(credentials: &WriteCredentials) -> PromtailValues {
    PromtailValues {
        promtail: PromtailSection {
            config: PromtailConfig {
                clients: vec![PromtailClient {
                    url: credentials.push_url(),
                    tenant_id: credentials.tenant.clone(),
                    basic_auth: BasicAuth {
                        username: credentials.username.clone(),
                        password: credentials.password.clone(),
                    },
                    backoff_config: BackoffConfig {
                        max_period: LOKI_MAX_BACKOFF_PERIOD,
                    },
                    external_labels: ExternalLabels {
                        installation: credentials.installation.clone(),
                        cluster_id: credentials.username.clone(),
                    },
                    tls_config: TlsConfig {
                        insecure_skip_verify: credentials.insecure_ca,
                    },
                    timeout: LOKI_REMOTE_TIMEOUT,
                }],
            },
        },
    }
}

/// Render the `values` document for `agent`
pub(crate) fn render_values(
    agent: LoggingAgent,
    credentials: &WriteCredentials,
) -> Result<String, ReconcilerError> {
    let rendered = match agent {
        LoggingAgent::Alloy => serde_yaml::to_string(&alloy_values(credentials)),
        LoggingAgent::Promtail => serde_yaml::to_string(&promtail_values(credentials)),
    };
    rendered.map_err(|e| ReconcilerError::Render {
        resource: "logging-secret",
        reason: e.to_string(),
    })
}

/// Reads the write credentials of a cluster out of the credential store
#[derive(Debug, Clone)]
pub(crate) struct WriteCredentialSource {
    credentials: CredentialStore,
    loki_url: String,
    enable_tracing: bool,
}

impl WriteCredentialSource {
    pub(crate) fn new(credentials: CredentialStore, config: &ControllerConfig) -> Self {
        Self {
            credentials,
            loki_url: config.loki_url.clone(),
            enable_tracing: config.enable_tracing,
        }
    }

    async fn read(&self, cluster: &dyn LoggedCluster) -> Result<WriteCredentials, CredentialError> {
        let username = cluster.cluster_name();
        let password = self
            .credentials
            .get_password(CredentialScope::Logging, &username)
            .await?;
        let tracing_password = if self.enable_tracing {
            Some(
                self.credentials
                    .get_password(CredentialScope::Tracing, &username)
                    .await?,
            )
        } else {
            None
        };
        Ok(WriteCredentials {
            loki_url: self.loki_url.clone(),
            tenant: cluster.tenant(),
            username,
            password,
            installation: cluster.installation_name().to_string(),
            insecure_ca: cluster.insecure_ca(),
            tracing_password,
        })
    }

    /// Write credentials of `cluster`, `None` while they are not readable yet
    pub(crate) async fn load(
        &self,
        cluster: &dyn LoggedCluster,
    ) -> Result<Option<WriteCredentials>, ReconcilerError> {
        match self.read(cluster).await {
            Ok(credentials) => Ok(Some(credentials)),
            Err(e) if e.is_not_found() => {
                info!(
                    cluster = %cluster.identity(),
                    error = %e,
                    "Write credentials not available yet, requeuing"
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Requeue used while write credentials are not readable yet
pub(crate) fn credentials_pending() -> ReconcileOutcome {
    ReconcileOutcome::RequeueAfter(Duration::from_secs(CREDENTIALS_NOT_FOUND_REQUEUE_SECS))
}

/// Secret named by `key` holding a single `values` document
pub(crate) fn values_secret(key: &ObjectKey, values: String) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(key.name.clone()),
            namespace: Some(key.namespace.clone()),
            labels: Some(common_labels()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([(
            "values".to_string(),
            ByteString(values.into_bytes()),
        )])),
        ..Secret::default()
    }
}

/// Owns the agent secret of one cluster
#[derive(Debug)]
pub struct LoggingSecret {
    store: Arc<dyn ObjectStore>,
    source: WriteCredentialSource,
    conflict_attempts: u32,
}

impl LoggingSecret {
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

    fn key(cluster: &dyn LoggedCluster) -> ObjectKey {
        ObjectKey::new(
            ResourceKind::Secret,
            cluster.apps_namespace(),
            cluster.app_config_name(LOGGING_SECRET_COMPONENT),
        )
    }
}

#[async_trait]
impl SubReconciler for LoggingSecret {
    fn name(&self) -> &'static str {
        "logging-secret"
    }

    fn delete_phase(&self) -> DeletePhase {
        DeletePhase::Remove
    }

    async fn reconcile_create(
        &self,
        cluster: &dyn LoggedCluster,
        _prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let Some(credentials) = self.source.load(cluster).await? else {
            return Ok(credentials_pending());
        };

        let agent = cluster.agent_selection().logging_agent;
        let values = render_values(agent, &credentials)?;
        let key = Self::key(cluster);
        let desired = values_secret(&key, values);

        if ensure_object(self.store.as_ref(), &desired, self.conflict_attempts).await? {
            info!(cluster = %cluster.identity(), object = %key, agent = %agent, "Logging secret up to date");
        } else {
            debug!(cluster = %cluster.identity(), object = %key, "Logging secret unchanged");
        }
        Ok(ReconcileOutcome::Done)
    }

    async fn reconcile_delete(
        &self,
        cluster: &dyn LoggedCluster,
        _prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        let key = Self::key(cluster);
        if delete_if_exists(self.store.as_ref(), &key).await? {
            info!(cluster = %cluster.identity(), object = %key, "Logging secret deleted");
        }
        Ok(ReconcileOutcome::Done)
    }
}
