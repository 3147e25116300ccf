//! # Ingress Auth Secrets
//!
//! Installation-wide basic-auth maps guarding the write paths of the log and
//! trace stores. Each map holds one bcrypt hash per write identity of the
//! matching credential scope; the read identity never gets write access.
//!
//! The map is re-derived from the credential secret on both create and
//! delete, so it has to run after the credentials were ensured or released.
//! Passwords are never rotated, so an identity keeps its stored hash and
//! only newcomers are hashed.

use super::{
    common_labels, labels_include, DeletePhase, PreFetched, ReconcileOutcome, SubReconciler,
};
use crate::config::ControllerConfig;
use crate::constants::{
    LOKI_INGRESS_AUTH_NAMESPACE, LOKI_INGRESS_AUTH_SECRET, READ_USER,
    TEMPO_INGRESS_AUTH_NAMESPACE, TEMPO_INGRESS_AUTH_SECRET,
};
use crate::controller::reconciler::ReconcilerError;
use crate::credentials::{CredentialScope, CredentialStore};
use crate::logged_cluster::LoggedCluster;
use crate::store::{
    create_typed, get_typed, optional, retry_on_conflict, update_typed, ObjectKey, ObjectStore,
    ResourceKind,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Keeps one ingress basic-auth map in line with a credential scope
#[derive(Debug)]
pub struct IngressAuthSecret {
    name: &'static str,
    store: Arc<dyn ObjectStore>,
    credentials: CredentialStore,
    scope: CredentialScope,
    key: ObjectKey,
    enabled: bool,
    hash_cost: u32,
    conflict_attempts: u32,
}

impl IngressAuthSecret {
    /// Basic-auth map of the Loki write path
    #[must_use]
    pub fn loki(
        store: Arc<dyn ObjectStore>,
        credentials: CredentialStore,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            name: "loki-ingress-auth-secret",
            store,
            credentials,
            scope: CredentialScope::Logging,
            key: ObjectKey::new(
                ResourceKind::Secret,
                LOKI_INGRESS_AUTH_NAMESPACE,
                LOKI_INGRESS_AUTH_SECRET,
            ),
            enabled: true,
            hash_cost: config.ingress_auth_hash_cost,
            conflict_attempts: config.conflict_retry_attempts,
        }
    }

    /// Basic-auth map of the Tempo write path, only maintained while tracing is enabled
    #[must_use]
    pub fn tempo(
        store: Arc<dyn ObjectStore>,
        credentials: CredentialStore,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            name: "tempo-ingress-auth-secret",
            store,
            credentials,
            scope: CredentialScope::Tracing,
            key: ObjectKey::new(
                ResourceKind::Secret,
                TEMPO_INGRESS_AUTH_NAMESPACE,
                TEMPO_INGRESS_AUTH_SECRET,
            ),
            enabled: config.enable_tracing,
            hash_cost: config.ingress_auth_hash_cost,
            conflict_attempts: config.conflict_retry_attempts,
        }
    }

    fn hash(&self, password: &str) -> Result<ByteString, ReconcilerError> {
        bcrypt::hash(password, self.hash_cost)
            .map(|hash| ByteString(hash.into_bytes()))
            .map_err(|e| ReconcilerError::Render {
                resource: self.name,
                reason: e.to_string(),
            })
    }

    /// Bring the map in line with the credential scope.
    ///
    /// Returns true when the map was written.
    async fn sync(&self) -> Result<bool, ReconcilerError> {
        let (namespace, name) = (&self.key.namespace, &self.key.name);
        retry_on_conflict(self.name, self.conflict_attempts, || async {
            let passwords = self.credentials.list_passwords(self.scope).await?;
            let current =
                optional(get_typed::<Secret>(self.store.as_ref(), namespace, name).await)?;
            let existing = current
                .as_ref()
                .and_then(|secret| secret.data.clone())
                .unwrap_or_default();

            let mut users = BTreeMap::new();
            for (user, password) in passwords.iter().filter(|(user, _)| *user != READ_USER) {
                let hash = match existing.get(user) {
                    Some(hash) => hash.clone(),
                    None => self.hash(password)?,
                };
                users.insert(user.clone(), hash);
            }

            let desired = ObjectMeta {
                labels: Some(common_labels()),
                ..ObjectMeta::default()
            };
            match current {
                None if users.is_empty() => Ok(false),
                None => {
                    let secret = Secret {
                        metadata: ObjectMeta {
                            name: Some(name.clone()),
                            namespace: Some(namespace.clone()),
                            ..desired
                        },
                        data: Some(users),
                        ..Secret::default()
                    };
                    create_typed(self.store.as_ref(), &secret).await?;
                    Ok(true)
                }
                Some(mut secret) => {
                    if existing == users && labels_include(&secret.metadata, &desired) {
                        return Ok(false);
                    }
                    secret.data = Some(users);
                    secret
                        .metadata
                        .labels
                        .get_or_insert_with(BTreeMap::new)
                        .extend(common_labels());
                    update_typed(self.store.as_ref(), &secret).await?;
                    Ok(true)
                }
            }
        })
        .await
    }

    async fn reconcile(
        &self,
        cluster: &dyn LoggedCluster,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        if !self.enabled {
            return Ok(ReconcileOutcome::Done);
        }
        if self.sync().await? {
            info!(cluster = %cluster.identity(), object = %self.key, "Ingress auth map updated");
        } else {
            debug!(cluster = %cluster.identity(), object = %self.key, "Ingress auth map unchanged");
        }
        Ok(ReconcileOutcome::Done)
    }
}

#[async_trait]
impl SubReconciler for IngressAuthSecret {
    fn name(&self) -> &'static str {
        self.name
    }

    fn delete_phase(&self) -> DeletePhase {
        DeletePhase::Release
    }

    async fn reconcile_create(
        &self,
        cluster: &dyn LoggedCluster,
        _prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        self.reconcile(cluster).await
    }

    async fn reconcile_delete(
        &self,
        cluster: &dyn LoggedCluster,
        _prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        self.reconcile(cluster).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::{capi_cluster, prefetched};
    use crate::store::{InMemoryObjectStore, StoreError, StoreOp};

    fn config(enable_tracing: bool) -> ControllerConfig {
        ControllerConfig {
            enable_tracing,
            ingress_auth_hash_cost: 4,
            ..ControllerConfig::default()
        }
    }

    fn setup(
        enable_tracing: bool,
    ) -> (Arc<InMemoryObjectStore>, CredentialStore, ControllerConfig) {
        let store = Arc::new(InMemoryObjectStore::new());
        let credentials = CredentialStore::new(Arc::clone(&store) as Arc<dyn ObjectStore>, 5);
        (store, credentials, config(enable_tracing))
    }

    async fn auth_map(
        store: &InMemoryObjectStore,
        namespace: &str,
        name: &str,
    ) -> BTreeMap<String, ByteString> {
        let secret: Secret = get_typed(store, namespace, name).await.unwrap();
        secret.data.unwrap_or_default()
    }

    fn loki_key() -> ObjectKey {
        ObjectKey::new(ResourceKind::Secret, "loki", "loki-ingress-auth")
    }

    #[tokio::test]
    async fn test_write_users_are_hashed() {
        let (store, credentials, config) = setup(false);
        credentials
            .ensure_credentials_for(CredentialScope::Logging, &[READ_USER, "alpha"])
            .await
            .unwrap();
        let password = credentials
            .get_password(CredentialScope::Logging, "alpha")
            .await
            .unwrap();
        let loki = IngressAuthSecret::loki(
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            credentials,
            &config,
        );

        let outcome = loki
            .reconcile_create(&capi_cluster("alpha"), &prefetched("1.9.0"))
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Done);
        let users = auth_map(&store, "loki", "loki-ingress-auth").await;
        assert_eq!(users.keys().collect::<Vec<_>>(), ["alpha"]);
        let hash = std::str::from_utf8(&users["alpha"].0).unwrap();
        assert!(bcrypt::verify(&password, hash).unwrap());
    }

    #[tokio::test]
    async fn test_existing_hashes_are_kept() {
        let (store, credentials, config) = setup(false);
        credentials
            .ensure_credentials(CredentialScope::Logging, "alpha")
            .await
            .unwrap();
        let loki = IngressAuthSecret::loki(
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            credentials.clone(),
            &config,
        );
        let cluster = capi_cluster("alpha");
        loki.reconcile_create(&cluster, &prefetched("1.9.0")).await.unwrap();
        let before = auth_map(&store, "loki", "loki-ingress-auth").await;

        store.reset_write_count();
        loki.reconcile_create(&cluster, &prefetched("1.9.0")).await.unwrap();
        assert_eq!(store.write_count(), 0);

        credentials
            .ensure_credentials(CredentialScope::Logging, "beta")
            .await
            .unwrap();
        loki.reconcile_create(&capi_cluster("beta"), &prefetched("1.9.0"))
            .await
            .unwrap();
        let after = auth_map(&store, "loki", "loki-ingress-auth").await;
        assert_eq!(after["alpha"], before["alpha"]);
        assert!(after.contains_key("beta"));
    }

    #[tokio::test]
    async fn test_released_users_are_dropped() {
        let (store, credentials, config) = setup(false);
        credentials
            .ensure_credentials_for(CredentialScope::Logging, &["alpha", "beta"])
            .await
            .unwrap();
        let loki = IngressAuthSecret::loki(
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            credentials.clone(),
            &config,
        );
        let cluster = capi_cluster("alpha");
        loki.reconcile_create(&cluster, &prefetched("1.9.0")).await.unwrap();

        credentials
            .remove_credentials(CredentialScope::Logging, "alpha")
            .await
            .unwrap();
        loki.reconcile_delete(&cluster, &PreFetched::default())
            .await
            .unwrap();

        let users = auth_map(&store, "loki", "loki-ingress-auth").await;
        assert_eq!(users.keys().collect::<Vec<_>>(), ["beta"]);
    }

    #[tokio::test]
    async fn test_nothing_to_guard_writes_nothing() {
        let (store, credentials, config) = setup(false);
        let loki = IngressAuthSecret::loki(
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            credentials,
            &config,
        );
        loki.reconcile_delete(&capi_cluster("alpha"), &PreFetched::default())
            .await
            .unwrap();
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_tempo_map_follows_tracing_switch() {
        let (store, credentials, _) = setup(true);
        credentials
            .ensure_credentials(CredentialScope::Tracing, "alpha")
            .await
            .unwrap();
        let cluster = capi_cluster("alpha");

        let disabled = IngressAuthSecret::tempo(
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            credentials.clone(),
            &config(false),
        );
        disabled
            .reconcile_create(&cluster, &prefetched("1.9.0"))
            .await
            .unwrap();
        assert!(!store.contains(&ObjectKey::new(
            ResourceKind::Secret,
            "tempo",
            "tempo-ingress-auth"
        )));

        let enabled = IngressAuthSecret::tempo(
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            credentials,
            &config(true),
        );
        enabled
            .reconcile_create(&cluster, &prefetched("1.9.0"))
            .await
            .unwrap();
        let users = auth_map(&store, "tempo", "tempo-ingress-auth").await;
        assert_eq!(users.keys().collect::<Vec<_>>(), ["alpha"]);
    }

    #[tokio::test]
    async fn test_conflicting_write_is_retried() {
        let (store, credentials, config) = setup(false);
        credentials
            .ensure_credentials(CredentialScope::Logging, "alpha")
            .await
            .unwrap();
        store.inject_failure(
            StoreOp::Create,
            ResourceKind::Secret,
            StoreError::Conflict(loki_key()),
            1,
        );
        let loki = IngressAuthSecret::loki(
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            credentials,
            &config,
        );

        loki.reconcile_create(&capi_cluster("alpha"), &prefetched("1.9.0"))
            .await
            .unwrap();
        assert!(store.contains(&loki_key()));
    }
}
