//! # Credential Store
//!
//! Per-identity passwords kept in one shared Secret per purpose:
//!
//! - `logging` scope: `monitoring/logging-credentials`
//! - `tracing` scope: `monitoring/tracing-credentials`
//!
//! Each data key is an identity (usually a cluster name) and each value a
//! YAML document `password: <value>`. Entries are created lazily, never
//! rotated, and removed with their cluster.
//!
//! Clusters reconciled concurrently write distinct keys of the same Secret,
//! so every mutation is a read-modify-write guarded by the resource version
//! and retried on conflict.

use crate::constants::{
    CREDENTIALS_NAMESPACE, LOGGING_CREDENTIALS_SECRET, PASSWORD_LENGTH, TRACING_CREDENTIALS_SECRET,
};
use crate::observability;
use crate::store::{
    create_typed, get_typed, optional, retry_on_conflict, update_typed, ConflictAware, ObjectKey,
    ObjectStore, ResourceKind, StoreError,
};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

const PASSWORD_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Purpose a credential is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialScope {
    Logging,
    Tracing,
}

impl CredentialScope {
    #[must_use]
    pub fn secret_key(self) -> ObjectKey {
        let name = match self {
            Self::Logging => LOGGING_CREDENTIALS_SECRET,
            Self::Tracing => TRACING_CREDENTIALS_SECRET,
        };
        ObjectKey::new(ResourceKind::Secret, CREDENTIALS_NAMESPACE, name)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Logging => "logging",
            Self::Tracing => "tracing",
        }
    }
}

impl fmt::Display for CredentialScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("no {scope} credentials for {identity}")]
    NotFound {
        scope: CredentialScope,
        identity: String,
    },
    #[error("{scope} credentials for {identity} cannot be decoded: {reason}")]
    Decode {
        scope: CredentialScope,
        identity: String,
        reason: String,
    },
    #[error("{scope} credentials for {identity} cannot be encoded: {reason}")]
    Encode {
        scope: CredentialScope,
        identity: String,
        reason: String,
    },
    #[error("failed to generate password: {0}")]
    Generation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CredentialError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl ConflictAware for CredentialError {
    fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct UserCredentials {
    password: String,
}

/// Generate a random alphanumeric password from the OS CSPRNG.
///
/// Bytes are rejection-sampled so every character of the alphabet is equally likely.
pub fn generate_password() -> Result<String, CredentialError> {
    // Largest multiple of the alphabet size that fits in a byte
    let limit = 256 - (256 % PASSWORD_ALPHABET.len());
    let mut password = String::with_capacity(PASSWORD_LENGTH);
    let mut buf = [0u8; 64];
    while password.len() < PASSWORD_LENGTH {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| CredentialError::Generation(e.to_string()))?;
        for byte in buf {
            if password.len() == PASSWORD_LENGTH {
                break;
            }
            let byte = usize::from(byte);
            if byte < limit {
                password.push(char::from(PASSWORD_ALPHABET[byte % PASSWORD_ALPHABET.len()]));
            }
        }
    }
    Ok(password)
}

fn encode_entry(
    scope: CredentialScope,
    identity: &str,
    password: String,
) -> Result<ByteString, CredentialError> {
    serde_yaml::to_string(&UserCredentials { password })
        .map(|yaml| ByteString(yaml.into_bytes()))
        .map_err(|e| CredentialError::Encode {
            scope,
            identity: identity.to_string(),
            reason: e.to_string(),
        })
}

fn decode_entry(
    scope: CredentialScope,
    identity: &str,
    raw: &ByteString,
) -> Result<String, CredentialError> {
    let decode_error = |reason: String| CredentialError::Decode {
        scope,
        identity: identity.to_string(),
        reason,
    };
    let text = std::str::from_utf8(&raw.0).map_err(|e| decode_error(e.to_string()))?;
    let user: UserCredentials =
        serde_yaml::from_str(text).map_err(|e| decode_error(e.to_string()))?;
    if user.password.is_empty() {
        return Err(decode_error("empty password".to_string()));
    }
    Ok(user.password)
}

fn missing_labels(secret: &Secret) -> bool {
    let labels = secret.metadata.labels.clone().unwrap_or_default();
    crate::resources::common_labels()
        .iter()
        .any(|(k, v)| labels.get(k) != Some(v))
}

/// Shared-secret credential store
#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn ObjectStore>,
    conflict_attempts: u32,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("conflict_attempts", &self.conflict_attempts)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, conflict_attempts: u32) -> Self {
        Self {
            store,
            conflict_attempts,
        }
    }

    /// Make sure `identity` has a password in `scope`.
    ///
    /// Returns true when the shared secret was written.
    pub async fn ensure_credentials(
        &self,
        scope: CredentialScope,
        identity: &str,
    ) -> Result<bool, CredentialError> {
        self.ensure_credentials_for(scope, &[identity]).await
    }

    /// Make sure every identity has a password in `scope`, with at most one write.
    pub async fn ensure_credentials_for(
        &self,
        scope: CredentialScope,
        identities: &[&str],
    ) -> Result<bool, CredentialError> {
        let key = scope.secret_key();
        retry_on_conflict("ensure_credentials", self.conflict_attempts, || async {
            let current =
                optional(get_typed::<Secret>(self.store.as_ref(), &key.namespace, &key.name).await)?;
            let exists = current.is_some();
            let mut secret = current.unwrap_or_else(|| Secret {
                metadata: ObjectMeta {
                    name: Some(key.name.clone()),
                    namespace: Some(key.namespace.clone()),
                    ..ObjectMeta::default()
                },
                type_: Some("Opaque".to_string()),
                ..Secret::default()
            });

            let mut updated = !exists || missing_labels(&secret);
            let data = secret.data.get_or_insert_with(BTreeMap::new);
            let mut generated = Vec::new();
            for identity in identities {
                if data.contains_key(*identity) {
                    continue;
                }
                let entry = encode_entry(scope, identity, generate_password()?)?;
                data.insert((*identity).to_string(), entry);
                generated.push(*identity);
                updated = true;
            }
            if !updated {
                debug!(scope = %scope, "Credentials already present");
                return Ok(false);
            }

            secret
                .metadata
                .labels
                .get_or_insert_with(BTreeMap::new)
                .extend(crate::resources::common_labels());
            if exists {
                update_typed(self.store.as_ref(), &secret).await?;
            } else {
                create_typed(self.store.as_ref(), &secret).await?;
            }
            for identity in &generated {
                info!(scope = %scope, identity = identity, "🔑 Generated credentials");
                observability::metrics::increment_credentials_generated(scope.as_str());
            }
            Ok(true)
        })
        .await
    }

    /// Drop the entry of `identity` from `scope`.
    ///
    /// Returns true when the shared secret was written.
    pub async fn remove_credentials(
        &self,
        scope: CredentialScope,
        identity: &str,
    ) -> Result<bool, CredentialError> {
        let key = scope.secret_key();
        retry_on_conflict("remove_credentials", self.conflict_attempts, || async {
            let Some(mut secret) =
                optional(get_typed::<Secret>(self.store.as_ref(), &key.namespace, &key.name).await)?
            else {
                return Ok(false);
            };
            let removed = secret
                .data
                .as_mut()
                .is_some_and(|data| data.remove(identity).is_some());
            if !removed {
                return Ok(false);
            }
            update_typed(self.store.as_ref(), &secret).await?;
            info!(scope = %scope, identity = identity, "🗑️ Removed credentials");
            Ok(true)
        })
        .await
    }

    /// Every identity of `scope` with its password; an absent secret is empty
    pub async fn list_passwords(
        &self,
        scope: CredentialScope,
    ) -> Result<BTreeMap<String, String>, CredentialError> {
        let key = scope.secret_key();
        let secret =
            optional(get_typed::<Secret>(self.store.as_ref(), &key.namespace, &key.name).await)?;
        secret
            .and_then(|secret| secret.data)
            .unwrap_or_default()
            .iter()
            .map(|(identity, raw)| {
                decode_entry(scope, identity, raw).map(|password| (identity.clone(), password))
            })
            .collect()
    }

    /// Password of `identity` in `scope`
    pub async fn get_password(
        &self,
        scope: CredentialScope,
        identity: &str,
    ) -> Result<String, CredentialError> {
        let key = scope.secret_key();
        let not_found = || CredentialError::NotFound {
            scope,
            identity: identity.to_string(),
        };
        let Some(secret) =
            optional(get_typed::<Secret>(self.store.as_ref(), &key.namespace, &key.name).await)?
        else {
            return Err(not_found());
        };
        let raw = secret
            .data
            .as_ref()
            .and_then(|data| data.get(identity))
            .ok_or_else(not_found)?;
        decode_entry(scope, identity, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryObjectStore, StoreOp};
    use proptest::prelude::*;

    fn credential_store() -> (Arc<InMemoryObjectStore>, CredentialStore) {
        let memory = Arc::new(InMemoryObjectStore::new());
        let store = CredentialStore::new(Arc::clone(&memory), 5);
        (memory, store)
    }

    mod password_tests {
        use super::*;

        #[test]
        fn test_password_shape() {
            let password = generate_password().unwrap();
            assert_eq!(password.len(), 20);
            assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
        }

        #[test]
        fn test_passwords_differ() {
            assert_ne!(generate_password().unwrap(), generate_password().unwrap());
        }
    }

    mod store_tests {
        use super::*;

        #[tokio::test]
        async fn test_ensure_then_get_password() {
            let (_, store) = credential_store();
            assert!(store
                .ensure_credentials(CredentialScope::Logging, "cluster-a")
                .await
                .unwrap());
            let password = store
                .get_password(CredentialScope::Logging, "cluster-a")
                .await
                .unwrap();
            assert_eq!(password.len(), 20);
            assert!(password.bytes().all(|b| PASSWORD_ALPHABET.contains(&b)));
        }

        #[tokio::test]
        async fn test_ensure_twice_writes_once() {
            let (memory, store) = credential_store();
            store
                .ensure_credentials(CredentialScope::Logging, "cluster-a")
                .await
                .unwrap();
            let first = store
                .get_password(CredentialScope::Logging, "cluster-a")
                .await
                .unwrap();
            assert!(!store
                .ensure_credentials(CredentialScope::Logging, "cluster-a")
                .await
                .unwrap());
            let second = store
                .get_password(CredentialScope::Logging, "cluster-a")
                .await
                .unwrap();
            assert_eq!(first, second);
            assert_eq!(memory.write_count(), 1);
        }

        #[tokio::test]
        async fn test_scopes_are_separate_secrets() {
            let (_, store) = credential_store();
            store
                .ensure_credentials(CredentialScope::Tracing, "cluster-a")
                .await
                .unwrap();
            let err = store
                .get_password(CredentialScope::Logging, "cluster-a")
                .await
                .unwrap_err();
            assert!(err.is_not_found());
        }

        #[tokio::test]
        async fn test_remove_only_touches_identity() {
            let (memory, store) = credential_store();
            store
                .ensure_credentials_for(CredentialScope::Logging, &["read", "cluster-a"])
                .await
                .unwrap();
            assert_eq!(memory.write_count(), 1);

            assert!(store
                .remove_credentials(CredentialScope::Logging, "cluster-a")
                .await
                .unwrap());
            assert!(!store
                .remove_credentials(CredentialScope::Logging, "cluster-a")
                .await
                .unwrap());
            assert!(store
                .get_password(CredentialScope::Logging, "read")
                .await
                .is_ok());
            assert!(store
                .get_password(CredentialScope::Logging, "cluster-a")
                .await
                .unwrap_err()
                .is_not_found());
        }

        #[tokio::test]
        async fn test_list_passwords() {
            let (_, store) = credential_store();
            assert!(store
                .list_passwords(CredentialScope::Logging)
                .await
                .unwrap()
                .is_empty());

            store
                .ensure_credentials_for(CredentialScope::Logging, &["read", "cluster-a"])
                .await
                .unwrap();
            let passwords = store.list_passwords(CredentialScope::Logging).await.unwrap();
            assert_eq!(passwords.keys().collect::<Vec<_>>(), ["cluster-a", "read"]);
            assert_eq!(
                passwords["cluster-a"],
                store
                    .get_password(CredentialScope::Logging, "cluster-a")
                    .await
                    .unwrap()
            );
        }

        #[tokio::test]
        async fn test_remove_without_secret_is_noop() {
            let (memory, store) = credential_store();
            assert!(!store
                .remove_credentials(CredentialScope::Tracing, "cluster-a")
                .await
                .unwrap());
            assert_eq!(memory.write_count(), 0);
        }

        #[tokio::test]
        async fn test_undecodable_entry() {
            let (memory, store) = credential_store();
            let key = CredentialScope::Logging.secret_key();
            memory
                .insert_typed(&Secret {
                    metadata: ObjectMeta {
                        name: Some(key.name.clone()),
                        namespace: Some(key.namespace.clone()),
                        ..ObjectMeta::default()
                    },
                    data: Some(BTreeMap::from([(
                        "cluster-a".to_string(),
                        ByteString(b"- just\n- a list\n".to_vec()),
                    )])),
                    ..Secret::default()
                })
                .unwrap();
            let err = store
                .get_password(CredentialScope::Logging, "cluster-a")
                .await
                .unwrap_err();
            assert!(matches!(err, CredentialError::Decode { .. }));
        }

        #[tokio::test]
        async fn test_conflict_is_retried() {
            let (memory, store) = credential_store();
            store
                .ensure_credentials(CredentialScope::Logging, "cluster-a")
                .await
                .unwrap();
            memory.inject_failure(
                StoreOp::Update,
                ResourceKind::Secret,
                StoreError::Conflict(CredentialScope::Logging.secret_key()),
                2,
            );
            assert!(store
                .ensure_credentials(CredentialScope::Logging, "cluster-b")
                .await
                .unwrap());
            assert!(store
                .get_password(CredentialScope::Logging, "cluster-b")
                .await
                .is_ok());
        }

        #[tokio::test]
        async fn test_concurrent_identities_do_not_lose_entries() {
            let (_, store) = credential_store();
            store
                .ensure_credentials(CredentialScope::Logging, "seed")
                .await
                .unwrap();
            let names: Vec<String> = (0..8).map(|i| format!("cluster-{i}")).collect();
            let tasks = names.iter().map(|name| {
                let store = store.clone();
                let name = name.clone();
                async move { store.ensure_credentials(CredentialScope::Logging, &name).await }
            });
            for result in futures::future::join_all(tasks).await {
                result.unwrap();
            }
            for name in &names {
                assert!(store
                    .get_password(CredentialScope::Logging, name)
                    .await
                    .is_ok());
            }
        }
    }

    proptest! {
        #[test]
        fn encoded_entries_decode_to_the_same_password(password in "[A-Za-z0-9]{1,40}") {
            let raw = encode_entry(CredentialScope::Logging, "x", password.clone()).unwrap();
            prop_assert_eq!(decode_entry(CredentialScope::Logging, "x", &raw).unwrap(), password);
        }
    }
}
