//! # Types
//!
//! Core types for the reconciler.

use crate::config::ControllerConfig;
use crate::controller::backoff::ExponentialBackoff;
use crate::credentials::{CredentialError, CredentialStore};
use crate::negotiator::CapabilityNegotiator;
use crate::resources::SubReconcilerSet;
use crate::store::{ConflictAware, ObjectStore, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error("malformed data: {0}")]
    MalformedData(String),
    #[error("reconciliation did not finish within {0:?}")]
    Timeout(Duration),
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    #[error("failed to render {resource}: {reason}")]
    Render {
        resource: &'static str,
        reason: String,
    },
}

impl ReconcilerError {
    /// Whether a plain retry may succeed without anything else changing
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) | Self::Credentials(CredentialError::Store(e)) => e.is_transient(),
            Self::Timeout(_) => true,
            _ => false,
        }
    }
}

impl ConflictAware for ReconcilerError {
    fn is_conflict(&self) -> bool {
        match self {
            Self::Store(e) => e.is_conflict(),
            Self::Credentials(e) => e.is_conflict(),
            _ => false,
        }
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: ExponentialBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            backoff: ExponentialBackoff::new(min_secs, max_secs),
            error_count: 0,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared context of every reconciliation
#[derive(Clone)]
pub struct LoggingReconciler {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) config: Arc<ControllerConfig>,
    pub(crate) negotiator: CapabilityNegotiator,
    pub(crate) sub_reconcilers: SubReconcilerSet,
    // Backoff state per resource (identified by namespace/name), owned by the error policy
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for LoggingReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingReconciler")
            .field("store", &self.store)
            .field("negotiator", &self.negotiator)
            .field("sub_reconcilers", &self.sub_reconcilers.len())
            .finish_non_exhaustive()
    }
}

impl LoggingReconciler {
    /// Reconciler managing the standard set of logging resources
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, config: ControllerConfig) -> Self {
        let credentials =
            CredentialStore::new(Arc::clone(&store), config.conflict_retry_attempts);
        let sub_reconcilers = SubReconcilerSet::standard(&store, &credentials, &config);
        Self::with_sub_reconcilers(store, config, sub_reconcilers)
    }

    /// Reconciler driving a custom set of sub-reconcilers
    #[must_use]
    pub fn with_sub_reconcilers(
        store: Arc<dyn ObjectStore>,
        config: ControllerConfig,
        sub_reconcilers: SubReconcilerSet,
    ) -> Self {
        Self {
            store,
            negotiator: CapabilityNegotiator::from(&config),
            config: Arc::new(config),
            sub_reconcilers,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Key of the backoff state of a resource
    #[must_use]
    pub fn backoff_key(namespace: &str, name: &str) -> String {
        format!("{namespace}/{name}")
    }

    /// Forget the error streak of a resource after a successful cycle
    pub(crate) fn reset_backoff(&self, namespace: &str, name: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(&Self::backoff_key(namespace, name)) {
                state.reset();
            }
        }
    }
}
