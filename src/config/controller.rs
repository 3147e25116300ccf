//! # Controller Configuration
//!
//! Operator-level settings loaded from environment variables.

use crate::logged_cluster::{EventsLogger, LoggingAgent};
use std::time::Duration;

/// Operator-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Installation-wide logging switch
    /// When false every cluster is treated as disabled and cleaned up
    pub enable_logging: bool,
    /// Installation-wide tracing switch
    /// Adds the tracing credential scope to the managed resources
    pub enable_tracing: bool,
    /// Logging agent requested for every cluster before capability negotiation
    pub logging_agent: LoggingAgent,
    /// Kubernetes events logger requested for every cluster before capability negotiation
    pub events_logger: EventsLogger,
    /// Name of the installation (management cluster)
    pub installation_name: String,
    /// Skip TLS verification when agents talk to the log store
    pub insecure_ca: bool,
    /// Reconcile vintage (Service backed management cluster and release labelled
    /// workload clusters) instead of CAPI clusters
    pub vintage_mode: bool,
    /// Base URL of the log store write path
    pub loki_url: String,
    /// Endpoint of the trace store write path
    pub tempo_url: String,
    /// HTTP server port for metrics and health checks
    pub metrics_port: u16,
    /// Deadline for one reconciliation cycle (seconds)
    pub reconcile_timeout_secs: u64,
    /// Deadline for one object store call (seconds)
    pub store_call_timeout_secs: u64,
    /// Error backoff starting value (seconds)
    pub backoff_min_secs: u64,
    /// Error backoff maximum value (seconds)
    pub backoff_max_secs: u64,
    /// Requeue interval when the observability bundle app is missing (seconds)
    pub bundle_not_found_requeue_secs: u64,
    /// Requeue interval after a failed finalizer removal (seconds)
    pub finalizer_removal_requeue_secs: u64,
    /// Attempts for optimistic-concurrency read-modify-write loops
    pub conflict_retry_attempts: u32,
    /// Delay before restarting a watch stream after it ends (seconds)
    pub watch_restart_delay_secs: u64,
    /// bcrypt cost of the hashes written to the ingress basic-auth secrets
    pub ingress_auth_hash_cost: u32,
    /// Minimum bundle version shipping alloy as logging agent
    pub alloy_logs_min_bundle_version: semver::Version,
    /// Minimum bundle version shipping alloy as events logger
    pub alloy_events_min_bundle_version: semver::Version,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            enable_logging: true,
            enable_tracing: false,
            logging_agent: LoggingAgent::Alloy,
            events_logger: EventsLogger::Alloy,
            installation_name: "unknown".to_string(),
            insecure_ca: false,
            vintage_mode: false,
            loki_url: DEFAULT_LOKI_URL.to_string(),
            tempo_url: DEFAULT_TEMPO_URL.to_string(),
            metrics_port: DEFAULT_METRICS_PORT,
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            store_call_timeout_secs: DEFAULT_STORE_CALL_TIMEOUT_SECS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            bundle_not_found_requeue_secs: DEFAULT_BUNDLE_NOT_FOUND_REQUEUE_SECS,
            finalizer_removal_requeue_secs: DEFAULT_FINALIZER_REMOVAL_REQUEUE_SECS,
            conflict_retry_attempts: DEFAULT_CONFLICT_RETRY_ATTEMPTS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            ingress_auth_hash_cost: DEFAULT_INGRESS_AUTH_HASH_COST,
            alloy_logs_min_bundle_version: DEFAULT_ALLOY_LOGS_MIN_BUNDLE_VERSION,
            alloy_events_min_bundle_version: DEFAULT_ALLOY_EVENTS_MIN_BUNDLE_VERSION,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        use crate::constants::*;
        let defaults = Self::default();
        Self {
            enable_logging: env_var_or_default_bool("ENABLE_LOGGING", defaults.enable_logging),
            enable_tracing: env_var_or_default_bool("ENABLE_TRACING", defaults.enable_tracing),
            logging_agent: env_var_or_default("LOGGING_AGENT", defaults.logging_agent),
            events_logger: env_var_or_default("EVENTS_LOGGER", defaults.events_logger),
            installation_name: env_var_or_default_str("INSTALLATION_NAME", "unknown"),
            insecure_ca: env_var_or_default_bool("INSECURE_CA", defaults.insecure_ca),
            vintage_mode: env_var_or_default_bool("VINTAGE_MODE", defaults.vintage_mode),
            loki_url: env_var_or_default_str("LOKI_URL", DEFAULT_LOKI_URL),
            tempo_url: env_var_or_default_str("TEMPO_URL", DEFAULT_TEMPO_URL),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            reconcile_timeout_secs: env_var_or_default(
                "RECONCILE_TIMEOUT_SECS",
                DEFAULT_RECONCILE_TIMEOUT_SECS,
            ),
            store_call_timeout_secs: env_var_or_default(
                "STORE_CALL_TIMEOUT_SECS",
                DEFAULT_STORE_CALL_TIMEOUT_SECS,
            ),
            backoff_min_secs: env_var_or_default("BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            bundle_not_found_requeue_secs: env_var_or_default(
                "BUNDLE_NOT_FOUND_REQUEUE_SECS",
                DEFAULT_BUNDLE_NOT_FOUND_REQUEUE_SECS,
            ),
            finalizer_removal_requeue_secs: env_var_or_default(
                "FINALIZER_REMOVAL_REQUEUE_SECS",
                DEFAULT_FINALIZER_REMOVAL_REQUEUE_SECS,
            ),
            conflict_retry_attempts: env_var_or_default(
                "CONFLICT_RETRY_ATTEMPTS",
                DEFAULT_CONFLICT_RETRY_ATTEMPTS,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            ingress_auth_hash_cost: env_var_or_default(
                "INGRESS_AUTH_HASH_COST",
                DEFAULT_INGRESS_AUTH_HASH_COST,
            ),
            alloy_logs_min_bundle_version: env_var_or_default(
                "ALLOY_LOGS_MIN_BUNDLE_VERSION",
                defaults.alloy_logs_min_bundle_version,
            ),
            alloy_events_min_bundle_version: env_var_or_default(
                "ALLOY_EVENTS_MIN_BUNDLE_VERSION",
                defaults.alloy_events_min_bundle_version,
            ),
        }
    }

    /// Get reconciliation cycle deadline
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    /// Get object store call deadline
    pub fn store_call_timeout(&self) -> Duration {
        Duration::from_secs(self.store_call_timeout_secs)
    }

    /// Get requeue delay used while the observability bundle app is missing
    pub fn bundle_not_found_requeue(&self) -> Duration {
        Duration::from_secs(self.bundle_not_found_requeue_secs)
    }

    /// Get requeue delay used after a failed finalizer removal
    pub fn finalizer_removal_requeue(&self) -> Duration {
        Duration::from_secs(self.finalizer_removal_requeue_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map_or(default, |v| parse_bool_flag(&v).unwrap_or(default))
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse a boolean flag spelled `true/false/t/f/1/0`, case-insensitive
///
/// Anything else, including `yes`/`no` and padded values, is unparseable.
pub(crate) fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Some(true),
        "false" | "f" | "0" => Some(false),
        _ => None,
    }
}
