//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Finalizer token placed on every resource whose logging stack is owned by the operator
pub const LOGGING_FINALIZER: &str = "logging-operator.monitoring.giantswarm.io/finalizer";

/// Label holding the per-cluster logging switch (`"true"`/`"false"`)
pub const LOGGING_LABEL: &str = "giantswarm.io/logging";

/// Label carrying the release of a vintage workload cluster
pub const RELEASE_VERSION_LABEL: &str = "release.giantswarm.io/version";

/// Label mapping an App back to the cluster it belongs to
pub const CLUSTER_LABEL: &str = "giantswarm.io/cluster";

/// Label carrying the organization owning a vintage workload cluster
pub const ORGANIZATION_LABEL: &str = "giantswarm.io/organization";

/// Label used to name the app a config map belongs to
pub const APP_NAME_LABEL: &str = "app.kubernetes.io/name";

/// Label marking objects managed by this operator
pub const MANAGED_BY_LABEL: &str = "giantswarm.io/managed-by";

/// Value of [`MANAGED_BY_LABEL`] on objects owned by this operator
pub const MANAGED_BY_VALUE: &str = "logging-operator";

/// Name of the observability bundle app
pub const OBSERVABILITY_BUNDLE_APP: &str = "observability-bundle";

/// Component name of the logging secret
pub const LOGGING_SECRET_COMPONENT: &str = "logging-secret";

/// Component name of the events logger secret when alloy ships kubernetes events
pub const EVENTS_LOGGER_SECRET_COMPONENT: &str = "events-logger-secret";

/// Component name of the events logger secret when grafana-agent ships kubernetes events
pub const GRAFANA_AGENT_SECRET_COMPONENT: &str = "grafana-agent-secret";

/// Component name of the secret the grafana-agent chart creates from its extra secret values
pub const GRAFANA_AGENT_EXTRA_SECRET_COMPONENT: &str = "grafana-agent-extra-secret";

/// Component name of the tracing secret
pub const TRACING_SECRET_COMPONENT: &str = "tracing-secret";

/// First observability bundle version shipping an events logger
pub const EVENTS_LOGGER_MIN_BUNDLE_VERSION: semver::Version = semver::Version::new(0, 9, 0);

/// Basic-auth secret of the Loki ingress write path
pub const LOKI_INGRESS_AUTH_SECRET: &str = "loki-ingress-auth";

/// Namespace of [`LOKI_INGRESS_AUTH_SECRET`]
pub const LOKI_INGRESS_AUTH_NAMESPACE: &str = "loki";

/// Basic-auth secret of the Tempo ingress write path
pub const TEMPO_INGRESS_AUTH_SECRET: &str = "tempo-ingress-auth";

/// Namespace of [`TEMPO_INGRESS_AUTH_SECRET`]
pub const TEMPO_INGRESS_AUTH_NAMESPACE: &str = "tempo";

/// Config map used to plug extra configuration into the bundle (CAPI and vintage workload clusters)
pub const BUNDLE_EXTRA_CONFIG_MAP: &str = "observability-bundle-logging-extraconfig";

/// Config map used as bundle user values on vintage management clusters
pub const BUNDLE_USER_VALUES_CONFIG_MAP: &str = "observability-bundle-user-values";

/// Priority of the extra config entry added to the bundle app
pub const BUNDLE_EXTRA_CONFIG_PRIORITY: i64 = 25;

/// Namespace holding the shared credential secrets
pub const CREDENTIALS_NAMESPACE: &str = "monitoring";

/// Shared secret holding logging write credentials
pub const LOGGING_CREDENTIALS_SECRET: &str = "logging-credentials";

/// Shared secret holding tracing write credentials
pub const TRACING_CREDENTIALS_SECRET: &str = "tracing-credentials";

/// Identity used by readers of the log store (always present in the logging scope)
pub const READ_USER: &str = "read";

/// Length of generated passwords
pub const PASSWORD_LENGTH: usize = 20;

/// Default write tenant for CAPI clusters
pub const DEFAULT_WRITE_TENANT: &str = "giantswarm";

/// Namespace of the Service backing a vintage management cluster
pub const MANAGEMENT_CLUSTER_SERVICE_NAMESPACE: &str = "default";

/// Name of the Service backing a vintage management cluster
pub const MANAGEMENT_CLUSTER_SERVICE_NAME: &str = "kubernetes";

/// Apps namespace on vintage management clusters
pub const VINTAGE_APPS_NAMESPACE: &str = "giantswarm";

/// First vintage release shipping the observability bundle with logging support
pub const MIN_VINTAGE_RELEASE: semver::Version = semver::Version::new(19, 1, 0);

/// First observability bundle version that ships alloy as logging agent
pub const DEFAULT_ALLOY_LOGS_MIN_BUNDLE_VERSION: semver::Version = semver::Version::new(1, 6, 0);

/// First observability bundle version that ships alloy as events logger
pub const DEFAULT_ALLOY_EVENTS_MIN_BUNDLE_VERSION: semver::Version =
    semver::Version::new(1, 9, 0);

/// Default HTTP server port for metrics and health checks
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default requeue interval when the observability bundle app is not found (seconds)
pub const DEFAULT_BUNDLE_NOT_FOUND_REQUEUE_SECS: u64 = 300;

/// Default requeue interval after a failed finalizer removal (seconds)
pub const DEFAULT_FINALIZER_REMOVAL_REQUEUE_SECS: u64 = 10;

/// Default deadline for one reconciliation cycle (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 60;

/// Default deadline for one object store call (seconds)
pub const DEFAULT_STORE_CALL_TIMEOUT_SECS: u64 = 10;

/// Default number of attempts for optimistic-concurrency writes
pub const DEFAULT_CONFLICT_RETRY_ATTEMPTS: u32 = 5;

/// Default error backoff starting value (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Default error backoff maximum value (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Default delay before restarting a watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default Loki base URL used by the agents
pub const DEFAULT_LOKI_URL: &str = "http://loki-gateway.loki.svc";

/// Default Tempo base URL used by the agents when tracing is enabled
pub const DEFAULT_TEMPO_URL: &str = "tempo-gateway.tempo.svc:4317";

/// Requeue interval while the write credentials of a cluster are not yet readable (seconds)
pub const CREDENTIALS_NOT_FOUND_REQUEUE_SECS: u64 = 30;

/// Maximum backoff period of the promtail client
pub const LOKI_MAX_BACKOFF_PERIOD: &str = "10m0s";

/// Remote write timeout of the promtail client
pub const LOKI_REMOTE_TIMEOUT: &str = "1m0s";

/// Default bcrypt cost of the ingress basic-auth hashes
pub const DEFAULT_INGRESS_AUTH_HASH_COST: u32 = 12;

/// Initial delay before restarting a throttled watch (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_START_MS: u64 = 1_000;

/// Maximum delay before restarting a throttled watch (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_MAX_MS: u64 = 30_000;
