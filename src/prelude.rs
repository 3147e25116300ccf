//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use logging_operator::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Cluster facade
pub use crate::logged_cluster::{
    AgentSelection, ClusterFlavor, ClusterIdentity, EventsLogger, LoggedCluster, LoggingAgent,
};

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{
    reconcile_cluster, reconcile_management_cluster, LifecycleState, LoggingReconciler,
    ReconcilerError,
};

// Sub-reconciler contract
pub use crate::resources::{PreFetched, ReconcileOutcome, SubReconciler, SubReconcilerSet};

// Storage and credentials
pub use crate::credentials::{CredentialError, CredentialScope, CredentialStore};
pub use crate::store::{ObjectKey, ObjectStore, ResourceKind, StoreError};

// Config types
pub use crate::config::ControllerConfig;
