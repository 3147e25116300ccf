//! # Custom Resource Definitions
//!
//! Typed views of the foreign resources the operator reads and patches.
//!
//! ## Module Structure
//!
//! - `cluster.rs` - Cluster API `Cluster` (also used for vintage workload clusters)
//! - `app.rs` - Giant Swarm `App`, carrier of the observability bundle version and wiring
//!
//! Neither type is owned by this operator, so both keep every field they do
//! not model in a flattened map and survive a read-modify-write untouched.

mod app;
mod cluster;

pub use app::{App, AppConfigRef, AppExtraConfig, AppSpec, AppUserConfig};
pub use cluster::{Cluster, ClusterSpec};
