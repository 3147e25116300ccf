//! Logging Operator Library
//!
//! This library provides the core functionality of the logging operator: it
//! enables log shipping on Giant Swarm clusters by generating per-cluster
//! credentials, rendering the agent configuration, and wiring it into each
//! cluster's observability bundle. Tests are included in the module files.
//!
//! ## Quick Start
//!
//! ```rust
//! use logging_operator::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod credentials;
pub mod crd;
pub mod logged_cluster;
pub mod negotiator;
pub mod observability;
pub mod prelude;
pub mod resources;
pub mod runtime;
pub mod store;
