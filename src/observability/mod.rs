//! # Observability
//!
//! Prometheus metrics for the reconciliation engine.
//!
//! Structured logging goes through `tracing` directly; the subscriber is set up in
//! [`crate::runtime::initialization`].

pub mod metrics;

pub use metrics::*;
