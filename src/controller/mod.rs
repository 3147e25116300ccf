//! # Controller
//!
//! Core controller modules for the logging operator.
//!
//! - `backoff`: exponential backoff for failed reconciliations
//! - `reconciler`: finalizer state machine and sub-reconciler fan-out
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod reconciler;
pub mod server;
