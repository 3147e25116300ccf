//! # Configuration
//!
//! Operator configuration, loaded once at startup and threaded explicitly
//! into the reconciler.

pub mod controller;

pub use controller::ControllerConfig;
