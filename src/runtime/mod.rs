//! # Runtime
//!
//! Process wiring for the controller: initialization, the watch loop, and the
//! error policy applied to failed reconciliations and watch streams.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
