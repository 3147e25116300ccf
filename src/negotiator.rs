//! # Capability Negotiation
//!
//! Downgrades a requested agent selection to what the installed observability
//! bundle can actually run.
//!
//! Each selectable feature has its own minimum bundle version. Below it, the
//! "new" kind is replaced by the fallback kind:
//!
//! | Feature        | New kind | Fallback        | Default threshold |
//! |----------------|----------|-----------------|-------------------|
//! | logging agent  | `alloy`  | `promtail`      | 1.6.0             |
//! | events logger  | `alloy`  | `grafana-agent` | 1.9.0             |
//!
//! Thresholds are inclusive: a bundle exactly at the threshold supports the new kind.

use crate::config::ControllerConfig;
use crate::constants::{DEFAULT_ALLOY_EVENTS_MIN_BUNDLE_VERSION, DEFAULT_ALLOY_LOGS_MIN_BUNDLE_VERSION};
use crate::logged_cluster::{AgentSelection, EventsLogger, LoggingAgent};
use semver::Version;

/// Pure, stateless negotiator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityNegotiator {
    logging_agent_threshold: Version,
    events_logger_threshold: Version,
}

impl Default for CapabilityNegotiator {
    fn default() -> Self {
        Self::new(
            DEFAULT_ALLOY_LOGS_MIN_BUNDLE_VERSION,
            DEFAULT_ALLOY_EVENTS_MIN_BUNDLE_VERSION,
        )
    }
}

impl From<&ControllerConfig> for CapabilityNegotiator {
    fn from(config: &ControllerConfig) -> Self {
        Self::new(
            config.alloy_logs_min_bundle_version.clone(),
            config.alloy_events_min_bundle_version.clone(),
        )
    }
}

impl CapabilityNegotiator {
    #[must_use]
    pub fn new(logging_agent_threshold: Version, events_logger_threshold: Version) -> Self {
        Self {
            logging_agent_threshold,
            events_logger_threshold,
        }
    }

    /// Selection supported by a bundle at `bundle_version`
    #[must_use]
    pub fn negotiate(&self, requested: AgentSelection, bundle_version: &Version) -> AgentSelection {
        let logging_agent = match requested.logging_agent {
            LoggingAgent::Alloy if *bundle_version < self.logging_agent_threshold => {
                LoggingAgent::Promtail
            }
            other => other,
        };
        let events_logger = match requested.events_logger {
            EventsLogger::Alloy if *bundle_version < self.events_logger_threshold => {
                EventsLogger::GrafanaAgent
            }
            other => other,
        };
        AgentSelection {
            logging_agent,
            events_logger,
        }
    }
}
