//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `logging_operator_reconciliations_total` - Total number of reconciliations
//! - `logging_operator_reconciliation_errors_total` - Total number of reconciliation errors
//! - `logging_operator_reconciliation_duration_seconds` - Duration of reconciliation cycles
//! - `logging_operator_subreconciler_outcomes_total` - Sub-reconciler results by name, phase and outcome
//! - `logging_operator_finalizer_operations_total` - Finalizer additions and removals
//! - `logging_operator_credentials_generated_total` - Passwords generated per credential scope
//! - `logging_operator_agent_downgrades_total` - Agent selections downgraded by bundle version
//! - `logging_operator_requeues_total` - Requeues by reason
//! - `logging_operator_conflict_retries_total` - Optimistic-concurrency retries by operation

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "logging_operator_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "logging_operator_reconciliation_errors_total",
        "Total number of reconciliation errors",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "logging_operator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static SUBRECONCILER_OUTCOMES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "logging_operator_subreconciler_outcomes_total",
            "Sub-reconciler results by reconciler, phase (create/delete) and outcome",
        ),
        &["reconciler", "phase", "outcome"],
    )
    .expect("Failed to create SUBRECONCILER_OUTCOMES_TOTAL metric - this should never happen")
});

static FINALIZER_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "logging_operator_finalizer_operations_total",
            "Finalizer patches by operation (add/remove)",
        ),
        &["operation"],
    )
    .expect("Failed to create FINALIZER_OPERATIONS_TOTAL metric - this should never happen")
});

static CREDENTIALS_GENERATED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "logging_operator_credentials_generated_total",
            "Passwords generated by credential scope",
        ),
        &["scope"],
    )
    .expect("Failed to create CREDENTIALS_GENERATED_TOTAL metric - this should never happen")
});

static AGENT_DOWNGRADES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "logging_operator_agent_downgrades_total",
            "Agent selections downgraded because the observability bundle is too old",
        ),
        &["feature"],
    )
    .expect("Failed to create AGENT_DOWNGRADES_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "logging_operator_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static CONFLICT_RETRIES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "logging_operator_conflict_retries_total",
            "Optimistic-concurrency retries by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create CONFLICT_RETRIES_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(SUBRECONCILER_OUTCOMES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FINALIZER_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CREDENTIALS_GENERATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(AGENT_DOWNGRADES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONFLICT_RETRIES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn record_subreconciler_outcome(reconciler: &str, phase: &str, outcome: &str) {
    SUBRECONCILER_OUTCOMES_TOTAL
        .with_label_values(&[reconciler, phase, outcome])
        .inc();
}

pub fn increment_finalizer_operations(operation: &str) {
    FINALIZER_OPERATIONS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn increment_credentials_generated(scope: &str) {
    CREDENTIALS_GENERATED_TOTAL.with_label_values(&[scope]).inc();
}

pub fn increment_agent_downgrades(feature: &str) {
    AGENT_DOWNGRADES_TOTAL.with_label_values(&[feature]).inc();
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_conflict_retries(operation: &str) {
    CONFLICT_RETRIES_TOTAL.with_label_values(&[operation]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Encoder;

    #[test]
    fn test_labelled_counters_increment() {
        let before = REQUEUES_TOTAL.with_label_values(&["unit-test"]).get();
        increment_requeues_total("unit-test");
        increment_requeues_total("unit-test");
        assert_eq!(REQUEUES_TOTAL.with_label_values(&["unit-test"]).get(), before + 2);
    }

    #[test]
    fn test_registered_metrics_are_gathered() {
        let registry = Registry::new();
        registry
            .register(Box::new(SUBRECONCILER_OUTCOMES_TOTAL.clone()))
            .unwrap();
        record_subreconciler_outcome("agents-toggle", "create", "done");
        let mut buffer = Vec::new();
        prometheus::TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.lines().any(|line| {
            line.starts_with("logging_operator_subreconciler_outcomes_total{")
                && line.contains("reconciler=\"agents-toggle\"")
                && line.contains("phase=\"create\"")
                && line.contains("outcome=\"done\"")
        }));
    }
}
