//! Common test utilities for the reconciliation integration tests
//!
//! Provides fixtures seeding an in-memory object store with clusters and
//! observability bundle apps, plus a scripted sub-reconciler that records
//! how the orchestrator drives it.

#![allow(dead_code, reason = "each test binary uses a different subset of the fixtures")]

use async_trait::async_trait;
use logging_operator::constants::{LOGGING_FINALIZER, LOGGING_LABEL};
use logging_operator::prelude::*;
use logging_operator::resources::DeletePhase;
use logging_operator::store::InMemoryObjectStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "org-acme";

pub fn identity(name: &str) -> ClusterIdentity {
    ClusterIdentity::new(NAMESPACE, name)
}

/// Seed a CAPI cluster carrying `labels` and `finalizers`
pub fn seed_cluster(
    store: &InMemoryObjectStore,
    name: &str,
    labels: &[(&str, &str)],
    finalizers: &[&str],
) {
    let mut cluster = Cluster::new(name, ClusterSpec::default());
    cluster.metadata.namespace = Some(NAMESPACE.to_string());
    if !labels.is_empty() {
        cluster.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
    }
    if !finalizers.is_empty() {
        cluster.metadata.finalizers = Some(finalizers.iter().map(ToString::to_string).collect());
    }
    store.insert_typed(&cluster).unwrap();
}

/// Seed a cluster with logging switched off through its label
pub fn seed_disabled_cluster(store: &InMemoryObjectStore, name: &str, finalizers: &[&str]) {
    seed_cluster(store, name, &[(LOGGING_LABEL, "false")], finalizers);
}

/// Seed the observability bundle app of cluster `name`
pub fn seed_bundle(store: &InMemoryObjectStore, name: &str, version: &str) {
    let mut app = App::new(
        &format!("{name}-observability-bundle"),
        AppSpec {
            name: "observability-bundle".to_string(),
            namespace: "kube-system".to_string(),
            version: version.to_string(),
            catalog: "default".to_string(),
            ..AppSpec::default()
        },
    );
    app.metadata.namespace = Some(NAMESPACE.to_string());
    store.insert_typed(&app).unwrap();
}

pub fn cluster_key(name: &str) -> ObjectKey {
    ObjectKey::new(ResourceKind::Cluster, NAMESPACE, name)
}

pub async fn finalizers(store: &InMemoryObjectStore, name: &str) -> Vec<String> {
    store
        .get(&cluster_key(name))
        .await
        .unwrap()
        .metadata
        .finalizers
        .unwrap_or_default()
}

pub async fn has_logging_finalizer(store: &InMemoryObjectStore, name: &str) -> bool {
    finalizers(store, name)
        .await
        .iter()
        .any(|f| f == LOGGING_FINALIZER)
}

/// Reconciler over `store` running the standard sub-reconcilers
pub fn standard_reconciler(
    store: &Arc<InMemoryObjectStore>,
    config: ControllerConfig,
) -> LoggingReconciler {
    LoggingReconciler::new(Arc::clone(store) as Arc<dyn ObjectStore>, config)
}

/// Reconciler over `store` running scripted sub-reconcilers
pub fn scripted_reconciler(
    store: &Arc<InMemoryObjectStore>,
    config: ControllerConfig,
    steps: &[Arc<ScriptedStep>],
) -> LoggingReconciler {
    let set = SubReconcilerSet::new(
        steps
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn SubReconciler>)
            .collect(),
    );
    LoggingReconciler::with_sub_reconcilers(Arc::clone(store) as Arc<dyn ObjectStore>, config, set)
}

pub async fn reconcile_capi(
    reconciler: &LoggingReconciler,
    name: &str,
) -> Result<ReconcileOutcome, ReconcilerError> {
    reconciler.reconcile(ClusterFlavor::Capi, &identity(name)).await
}

/// Scripted result of one sub-reconciler call
#[derive(Debug, Clone)]
pub enum Step {
    Done,
    Requeue(Duration),
    Fail,
    Sleep(Duration),
}

/// Sub-reconciler replaying scripted results and recording every call
#[derive(Debug)]
pub struct ScriptedStep {
    name: &'static str,
    phase: DeletePhase,
    create: Mutex<VecDeque<Step>>,
    delete: Mutex<VecDeque<Step>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedStep {
    pub fn new(name: &'static str, phase: DeletePhase, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            phase,
            create: Mutex::new(VecDeque::new()),
            delete: Mutex::new(VecDeque::new()),
            log: Arc::clone(log),
        })
    }

    /// Queue results of the next create calls; an empty queue means `Done`
    pub fn on_create(&self, steps: impl IntoIterator<Item = Step>) {
        self.create.lock().unwrap().extend(steps);
    }

    /// Queue results of the next delete calls; an empty queue means `Done`
    pub fn on_delete(&self, steps: impl IntoIterator<Item = Step>) {
        self.delete.lock().unwrap().extend(steps);
    }

    async fn run(
        &self,
        direction: &str,
        queue: &Mutex<VecDeque<Step>>,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{direction}", self.name));
        let step = queue.lock().unwrap().pop_front().unwrap_or(Step::Done);
        match step {
            Step::Done => Ok(ReconcileOutcome::Done),
            Step::Requeue(delay) => Ok(ReconcileOutcome::RequeueAfter(delay)),
            Step::Fail => Err(ReconcilerError::Store(StoreError::Transport(format!(
                "{} unavailable",
                self.name
            )))),
            Step::Sleep(delay) => {
                tokio::time::sleep(delay).await;
                Ok(ReconcileOutcome::Done)
            }
        }
    }
}

#[async_trait]
impl SubReconciler for ScriptedStep {
    fn name(&self) -> &'static str {
        self.name
    }

    fn delete_phase(&self) -> DeletePhase {
        self.phase
    }

    async fn reconcile_create(
        &self,
        _cluster: &dyn LoggedCluster,
        _prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        self.run("create", &self.create).await
    }

    async fn reconcile_delete(
        &self,
        _cluster: &dyn LoggedCluster,
        _prefetched: &PreFetched,
    ) -> Result<ReconcileOutcome, ReconcilerError> {
        self.run("delete", &self.delete).await
    }
}

/// Drain the call log
pub fn take_log(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}
