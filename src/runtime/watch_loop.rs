//! # Watch Loop
//!
//! Controller watch loop that monitors clusters and triggers reconciliation
//! when they change.
//!
//! `Cluster` resources are watched together with the observability bundle
//! `App` of every cluster, so a bundle upgrade re-runs agent negotiation.
//! CAPI bundles live next to their cluster; vintage bundles are mapped back
//! through their organization label. In vintage mode the `default/kubernetes`
//! Service stands in for the management cluster and runs next to the workload
//! cluster watch.

use crate::config::ControllerConfig;
use crate::constants::{
    CLUSTER_LABEL, DEFAULT_WATCH_BACKOFF_MAX_MS, DEFAULT_WATCH_BACKOFF_START_MS,
    MANAGEMENT_CLUSTER_SERVICE_NAME, MANAGEMENT_CLUSTER_SERVICE_NAMESPACE,
    OBSERVABILITY_BUNDLE_APP, ORGANIZATION_LABEL,
};
use crate::controller::reconciler::{
    reconcile_cluster, reconcile_management_cluster, LoggingReconciler, ReconcilerError,
};
use crate::controller::server::ServerState;
use crate::crd::{App, Cluster};
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Service;
use kube::api::Api;
use kube::{Client, ResourceExt};
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::fmt::Debug;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

type ControllerEvent<K> =
    Result<(ObjectRef<K>, Action), controller::Error<ReconcilerError, watcher::Error>>;

/// Cluster owning an observability bundle app, if `app` is one
#[must_use]
pub fn bundle_app_owner(app: &App) -> Option<ObjectRef<Cluster>> {
    if app.spec.name != OBSERVABILITY_BUNDLE_APP {
        return None;
    }
    let cluster = app.labels().get(CLUSTER_LABEL)?;
    let namespace = app.namespace()?;
    Some(ObjectRef::new(cluster).within(&namespace))
}

/// Vintage workload cluster owning an observability bundle app, if `app` is one
///
/// Vintage bundles are not installed next to their cluster, the cluster lives
/// in the `org-<organization>` namespace.
#[must_use]
pub fn vintage_bundle_app_owner(app: &App) -> Option<ObjectRef<Cluster>> {
    if app.spec.name != OBSERVABILITY_BUNDLE_APP {
        return None;
    }
    let labels = app.labels();
    let cluster = labels.get(CLUSTER_LABEL)?;
    let organization = labels.get(ORGANIZATION_LABEL)?;
    Some(ObjectRef::new(cluster).within(&format!("org-{organization}")))
}

/// Run the controller watch loop
///
/// Handles graceful shutdown and restarts the controllers whenever their
/// streams end while the server is still ready.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<LoggingReconciler>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let config = reconciler.config().clone();
    let backoff_duration_ms = Arc::new(AtomicU64::new(DEFAULT_WATCH_BACKOFF_START_MS));

    // Mark the server as not ready on SIGTERM/SIGINT so readiness checks fail while in-flight work drains
    tokio::spawn(mark_not_ready_on_signal(
        tokio::signal::ctrl_c(),
        Arc::clone(&server_state),
    ));

    loop {
        if !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop",
            vintage_mode = config.vintage_mode
        );

        info!("Starting controller watch loop...");
        let clusters = drain(
            cluster_controller(client.clone(), Arc::clone(&reconciler), config.vintage_mode),
            Arc::clone(&backoff_duration_ms),
            &config,
        );
        if config.vintage_mode {
            let management = drain(
                management_cluster_controller(client.clone(), Arc::clone(&reconciler)),
                Arc::clone(&backoff_duration_ms),
                &config,
            );
            tracing::Instrument::instrument(
                async {
                    futures::join!(clusters, management);
                },
                watch_span,
            )
            .await;
        } else {
            tracing::Instrument::instrument(clusters, watch_span).await;
        }

        if !server_state.is_ready() {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = config.watch_restart_delay();
        warn!("Controller watch stream ended, restarting in {:?}...", delay);
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Mark the server not ready once `signal` fires
///
/// A signal handler that cannot be installed leaves readiness untouched.
async fn mark_not_ready_on_signal<F>(signal: F, server_state: Arc<ServerState>)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
    server_state.set_ready(false);
    info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
}

/// Controller over `Cluster` resources and their bundle apps
fn cluster_controller(
    client: Client,
    reconciler: Arc<LoggingReconciler>,
    vintage_mode: bool,
) -> impl Stream<Item = ControllerEvent<Cluster>> {
    let clusters: Api<Cluster> = Api::all(client.clone());
    let apps: Api<App> = Api::all(client);
    let owner: fn(&App) -> Option<ObjectRef<Cluster>> = if vintage_mode {
        vintage_bundle_app_owner
    } else {
        bundle_app_owner
    };
    Controller::new(clusters, watcher::Config::default().any_semantic())
        .watches(apps, watcher::Config::default(), move |app| owner(&app))
        .shutdown_on_signal()
        .run(
            reconcile_cluster,
            |obj, error, ctx| handle_reconciliation_error(obj, error, ctx),
            reconciler,
        )
}

/// Controller over the Service standing in for a vintage management cluster
fn management_cluster_controller(
    client: Client,
    reconciler: Arc<LoggingReconciler>,
) -> impl Stream<Item = ControllerEvent<Service>> {
    let services: Api<Service> = Api::namespaced(client, MANAGEMENT_CLUSTER_SERVICE_NAMESPACE);
    let selector = format!("metadata.name={MANAGEMENT_CLUSTER_SERVICE_NAME}");
    Controller::new(services, watcher::Config::default().fields(&selector))
        .shutdown_on_signal()
        .run(
            reconcile_management_cluster,
            |obj, error, ctx| handle_reconciliation_error(obj, error, ctx),
            reconciler,
        )
}

/// Consume a controller stream, classifying and backing off on watch errors
async fn drain<S, T, E>(stream: S, backoff: Arc<AtomicU64>, config: &ControllerConfig)
where
    S: Stream<Item = Result<T, E>>,
    E: Debug,
{
    let restart_delay = config.watch_restart_delay();
    stream
        .for_each(|event| {
            let backoff = Arc::clone(&backoff);
            async move {
                match event {
                    Ok(_) => {
                        backoff.store(DEFAULT_WATCH_BACKOFF_START_MS, Ordering::Relaxed);
                        debug!("watch.event.success");
                    }
                    Err(e) => {
                        let error_string = format!("{e:?}");
                        handle_watch_stream_error(
                            &error_string,
                            &backoff,
                            DEFAULT_WATCH_BACKOFF_MAX_MS,
                            restart_delay,
                        )
                        .await;
                    }
                }
            }
        })
        .await;
}
