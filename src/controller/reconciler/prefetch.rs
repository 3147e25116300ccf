//! # Pre-fetch
//!
//! Reads the observability bundle version once per cycle, before fan-out.

use super::ReconcilerError;
use crate::logged_cluster::{fetch_observability_bundle, LoggedCluster};
use crate::resources::PreFetched;
use crate::store::ObjectStore;
use semver::Version;
use tracing::warn;

/// Parse an app version, tolerating a leading `v`
pub(crate) fn parse_bundle_version(raw: &str) -> Result<Version, semver::Error> {
    let raw = raw.trim();
    Version::parse(raw.strip_prefix('v').unwrap_or(raw))
}

/// Dependencies of create-side work.
///
/// Returns `None` while the bundle app does not exist.
pub(crate) async fn for_create(
    store: &dyn ObjectStore,
    cluster: &dyn LoggedCluster,
) -> Result<Option<PreFetched>, ReconcilerError> {
    let Some(app) = fetch_observability_bundle(store, cluster).await? else {
        return Ok(None);
    };
    let version = parse_bundle_version(&app.spec.version).map_err(|e| {
        ReconcilerError::MalformedData(format!(
            "observability bundle {} has version {:?}: {e}",
            cluster.observability_bundle_app(),
            app.spec.version
        ))
    })?;
    Ok(Some(PreFetched {
        bundle_version: Some(version),
    }))
}

/// Dependencies of delete-side work; nothing here blocks cleanup
pub(crate) async fn for_delete(
    store: &dyn ObjectStore,
    cluster: &dyn LoggedCluster,
) -> Result<PreFetched, ReconcilerError> {
    let bundle_version = match fetch_observability_bundle(store, cluster).await? {
        Some(app) => match parse_bundle_version(&app.spec.version) {
            Ok(version) => Some(version),
            Err(e) => {
                warn!(
                    cluster = %cluster.identity(),
                    version = %app.spec.version,
                    error = %e,
                    "Ignoring unparseable bundle version during cleanup"
                );
                None
            }
        },
        None => None,
    };
    Ok(PreFetched { bundle_version })
}
