//! # Logging Operator
//!
//! A Kubernetes operator that enables log shipping on Giant Swarm clusters.
//!
//! For every cluster with logging enabled it:
//!
//! 1. **Generates credentials** - per-cluster basic-auth users for the log (and trace) gateway
//! 2. **Renders agent configuration** - Promtail or Alloy values pointing at Loki
//! 3. **Wires the observability bundle** - references the generated config from the agent app
//! 4. **Toggles agents** - enables the selected logging agent and events logger
//!
//! Everything is removed again, and the finalizer released, once logging is
//! disabled or the cluster is deleted.

use anyhow::Result;
use logging_operator::runtime::{initialization, watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialization::initialize().await?;

    watch_loop::run_watch_loop(init.client, init.reconciler, init.server_state).await
}
