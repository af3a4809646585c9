pub mod apis;
pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod metrics;
pub mod namegen;
pub mod synchronizer;

pub use config::Config;
pub use controller::{PostgresReconciler, RECONCILER_NAME};
pub use crd::Postgres;
pub use synchronizer::Synchronizer;

use std::sync::Arc;

use kube::Client;

use crate::metrics::Metrics;
use crate::synchronizer::events::KubeEventSink;

/// Run the operator controller
///
/// Builds the synchronizer around the PostgreSQL strategy and drives it
/// until the watch stream ends. Callable from main.rs or spawned as a
/// background task during integration tests.
pub async fn run_controller(client: Client, config: Config, metrics: Arc<Metrics>) {
    let events = Arc::new(KubeEventSink::new(client.clone(), RECONCILER_NAME));
    let dry_run = config.dry_run;
    let reconciler = PostgresReconciler::new(config);

    let synchronizer = Arc::new(Synchronizer::new(
        client, reconciler, events, metrics, dry_run,
    ));
    synchronizer.run().await;
}
