//! The strategy contract driven by the synchronizer

use std::time::Duration;

use async_trait::async_trait;
use kube::core::ApiResource;
use kube::Client;

use crate::synchronizer::action::Action;
use crate::synchronizer::error::Result;
use crate::synchronizer::object::SyncedObject;

/// Result of the preparation stage
pub struct Prepared<P> {
    pub payload: P,
    pub requeue_after: Option<Duration>,
}

impl<P> Prepared<P> {
    pub fn new(payload: P) -> Self {
        Self {
            payload,
            requeue_after: None,
        }
    }
}

/// Planned actions for one reconciliation path
pub struct Plan {
    pub actions: Vec<Action>,
    pub requeue_after: Option<Duration>,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            actions,
            requeue_after: None,
        }
    }

    /// Whether the plan performs no mutation at all
    pub fn is_all_noop(&self) -> bool {
        self.actions.iter().all(Action::is_noop)
    }
}

/// A reconciliation strategy for one owned resource kind
///
/// The synchronizer consumes this contract; it never implements it. The
/// strategy decides what the cluster should look like, the synchronizer
/// decides when and how to get there.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// The owned custom resource kind
    type Owner: SyncedObject;

    /// Payload produced by [`Reconciler::prepare`] and consumed by
    /// [`Reconciler::plan_update`]
    type Prepared: Send;

    /// Stable identifier for this reconciler
    ///
    /// Used verbatim as the finalizer and as the prefix of the owner
    /// annotation key. Must be DNS-subdomain compatible.
    fn name(&self) -> &str;

    /// Dependent types living in the owner's namespace, cleaned up through
    /// Kubernetes owner references
    fn owned_types(&self) -> Vec<ApiResource>;

    /// Dependent types that may live in any namespace, linked to the owner
    /// only through the `<name>/owner` annotation
    fn additional_types(&self) -> Vec<ApiResource>;

    /// Read-only enrichment from the cluster before planning
    async fn prepare(&self, client: &Client, obj: &Self::Owner) -> Result<Prepared<Self::Prepared>>;

    /// Actions converging the cluster towards the owner's desired state
    ///
    /// Also covers the first time the object is seen.
    fn plan_update(&self, obj: &Self::Owner, prepared: Self::Prepared) -> Result<Plan>;

    /// Actions tearing down the owner's dependents
    ///
    /// Returning only no-op actions orphans the dependents: the
    /// synchronizer keeps the finalizer in place and the owner stays in
    /// Terminating until the plan changes.
    fn plan_delete(&self, obj: &Self::Owner) -> Result<Plan>;
}
