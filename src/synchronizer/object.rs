//! The contract an owned custom resource must satisfy for the synchronizer

use std::fmt::Debug;

use kube::core::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crd::{Condition, Postgres, PostgresStatus};

/// An object the synchronizer can reconcile
///
/// The synchronizer reads identity from the kube `Resource` implementation
/// and owns the status subresource described by [`PostgresStatus`].
pub trait SyncedObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + Serialize
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
    /// Status as last written, if any
    fn status(&self) -> Option<&PostgresStatus>;

    /// Status, created empty on first access
    fn status_mut(&mut self) -> &mut PostgresStatus;

    /// Correlation id threaded through events and status
    fn correlation_id(&self) -> String;
}

impl SyncedObject for Postgres {
    fn status(&self) -> Option<&PostgresStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut PostgresStatus {
        self.status.get_or_insert_with(PostgresStatus::default)
    }

    fn correlation_id(&self) -> String {
        Postgres::correlation_id(self)
    }
}

/// Merge a condition into a condition list, last write wins per type
///
/// The transition timestamp is preserved when the status value is unchanged,
/// so flapping reasons do not look like transitions.
pub fn set_status_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status != condition.status {
                existing.status = condition.status;
                existing.last_transition_time = condition.last_transition_time;
            }
            existing.reason = condition.reason;
            existing.message = condition.message;
            existing.observed_generation = condition.observed_generation;
        }
        None => conditions.push(condition),
    }
}
