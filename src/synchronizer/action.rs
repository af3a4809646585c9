//! Planned, idempotent mutations of cluster state
//!
//! Reconciler strategies express their desired state as a list of actions.
//! Each action targets one dependent object and knows how to converge the
//! cluster towards it, tolerating the object already being in the desired
//! state. Actions are executed sequentially and may safely be re-run.

use kube::api::{DeleteParams, PostParams};
use kube::core::{ApiResource, DynamicObject};
use kube::{Api, Client, ResourceExt};
use serde::Serialize;
use tracing::debug;

use crate::crd::Condition;
use crate::synchronizer::error::{Error, Result};
use crate::synchronizer::events::EventContext;

/// Maps a dependent object's native status into owner conditions
pub type ConditionGetter = Box<dyn Fn(&DynamicObject) -> Vec<Condition> + Send + Sync>;

/// Condition getter yielding no conditions
pub fn no_conditions() -> ConditionGetter {
    Box::new(|_| Vec::new())
}

/// The mutation an [`Action`] performs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    CreateOrUpdate,
    CreateIfNotExists,
    DeleteIfExists,
    NoOp,
}

pub struct Action {
    kind: ActionKind,
    resource: ApiResource,
    object: DynamicObject,
    condition_getter: ConditionGetter,
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("kind", &self.kind)
            .field("kind_target", &self.resource.kind)
            .field("name", &self.object.name_any())
            .finish()
    }
}

impl Action {
    fn new(
        kind: ActionKind,
        resource: ApiResource,
        obj: &impl Serialize,
        condition_getter: ConditionGetter,
    ) -> Result<Self> {
        let object = to_dynamic(obj, &resource)?;
        Ok(Self {
            kind,
            resource,
            object,
            condition_getter,
        })
    }

    pub fn create_or_update(
        resource: ApiResource,
        obj: &impl Serialize,
        condition_getter: ConditionGetter,
    ) -> Result<Self> {
        Self::new(ActionKind::CreateOrUpdate, resource, obj, condition_getter)
    }

    pub fn create_if_not_exists(
        resource: ApiResource,
        obj: &impl Serialize,
        condition_getter: ConditionGetter,
    ) -> Result<Self> {
        Self::new(ActionKind::CreateIfNotExists, resource, obj, condition_getter)
    }

    pub fn delete_if_exists(
        resource: ApiResource,
        obj: &impl Serialize,
        condition_getter: ConditionGetter,
    ) -> Result<Self> {
        Self::new(ActionKind::DeleteIfExists, resource, obj, condition_getter)
    }

    pub fn no_op(resource: ApiResource, obj: &impl Serialize) -> Result<Self> {
        Self::new(ActionKind::NoOp, resource, obj, no_conditions())
    }

    /// Deletion action for an object discovered by the unreferenced sweep
    pub fn swept(resource: ApiResource, object: DynamicObject) -> Self {
        Self {
            kind: ActionKind::DeleteIfExists,
            resource,
            object,
            condition_getter: no_conditions(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn is_noop(&self) -> bool {
        self.kind == ActionKind::NoOp
    }

    pub fn object(&self) -> &DynamicObject {
        &self.object
    }

    pub fn target_kind(&self) -> &str {
        &self.resource.kind
    }

    /// Whether this action targets the given object
    ///
    /// Identity is type plus name; the namespace is not compared because
    /// additional types may live in a fixed shared namespace.
    pub fn references(&self, api_version: &str, kind: &str, name: &str) -> bool {
        self.resource.api_version == api_version
            && self.resource.kind == kind
            && self.object.name_any() == name
    }

    /// Perform the mutation and return the conditions it produced
    ///
    /// Idempotent outcomes (already exists, already gone) are successes.
    pub async fn execute(
        &self,
        client: &Client,
        events: &EventContext<'_>,
    ) -> Result<Vec<Condition>> {
        let name = self.object.name_any();
        let namespace = self
            .object
            .namespace()
            .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
        let target = format!("{} {}/{}", self.resource.kind, namespace, name);
        let api: Api<DynamicObject> =
            Api::namespaced_with(client.clone(), &namespace, &self.resource);

        match self.kind {
            ActionKind::NoOp => Ok(Vec::new()),
            ActionKind::CreateOrUpdate => {
                debug!("CreateOrUpdate {}", target);
                match api.get(&name).await {
                    Ok(existing) => {
                        let mut desired = self.object.clone();
                        // Must always be present when updating a resource
                        desired.metadata.resource_version = existing.resource_version();
                        desired.metadata.uid = existing.uid();
                        let updated = api.replace(&name, &PostParams::default(), &desired).await?;
                        events.normal("Updated", target).await;
                        Ok((self.condition_getter)(&updated))
                    }
                    Err(err) if is_not_found(&err) => {
                        let created = api.create(&PostParams::default(), &self.object).await?;
                        events.normal("Created", target).await;
                        Ok((self.condition_getter)(&created))
                    }
                    Err(err) => Err(err.into()),
                }
            }
            ActionKind::CreateIfNotExists => {
                debug!("CreateIfNotExists {}", target);
                match api.get(&name).await {
                    Ok(existing) => {
                        events.normal("Exists", target).await;
                        Ok((self.condition_getter)(&existing))
                    }
                    Err(err) if is_not_found(&err) => {
                        let created = api.create(&PostParams::default(), &self.object).await?;
                        events.normal("Created", target).await;
                        Ok((self.condition_getter)(&created))
                    }
                    Err(err) => Err(err.into()),
                }
            }
            ActionKind::DeleteIfExists => {
                debug!("DeleteIfExists {}", target);
                match api.delete(&name, &DeleteParams::default()).await {
                    Ok(_) => {}
                    Err(err) if is_not_found(&err) => {}
                    Err(err) => return Err(err.into()),
                }
                events.normal("Deleted", target).await;
                // The target may be stale here; getters must tolerate that
                Ok((self.condition_getter)(&self.object))
            }
        }
    }
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}

/// Convert a typed object into its dynamic form, stamping type metadata
pub fn to_dynamic(obj: &impl Serialize, resource: &ApiResource) -> Result<DynamicObject> {
    let mut value = serde_json::to_value(obj)?;
    if let serde_json::Value::Object(map) = &mut value {
        map.insert(
            "apiVersion".to_string(),
            serde_json::Value::String(resource.api_version.clone()),
        );
        map.insert(
            "kind".to_string(),
            serde_json::Value::String(resource.kind.clone()),
        );
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::networking::v1::NetworkPolicy;
    use kube::core::ObjectMeta;

    fn netpol(name: &str, namespace: &str) -> NetworkPolicy {
        NetworkPolicy {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn netpol_resource() -> ApiResource {
        ApiResource::erase::<NetworkPolicy>(&())
    }

    #[test]
    fn to_dynamic_stamps_type_meta() {
        let dynamic = to_dynamic(&netpol("db", "pg-default"), &netpol_resource()).unwrap();
        let types = dynamic.types.clone().expect("type meta");
        assert_eq!(types.api_version, "networking.k8s.io/v1");
        assert_eq!(types.kind, "NetworkPolicy");
        assert_eq!(dynamic.name_any(), "db");
        assert_eq!(dynamic.namespace().as_deref(), Some("pg-default"));
    }

    #[test]
    fn references_compares_type_and_name_only() {
        let action =
            Action::create_or_update(netpol_resource(), &netpol("db", "pg-default"), no_conditions())
                .unwrap();

        assert!(action.references("networking.k8s.io/v1", "NetworkPolicy", "db"));
        // Different namespace is still a reference
        let other_ns =
            Action::create_or_update(netpol_resource(), &netpol("db", "elsewhere"), no_conditions())
                .unwrap();
        assert!(other_ns.references("networking.k8s.io/v1", "NetworkPolicy", "db"));

        assert!(!action.references("networking.k8s.io/v1", "NetworkPolicy", "other"));
        assert!(!action.references("acid.zalan.do/v1", "postgresql", "db"));
    }

    #[test]
    fn noop_detection() {
        let noop = Action::no_op(netpol_resource(), &netpol("db", "pg-default")).unwrap();
        let delete =
            Action::delete_if_exists(netpol_resource(), &netpol("db", "pg-default"), no_conditions())
                .unwrap();
        assert!(noop.is_noop());
        assert!(!delete.is_noop());

        let actions = vec![noop];
        assert!(actions.iter().all(Action::is_noop));
        let actions: Vec<Action> = vec![];
        assert!(actions.iter().all(Action::is_noop));
    }
}
