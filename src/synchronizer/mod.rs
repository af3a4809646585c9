//! Generic reconciliation engine
//!
//! The synchronizer drives the full lifecycle for one owned object per
//! invocation: preparation, update or delete planning, detection of
//! unreferenced dependents, action execution, finalizer management and
//! status reporting. The object-kind specifics live in a [`Reconciler`]
//! strategy; the engine only knows the phases.

pub mod action;
pub mod error;
pub mod events;
pub mod object;
pub mod predicate;
pub mod reconciler;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use kube::api::{ListParams, PostParams};
use kube::core::{ApiResource, DynamicObject};
use kube::runtime::controller::{Action as ReconcileAction, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use crate::crd::{ReconcilePhase, RolloutStatus};
use crate::metrics::Metrics;
use crate::synchronizer::action::Action;
use crate::synchronizer::error::{Error, Result, RetryBackoff};
use crate::synchronizer::events::{EventContext, EventSink};
use crate::synchronizer::object::SyncedObject;
use crate::synchronizer::reconciler::Reconciler;

/// Requeue delay after a status-update conflict
const STATUS_CONFLICT_REQUEUE: Duration = Duration::from_secs(4);

/// Upper bound on one reconciliation pass
///
/// Partial state left behind by an aborted pass is picked up by the next
/// one; every action is idempotent.
const RECONCILE_TIMEOUT: Duration = Duration::from_secs(60);

/// Annotation key identifying the logical owner of a dependent resource
pub fn owner_annotation_key(reconciler_name: &str) -> String {
    format!("{reconciler_name}/owner")
}

/// Annotation value identifying an owner, `<namespace>/<name>`
pub fn owner_annotation_value(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Outcome of a single reconciliation pass
enum Outcome {
    /// The full phase sequence ran to the end
    Completed(ReconcileAction),
    /// The pass ended early without an error (object gone, status
    /// conflict, deletion guard)
    Skipped(ReconcileAction),
}

impl Outcome {
    fn into_action(self) -> ReconcileAction {
        match self {
            Outcome::Completed(action) | Outcome::Skipped(action) => action,
        }
    }
}

pub struct Synchronizer<R: Reconciler> {
    client: Client,
    reconciler: R,
    events: Arc<dyn EventSink>,
    metrics: Arc<Metrics>,
    /// Types listed by the unreferenced sweep, fixed at construction
    relevant_types: Vec<ApiResource>,
    owner_annotation: String,
    dry_run: bool,
}

impl<R: Reconciler> Synchronizer<R> {
    pub fn new(
        client: Client,
        reconciler: R,
        events: Arc<dyn EventSink>,
        metrics: Arc<Metrics>,
        dry_run: bool,
    ) -> Self {
        let mut relevant_types = reconciler.owned_types();
        relevant_types.extend(reconciler.additional_types());
        let owner_annotation = owner_annotation_key(reconciler.name());
        Self {
            client,
            reconciler,
            events,
            metrics,
            relevant_types,
            owner_annotation,
            dry_run,
        }
    }

    /// Run the controller loop until the watch stream ends
    ///
    /// Watches the owned kind filtered down to generation, label and
    /// annotation changes, plus every owned and additional dependent type.
    /// Dependents are mapped back to their owner through the owner
    /// reference or the owner annotation respectively.
    pub async fn run(self: Arc<Self>) {
        info!(
            "Starting controller for {} resources",
            self.reconciler.name()
        );

        let owners: Api<R::Owner> = Api::all(self.client.clone());
        let watcher_config = watcher::Config::default().any_semantic();

        let (reader, writer) = reflector::store();
        let owner_stream = watcher(owners, watcher_config.clone())
            .default_backoff()
            .reflect(writer)
            .applied_objects()
            .predicate_filter(predicate::relevant_changes);

        let mut controller = Controller::for_stream(owner_stream, reader);

        for resource in self.reconciler.owned_types() {
            let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
            controller = controller.owns_with(api, resource, watcher_config.clone());
        }

        for resource in self.reconciler.additional_types() {
            let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &resource);
            let annotation = self.owner_annotation.clone();
            controller = controller.watches_with(
                api,
                resource,
                watcher_config.clone(),
                move |obj: DynamicObject| {
                    let mut owners = Vec::new();
                    if let Some(value) = obj.annotations().get(&annotation) {
                        if let Some((namespace, name)) = value.split_once('/') {
                            owners.push(ObjectRef::<R::Owner>::new(name).within(namespace));
                        }
                    }
                    owners
                },
            );
        }

        controller
            .run(Self::reconcile, Self::error_policy, self.clone())
            .for_each(|result| async move {
                match result {
                    Ok((obj, _action)) => debug!("Reconciled: {}", obj.name),
                    Err(e) => error!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        error!("Controller stream ended unexpectedly");
    }

    /// Reconcile one owner, with metrics around the pass
    pub(crate) async fn reconcile(owner: Arc<R::Owner>, ctx: Arc<Self>) -> Result<ReconcileAction> {
        let resource = ctx.reconciler.name();
        ctx.metrics.inc_reconciliations(resource);
        let start = Instant::now();

        let result = match tokio::time::timeout(RECONCILE_TIMEOUT, ctx.reconcile_owner(&owner)).await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        };

        ctx.metrics
            .observe_reconcile_duration(resource, start.elapsed().as_secs_f64());
        match &result {
            Ok(Outcome::Completed(_)) => ctx.metrics.inc_reconcile_success(resource),
            Ok(Outcome::Skipped(_)) => {}
            Err(_) => ctx.metrics.inc_reconcile_errors(resource),
        }

        result.map(Outcome::into_action)
    }

    /// Decide how long to wait before retrying a failed pass
    ///
    /// The escalation input is the consecutive-failure count the engine
    /// persists on the owner's status, read back from the triggering
    /// object. The triggering object can lag one pass behind the store,
    /// so escalation may start one step late; it never resets early
    /// because a successful pass clears the count.
    pub(crate) fn error_policy(
        owner: Arc<R::Owner>,
        error: &Error,
        _ctx: Arc<Self>,
    ) -> ReconcileAction {
        let consecutive_failures = owner
            .status()
            .and_then(|status| status.retry_count)
            .unwrap_or(0)
            .max(0) as u32;
        let delay = RetryBackoff::default().delay_for(error, consecutive_failures);

        if error.is_retryable() {
            warn!(
                "{} has failed {} consecutive pass(es): {}; next attempt in {:?}",
                owner.name_any(),
                consecutive_failures.saturating_add(1),
                error,
                delay
            );
        } else {
            error!(
                "{} needs a spec or code change to proceed: {}; parked for {:?}",
                owner.name_any(),
                error,
                delay
            );
        }

        ReconcileAction::requeue(delay)
    }

    #[instrument(skip_all, fields(name = %request.name_any(), namespace = request.namespace().unwrap_or_default()))]
    async fn reconcile_owner(&self, request: &R::Owner) -> Result<Outcome> {
        let namespace = request
            .namespace()
            .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
        let name = request.name_any();
        let api: Api<R::Owner> = Api::namespaced(self.client.clone(), &namespace);

        // The triggering object may be stale; reconcile the fresh state.
        // A missing object cannot be fixed by requeuing.
        let Some(mut obj) = api.get_opt(&name).await? else {
            debug!("{}/{} is gone, nothing to do", namespace, name);
            return Ok(Outcome::Skipped(ReconcileAction::await_change()));
        };

        let correlation_id = obj.correlation_id();
        let generation = obj.meta().generation;
        {
            let status = obj.status_mut();
            status.reconcile_time = Some(Utc::now().to_rfc3339());
            status.observed_generation = generation;
            status.correlation_id = Some(correlation_id.clone());
        }

        let events = EventContext::new(self.events.as_ref(), obj.object_ref(&()), correlation_id);
        events
            .normal("Reconciling", format!("Reconciling {namespace}/{name}"))
            .await;

        let result = self.run_phases(&api, &mut obj, &events).await;

        match &result {
            Ok(Outcome::Completed(_)) => {
                let status = obj.status_mut();
                status.reconcile_phase = Some(ReconcilePhase::Completed);
                status.rollout_status = Some(RolloutStatus::Succeeded);
                status.retry_count = None;
            }
            Ok(Outcome::Skipped(_)) => {}
            Err(_) => {
                let status = obj.status_mut();
                status.reconcile_phase = Some(ReconcilePhase::Error);
                status.rollout_status = Some(RolloutStatus::Failed);
                status.retry_count = Some(status.retry_count.unwrap_or(0).saturating_add(1));
            }
        }

        // Final status write runs on every exit path past the initial GET
        if let Err(err) = self.write_status(&api, &mut obj).await {
            warn!("deferred update of status failed: {}", err);
        }

        if matches!(result, Ok(Outcome::Completed(_))) {
            events
                .normal("Synchronized", format!("Synchronized {namespace}/{name}"))
                .await;
        }

        result
    }

    async fn run_phases(
        &self,
        api: &Api<R::Owner>,
        obj: &mut R::Owner,
        events: &EventContext<'_>,
    ) -> Result<Outcome> {
        if let Some(requeue) = self
            .enter_phase(api, obj, ReconcilePhase::Preparing, events)
            .await?
        {
            return Ok(Outcome::Skipped(requeue));
        }
        let prepared = match self.reconciler.prepare(&self.client, obj).await {
            Ok(prepared) => prepared,
            Err(err) => {
                error!("failed preparation stage: {}", err);
                events.phase_failed("Preparing", &err).await;
                return Err(err);
            }
        };
        let mut requeue_after = prepared.requeue_after;

        let finalizer = self.reconciler.name();
        let deleting = obj.meta().deletion_timestamp.is_some();
        let has_finalizer = obj.finalizers().iter().any(|f| f == finalizer);

        let mut actions;
        let remove_finalizer;
        if deleting {
            if !has_finalizer {
                // Never acquired or already released; any mutation now
                // would fight the API server's garbage collection
                return Ok(Outcome::Skipped(ReconcileAction::await_change()));
            }
            if let Some(requeue) = self
                .enter_phase(api, obj, ReconcilePhase::Deleting, events)
                .await?
            {
                return Ok(Outcome::Skipped(requeue));
            }
            let plan = match self.reconciler.plan_delete(obj) {
                Ok(plan) => plan,
                Err(err) => {
                    error!("failed to calculate delete actions: {}", err);
                    events.phase_failed("Deleting", &err).await;
                    return Err(err);
                }
            };
            if plan.is_all_noop() {
                info!("Skipping deletion because guard is off");
                events
                    .normal(
                        "SkippingDelete",
                        "Deletion is not allowed, dependent resources are kept".to_string(),
                    )
                    .await;
                return Ok(Outcome::Skipped(ReconcileAction::await_change()));
            }
            requeue_after = plan.requeue_after.or(requeue_after);
            actions = plan.actions;
            remove_finalizer = true;
        } else {
            if !has_finalizer {
                self.add_finalizer(api, obj).await?;
            }
            if let Some(requeue) = self
                .enter_phase(api, obj, ReconcilePhase::Updating, events)
                .await?
            {
                return Ok(Outcome::Skipped(requeue));
            }
            let plan = match self.reconciler.plan_update(obj, prepared.payload) {
                Ok(plan) => plan,
                Err(err) => {
                    error!("failed to calculate update actions: {}", err);
                    events.phase_failed("Updating", &err).await;
                    return Err(err);
                }
            };
            requeue_after = plan.requeue_after.or(requeue_after);
            actions = plan.actions;

            if let Some(requeue) = self
                .enter_phase(api, obj, ReconcilePhase::DetectingUnreferenced, events)
                .await?
            {
                return Ok(Outcome::Skipped(requeue));
            }
            actions = match self.detect_unreferenced(obj, actions).await {
                Ok(actions) => actions,
                Err(err) => {
                    error!("unable to detect unreferenced resources: {}", err);
                    events.phase_failed("DetectingUnreferenced", &err).await;
                    return Err(err);
                }
            };
            remove_finalizer = false;
        }

        if let Some(requeue) = self
            .enter_phase(api, obj, ReconcilePhase::PerformingActions, events)
            .await?
        {
            return Ok(Outcome::Skipped(requeue));
        }
        if let Err(err) = self.perform_actions(obj, &actions, events).await {
            error!("failed to perform reconciliation: {}", err);
            events.phase_failed("PerformingActions", &err).await;
            return Err(err);
        }

        if remove_finalizer {
            self.remove_finalizer(api, obj).await?;
        }

        Ok(Outcome::Completed(
            requeue_after
                .map(ReconcileAction::requeue)
                .unwrap_or_else(ReconcileAction::await_change),
        ))
    }

    /// Execute actions in planned order, stopping at the first failure
    ///
    /// Conditions emitted by each action are merged into the owner status
    /// with the owner's current generation. Re-running after a partial
    /// failure is safe because every action is idempotent.
    async fn perform_actions(
        &self,
        obj: &mut R::Owner,
        actions: &[Action],
        events: &EventContext<'_>,
    ) -> Result<()> {
        let generation = obj.meta().generation;
        for action in actions {
            if self.dry_run {
                info!("dry run, skipping {:?}", action);
                continue;
            }
            let conditions = action.execute(&self.client, events).await?;
            let status = obj.status_mut();
            for mut condition in conditions {
                condition.observed_generation = generation;
                object::set_status_condition(&mut status.conditions, condition);
            }
        }
        Ok(())
    }

    /// Append deletion actions for dependents no longer referenced
    ///
    /// Lists every relevant type cluster-wide and keeps items whose owner
    /// annotation points at this owner. Items already referenced by the
    /// plan survive; the rest are deleted. Resources without the
    /// annotation were not created by this controller and are never
    /// touched.
    async fn detect_unreferenced(
        &self,
        owner: &R::Owner,
        mut actions: Vec<Action>,
    ) -> Result<Vec<Action>> {
        let value = owner_annotation_value(
            &owner.namespace().unwrap_or_default(),
            &owner.name_any(),
        );

        for resource in &self.relevant_types {
            let api: Api<DynamicObject> = Api::all_with(self.client.clone(), resource);
            let list = api.list(&ListParams::default()).await?;
            let swept =
                select_unreferenced(&actions, resource, list.items, &self.owner_annotation, &value);
            actions.extend(
                swept
                    .into_iter()
                    .map(|item| Action::swept(resource.clone(), item)),
            );
        }

        Ok(actions)
    }

    async fn add_finalizer(&self, api: &Api<R::Owner>, obj: &mut R::Owner) -> Result<()> {
        let name = obj.name_any();
        obj.meta_mut()
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(self.reconciler.name().to_string());
        match api.replace(&name, &PostParams::default(), obj).await {
            Ok(updated) => {
                info!("Added finalizer to {}", name);
                *obj = updated;
                Ok(())
            }
            Err(err) => {
                error!("failed to update finalizer: {}", err);
                Err(err.into())
            }
        }
    }

    async fn remove_finalizer(&self, api: &Api<R::Owner>, obj: &mut R::Owner) -> Result<()> {
        let name = obj.name_any();
        let finalizer = self.reconciler.name();
        if let Some(finalizers) = obj.meta_mut().finalizers.as_mut() {
            finalizers.retain(|f| f != finalizer);
        }
        match api.replace(&name, &PostParams::default(), obj).await {
            Ok(updated) => {
                info!("Removed finalizer from {}", name);
                *obj = updated;
                Ok(())
            }
            Err(err) => {
                error!("failed to update finalizer: {}", err);
                Err(err.into())
            }
        }
    }

    /// Record the phase on the status and persist it
    ///
    /// A conflict means another writer got there first; the pass ends with
    /// a short requeue instead of an error and the next pass reads the
    /// fresh object.
    async fn enter_phase(
        &self,
        api: &Api<R::Owner>,
        obj: &mut R::Owner,
        phase: ReconcilePhase,
        events: &EventContext<'_>,
    ) -> Result<Option<ReconcileAction>> {
        obj.status_mut().reconcile_phase = Some(phase);
        events
            .normal(&phase.to_string(), format!("Entered phase {phase}"))
            .await;
        match self.write_status(api, obj).await {
            Ok(()) => Ok(None),
            Err(err) if err.is_conflict() => {
                debug!("status update conflict entering {}, requeuing", phase);
                Ok(Some(ReconcileAction::requeue(STATUS_CONFLICT_REQUEUE)))
            }
            Err(err) => {
                error!("failed to update status: {}", err);
                Err(err)
            }
        }
    }

    async fn write_status(&self, api: &Api<R::Owner>, obj: &mut R::Owner) -> Result<()> {
        let name = obj.name_any();
        let data = serde_json::to_vec(&*obj)?;
        *obj = api
            .replace_status(&name, &PostParams::default(), data)
            .await?;
        Ok(())
    }
}

/// The sweep's selection rule, separated from the listing
///
/// Keeps items carrying this owner's annotation that no planned action
/// references. Reference identity is type plus name; namespaces are not
/// compared because additional types may live in a fixed shared namespace.
pub fn select_unreferenced(
    actions: &[Action],
    resource: &ApiResource,
    items: Vec<DynamicObject>,
    annotation_key: &str,
    owner_value: &str,
) -> Vec<DynamicObject> {
    items
        .into_iter()
        .filter(|item| {
            item.annotations()
                .get(annotation_key)
                .is_some_and(|v| v == owner_value)
        })
        .filter(|item| {
            !actions.iter().any(|action| {
                action.references(&resource.api_version, &resource.kind, &item.name_any())
            })
        })
        .collect()
}
