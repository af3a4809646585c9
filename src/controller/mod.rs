//! The PostgreSQL reconciliation strategy
//!
//! Maps a Postgres resource onto a zalando postgresql cluster, a network
//! isolation policy, a workload-identity IAM binding and a set of alert
//! rules. The synchronizer engine drives this strategy.

pub mod resourcecreator;

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::core::{ApiResource, DynamicObject};
use kube::{Client, ResourceExt};

use crate::apis::iam::IamPolicyMemberStatus;
use crate::apis::postgresql::PostgresqlStatus;
use crate::apis::{iam, monitoring, postgresql};
use crate::config::Config;
use crate::crd::{Condition, Postgres};
use crate::namegen;
use crate::synchronizer::action::Action;
use crate::synchronizer::error::{Error, Result};
use crate::synchronizer::reconciler::{Plan, Prepared, Reconciler};
use crate::synchronizer::{owner_annotation_key, owner_annotation_value};

/// Identifier of this reconciler, used as finalizer and annotation prefix
pub const RECONCILER_NAME: &str = "postgres.data.nais.io";

/// Max length is 63, but we need to save space for suffixes added by the
/// zalando operator and StatefulSets
const MAX_CLUSTER_NAME_LENGTH: usize = 50;

pub struct PostgresReconciler {
    config: Config,
}

impl PostgresReconciler {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn owner_annotation(&self, obj: &Postgres) -> Result<(String, String)> {
        let namespace = obj
            .namespace()
            .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
        Ok((
            owner_annotation_key(RECONCILER_NAME),
            owner_annotation_value(&namespace, &obj.name_any()),
        ))
    }
}

#[async_trait]
impl Reconciler for PostgresReconciler {
    type Owner = Postgres;
    type Prepared = ();

    fn name(&self) -> &str {
        RECONCILER_NAME
    }

    fn owned_types(&self) -> Vec<ApiResource> {
        Vec::new()
    }

    fn additional_types(&self) -> Vec<ApiResource> {
        vec![
            postgresql::api_resource(),
            ApiResource::erase::<NetworkPolicy>(&()),
            iam::api_resource(),
            monitoring::api_resource(),
        ]
    }

    async fn prepare(&self, _client: &Client, _obj: &Postgres) -> Result<Prepared<()>> {
        Ok(Prepared::new(()))
    }

    fn plan_update(&self, obj: &Postgres, _prepared: ()) -> Result<Plan> {
        let (cluster_name, pg_namespace) = cluster_name_and_namespace(obj)?;
        let (annotation_key, annotation_value) = self.owner_annotation(obj)?;

        let mut actions = Vec::new();

        let mut cluster =
            resourcecreator::create_cluster(obj, &self.config, &cluster_name, &pg_namespace)?;
        resourcecreator::set_annotation(&mut cluster.metadata, &annotation_key, &annotation_value);
        actions.push(Action::create_or_update(
            postgresql::api_resource(),
            &cluster,
            Box::new(postgresql_conditions),
        )?);

        let mut netpol = resourcecreator::create_network_policy(obj, &cluster_name, &pg_namespace);
        resourcecreator::set_annotation(&mut netpol.metadata, &annotation_key, &annotation_value);
        actions.push(Action::create_or_update(
            ApiResource::erase::<NetworkPolicy>(&()),
            &netpol,
            Box::new(exists_conditions),
        )?);

        if !self.config.prometheus_rules_disabled {
            let mut rule =
                resourcecreator::create_prometheus_rule(obj, &cluster_name, &pg_namespace);
            resourcecreator::set_annotation(&mut rule.metadata, &annotation_key, &annotation_value);
            actions.push(Action::create_or_update(
                monitoring::api_resource(),
                &rule,
                Box::new(exists_conditions),
            )?);
        }

        let mut member = resourcecreator::create_iam_policy_member(obj, &self.config, &pg_namespace);
        resourcecreator::set_annotation(&mut member.metadata, &annotation_key, &annotation_value);
        actions.push(Action::create_if_not_exists(
            iam::api_resource(),
            &member,
            Box::new(iam_conditions),
        )?);

        Ok(Plan::new(actions))
    }

    fn plan_delete(&self, obj: &Postgres) -> Result<Plan> {
        let (cluster_name, pg_namespace) = cluster_name_and_namespace(obj)?;

        if !obj.spec.cluster.allow_deletion {
            let cluster = resourcecreator::minimal_cluster(obj, &cluster_name, &pg_namespace);
            return Ok(Plan::new(vec![Action::no_op(
                postgresql::api_resource(),
                &cluster,
            )?]));
        }

        let mut actions = Vec::new();

        let cluster = resourcecreator::minimal_cluster(obj, &cluster_name, &pg_namespace);
        actions.push(Action::delete_if_exists(
            postgresql::api_resource(),
            &cluster,
            Box::new(postgresql_conditions),
        )?);

        let netpol = resourcecreator::minimal_netpol(obj, &cluster_name, &pg_namespace);
        actions.push(Action::delete_if_exists(
            ApiResource::erase::<NetworkPolicy>(&()),
            &netpol,
            Box::new(exists_conditions),
        )?);

        if !self.config.prometheus_rules_disabled {
            let rule = resourcecreator::minimal_prometheus_rule(obj, &cluster_name);
            actions.push(Action::delete_if_exists(
                monitoring::api_resource(),
                &rule,
                Box::new(exists_conditions),
            )?);
        }

        Ok(Plan::new(actions))
    }
}

/// Name and namespace of the backing cluster
///
/// Overlong owner names are shortened deterministically so repeated
/// reconciles keep targeting the same cluster.
pub fn cluster_name_and_namespace(obj: &Postgres) -> Result<(String, String)> {
    let namespace = obj
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
    let cluster_name = namegen::short_name(&obj.name_any(), MAX_CLUSTER_NAME_LENGTH);
    Ok((cluster_name, format!("pg-{namespace}")))
}

fn type_prefix(obj: &DynamicObject) -> String {
    match &obj.types {
        Some(types) => {
            let group = types.api_version.split('/').next().unwrap_or_default();
            format!("{}.{}", types.kind.to_lowercase(), group)
        }
        None => String::new(),
    }
}

fn condition_status(value: bool) -> String {
    if value { "True" } else { "False" }.to_string()
}

fn condition(type_: String, status: bool, reason: &str, message: &str) -> Condition {
    Condition {
        type_,
        status: condition_status(status),
        reason: if reason.is_empty() {
            "Unknown".to_string()
        } else {
            reason.to_string()
        },
        message: message.to_string(),
        last_transition_time: Utc::now().to_rfc3339(),
        observed_generation: None,
    }
}

/// Conditions derived from the zalando cluster status
fn postgresql_conditions(obj: &DynamicObject) -> Vec<Condition> {
    let prefix = type_prefix(obj);
    let status: PostgresqlStatus = obj
        .data
        .get("status")
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default();
    let state = status.postgres_cluster_status.as_str();

    vec![
        condition(
            format!("{prefix}/Available"),
            state == "Running" || state == "Updating",
            state,
            "",
        ),
        condition(
            format!("{prefix}/Progressing"),
            state == "Creating" || state == "Updating",
            state,
            "",
        ),
        condition(format!("{prefix}/Degraded"), !status.success(), state, ""),
    ]
}

/// Conditions derived from the Config Connector status
fn iam_conditions(obj: &DynamicObject) -> Vec<Condition> {
    let prefix = type_prefix(obj);
    let status: IamPolicyMemberStatus = obj
        .data
        .get("status")
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default();
    let reported = status.conditions.first().cloned().unwrap_or_default();

    vec![
        condition(
            format!("{prefix}/Available"),
            reported.status == "True" && ["UpToDate", "Updating"].contains(&reported.reason.as_str()),
            &reported.reason,
            &reported.message,
        ),
        condition(
            format!("{prefix}/Progressing"),
            ["Creating", "Updating", "Deleting"].contains(&reported.reason.as_str()),
            &reported.reason,
            &reported.message,
        ),
        condition(
            format!("{prefix}/Degraded"),
            reported.reason.contains("Failed"),
            &reported.reason,
            &reported.message,
        ),
    ]
}

/// Single availability condition for kinds without a useful status
fn exists_conditions(obj: &DynamicObject) -> Vec<Condition> {
    let prefix = type_prefix(obj);
    vec![condition(format!("{prefix}/Available"), true, "Exists", "")]
}
