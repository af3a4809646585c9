//! Planned actions for the create/update and delete paths

use kube::ResourceExt;
use pgrator::synchronizer::action::ActionKind;
use pgrator::synchronizer::reconciler::Reconciler;
use pgrator::{Config, PostgresReconciler};

use crate::common::make_postgres;

fn reconciler() -> PostgresReconciler {
    PostgresReconciler::new(Config {
        google_project_id: "example-project".to_string(),
        postgres_image: "ghcr.io/zalando/spilo-17:4.0-p2".to_string(),
        ..Default::default()
    })
}

#[test]
fn create_plan_produces_cluster_netpol_rule_and_iam() {
    let postgres = make_postgres("test-resource", "default", true);
    let plan = reconciler().plan_update(&postgres, ()).unwrap();

    assert_eq!(plan.actions.len(), 4);

    let cluster = &plan.actions[0];
    assert_eq!(cluster.kind(), ActionKind::CreateOrUpdate);
    assert_eq!(cluster.target_kind(), "postgresql");
    assert_eq!(cluster.object().name_any(), "test-resource");
    assert_eq!(cluster.object().namespace().as_deref(), Some("pg-default"));

    let netpol = &plan.actions[1];
    assert_eq!(netpol.kind(), ActionKind::CreateOrUpdate);
    assert_eq!(netpol.target_kind(), "NetworkPolicy");
    assert_eq!(netpol.object().name_any(), "test-resource");
    assert_eq!(netpol.object().namespace().as_deref(), Some("pg-default"));

    let rule = &plan.actions[2];
    assert_eq!(rule.target_kind(), "PrometheusRule");
    assert_eq!(rule.object().name_any(), "pg-test-resource");

    let iam = &plan.actions[3];
    assert_eq!(iam.kind(), ActionKind::CreateIfNotExists);
    assert_eq!(iam.target_kind(), "IAMPolicyMember");
    assert_eq!(iam.object().namespace().as_deref(), Some("serviceaccounts"));
}

#[test]
fn every_planned_dependent_carries_the_owner_annotation() {
    let postgres = make_postgres("test-resource", "default", true);
    let plan = reconciler().plan_update(&postgres, ()).unwrap();

    for action in &plan.actions {
        assert_eq!(
            action
                .object()
                .annotations()
                .get("postgres.data.nais.io/owner"),
            Some(&"default/test-resource".to_string()),
            "{} misses the owner annotation",
            action.target_kind()
        );
    }
}

#[test]
fn delete_plan_keeps_the_iam_binding() {
    let postgres = make_postgres("test-resource", "default", true);
    let plan = reconciler().plan_delete(&postgres).unwrap();

    assert!(!plan.is_all_noop());
    assert!(plan
        .actions
        .iter()
        .all(|a| a.kind() == ActionKind::DeleteIfExists));
    assert!(plan
        .actions
        .iter()
        .all(|a| a.target_kind() != "IAMPolicyMember"));
    assert!(plan
        .actions
        .iter()
        .any(|a| a.target_kind() == "postgresql"));
    assert!(plan
        .actions
        .iter()
        .any(|a| a.target_kind() == "NetworkPolicy"));
}

#[test]
fn guarded_delete_plans_no_mutations() {
    let postgres = make_postgres("undeletable-resource", "default", false);
    let plan = reconciler().plan_delete(&postgres).unwrap();

    assert!(plan.is_all_noop());
}

#[test]
fn overlong_names_shorten_identically_across_plans() {
    let name = "an-application-name-well-past-the-fifty-character-cluster-limit";
    assert!(name.len() > 50);
    let postgres = make_postgres(name, "default", true);

    let update = reconciler().plan_update(&postgres, ()).unwrap();
    let delete = reconciler().plan_delete(&postgres).unwrap();

    let created = update.actions[0].object().name_any();
    let deleted = delete.actions[0].object().name_any();
    assert!(created.len() <= 50);
    assert_eq!(created, deleted);
}

#[test]
fn kube_resources_use_the_same_name_on_repeat_plans() {
    let name = "an-application-name-well-past-the-fifty-character-cluster-limit";
    let postgres = make_postgres(name, "default", true);

    let first = reconciler().plan_update(&postgres, ()).unwrap();
    let second = reconciler().plan_update(&postgres, ()).unwrap();
    assert_eq!(
        first.actions[0].object().name_any(),
        second.actions[0].object().name_any()
    );
}
