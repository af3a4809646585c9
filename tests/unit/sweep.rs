//! Selection logic of the unreferenced-resource sweep

use kube::core::{ApiResource, DynamicObject};
use kube::ResourceExt;
use pgrator::apis::postgresql;
use pgrator::synchronizer::reconciler::Reconciler;
use pgrator::synchronizer::select_unreferenced;
use pgrator::{Config, PostgresReconciler};

use crate::common::make_postgres;

const OWNER_ANNOTATION: &str = "postgres.data.nais.io/owner";

fn cluster_item(name: &str, owner: Option<&str>) -> DynamicObject {
    let mut obj = DynamicObject::new(name, &postgresql::api_resource());
    obj.metadata.namespace = Some("pg-default".to_string());
    if let Some(owner) = owner {
        obj.metadata.annotations = Some(
            [(OWNER_ANNOTATION.to_string(), owner.to_string())]
                .into_iter()
                .collect(),
        );
    }
    obj
}

fn relevant_types() -> Vec<ApiResource> {
    let reconciler = PostgresReconciler::new(Config::default());
    let mut types = reconciler.owned_types();
    types.extend(reconciler.additional_types());
    types
}

#[test]
fn renamed_dependent_is_swept_while_current_plan_survives() {
    let postgres = make_postgres("test-resource", "default", true);
    let plan = PostgresReconciler::new(Config::default())
        .plan_update(&postgres, ())
        .unwrap();

    // A cluster left behind by an earlier plan under a different name
    let items = vec![
        cluster_item("test-resource", Some("default/test-resource")),
        cluster_item("test-resource-v1", Some("default/test-resource")),
    ];

    let swept = select_unreferenced(
        &plan.actions,
        &postgresql::api_resource(),
        items,
        OWNER_ANNOTATION,
        "default/test-resource",
    );

    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].name_any(), "test-resource-v1");
}

#[test]
fn resources_not_created_by_this_controller_are_never_swept() {
    let items = vec![
        cluster_item("unannotated", None),
        cluster_item("foreign", Some("default/another-owner")),
    ];

    let swept = select_unreferenced(
        &[],
        &postgresql::api_resource(),
        items,
        OWNER_ANNOTATION,
        "default/test-resource",
    );

    assert!(swept.is_empty());
}

#[test]
fn sweep_covers_every_watched_type() {
    let kinds: Vec<String> = relevant_types()
        .iter()
        .map(|resource| resource.kind.clone())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "postgresql",
            "NetworkPolicy",
            "IAMPolicyMember",
            "PrometheusRule"
        ]
    );
}
