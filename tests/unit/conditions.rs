//! Condition aggregation and event reporting

use k8s_openapi::api::core::v1::ObjectReference;
use pgrator::crd::Condition;
use pgrator::synchronizer::events::{EventContext, MemoryEventSink};
use pgrator::synchronizer::object::set_status_condition;

use crate::common::{make_postgres, with_correlation_id};

fn condition(type_: &str, status: &str, generation: i64) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: "Test".to_string(),
        message: String::new(),
        last_transition_time: "2026-01-01T00:00:00Z".to_string(),
        observed_generation: Some(generation),
    }
}

#[test]
fn conflicting_condition_types_resolve_last_write_wins() {
    let mut conditions = Vec::new();
    set_status_condition(
        &mut conditions,
        condition("postgresql.acid.zalan.do/Available", "False", 1),
    );
    set_status_condition(
        &mut conditions,
        condition("postgresql.acid.zalan.do/Available", "True", 2),
    );

    assert_eq!(conditions.len(), 1);
    assert_eq!(conditions[0].status, "True");
    assert_eq!(conditions[0].observed_generation, Some(2));
}

#[test]
fn conditions_from_different_dependents_accumulate() {
    let mut conditions = Vec::new();
    for type_ in [
        "postgresql.acid.zalan.do/Available",
        "postgresql.acid.zalan.do/Progressing",
        "networkpolicy.networking.k8s.io/Available",
    ] {
        set_status_condition(&mut conditions, condition(type_, "True", 1));
    }

    assert_eq!(conditions.len(), 3);
}

#[tokio::test]
async fn events_carry_the_owner_correlation_id() {
    let postgres = with_correlation_id(make_postgres("db", "default", true), "deploy-42");

    let sink = MemoryEventSink::default();
    let ctx = EventContext::new(
        &sink,
        ObjectReference::default(),
        postgres.correlation_id(),
    );
    ctx.normal("Synchronized", "Synchronized default/db".to_string())
        .await;

    let events = sink.recorded();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].note, "[deploy-42] Synchronized default/db");
}

#[tokio::test]
async fn phase_failures_record_warnings() {
    let sink = MemoryEventSink::default();
    let ctx = EventContext::new(&sink, ObjectReference::default(), String::new());
    ctx.phase_failed("PerformingActions", &"timed out").await;

    let events = sink.recorded();
    assert!(events[0].warning);
    assert_eq!(events[0].reason, "PerformingActionsFailed");
}
