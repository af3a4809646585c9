//! Event recording for reconciled objects
//!
//! Events are the user-facing trace of a reconciliation. Every message is
//! prefixed with the owner's correlation id so a rollout can be followed
//! across the owner and its dependents.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;

/// Capability for emitting events on a reconciled object
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn normal(&self, obj_ref: &ObjectReference, reason: &str, note: String);

    async fn warning(&self, obj_ref: &ObjectReference, reason: &str, note: String);
}

/// Event sink publishing through the Kubernetes events API
pub struct KubeEventSink {
    recorder: Recorder,
}

impl KubeEventSink {
    pub fn new(client: Client, controller: &str) -> Self {
        let reporter = Reporter {
            controller: controller.into(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }

    async fn publish(&self, obj_ref: &ObjectReference, type_: EventType, reason: &str, note: String) {
        let event = Event {
            type_,
            reason: reason.into(),
            note: Some(note),
            action: reason.into(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, obj_ref).await {
            tracing::warn!("Failed to publish event: {}", e);
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn normal(&self, obj_ref: &ObjectReference, reason: &str, note: String) {
        self.publish(obj_ref, EventType::Normal, reason, note).await;
    }

    async fn warning(&self, obj_ref: &ObjectReference, reason: &str, note: String) {
        self.publish(obj_ref, EventType::Warning, reason, note).await;
    }
}

/// Per-reconcile event context binding the sink to one owner
pub struct EventContext<'a> {
    sink: &'a dyn EventSink,
    obj_ref: ObjectReference,
    correlation_id: String,
}

impl<'a> EventContext<'a> {
    pub fn new(sink: &'a dyn EventSink, obj_ref: ObjectReference, correlation_id: String) -> Self {
        Self {
            sink,
            obj_ref,
            correlation_id,
        }
    }

    pub async fn normal(&self, reason: &str, note: String) {
        self.sink
            .normal(&self.obj_ref, reason, self.prefixed(note))
            .await;
    }

    pub async fn warning(&self, reason: &str, note: String) {
        self.sink
            .warning(&self.obj_ref, reason, self.prefixed(note))
            .await;
    }

    /// Warning recorded when a reconciliation phase fails
    pub async fn phase_failed(&self, phase: &str, err: &(dyn std::fmt::Display + Send + Sync)) {
        self.warning(
            &format!("{phase}Failed"),
            format!("{phase} phase failed: {err}"),
        )
        .await;
    }

    fn prefixed(&self, note: String) -> String {
        format!("[{}] {}", self.correlation_id, note)
    }
}

/// In-memory sink collecting events, used by tests
#[derive(Default)]
pub struct MemoryEventSink {
    events: std::sync::Mutex<Vec<RecordedEvent>>,
}

#[derive(Clone, Debug)]
pub struct RecordedEvent {
    pub warning: bool,
    pub reason: String,
    pub note: String,
}

impl MemoryEventSink {
    pub fn recorded(&self) -> Vec<RecordedEvent> {
        self.events.lock().expect("event lock poisoned").clone()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn normal(&self, _obj_ref: &ObjectReference, reason: &str, note: String) {
        self.events
            .lock()
            .expect("event lock poisoned")
            .push(RecordedEvent {
                warning: false,
                reason: reason.to_string(),
                note,
            });
    }

    async fn warning(&self, _obj_ref: &ObjectReference, reason: &str, note: String) {
        self.events
            .lock()
            .expect("event lock poisoned")
            .push(RecordedEvent {
                warning: true,
                reason: reason.to_string(),
                note,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notes_are_prefixed_with_correlation_id() {
        let sink = MemoryEventSink::default();
        let ctx = EventContext::new(&sink, ObjectReference::default(), "abc-123".to_string());

        ctx.normal("Reconciling", "Reconciling default/db".to_string())
            .await;
        ctx.phase_failed("Preparing", &"boom").await;

        let events = sink.recorded();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].reason, "Reconciling");
        assert_eq!(events[0].note, "[abc-123] Reconciling default/db");
        assert!(events[1].warning);
        assert_eq!(events[1].reason, "PreparingFailed");
        assert_eq!(events[1].note, "[abc-123] Preparing phase failed: boom");
    }
}
