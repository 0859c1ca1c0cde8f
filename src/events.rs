//! Kubernetes Event recording
//!
//! Transformers and the controller report noteworthy transitions as
//! Kubernetes Events. Publishing never fails the caller: errors are logged
//! as warnings.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use parking_lot::Mutex;
use tracing::warn;

/// Sink for Kubernetes Events
#[async_trait]
pub trait EventRecorder: Send + Sync {
    /// Publish an Event about `obj`.
    ///
    /// * `type_` - Normal or Warning
    /// * `reason` - machine-readable reason, see [`reasons`]
    /// * `action` - what was done, see [`actions`]
    /// * `note` - optional human-readable message
    async fn publish(
        &self,
        obj: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Recorder writing `events.k8s.io` Events through the API server
pub struct KubeEventRecorder {
    client: Client,
    reporter: Reporter,
}

impl KubeEventRecorder {
    pub fn new(client: Client, controller_name: &str) -> Self {
        Self {
            client,
            reporter: Reporter {
                controller: controller_name.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn publish(
        &self,
        obj: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone(), obj.clone());
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = recorder.publish(event).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Discards every event
pub struct NoopEventRecorder;

#[async_trait]
impl EventRecorder for NoopEventRecorder {
    async fn publish(
        &self,
        _obj: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// An event captured by [`MemoryEventRecorder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub object: String,
    pub warning: bool,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
}

/// Keeps published events in memory
#[derive(Default)]
pub struct MemoryEventRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MemoryEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.reason.clone()).collect()
    }
}

#[async_trait]
impl EventRecorder for MemoryEventRecorder {
    async fn publish(
        &self,
        obj: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.events.lock().push(RecordedEvent {
            object: obj.name.clone().unwrap_or_default(),
            warning: matches!(type_, EventType::Warning),
            reason: reason.to_string(),
            action: action.to_string(),
            note,
        });
    }
}

/// Event reason strings, the REASON column of `kubectl get events`
pub mod reasons {
    pub const ROLLOUT_STARTED: &str = "RolloutStarted";
    pub const SCALED_UP: &str = "ScaledUp";
    pub const SCALED_DOWN: &str = "ScaledDown";
    pub const ROLLOUT_SUCCEEDED: &str = "RolloutSucceeded";
    /// Another rollout already owns the cluster
    pub const CLUSTER_CLAIMED: &str = "ClusterClaimed";
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
    pub const DELETION_STARTED: &str = "DeletionStarted";
}

/// Event action strings
pub mod actions {
    pub const RECONCILE: &str = "Reconcile";
    pub const SCALE: &str = "Scale";
    pub const DELETE: &str = "Delete";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_recorder_captures_events() {
        let recorder = MemoryEventRecorder::new();
        let obj_ref = ObjectReference {
            name: Some("r1".into()),
            ..Default::default()
        };
        recorder
            .publish(
                &obj_ref,
                EventType::Warning,
                reasons::CLUSTER_CLAIMED,
                actions::RECONCILE,
                Some("claimed by r0".into()),
            )
            .await;
        NoopEventRecorder
            .publish(&obj_ref, EventType::Normal, reasons::SCALED_UP, actions::SCALE, None)
            .await;

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].warning);
        assert_eq!(events[0].object, "r1");
        assert_eq!(recorder.reasons(), vec!["ClusterClaimed"]);
    }
}
