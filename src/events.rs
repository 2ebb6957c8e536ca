//! Thin wrapper over `kube::runtime::events` posting the five reconciler
//! event kinds against the object that triggered them — an ingress or,
//! for configmap-driven reloads, the configmap itself (design doc §4.4,
//! §4.6, §5).

use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::api::networking::v1::Ingress;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::ResourceExt;

use crate::OPERATOR_MANAGER;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    AddedOrUpdated,
    AddedOrUpdatedWithError,
    Rejected,
    Updated,
    UpdatedWithError,
}

impl Outcome {
    fn event_type(self) -> EventType {
        match self {
            Outcome::AddedOrUpdated | Outcome::Updated => EventType::Normal,
            Outcome::AddedOrUpdatedWithError | Outcome::Rejected | Outcome::UpdatedWithError => {
                EventType::Warning
            }
        }
    }

    fn reason(self) -> &'static str {
        match self {
            Outcome::AddedOrUpdated => "AddedOrUpdated",
            Outcome::AddedOrUpdatedWithError => "AddedOrUpdatedWithError",
            Outcome::Rejected => "Rejected",
            Outcome::Updated => "Updated",
            Outcome::UpdatedWithError => "UpdatedWithError",
        }
    }
}

pub struct EventEmitter {
    client: kube::Client,
}

impl EventEmitter {
    pub fn new(client: kube::Client) -> Self {
        EventEmitter { client }
    }

    pub async fn emit(&self, ing: &Ingress, outcome: Outcome, message: String) {
        let name = ing.name_any();
        let namespace = ing.namespace().unwrap_or_default();
        self.emit_for_ref(ing.object_ref(&()), outcome, message, &namespace, &name)
            .await;
    }

    /// Same as `emit`, but against an arbitrary object reference rather
    /// than an `Ingress` — used for events raised against the watched
    /// ConfigMap (§4.4, §4.6).
    pub async fn emit_for_object_ref(
        &self,
        object_ref: ObjectReference,
        outcome: Outcome,
        message: String,
    ) {
        let namespace = object_ref.namespace.clone().unwrap_or_default();
        let name = object_ref.name.clone().unwrap_or_default();
        self.emit_for_ref(object_ref, outcome, message, &namespace, &name).await;
    }

    async fn emit_for_ref(
        &self,
        object_ref: ObjectReference,
        outcome: Outcome,
        message: String,
        namespace: &str,
        name: &str,
    ) {
        let recorder = Recorder::new(
            self.client.clone(),
            Reporter::from(OPERATOR_MANAGER.to_string()),
            object_ref,
        );
        let event = Event {
            type_: outcome.event_type(),
            reason: outcome.reason().to_string(),
            note: Some(message),
            action: outcome.reason().to_string(),
            secondary: None,
        };
        if let Err(err) = recorder.publish(event).await {
            log::warn!("failed to publish {outcome:?} event for {namespace}/{name}: {err}");
        }
    }
}
