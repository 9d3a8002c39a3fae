//! Kubernetes Event recording
//!
//! Events are fire-and-forget: failures are logged and never propagate, so a
//! broken event sink can not fail a reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{
    api::{Api, ObjectMeta, PostParams},
    Client, Resource,
};
use tracing::warn;

use crate::crd::Submariner;

use super::target::TargetKey;

/// Reason of the event emitted after the hub status actually changed
pub const REASON_STATUS_UPDATED: &str = "ManagedClusterAddOnStatusUpdated";

/// Component name reported on emitted events
pub const REPORTING_COMPONENT: &str = "submariner-agent-status-controller";

#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, target: &TargetKey, reason: &str, message: &str);
}

/// Creates `core/v1` Events attached to the target's `Submariner` object
pub struct KubeEventRecorder {
    client: Client,
    instance: String,
}

impl KubeEventRecorder {
    pub fn new(client: Client) -> Self {
        let instance = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string());
        Self { client, instance }
    }
}

/// Object reference to the `Submariner` resource behind a target
pub fn involved_object(target: &TargetKey) -> ObjectReference {
    ObjectReference {
        api_version: Some(Submariner::api_version(&()).to_string()),
        kind: Some(Submariner::kind(&()).to_string()),
        name: Some(target.name.clone()),
        namespace: Some(target.namespace.clone()),
        ..Default::default()
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn record(&self, target: &TargetKey, reason: &str, message: &str) {
        let events: Api<Event> = Api::namespaced(self.client.clone(), &target.namespace);

        let time = chrono::Utc::now();
        let event = Event {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}-", target.name)),
                ..Default::default()
            },
            type_: Some("Normal".to_string()),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            involved_object: involved_object(target),
            first_timestamp: Some(Time(time)),
            last_timestamp: Some(Time(time)),
            count: Some(1),
            reporting_component: Some(REPORTING_COMPONENT.to_string()),
            reporting_instance: Some(self.instance.clone()),
            source: Some(EventSource {
                component: Some(REPORTING_COMPONENT.to_string()),
                host: Some(self.instance.clone()),
            }),
            ..Default::default()
        };

        if let Err(e) = events.create(&PostParams::default(), &event).await {
            warn!(
                key = %target,
                reason,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_involved_object_points_at_submariner() {
        let reference = involved_object(&TargetKey::new("submariner-operator", "submariner"));
        assert_eq!(reference.api_version.as_deref(), Some("submariner.io/v1alpha1"));
        assert_eq!(reference.kind.as_deref(), Some("Submariner"));
        assert_eq!(reference.name.as_deref(), Some("submariner"));
        assert_eq!(reference.namespace.as_deref(), Some("submariner-operator"));
    }
}
