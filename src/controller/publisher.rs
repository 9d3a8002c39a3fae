//! Publishing the agent condition to the hub's ManagedClusterAddOn
//!
//! Status writes are optimistic read-modify-write cycles. The caller supplies a
//! pure merge function from the current status to the desired one; it is
//! re-applied to a fresh read after every conflict. Nothing is written when
//! the merge leaves the status unchanged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::{
    api::{Api, Patch, PatchParams},
    Client,
};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::crd::{ManagedClusterAddOn, ManagedClusterAddOnStatus};
use crate::error::{Error, Result};

use super::conditions::CompositeCondition;
use super::events::{EventRecorder, REASON_STATUS_UPDATED};
use super::target::TargetKey;

/// Field manager recorded on status patches
pub const FIELD_MANAGER: &str = "submariner-agent-status";

/// Pause between conflicting attempts
const CONFLICT_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Remote access to the ManagedClusterAddOn
#[async_trait]
pub trait AddOnStatusClient: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<ManagedClusterAddOn>;

    /// Replace `status.conditions`, failing with [`Error::Conflict`] when the
    /// object no longer has `resource_version`
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &ManagedClusterAddOnStatus,
    ) -> Result<ManagedClusterAddOn>;
}

/// [`AddOnStatusClient`] talking to the hub API server
pub struct KubeAddOnStatusClient {
    client: Client,
}

impl KubeAddOnStatusClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Merge patch for the condition list, guarded by the resource version
///
/// A merge patch replaces lists wholesale and leaves the other status fields
/// alone; a `metadata.resourceVersion` in the body makes the API server reject
/// the write with 409 if the object moved on.
pub fn conditions_patch(
    resource_version: Option<&str>,
    status: &ManagedClusterAddOnStatus,
) -> serde_json::Value {
    let mut patch = json!({
        "status": {
            "conditions": status.conditions,
        }
    });
    if let Some(rv) = resource_version {
        patch["metadata"] = json!({ "resourceVersion": rv });
    }
    patch
}

#[async_trait]
impl AddOnStatusClient for KubeAddOnStatusClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<ManagedClusterAddOn> {
        let api: Api<ManagedClusterAddOn> = Api::namespaced(self.client.clone(), namespace);
        api.get(name).await.map_err(Error::KubeError)
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &ManagedClusterAddOnStatus,
    ) -> Result<ManagedClusterAddOn> {
        let api: Api<ManagedClusterAddOn> = Api::namespaced(self.client.clone(), namespace);
        let patch = conditions_patch(resource_version, status);

        match api
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
        {
            Ok(addon) => Ok(addon),
            Err(kube::Error::Api(resp)) if resp.code == 409 => Err(Error::Conflict {
                name: format!("{}/{}", namespace, name),
            }),
            Err(e) => Err(Error::KubeError(e)),
        }
    }
}

/// Merge function replacing the condition of `condition`'s type
pub fn update_condition_fn(
    condition: &CompositeCondition,
) -> impl Fn(&ManagedClusterAddOnStatus) -> ManagedClusterAddOnStatus + Send + Sync {
    let condition = condition.clone();
    move |current: &ManagedClusterAddOnStatus| {
        let mut next = current.clone();
        condition.merge_into(&mut next.conditions);
        next
    }
}

/// Writes the agent condition for one managed cluster
pub struct StatusPublisher {
    client: Arc<dyn AddOnStatusClient>,
    recorder: Arc<dyn EventRecorder>,
    /// Hub namespace of the ManagedClusterAddOn, i.e. the managed cluster's name
    cluster_name: String,
    addon_name: String,
    max_attempts: u32,
    timeout: Duration,
}

impl StatusPublisher {
    pub fn new(
        client: Arc<dyn AddOnStatusClient>,
        recorder: Arc<dyn EventRecorder>,
        cluster_name: impl Into<String>,
        addon_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            recorder,
            cluster_name: cluster_name.into(),
            addon_name: addon_name.into(),
            max_attempts: 5,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn object_name(&self) -> String {
        format!("{}/{}", self.cluster_name, self.addon_name)
    }

    /// Apply `merge` to the remote status
    ///
    /// Returns the resulting status and whether a write happened.
    pub async fn update_status<F>(&self, merge: F) -> Result<(ManagedClusterAddOnStatus, bool)>
    where
        F: Fn(&ManagedClusterAddOnStatus) -> ManagedClusterAddOnStatus + Send + Sync,
    {
        match tokio::time::timeout(self.timeout, self.update_with_retry(&merge)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                name: self.object_name(),
                seconds: self.timeout.as_secs(),
            }),
        }
    }

    async fn update_with_retry<F>(&self, merge: &F) -> Result<(ManagedClusterAddOnStatus, bool)>
    where
        F: Fn(&ManagedClusterAddOnStatus) -> ManagedClusterAddOnStatus + Send + Sync,
    {
        for attempt in 1..=self.max_attempts {
            let addon = self.client.get(&self.cluster_name, &self.addon_name).await?;
            let current = addon.status_or_default();
            let desired = merge(&current);

            if desired == current {
                debug!("Status of {} already up to date", self.object_name());
                return Ok((current, false));
            }

            match self
                .client
                .patch_status(
                    &self.cluster_name,
                    &self.addon_name,
                    addon.metadata.resource_version.as_deref(),
                    &desired,
                )
                .await
            {
                Ok(updated) => return Ok((updated.status.unwrap_or(desired), true)),
                Err(Error::Conflict { .. }) => {
                    debug!(
                        "Conflict updating {} (attempt {}/{}), retrying",
                        self.object_name(),
                        attempt,
                        self.max_attempts
                    );
                    #[cfg(feature = "metrics")]
                    super::metrics::inc_write_conflict();
                    if attempt < self.max_attempts {
                        tokio::time::sleep(CONFLICT_RETRY_INTERVAL).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            "Giving up on {} after {} conflicting attempts",
            self.object_name(),
            self.max_attempts
        );
        Err(Error::RetriesExhausted {
            name: self.object_name(),
            attempts: self.max_attempts,
        })
    }

    /// Publish `condition`, emitting an event when the hub status changed
    pub async fn publish(&self, target: &TargetKey, condition: &CompositeCondition) -> Result<bool> {
        let (status, changed) = self.update_status(update_condition_fn(condition)).await?;

        if changed {
            info!(
                "Updated {} condition on {}: {}",
                condition.type_,
                self.object_name(),
                condition.reason
            );
            self.recorder
                .record(
                    target,
                    REASON_STATUS_UPDATED,
                    &format!("Updated status conditions: {:?}", status.conditions),
                )
                .await;
        }

        #[cfg(feature = "metrics")]
        super::metrics::inc_status_update(changed);

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::conditions::{synthesize, CONDITION_TYPE_AGENT_DEGRADED};
    use crate::controller::checks::DegradedSignal;
    use crate::controller::testing::{FakeRecorder, FakeStatusClient};

    fn publisher(client: &Arc<FakeStatusClient>, recorder: &Arc<FakeRecorder>) -> StatusPublisher {
        StatusPublisher::new(client.clone(), recorder.clone(), "cluster1", "submariner")
    }

    fn target() -> TargetKey {
        TargetKey::new("submariner-operator", "submariner")
    }

    fn degraded() -> CompositeCondition {
        synthesize(
            &[DegradedSignal::new("NoGatewayDaemonSet", "The gateway daemon set does not exist")],
            "",
        )
    }

    #[tokio::test]
    async fn test_identical_condition_is_written_once() {
        let client = Arc::new(FakeStatusClient::default());
        let recorder = Arc::new(FakeRecorder::default());
        let publisher = publisher(&client, &recorder);

        assert!(publisher.publish(&target(), &degraded()).await.unwrap());
        assert!(!publisher.publish(&target(), &degraded()).await.unwrap());

        assert_eq!(client.patch_calls(), 1);
        assert_eq!(recorder.events().len(), 1);
        assert_eq!(recorder.events()[0].0, REASON_STATUS_UPDATED);
    }

    #[tokio::test]
    async fn test_single_conflict_is_retried() {
        let client = Arc::new(FakeStatusClient::default());
        client.fail_next_patches(1);
        let recorder = Arc::new(FakeRecorder::default());
        let publisher = publisher(&client, &recorder);

        let (status, changed) = publisher
            .update_status(update_condition_fn(&degraded()))
            .await
            .unwrap();

        assert!(changed);
        assert_eq!(client.patch_calls(), 2);
        assert_eq!(client.get_calls(), 2);
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].reason, "NoGatewayDaemonSet");
    }

    #[tokio::test]
    async fn test_conflicts_exhaust_retries() {
        let client = Arc::new(FakeStatusClient::default());
        client.fail_next_patches(10);
        let recorder = Arc::new(FakeRecorder::default());
        let publisher = publisher(&client, &recorder).with_max_attempts(3);

        let err = publisher.publish(&target(), &degraded()).await.unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(client.patch_calls(), 3);
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn test_merge_replaces_condition_of_same_type_only() {
        let client = Arc::new(FakeStatusClient::default());
        client.seed_condition(crate::crd::Condition::new("Available", true, "Running", "ok"));
        let recorder = Arc::new(FakeRecorder::default());
        let publisher = publisher(&client, &recorder);

        publisher.publish(&target(), &degraded()).await.unwrap();
        let healthy = synthesize(&[], "submariner.v0.12.0");
        publisher.publish(&target(), &healthy).await.unwrap();

        let conditions = client.conditions();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].type_, "Available");
        assert_eq!(conditions[1].type_, CONDITION_TYPE_AGENT_DEGRADED);
        assert_eq!(conditions[1].status, "False");
        assert_eq!(client.patch_calls(), 2);
    }

    #[test]
    fn test_conditions_patch_carries_resource_version() {
        let status = ManagedClusterAddOnStatus {
            conditions: vec![degraded().to_condition()],
        };
        let patch = conditions_patch(Some("42"), &status);
        assert_eq!(patch["metadata"]["resourceVersion"], "42");
        assert_eq!(patch["status"]["conditions"][0]["type"], CONDITION_TYPE_AGENT_DEGRADED);

        let unguarded = conditions_patch(None, &status);
        assert!(unguarded.get("metadata").is_none());
    }
}
