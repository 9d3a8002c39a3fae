//! ManagedClusterAddOn on the hub cluster
//!
//! Partial view of `addon.open-cluster-management.io/v1alpha1`
//! `ManagedClusterAddOn`. The controller only ever writes
//! `status.conditions`; other status fields are left to their owners.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "addon.open-cluster-management.io",
    version = "v1alpha1",
    kind = "ManagedClusterAddOn",
    namespaced,
    status = "ManagedClusterAddOnStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterAddOnSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_namespace: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterAddOnStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl ManagedClusterAddOn {
    /// Current status, empty when the hub has not written one yet
    pub fn status_or_default(&self) -> ManagedClusterAddOnStatus {
        self.status.clone().unwrap_or_default()
    }
}
