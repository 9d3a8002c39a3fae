//! Submariner configuration resource
//!
//! Partial view of `submariner.io/v1alpha1` `Submariner`. The schema is owned
//! by the submariner-operator; only the fields that gate the conditional
//! deployment checks are modelled, everything else is ignored on decode.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Network plugin value that requires the network plugin syncer
pub const NETWORK_PLUGIN_OVN_KUBERNETES: &str = "OVNKubernetes";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "submariner.io",
    version = "v1alpha1",
    kind = "Submariner",
    namespaced,
    status = "SubmarinerStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct SubmarinerSpec {
    /// Global CIDR handed to this cluster; Globalnet is deployed when non-empty
    #[serde(rename = "globalCIDR", default)]
    pub global_cidr: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmarinerStatus {
    /// CNI detected by the operator (e.g. "OVNKubernetes", "weave-net")
    #[serde(default)]
    pub network_plugin: String,
}

impl Submariner {
    /// Whether Globalnet is enabled for this cluster
    pub fn globalnet_enabled(&self) -> bool {
        !self.spec.global_cidr.is_empty()
    }

    /// Whether the cluster runs OVN-Kubernetes and needs the syncer
    pub fn uses_ovn_kubernetes(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.network_plugin == NETWORK_PLUGIN_OVN_KUBERNETES)
            .unwrap_or(false)
    }
}
