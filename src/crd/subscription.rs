//! OLM Subscription for the submariner-operator
//!
//! Partial view of `operators.coreos.com/v1alpha1` `Subscription`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "operators.coreos.com",
    version = "v1alpha1",
    kind = "Subscription",
    namespaced,
    status = "SubscriptionStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSpec {
    /// Package name
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub channel: String,

    #[serde(rename = "startingCSV", default)]
    pub starting_csv: String,

    /// Catalog source
    #[serde(default)]
    pub source: String,

    #[serde(default)]
    pub source_namespace: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    /// Name of the ClusterServiceVersion OLM finished installing
    #[serde(rename = "installedCSV", default)]
    pub installed_csv: String,
}

impl Subscription {
    /// Installed CSV, empty until OLM has completed the install
    pub fn installed_csv(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.installed_csv.as_str())
            .unwrap_or("")
    }
}
