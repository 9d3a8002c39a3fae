//! Shared types for the resources the controller reads and writes

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition for Kubernetes status
///
/// Follows the `metav1.Condition` convention used by the hub's
/// ManagedClusterAddOn status.
///
/// # Examples
///
/// ```rust,no_run
/// use submariner_agent_status::crd::Condition;
///
/// let condition = Condition::new("SubmarinerAgentDegraded", false, "SubmarinerAgentDeployed", "ok");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "SubmarinerAgentDegraded")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    /// Last time the condition transitioned
    #[serde(default)]
    pub last_transition_time: String,
    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: String,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a condition stamped with the current time
    pub fn new(type_: &str, status: bool, reason: &str, message: &str) -> Self {
        Self {
            type_: type_.to_string(),
            status: if status { "True" } else { "False" }.to_string(),
            last_transition_time: chrono::Utc::now().to_rfc3339(),
            reason: reason.to_string(),
            message: message.to_string(),
            observed_generation: None,
        }
    }
}
