//! The agent health condition and how it is merged into a status

use crate::crd::Condition;

use super::checks::DegradedSignal;

/// Condition type published on the hub's ManagedClusterAddOn
pub const CONDITION_TYPE_AGENT_DEGRADED: &str = "SubmarinerAgentDegraded";

/// Reason reported when no check found a problem
pub const REASON_AGENT_DEPLOYED: &str = "SubmarinerAgentDeployed";

/// Standard condition statuses
pub const CONDITION_STATUS_TRUE: &str = "True";
pub const CONDITION_STATUS_FALSE: &str = "False";

/// The single health condition computed by one pass
///
/// Carries no timestamp, so two passes over the same cluster state produce
/// equal values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositeCondition {
    pub type_: String,
    pub degraded: bool,
    pub reason: String,
    pub message: String,
}

impl CompositeCondition {
    pub fn status(&self) -> &'static str {
        if self.degraded {
            CONDITION_STATUS_TRUE
        } else {
            CONDITION_STATUS_FALSE
        }
    }

    /// Kubernetes representation stamped with the current time
    pub fn to_condition(&self) -> Condition {
        Condition::new(&self.type_, self.degraded, &self.reason, &self.message)
    }

    /// Replace the condition of the same type in `conditions`
    ///
    /// A previously published transition time survives as long as the
    /// degraded status does not flip, so republishing the same health is a
    /// no-op for the list. Conditions of other types are left alone.
    pub fn merge_into(&self, conditions: &mut Vec<Condition>) {
        let Some(existing) = conditions.iter_mut().find(|c| c.type_ == self.type_) else {
            conditions.push(self.to_condition());
            return;
        };

        let mut merged = self.to_condition();
        if existing.status == merged.status {
            merged.last_transition_time = std::mem::take(&mut existing.last_transition_time);
        }
        merged.observed_generation = existing.observed_generation;
        *existing = merged;
    }
}

/// Merge the pipeline's signals into the published condition
///
/// Reasons are joined with "," and messages with "\n", in signal order. With
/// no signals the condition is healthy and names the installed CSV.
pub fn synthesize(signals: &[DegradedSignal], installed_csv: &str) -> CompositeCondition {
    if signals.is_empty() {
        return CompositeCondition {
            type_: CONDITION_TYPE_AGENT_DEGRADED.to_string(),
            degraded: false,
            reason: REASON_AGENT_DEPLOYED.to_string(),
            message: format!(
                "Submariner ({}) is deployed on managed cluster.",
                installed_csv
            ),
        };
    }

    CompositeCondition {
        type_: CONDITION_TYPE_AGENT_DEGRADED.to_string(),
        degraded: true,
        reason: signals
            .iter()
            .map(|s| s.reason.as_str())
            .collect::<Vec<_>>()
            .join(","),
        message: signals
            .iter()
            .map(|s| s.message.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}
