//! Controller module for the Submariner agent status
//! This module contains the health checks, the condition synthesis, the
//! work queue and the hub status publisher.

pub mod checks;
pub mod conditions;
pub mod events;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod publisher;
pub mod queue;
mod reconciler;
pub mod target;
#[cfg(test)]
mod testing;
pub mod view;

pub use checks::{CheckPipeline, DegradedSignal};
pub use conditions::{synthesize, CompositeCondition, CONDITION_TYPE_AGENT_DEGRADED};
pub use events::{EventRecorder, KubeEventRecorder};
pub use publisher::{AddOnStatusClient, KubeAddOnStatusClient, StatusPublisher};
pub use queue::{calculate_backoff, KeyPhase, WorkQueue};
pub use reconciler::{
    error_policy, reconcile, run_controller, run_workers, target_keys, ControllerConfig,
    ControllerState, PassOutcome,
};
pub use target::{KeyRouter, TargetKey, WatchedKind};
pub use view::{ReflectorView, ResourceView};
