//! Typed views of the resources the controller works with
//!
//! None of these CRDs are owned by this crate. They are declared with partial
//! schemas so the cluster's objects decode into strongly typed structs.

mod addon;
mod submariner;
mod subscription;
pub mod types;

pub use addon::{ManagedClusterAddOn, ManagedClusterAddOnSpec, ManagedClusterAddOnStatus};
pub use submariner::{Submariner, SubmarinerSpec, SubmarinerStatus, NETWORK_PLUGIN_OVN_KUBERNETES};
pub use subscription::{Subscription, SubscriptionSpec, SubscriptionStatus};
pub use types::*;
