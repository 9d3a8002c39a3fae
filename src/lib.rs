//! submariner-agent-status: reports the health of a Submariner installation
//!
//! This crate watches the Submariner components on a managed cluster and
//! publishes a single `SubmarinerAgentDegraded` condition on the hub's
//! `ManagedClusterAddOn` status.

pub mod controller;
pub mod crd;
pub mod error;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};
