//! Deployment health checks for the Submariner components
//!
//! Each check reads one component from the [`ResourceView`] and appends a
//! [`DegradedSignal`] for every problem it finds. Checks run in a fixed order
//! and never suppress each other, so the resulting reason and message are
//! stable for a given cluster state. A missing object is a signal; any other
//! read failure aborts the whole evaluation.

use crate::crd::{Submariner, Subscription};
use crate::error::Result;

use super::view::ResourceView;

pub const OPERATOR_DEPLOYMENT: &str = "submariner-operator";
pub const LIGHTHOUSE_AGENT_DEPLOYMENT: &str = "submariner-lighthouse-agent";
pub const LIGHTHOUSE_COREDNS_DEPLOYMENT: &str = "submariner-lighthouse-coredns";
pub const GLOBALNET_DEPLOYMENT: &str = "submariner-globalnet";
pub const NETWORK_PLUGIN_SYNCER_DEPLOYMENT: &str = "submariner-networkplugin-syncer";
pub const GATEWAY_DAEMONSET: &str = "submariner-gateway";
pub const ROUTE_AGENT_DAEMONSET: &str = "submariner-routeagent";

/// Every deployment any check may read
pub const WATCHED_DEPLOYMENTS: &[&str] = &[
    OPERATOR_DEPLOYMENT,
    LIGHTHOUSE_AGENT_DEPLOYMENT,
    LIGHTHOUSE_COREDNS_DEPLOYMENT,
    GLOBALNET_DEPLOYMENT,
    NETWORK_PLUGIN_SYNCER_DEPLOYMENT,
];

pub const WATCHED_DAEMONSETS: &[&str] = &[GATEWAY_DAEMONSET, ROUTE_AGENT_DAEMONSET];

/// One detected problem
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DegradedSignal {
    /// PascalCase token, e.g. "NoOperatorDeployment"
    pub reason: String,
    pub message: String,
}

impl DegradedSignal {
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// A deployment that must exist and have at least one available replica
#[derive(Clone, Copy, Debug)]
pub struct DeploymentCheck {
    pub name: &'static str,
    /// Component name used in reason codes
    pub reason_name: &'static str,
}

pub const REQUIRED_DEPLOYMENTS: &[DeploymentCheck] = &[
    DeploymentCheck {
        name: OPERATOR_DEPLOYMENT,
        reason_name: "Operator",
    },
    DeploymentCheck {
        name: LIGHTHOUSE_AGENT_DEPLOYMENT,
        reason_name: "LighthouseAgent",
    },
    DeploymentCheck {
        name: LIGHTHOUSE_COREDNS_DEPLOYMENT,
        reason_name: "LighthouseCoreDNS",
    },
];

/// A deployment check that only applies for some Submariner configurations
pub struct ConditionalCheck {
    pub applies: fn(&Submariner) -> bool,
    pub deployment: DeploymentCheck,
}

pub const CONDITIONAL_DEPLOYMENTS: &[ConditionalCheck] = &[
    ConditionalCheck {
        applies: Submariner::globalnet_enabled,
        deployment: DeploymentCheck {
            name: GLOBALNET_DEPLOYMENT,
            reason_name: "Globalnet",
        },
    },
    ConditionalCheck {
        applies: Submariner::uses_ovn_kubernetes,
        deployment: DeploymentCheck {
            name: NETWORK_PLUGIN_SYNCER_DEPLOYMENT,
            reason_name: "NetworkPluginSyncer",
        },
    },
];

fn or_default(value: &str) -> &str {
    if value.is_empty() {
        "default"
    } else {
        value
    }
}

/// Flags a Subscription that OLM has not finished installing
pub fn check_subscription(sub: &Subscription) -> Option<DegradedSignal> {
    if !sub.installed_csv().is_empty() {
        return None;
    }

    Some(DegradedSignal::new(
        "CSVNotInstalled",
        format!(
            "The submariner-operator CSV ({}) is not installed from channel ({}) in catalog source ({}/{})",
            or_default(&sub.spec.starting_csv),
            or_default(&sub.spec.channel),
            sub.spec.source_namespace,
            sub.spec.source
        ),
    ))
}

/// Ordered checks against one installation namespace
pub struct CheckPipeline<'a> {
    view: &'a dyn ResourceView,
    namespace: &'a str,
}

impl<'a> CheckPipeline<'a> {
    pub fn new(view: &'a dyn ResourceView, namespace: &'a str) -> Self {
        Self { view, namespace }
    }

    /// Checks that apply to every installation, in evaluation order
    pub fn required(&self, sub: &Subscription) -> Result<Vec<DegradedSignal>> {
        let mut signals = Vec::new();
        signals.extend(check_subscription(sub));
        for check in REQUIRED_DEPLOYMENTS {
            signals.extend(self.check_deployment(check)?);
        }
        signals.extend(self.check_gateways()?);
        signals.extend(self.check_route_agents()?);
        Ok(signals)
    }

    /// Checks gated on the Submariner configuration
    pub fn conditional(&self, submariner: &Submariner) -> Result<Vec<DegradedSignal>> {
        let mut signals = Vec::new();
        for check in CONDITIONAL_DEPLOYMENTS {
            if (check.applies)(submariner) {
                signals.extend(self.check_deployment(&check.deployment)?);
            }
        }
        Ok(signals)
    }

    /// Full evaluation: required checks followed by conditional ones
    pub fn run(&self, sub: &Subscription, submariner: &Submariner) -> Result<Vec<DegradedSignal>> {
        let mut signals = self.required(sub)?;
        signals.extend(self.conditional(submariner)?);
        Ok(signals)
    }

    pub fn check_deployment(&self, check: &DeploymentCheck) -> Result<Option<DegradedSignal>> {
        let msg_name = check.name.replace('-', " ");
        let deployment = match self.view.deployment(self.namespace, check.name)? {
            Some(d) => d,
            None => {
                return Ok(Some(DegradedSignal::new(
                    format!("No{}Deployment", check.reason_name),
                    format!("The {} deployment does not exist", msg_name),
                )))
            }
        };

        let available = deployment
            .status
            .as_ref()
            .and_then(|s| s.available_replicas)
            .unwrap_or(0);
        if available == 0 {
            return Ok(Some(DegradedSignal::new(
                format!("No{}Available", check.reason_name),
                format!("There are no {} replica available", msg_name),
            )));
        }

        Ok(None)
    }

    pub fn check_gateways(&self) -> Result<Vec<DegradedSignal>> {
        let gateways = match self.view.daemon_set(self.namespace, GATEWAY_DAEMONSET)? {
            Some(ds) => ds,
            None => {
                return Ok(vec![DegradedSignal::new(
                    "NoGatewayDaemonSet",
                    "The gateway daemon set does not exist",
                )])
            }
        };

        let mut signals = Vec::new();
        let status = gateways.status.clone().unwrap_or_default();
        if status.desired_number_scheduled == 0 {
            signals.push(DegradedSignal::new(
                "NoScheduledGateways",
                "There are no nodes to run the gateways",
            ));
        }

        let unavailable = status.number_unavailable.unwrap_or(0);
        if unavailable != 0 {
            signals.push(DegradedSignal::new(
                "GatewaysUnavailable",
                format!("There are {} unavailable gateways", unavailable),
            ));
        }

        Ok(signals)
    }

    pub fn check_route_agents(&self) -> Result<Option<DegradedSignal>> {
        let route_agents = match self.view.daemon_set(self.namespace, ROUTE_AGENT_DAEMONSET)? {
            Some(ds) => ds,
            None => {
                return Ok(Some(DegradedSignal::new(
                    "NoRouteAgentDaemonSet",
                    "The route agents are not found",
                )))
            }
        };

        let unavailable = route_agents
            .status
            .as_ref()
            .and_then(|s| s.number_unavailable)
            .unwrap_or(0);
        if unavailable != 0 {
            return Ok(Some(DegradedSignal::new(
                "RouteAgentsUnavailable",
                format!("There are {} unavailable route agents", unavailable),
            )));
        }

        Ok(None)
    }
}
