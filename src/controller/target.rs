//! Reconciliation targets and how watch notifications map onto them

use std::fmt;

use super::checks::{WATCHED_DAEMONSETS, WATCHED_DEPLOYMENTS};

/// Identity of the `Submariner` resource whose health is being evaluated
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKey {
    pub namespace: String,
    pub name: String,
}

impl TargetKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Resource collections that feed the controller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WatchedKind {
    Subscription,
    Deployment,
    DaemonSet,
    Submariner,
}

impl fmt::Display for WatchedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchedKind::Subscription => write!(f, "Subscription"),
            WatchedKind::Deployment => write!(f, "Deployment"),
            WatchedKind::DaemonSet => write!(f, "DaemonSet"),
            WatchedKind::Submariner => write!(f, "Submariner"),
        }
    }
}

/// Maps a changed object to the target it affects
///
/// `Submariner` objects are their own target. Every other watched object
/// belongs to the single target configured for the installation namespace,
/// and only the well-known Submariner components are routed; unrelated
/// workloads sharing the namespace are dropped.
#[derive(Clone, Debug)]
pub struct KeyRouter {
    pub installation_namespace: String,
    pub target_name: String,
    pub subscription_name: String,
}

impl KeyRouter {
    pub fn default_target(&self) -> TargetKey {
        TargetKey::new(&self.installation_namespace, &self.target_name)
    }

    pub fn route(&self, kind: WatchedKind, namespace: Option<&str>, name: &str) -> Option<TargetKey> {
        let namespace = namespace?;
        if kind == WatchedKind::Submariner {
            return Some(TargetKey::new(namespace, name));
        }
        if namespace != self.installation_namespace {
            return None;
        }

        let relevant = match kind {
            WatchedKind::Subscription => name == self.subscription_name,
            WatchedKind::Deployment => WATCHED_DEPLOYMENTS.contains(&name),
            WatchedKind::DaemonSet => WATCHED_DAEMONSETS.contains(&name),
            WatchedKind::Submariner => true,
        };
        relevant.then(|| self.default_target())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> KeyRouter {
        KeyRouter {
            installation_namespace: "submariner-operator".to_string(),
            target_name: "submariner".to_string(),
            subscription_name: "submariner".to_string(),
        }
    }

    #[test]
    fn test_submariner_is_its_own_target() {
        let key = router().route(WatchedKind::Submariner, Some("other-ns"), "custom");
        assert_eq!(key, Some(TargetKey::new("other-ns", "custom")));
    }

    #[test]
    fn test_component_changes_map_to_configured_target() {
        let r = router();
        let expected = Some(TargetKey::new("submariner-operator", "submariner"));
        assert_eq!(
            r.route(WatchedKind::Deployment, Some("submariner-operator"), "submariner-operator"),
            expected
        );
        assert_eq!(
            r.route(WatchedKind::DaemonSet, Some("submariner-operator"), "submariner-gateway"),
            expected
        );
        assert_eq!(
            r.route(WatchedKind::Subscription, Some("submariner-operator"), "submariner"),
            expected
        );
    }

    #[test]
    fn test_unrelated_objects_are_dropped() {
        let r = router();
        assert_eq!(
            r.route(WatchedKind::Deployment, Some("submariner-operator"), "unrelated"),
            None
        );
        assert_eq!(
            r.route(WatchedKind::Deployment, Some("kube-system"), "submariner-operator"),
            None
        );
        assert_eq!(r.route(WatchedKind::DaemonSet, None, "submariner-gateway"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            TargetKey::new("submariner-operator", "submariner").to_string(),
            "submariner-operator/submariner"
        );
    }
}
