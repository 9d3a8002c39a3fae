//! Test doubles for the controller's collaborators

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, DaemonSetStatus, Deployment, DeploymentStatus};
use kube::api::ObjectMeta;

use crate::crd::{
    Condition, ManagedClusterAddOn, ManagedClusterAddOnSpec, ManagedClusterAddOnStatus,
    Submariner, SubmarinerSpec, SubmarinerStatus, Subscription, SubscriptionSpec,
    SubscriptionStatus,
};
use crate::error::{Error, Result};

use super::checks::{WATCHED_DAEMONSETS, WATCHED_DEPLOYMENTS};
use super::events::EventRecorder;
use super::publisher::AddOnStatusClient;
use super::target::TargetKey;
use super::view::ResourceView;

pub const NS: &str = "submariner-operator";

fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NS.to_string()),
        ..Default::default()
    }
}

pub fn deployment(name: &str, available: i32) -> Deployment {
    Deployment {
        metadata: meta(name),
        status: Some(DeploymentStatus {
            available_replicas: Some(available),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn daemon_set(name: &str, desired: i32, unavailable: i32) -> DaemonSet {
    DaemonSet {
        metadata: meta(name),
        status: Some(DaemonSetStatus {
            desired_number_scheduled: desired,
            number_unavailable: Some(unavailable),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn subscription(installed_csv: &str) -> Subscription {
    let mut sub = Subscription::new(
        "submariner",
        SubscriptionSpec {
            name: "submariner".to_string(),
            source: "redhat-operators".to_string(),
            source_namespace: "openshift-marketplace".to_string(),
            ..Default::default()
        },
    );
    sub.metadata.namespace = Some(NS.to_string());
    sub.status = Some(SubscriptionStatus {
        installed_csv: installed_csv.to_string(),
    });
    sub
}

pub fn submariner(global_cidr: &str, network_plugin: &str) -> Submariner {
    let mut submariner = Submariner::new(
        "submariner",
        SubmarinerSpec {
            global_cidr: global_cidr.to_string(),
        },
    );
    submariner.metadata.namespace = Some(NS.to_string());
    submariner.status = Some(SubmarinerStatus {
        network_plugin: network_plugin.to_string(),
    });
    submariner
}

#[derive(Default)]
struct ViewState {
    subscriptions: HashMap<String, Arc<Subscription>>,
    deployments: HashMap<String, Arc<Deployment>>,
    daemon_sets: HashMap<String, Arc<DaemonSet>>,
    submariners: HashMap<String, Arc<Submariner>>,
    failing: HashSet<String>,
}

/// In-memory [`ResourceView`] for the installation namespace
#[derive(Default)]
pub struct FakeView {
    state: Mutex<ViewState>,
    panicking: AtomicBool,
}

impl FakeView {
    pub fn set_subscription(&self, sub: Subscription) {
        self.state
            .lock()
            .unwrap()
            .subscriptions
            .insert(sub.metadata.name.clone().unwrap(), Arc::new(sub));
    }

    pub fn remove_subscription(&self, name: &str) {
        self.state.lock().unwrap().subscriptions.remove(name);
    }

    pub fn set_deployment(&self, name: &str, available: i32) {
        self.state
            .lock()
            .unwrap()
            .deployments
            .insert(name.to_string(), Arc::new(deployment(name, available)));
    }

    pub fn remove_deployment(&self, name: &str) {
        self.state.lock().unwrap().deployments.remove(name);
    }

    pub fn set_daemon_set(&self, name: &str, desired: i32, unavailable: i32) {
        self.state
            .lock()
            .unwrap()
            .daemon_sets
            .insert(name.to_string(), Arc::new(daemon_set(name, desired, unavailable)));
    }

    pub fn remove_daemon_set(&self, name: &str) {
        self.state.lock().unwrap().daemon_sets.remove(name);
    }

    pub fn set_submariner(&self, submariner: Submariner) {
        self.state
            .lock()
            .unwrap()
            .submariners
            .insert(submariner.metadata.name.clone().unwrap(), Arc::new(submariner));
    }

    pub fn remove_submariner(&self, name: &str) {
        self.state.lock().unwrap().submariners.remove(name);
    }

    /// Make reads of the named deployment fail
    pub fn fail_deployment(&self, name: &str) {
        self.state.lock().unwrap().failing.insert(name.to_string());
    }

    /// Make every read panic, as a buggy pass would
    pub fn panic_on_read(&self, enabled: bool) {
        self.panicking.store(enabled, Ordering::SeqCst);
    }

    fn read<T>(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        pick: impl Fn(&ViewState) -> &HashMap<String, Arc<T>>,
    ) -> Result<Option<Arc<T>>> {
        if self.panicking.load(Ordering::SeqCst) {
            panic!("injected panic reading {} {}/{}", kind, namespace, name);
        }
        let state = self.state.lock().unwrap();
        if state.failing.contains(name) {
            return Err(Error::CacheReadError {
                kind: kind.to_string(),
                key: format!("{}/{}", namespace, name),
                message: "injected failure".to_string(),
            });
        }
        if namespace != NS {
            return Ok(None);
        }
        Ok(pick(&*state).get(name).cloned())
    }
}

impl ResourceView for FakeView {
    fn subscription(&self, namespace: &str, name: &str) -> Result<Option<Arc<Subscription>>> {
        self.read("Subscription", namespace, name, |s| &s.subscriptions)
    }

    fn deployment(&self, namespace: &str, name: &str) -> Result<Option<Arc<Deployment>>> {
        self.read("Deployment", namespace, name, |s| &s.deployments)
    }

    fn daemon_set(&self, namespace: &str, name: &str) -> Result<Option<Arc<DaemonSet>>> {
        self.read("DaemonSet", namespace, name, |s| &s.daemon_sets)
    }

    fn submariner(&self, namespace: &str, name: &str) -> Result<Option<Arc<Submariner>>> {
        self.read("Submariner", namespace, name, |s| &s.submariners)
    }
}

/// Every component present and available, CSV installed
pub fn healthy_view() -> FakeView {
    let view = FakeView::default();
    view.set_subscription(subscription("submariner.v0.12.0"));
    view.set_submariner(submariner("", ""));
    for name in WATCHED_DEPLOYMENTS {
        view.set_deployment(name, 1);
    }
    for name in WATCHED_DAEMONSETS {
        view.set_daemon_set(name, 2, 0);
    }
    view
}

struct HubState {
    addon: ManagedClusterAddOn,
    resource_version: u64,
    pending_conflicts: u32,
    get_calls: usize,
    patch_calls: usize,
}

/// In-memory hub holding one ManagedClusterAddOn
pub struct FakeStatusClient {
    state: Mutex<HubState>,
}

impl Default for FakeStatusClient {
    fn default() -> Self {
        let mut addon = ManagedClusterAddOn::new("submariner", ManagedClusterAddOnSpec::default());
        addon.metadata.namespace = Some("cluster1".to_string());
        addon.metadata.resource_version = Some("1".to_string());
        Self {
            state: Mutex::new(HubState {
                addon,
                resource_version: 1,
                pending_conflicts: 0,
                get_calls: 0,
                patch_calls: 0,
            }),
        }
    }
}

impl FakeStatusClient {
    /// Simulate concurrent writers winning the next `count` patches
    pub fn fail_next_patches(&self, count: u32) {
        self.state.lock().unwrap().pending_conflicts = count;
    }

    pub fn seed_condition(&self, condition: Condition) {
        let mut state = self.state.lock().unwrap();
        state
            .addon
            .status
            .get_or_insert_with(ManagedClusterAddOnStatus::default)
            .conditions
            .push(condition);
    }

    pub fn conditions(&self) -> Vec<Condition> {
        self.state.lock().unwrap().addon.status_or_default().conditions
    }

    pub fn get_calls(&self) -> usize {
        self.state.lock().unwrap().get_calls
    }

    pub fn patch_calls(&self) -> usize {
        self.state.lock().unwrap().patch_calls
    }
}

#[async_trait]
impl AddOnStatusClient for FakeStatusClient {
    async fn get(&self, _namespace: &str, _name: &str) -> Result<ManagedClusterAddOn> {
        let mut state = self.state.lock().unwrap();
        state.get_calls += 1;
        Ok(state.addon.clone())
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<&str>,
        status: &ManagedClusterAddOnStatus,
    ) -> Result<ManagedClusterAddOn> {
        let mut state = self.state.lock().unwrap();
        state.patch_calls += 1;

        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            state.resource_version += 1;
            let rv = state.resource_version.to_string();
            state.addon.metadata.resource_version = Some(rv);
        }

        if resource_version != state.addon.metadata.resource_version.as_deref() {
            return Err(Error::Conflict {
                name: format!("{}/{}", namespace, name),
            });
        }

        state.resource_version += 1;
        let rv = state.resource_version.to_string();
        state.addon.metadata.resource_version = Some(rv);
        state.addon.status = Some(status.clone());
        Ok(state.addon.clone())
    }
}

/// Records events in memory
#[derive(Default)]
pub struct FakeRecorder {
    events: Mutex<Vec<(String, String)>>,
}

impl FakeRecorder {
    pub fn events(&self) -> Vec<(String, String)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventRecorder for FakeRecorder {
    async fn record(&self, _target: &TargetKey, reason: &str, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((reason.to_string(), message.to_string()));
    }
}
