//! Read access to the locally cached resources
//!
//! Reads never block on the network: they return whatever the watch cache
//! currently holds. `Ok(None)` means the object does not exist; an `Err` is a
//! cache malfunction and aborts the pass that hit it.

use std::sync::Arc;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::runtime::reflector::{ObjectRef, Store};

use crate::crd::{Submariner, Subscription};
use crate::error::Result;

pub trait ResourceView: Send + Sync {
    fn subscription(&self, namespace: &str, name: &str) -> Result<Option<Arc<Subscription>>>;

    fn deployment(&self, namespace: &str, name: &str) -> Result<Option<Arc<Deployment>>>;

    fn daemon_set(&self, namespace: &str, name: &str) -> Result<Option<Arc<DaemonSet>>>;

    fn submariner(&self, namespace: &str, name: &str) -> Result<Option<Arc<Submariner>>>;
}

/// [`ResourceView`] backed by `kube` reflector stores
#[derive(Clone)]
pub struct ReflectorView {
    pub subscriptions: Store<Subscription>,
    pub deployments: Store<Deployment>,
    pub daemon_sets: Store<DaemonSet>,
    pub submariners: Store<Submariner>,
}

impl ResourceView for ReflectorView {
    fn subscription(&self, namespace: &str, name: &str) -> Result<Option<Arc<Subscription>>> {
        Ok(self.subscriptions.get(&ObjectRef::new(name).within(namespace)))
    }

    fn deployment(&self, namespace: &str, name: &str) -> Result<Option<Arc<Deployment>>> {
        Ok(self.deployments.get(&ObjectRef::new(name).within(namespace)))
    }

    fn daemon_set(&self, namespace: &str, name: &str) -> Result<Option<Arc<DaemonSet>>> {
        Ok(self.daemon_sets.get(&ObjectRef::new(name).within(namespace)))
    }

    fn submariner(&self, namespace: &str, name: &str) -> Result<Option<Arc<Submariner>>> {
        Ok(self.submariners.get(&ObjectRef::new(name).within(namespace)))
    }
}
