//! Reconciler for the Submariner agent status
//!
//! Watches the installation namespace, maps every change to the target it
//! affects and runs status passes on a bounded worker pool.

use std::fmt::Debug;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, BoxStream, Stream};
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube::{
    api::Api,
    client::Client,
    runtime::{reflector, reflector::Store, watcher, WatchStreamExt},
    Resource, ResourceExt,
};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, instrument, warn};

use crate::crd::{Submariner, Subscription};
use crate::error::{Error, Result};

use super::checks::CheckPipeline;
use super::conditions::synthesize;
use super::events::{EventRecorder, KubeEventRecorder};
use super::publisher::{AddOnStatusClient, KubeAddOnStatusClient, StatusPublisher};
use super::queue::{calculate_backoff, WorkQueue};
use super::target::{KeyRouter, TargetKey, WatchedKind};
use super::view::{ReflectorView, ResourceView};

/// Requeue base delay for transient failures
const RETRIABLE_BASE_DELAY_SECS: u64 = 5;
/// Requeue base delay for everything else
const PERMANENT_BASE_DELAY_SECS: u64 = 30;
const MAX_REQUEUE_DELAY_SECS: u64 = 300;

/// Settings for one controller instance
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Managed cluster name, which is also the hub namespace of the add-on
    pub cluster_name: String,
    pub installation_namespace: String,
    /// Name of the `Submariner` object reported on
    pub target_name: String,
    pub addon_name: String,
    pub subscription_name: String,
    pub workers: usize,
    pub max_update_attempts: u32,
    pub status_update_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cluster_name: "cluster1".to_string(),
            installation_namespace: "submariner-operator".to_string(),
            target_name: "submariner".to_string(),
            addon_name: "submariner".to_string(),
            subscription_name: "submariner".to_string(),
            workers: 2,
            max_update_attempts: 5,
            status_update_timeout: Duration::from_secs(30),
        }
    }
}

impl ControllerConfig {
    pub fn router(&self) -> KeyRouter {
        KeyRouter {
            installation_namespace: self.installation_namespace.clone(),
            target_name: self.target_name.clone(),
            subscription_name: self.subscription_name.clone(),
        }
    }
}

/// Shared state for the controller
pub struct ControllerState {
    pub config: ControllerConfig,
    pub view: Arc<dyn ResourceView>,
    pub publisher: StatusPublisher,
}

impl ControllerState {
    pub fn new(
        config: ControllerConfig,
        view: Arc<dyn ResourceView>,
        client: Arc<dyn AddOnStatusClient>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        let publisher = StatusPublisher::new(
            client,
            recorder,
            config.cluster_name.clone(),
            config.addon_name.clone(),
        )
        .with_max_attempts(config.max_update_attempts)
        .with_timeout(config.status_update_timeout);

        Self {
            config,
            view,
            publisher,
        }
    }
}

/// How a pass ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// No Subscription yet; nothing was checked
    SubscriptionMissing,
    /// The `Submariner` object is gone; nothing to report on
    TargetMissing,
    Published { changed: bool, degraded: bool },
}

/// One status pass for `key`
///
/// Checks run in a fixed order against the cache; any read error aborts the
/// pass before anything is published.
#[instrument(skip(key, ctx), fields(key = %key))]
pub async fn reconcile(key: &TargetKey, ctx: &ControllerState) -> Result<PassOutcome> {
    let config = &ctx.config;
    let namespace = config.installation_namespace.as_str();

    let Some(sub) = ctx.view.subscription(namespace, &config.subscription_name)? else {
        debug!(
            "Subscription {}/{} not found, skipping",
            namespace, config.subscription_name
        );
        return Ok(PassOutcome::SubscriptionMissing);
    };

    let pipeline = CheckPipeline::new(ctx.view.as_ref(), namespace);
    let mut signals = pipeline.required(&sub)?;

    let Some(submariner) = ctx.view.submariner(&key.namespace, &key.name)? else {
        debug!("Submariner {} not found, skipping", key);
        #[cfg(feature = "metrics")]
        super::metrics::clear_agent_degraded(&key.namespace, &key.name);
        return Ok(PassOutcome::TargetMissing);
    };
    signals.extend(pipeline.conditional(&submariner)?);

    let condition = synthesize(&signals, sub.installed_csv());
    if condition.degraded {
        info!("Submariner agent degraded: {}", condition.reason);
    }

    let changed = ctx.publisher.publish(key, &condition).await?;

    #[cfg(feature = "metrics")]
    super::metrics::set_agent_degraded(&key.namespace, &key.name, condition.degraded);

    Ok(PassOutcome::Published {
        changed,
        degraded: condition.degraded,
    })
}

/// Delay before retrying a key after its `failures`-th consecutive failure
pub fn error_policy(error: &Error, failures: u32) -> Duration {
    let base = if error.is_retriable() {
        RETRIABLE_BASE_DELAY_SECS
    } else {
        PERMANENT_BASE_DELAY_SECS
    };
    calculate_backoff(
        failures.saturating_sub(1),
        Some(base),
        Some(MAX_REQUEUE_DELAY_SECS),
    )
}

async fn worker(id: usize, queue: Arc<WorkQueue<TargetKey>>, state: Arc<ControllerState>) {
    debug!(worker = id, "Worker started");

    while let Some(key) = queue.next().await {
        let started = Instant::now();

        // A panicking pass must still release the key and keep this worker alive.
        match AssertUnwindSafe(reconcile(&key, &state)).catch_unwind().await {
            Ok(Ok(outcome)) => {
                queue.forget(&key);
                debug!(key = %key, ?outcome, "Reconciled");
            }
            Ok(Err(e)) => {
                let failures = queue.record_failure(&key);
                let delay = error_policy(&e, failures);
                error!(
                    key = %key,
                    failures,
                    "Reconciliation error, retrying in {:?}: {}",
                    delay, e
                );
                #[cfg(feature = "metrics")]
                super::metrics::inc_reconcile_error(e.metric_kind());
                queue.add_after(key.clone(), delay);
            }
            Err(_) => {
                let failures = queue.record_failure(&key);
                let delay = calculate_backoff(
                    failures.saturating_sub(1),
                    Some(PERMANENT_BASE_DELAY_SECS),
                    Some(MAX_REQUEUE_DELAY_SECS),
                );
                error!(
                    key = %key,
                    failures,
                    "Reconciliation panicked, retrying in {:?}",
                    delay
                );
                #[cfg(feature = "metrics")]
                super::metrics::inc_reconcile_error("panic");
                queue.add_after(key.clone(), delay);
            }
        }

        #[cfg(feature = "metrics")]
        super::metrics::observe_reconcile_duration_seconds(started.elapsed().as_secs_f64());
        #[cfg(not(feature = "metrics"))]
        let _ = started;

        queue.done(&key);
    }

    debug!(worker = id, "Worker stopped");
}

/// Process keys from `queue` until it is shut down
pub async fn run_workers(queue: Arc<WorkQueue<TargetKey>>, state: Arc<ControllerState>) {
    let workers = state.config.workers.max(1);
    let handles: Vec<_> = (0..workers)
        .map(|id| tokio::spawn(worker(id, queue.clone(), state.clone())))
        .collect();

    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            error!("Worker task failed: {}", e);
        }
    }
}

/// Map watch events to the targets they affect
///
/// `events` must already have been applied to `store`. Objects from the
/// initial list only become readable once the list completes, so `InitApply`
/// is ignored and `InitDone` enqueues every target backed by the store, plus
/// the configured one.
pub fn target_keys<K, S>(
    events: S,
    store: Store<K>,
    kind: WatchedKind,
    router: KeyRouter,
) -> impl Stream<Item = TargetKey>
where
    S: Stream<Item = watcher::Result<watcher::Event<K>>>,
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    events.flat_map(move |event| {
        let keys = match event {
            Ok(watcher::Event::Apply(obj)) | Ok(watcher::Event::Delete(obj)) => router
                .route(kind, obj.namespace().as_deref(), &obj.name_any())
                .into_iter()
                .collect(),
            Ok(watcher::Event::InitDone) => {
                let mut keys = vec![router.default_target()];
                for obj in store.state() {
                    if let Some(key) = router.route(kind, obj.namespace().as_deref(), &obj.name_any()) {
                        if !keys.contains(&key) {
                            keys.push(key);
                        }
                    }
                }
                debug!("{} cache synced with {} objects", kind, store.state().len());
                keys
            }
            Ok(watcher::Event::Init) | Ok(watcher::Event::InitApply(_)) => Vec::new(),
            Err(e) => {
                warn!("{} watch error: {}", kind, e);
                Vec::new()
            }
        };
        stream::iter(keys)
    })
}

/// Watch one resource kind into a new store
fn watch_keys<K>(
    api: Api<K>,
    kind: WatchedKind,
    router: KeyRouter,
) -> (Store<K>, BoxStream<'static, TargetKey>)
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
    let (store, writer) = reflector::store::<K>();
    let events = watcher(api, watcher::Config::default())
        .default_backoff()
        .reflect(writer);
    let keys = target_keys(events, store.clone(), kind, router).boxed();
    (store, keys)
}

async fn wait_for_cache<K>(store: &Store<K>, kind: WatchedKind, namespace: &str) -> Result<()>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    store
        .wait_until_ready()
        .await
        .map_err(|e| Error::CacheReadError {
            kind: kind.to_string(),
            key: namespace.to_string(),
            message: e.to_string(),
        })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                futures::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Main entry point to start the controller
///
/// `client` reaches the managed cluster, `hub_client` the hub holding the
/// ManagedClusterAddOn.
pub async fn run_controller(
    client: Client,
    hub_client: Client,
    config: ControllerConfig,
) -> Result<()> {
    let namespace = config.installation_namespace.clone();
    let router = config.router();

    info!(
        "Starting Submariner agent status controller for {} ({} workers)",
        router.default_target(),
        config.workers
    );

    let (subscriptions, subscription_keys) = watch_keys(
        Api::<Subscription>::namespaced(client.clone(), &namespace),
        WatchedKind::Subscription,
        router.clone(),
    );
    let (deployments, deployment_keys) = watch_keys(
        Api::<Deployment>::namespaced(client.clone(), &namespace),
        WatchedKind::Deployment,
        router.clone(),
    );
    let (daemon_sets, daemon_set_keys) = watch_keys(
        Api::<DaemonSet>::namespaced(client.clone(), &namespace),
        WatchedKind::DaemonSet,
        router.clone(),
    );
    let (submariners, submariner_keys) = watch_keys(
        Api::<Submariner>::namespaced(client.clone(), &namespace),
        WatchedKind::Submariner,
        router.clone(),
    );
    let changes = stream::select_all(vec![
        subscription_keys,
        deployment_keys,
        daemon_set_keys,
        submariner_keys,
    ]);

    let queue = Arc::new(WorkQueue::new());
    let feeder = {
        let queue = queue.clone();
        tokio::spawn(async move {
            let mut changes = changes;
            while let Some(key) = changes.next().await {
                queue.add(key);
            }
        })
    };

    let synced = async {
        wait_for_cache(&subscriptions, WatchedKind::Subscription, &namespace).await?;
        wait_for_cache(&deployments, WatchedKind::Deployment, &namespace).await?;
        wait_for_cache(&daemon_sets, WatchedKind::DaemonSet, &namespace).await?;
        wait_for_cache(&submariners, WatchedKind::Submariner, &namespace).await
    };
    tokio::select! {
        res = synced => {
            if let Err(e) = res {
                feeder.abort();
                return Err(e);
            }
            info!("Caches synced for namespace {}", namespace);
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received before caches synced");
            feeder.abort();
            return Ok(());
        }
    }

    let view = ReflectorView {
        subscriptions,
        deployments,
        daemon_sets,
        submariners,
    };
    let state = Arc::new(ControllerState::new(
        config,
        Arc::new(view),
        Arc::new(KubeAddOnStatusClient::new(hub_client)),
        Arc::new(KubeEventRecorder::new(client)),
    ));

    queue.add(router.default_target());
    let workers = tokio::spawn(run_workers(queue.clone(), state));

    shutdown_signal().await;
    info!("Shutdown signal received, draining workers");

    queue.shutdown();
    feeder.abort();
    if let Err(e) = workers.await {
        error!("Worker pool failed: {}", e);
    }

    info!("Controller stopped");
    Ok(())
}
