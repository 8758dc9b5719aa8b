//! IPPool watch loop.
//!
//! Drives the reconciler through `kube_runtime::Controller`. The extra
//! `watches` edge translates agent pod events back into the owning pool's
//! key via the pod labels; it is the only channel that propagates agent
//! readiness into pool status. Deletion runs through a finalizer so the
//! agent pod and the IPAM subnet are torn down before the pool goes away.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig, Controller};
use kube_runtime::finalizer::{finalizer, Error as FinalizerError, Event};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use tracing::{debug, error, info};

use crds::IPPool;

use crate::error::ControllerError;
use crate::reconciler::{
    Reconciler, IPPOOL_NAMESPACE_LABEL_KEY, IPPOOL_NAME_LABEL_KEY, VM_DHCP_CONTROLLER_LABEL_KEY,
};

pub const IPPOOL_FINALIZER: &str = "network.vmdhcp.io/ippool";

/// Safety resync for pools that received no events for a long time.
const RESYNC_PERIOD: Duration = Duration::from_secs(3600);

struct Context {
    client: Client,
    reconciler: Arc<Reconciler>,
}

pub async fn watch_ip_pools(
    client: Client,
    reconciler: Arc<Reconciler>,
    ippool_api: Api<IPPool>,
    agent_pod_api: Api<Pod>,
) -> Result<(), ControllerError> {
    info!("starting ippool watcher");

    let context = Arc::new(Context { client, reconciler });
    let agent_selector = format!("{VM_DHCP_CONTROLLER_LABEL_KEY}=agent");
    let controller_config = ControllerConfig::default()
        .debounce(Duration::from_secs(1))
        .concurrency(5);

    Controller::new(ippool_api, watcher::Config::default())
        .with_config(controller_config)
        .watches(
            agent_pod_api,
            watcher::Config::default().labels(&agent_selector),
            owning_pool,
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((pool, _)) => debug!("reconciled ippool {:?}", pool),
                Err(e) => error!("ippool controller error: {}", e),
            }
        })
        .await;

    Ok(())
}

/// Maps an agent pod event to the owning pool's key.
fn owning_pool(pod: Pod) -> Option<ObjectRef<IPPool>> {
    let labels = pod.metadata.labels.as_ref()?;
    let namespace = labels.get(IPPOOL_NAMESPACE_LABEL_KEY)?;
    let name = labels.get(IPPOOL_NAME_LABEL_KEY)?;
    Some(ObjectRef::new(name).within(namespace))
}

async fn reconcile(
    pool: Arc<IPPool>,
    ctx: Arc<Context>,
) -> Result<Action, FinalizerError<ControllerError>> {
    let namespace = pool.namespace().unwrap_or_default();
    let key = format!("{}/{}", namespace, pool.name_any());
    let api: Api<IPPool> = Api::namespaced(ctx.client.clone(), &namespace);

    let reconciler = ctx.reconciler.clone();
    let result = finalizer(&api, IPPOOL_FINALIZER, pool, |event| async move {
        match event {
            Event::Apply(pool) => {
                reconciler.reconcile_ip_pool(&pool).await?;
                Ok(Action::requeue(RESYNC_PERIOD))
            }
            Event::Cleanup(pool) => {
                reconciler.cleanup_ip_pool(&pool).await?;
                Ok(Action::await_change())
            }
        }
    })
    .await;

    if result.is_ok() {
        ctx.reconciler.clear_retries(&key);
    }
    result
}

fn error_policy(
    pool: Arc<IPPool>,
    error: &FinalizerError<ControllerError>,
    ctx: Arc<Context>,
) -> Action {
    let key = format!("{}/{}", pool.namespace().unwrap_or_default(), pool.name_any());
    let (delay, failures) = ctx.reconciler.next_retry(&key);
    error!(
        "reconciliation of ippool {} failed (attempt {}), retrying in {}s: {}",
        key,
        failures,
        delay.as_secs(),
        error
    );
    Action::requeue(delay)
}
