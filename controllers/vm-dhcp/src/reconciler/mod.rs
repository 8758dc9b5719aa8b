//! Reconciliation logic for IPPool resources.
//!
//! The reconciler drives each pool through its condition lifecycle
//! (Registered, CacheReady, AgentReady, Disabled), owns agent pod
//! placement, and derives live status from the IPAM on every pass.

pub mod agent_pod;
pub mod ippool;
#[cfg(test)]
mod agent_pod_test;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cache::CacheAllocator;
use ipam::IpAllocator;

use crate::backoff::RequeueBackoff;
use crate::clients::{IpPoolClient, NadClient, PodClient};
use crate::config::ControllerOptions;

/// Annotation consumed by multus to attach the agent pod to the pool's
/// network on a secondary interface.
pub const MULTUS_NETWORKS_ANNOTATION_KEY: &str = "k8s.v1.cni.cncf.io/networks";

pub const VM_DHCP_CONTROLLER_LABEL_KEY: &str = "network.vmdhcp.io/vm-dhcp-controller";
pub const IPPOOL_NAMESPACE_LABEL_KEY: &str = "network.vmdhcp.io/ippool-namespace";
pub const IPPOOL_NAME_LABEL_KEY: &str = "network.vmdhcp.io/ippool-name";

/// Node label marking attachment to a given L2 domain; the value part of
/// the key is read from the NetworkAttachmentDefinition.
pub const CLUSTER_NETWORK_LABEL_KEY: &str = "network.vmdhcp.io/clusternetwork";

#[derive(Debug)]
struct RetryState {
    delay: RequeueBackoff,
    failures: u32,
}

impl RetryState {
    fn new() -> Self {
        Self {
            delay: RequeueBackoff::minutes(1, 10),
            failures: 0,
        }
    }
}

/// Reconciles IPPool resources into IPAM state, binding cache namespaces,
/// and agent pods.
pub struct Reconciler {
    pub(crate) options: ControllerOptions,
    pub(crate) ip_allocator: Arc<IpAllocator>,
    pub(crate) cache_allocator: Arc<CacheAllocator>,
    pub(crate) nad_client: Box<dyn NadClient>,
    pub(crate) pod_client: Box<dyn PodClient>,
    pub(crate) ippool_client: Box<dyn IpPoolClient>,
    /// Per-pool retry state, keyed by "namespace/name".
    retry_states: Mutex<HashMap<String, RetryState>>,
}

impl Reconciler {
    pub fn new(
        options: ControllerOptions,
        ip_allocator: Arc<IpAllocator>,
        cache_allocator: Arc<CacheAllocator>,
        nad_client: Box<dyn NadClient>,
        pod_client: Box<dyn PodClient>,
        ippool_client: Box<dyn IpPoolClient>,
    ) -> Self {
        Self {
            options,
            ip_allocator,
            cache_allocator,
            nad_client,
            pod_client,
            ippool_client,
            retry_states: Mutex::new(HashMap::new()),
        }
    }

    /// Advances the retry pacing for a pool and returns the delay to wait
    /// along with the consecutive failure count.
    pub fn next_retry(&self, key: &str) -> (Duration, u32) {
        let mut states = self.retry_states.lock().unwrap();
        let state = states.entry(key.to_string()).or_insert_with(RetryState::new);
        state.failures += 1;
        (state.delay.advance(), state.failures)
    }

    /// Clears the retry state after a clean pass.
    pub fn clear_retries(&self, key: &str) {
        self.retry_states.lock().unwrap().remove(key);
    }
}
