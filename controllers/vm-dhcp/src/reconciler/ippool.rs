//! IPPool reconcile pass and the condition handlers behind it.

use std::net::Ipv4Addr;

use chrono::Utc;
use ipam::IpamError;
use ipnet::Ipv4Net;
use tracing::{debug, info, warn};

use crds::{
    split_network_name, ConditionStatus, IPPool, IPPoolConditionType, IPPoolStatus, PodReference,
    EXCLUDED_MARK, SERVER_MARK,
};

use super::agent_pod::{is_pod_ready, prepare_agent_pod};
use super::Reconciler;
use crate::error::{is_already_exists, is_not_found, ControllerError};

impl Reconciler {
    /// One convergence pass over a pool: run the condition handlers,
    /// derive status from the IPAM, and write it back when it changed.
    ///
    /// Handlers are idempotent and fail soft; a failed handler leaves its
    /// condition False with the error as message and the pass still writes
    /// whatever was derived before returning the error for requeue.
    pub async fn reconcile_ip_pool(&self, pool: &IPPool) -> Result<(), ControllerError> {
        let name = pool
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| ControllerError::InvalidConfig("IPPool missing name".to_string()))?;
        let namespace = pool.metadata.namespace.as_deref().unwrap_or("default");
        let network_name = &pool.spec.network_name;

        debug!("reconciling ippool {}/{}", namespace, name);

        let observed = pool.status.clone().unwrap_or_default();
        let mut status = observed.clone();
        let mut first_err: Option<ControllerError> = None;
        let mut record = |err: ControllerError| -> String {
            let message = err.to_string();
            first_err.get_or_insert(err);
            message
        };

        if pool.spec.paused.unwrap_or(false) {
            status.set_condition(
                IPPoolConditionType::Disabled,
                ConditionStatus::True,
                "Paused",
                format!("reconciliation of ippool {namespace}/{name} is paused"),
            );
        } else {
            status.set_condition(
                IPPoolConditionType::Disabled,
                ConditionStatus::False,
                "",
                "",
            );

            match self.deploy_agent(pool, &mut status).await {
                Ok(()) => status.set_condition(
                    IPPoolConditionType::Registered,
                    ConditionStatus::True,
                    "",
                    "",
                ),
                Err(e) => {
                    let message = record(e);
                    status.set_condition(
                        IPPoolConditionType::Registered,
                        ConditionStatus::False,
                        "",
                        message,
                    );
                }
            }

            match self.build_cache(pool, &status).await {
                Ok(()) => status.set_condition(
                    IPPoolConditionType::CacheReady,
                    ConditionStatus::True,
                    "",
                    "",
                ),
                Err(e) => {
                    let message = record(e);
                    status.set_condition(
                        IPPoolConditionType::CacheReady,
                        ConditionStatus::False,
                        "",
                        message,
                    );
                }
            }

            match self.monitor_agent(pool, &status).await {
                Ok(()) => status.set_condition(
                    IPPoolConditionType::AgentReady,
                    ConditionStatus::True,
                    "",
                    "",
                ),
                Err(e) => {
                    let message = record(e);
                    status.set_condition(
                        IPPoolConditionType::AgentReady,
                        ConditionStatus::False,
                        "",
                        message,
                    );
                }
            }
        }

        // Status derivation. The IPAM is the source of the counters; the
        // persisted status is only ever extended with the exclusion and
        // server markers here.
        if !self.ip_allocator.is_initialized(network_name) {
            warn!("ipam for ippool {}/{} is not initialized", namespace, name);
            status.set_condition(
                IPPoolConditionType::CacheReady,
                ConditionStatus::False,
                "NotInitialized",
                "",
            );
            self.write_status_if_changed(pool, &observed, status).await?;
            return first_err.map_or(Ok(()), Err);
        }

        let mut ipv4 = status.ipv4.clone().unwrap_or_default();
        let (range_start, range_end) = self.ip_allocator.range(network_name)?;

        // The server reservation tracks spec.ipv4.serverIP across updates:
        // a moved or removed server releases the old address before the
        // current one is pinned and bound. A half-built pool (no cache
        // namespace yet) skips this until the next rebuild.
        if self.cache_allocator.has_ns(network_name) {
            let desired_server = match pool.spec.ipv4.server_ip.parse::<Ipv4Addr>() {
                Ok(ip) if ip >= range_start && ip <= range_end => Some(ip),
                _ => None,
            };
            let desired_key = desired_server.map(|ip| ip.to_string());
            let stale_servers: Vec<String> = ipv4
                .allocated
                .iter()
                .filter(|(ip, mac)| {
                    mac.as_str() == SERVER_MARK && desired_key.as_deref() != Some(ip.as_str())
                })
                .map(|(ip, _)| ip.clone())
                .collect();
            for ip in stale_servers {
                let addr = parse_ipv4("allocated", &ip)?;
                match self.ip_allocator.release(network_name, addr) {
                    Ok(()) | Err(IpamError::NotAllocated(_)) => {}
                    Err(e) => return Err(e.into()),
                }
                ipv4.allocated.remove(&ip);
                info!(
                    "server reservation for ip {} was released in ipam {}",
                    addr, network_name
                );
            }
            match desired_server {
                Some(server_ip) => {
                    if !ipv4.allocated.contains_key(&server_ip.to_string()) {
                        self.ip_allocator.allocate(network_name, server_ip)?;
                        ipv4.allocated
                            .insert(server_ip.to_string(), SERVER_MARK.to_string());
                    }
                    self.cache_allocator.bind_server(network_name, server_ip)?;
                }
                None => self.cache_allocator.unbind_server(network_name)?,
            }
        }

        ipv4.used = self.ip_allocator.used(network_name)?;
        ipv4.available = self.ip_allocator.available(network_name)?;

        for exclude in &pool.spec.ipv4.pool.exclude {
            if let Ok(ip) = exclude.parse::<Ipv4Addr>() {
                if ip >= range_start && ip <= range_end {
                    ipv4.allocated
                        .insert(ip.to_string(), EXCLUDED_MARK.to_string());
                }
            }
        }
        status.ipv4 = Some(ipv4);

        self.write_status_if_changed(pool, &observed, status).await?;
        first_err.map_or(Ok(()), Err)
    }

    /// Tears down everything owned by a deleted pool: the agent pod, if
    /// one was launched, then the IPAM subnet. The binding cache namespace
    /// is dropped by the agent's own teardown.
    pub async fn cleanup_ip_pool(&self, pool: &IPPool) -> Result<(), ControllerError> {
        let (namespace, name) = pool_key(pool);
        debug!("ippool configuration {}/{} has been removed", namespace, name);

        if !self.options.no_agent {
            if let Some(pod_ref) = pool.status.as_ref().and_then(|s| s.agent_pod_ref.as_ref()) {
                info!(
                    "remove the backing agent {}/{} for ippool {}/{}",
                    pod_ref.namespace, pod_ref.name, namespace, name
                );
                match self.pod_client.delete(&pod_ref.namespace, &pod_ref.name).await {
                    Ok(()) => {}
                    Err(e) if is_not_found(&e) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.ip_allocator.delete_subnet(&pool.spec.network_name);

        Ok(())
    }

    /// Registered handler: launches the agent pod for the pool and records
    /// the reference in status. An agent that already exists is success;
    /// the existing pod is never overwritten.
    async fn deploy_agent(
        &self,
        pool: &IPPool,
        status: &mut IPPoolStatus,
    ) -> Result<(), ControllerError> {
        let (namespace, name) = pool_key(pool);
        debug!("deploy agent for ippool {}/{}", namespace, name);

        if self.options.no_agent {
            return Ok(());
        }

        let (nad_namespace, nad_name) = split_network_name(&pool.spec.network_name);
        let nad = self.nad_client.get(nad_namespace, nad_name).await?;
        let cluster_network = nad
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(super::CLUSTER_NETWORK_LABEL_KEY))
            .cloned()
            .ok_or_else(|| {
                ControllerError::MissingClusterNetwork(pool.spec.network_name.clone())
            })?;

        let agent = prepare_agent_pod(pool, &self.options, &cluster_network)?;
        match self.pod_client.create(&agent).await {
            Ok(agent_pod) => {
                info!("agent for ippool {}/{} has been deployed", namespace, name);
                status.agent_pod_ref = Some(PodReference {
                    namespace: agent_pod.metadata.namespace.unwrap_or_default(),
                    name: agent_pod.metadata.name.unwrap_or_default(),
                });
                Ok(())
            }
            Err(e) if is_already_exists(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// CacheReady handler: builds the IPAM subnet and binding cache
    /// namespace from spec plus persisted status. One-shot while the
    /// condition holds True; a retried build starts from a clean subnet so
    /// a partial failure cannot leave stale state behind.
    async fn build_cache(&self, pool: &IPPool, status: &IPPoolStatus) -> Result<(), ControllerError> {
        let (namespace, name) = pool_key(pool);
        debug!("build ipam for ippool {}/{}", namespace, name);

        if status.is_condition_true(IPPoolConditionType::CacheReady) {
            return Ok(());
        }

        let network_name = &pool.spec.network_name;
        let ipv4 = &pool.spec.ipv4;
        let cidr: Ipv4Net = ipv4.cidr.parse().map_err(|_| {
            ControllerError::InvalidConfig(format!("cidr {} is not a valid network", ipv4.cidr))
        })?;
        let start = parse_opt_ipv4("start", ipv4.pool.start.as_deref())?;
        let end = parse_opt_ipv4("end", ipv4.pool.end.as_deref())?;

        info!("initialize ipam for ippool {}/{}", namespace, name);
        self.ip_allocator.delete_subnet(network_name);
        self.ip_allocator.new_subnet(network_name, cidr, start, end)?;
        let (range_start, range_end) = self.ip_allocator.range(network_name)?;

        // Withhold the operator-excluded addresses; excludes outside the
        // allocatable range are inert.
        for exclude in &ipv4.pool.exclude {
            let ip = parse_ipv4("excluded", exclude)?;
            if ip < range_start || ip > range_end {
                continue;
            }
            self.ip_allocator.revoke(network_name, ip)?;
            info!("excluded ip {} was revoked in ipam {}", ip, network_name);
        }

        // Rehydrate prior allocations from persisted status. A conflict
        // here means the persisted allocation map is corrupt and aborts
        // the build with the allocator's reason.
        let allocated = pool
            .status
            .as_ref()
            .and_then(|s| s.ipv4.as_ref())
            .map(|s| &s.allocated);
        if let Some(allocated) = allocated {
            for (ip, mac) in allocated {
                if mac == EXCLUDED_MARK {
                    continue;
                }
                let ip = parse_ipv4("allocated", ip)?;
                self.ip_allocator.allocate(network_name, ip)?;
                info!(
                    "previously allocated ip {} was re-allocated in ipam {}",
                    ip, network_name
                );
            }
        }

        self.cache_allocator.delete_ns(network_name);
        self.cache_allocator.new_ns(network_name)?;

        info!(
            "ipam and cache {} for ippool {}/{} have been initialized",
            network_name, namespace, name
        );

        Ok(())
    }

    /// AgentReady handler: True iff the launched agent pod reports Ready.
    async fn monitor_agent(
        &self,
        pool: &IPPool,
        status: &IPPoolStatus,
    ) -> Result<(), ControllerError> {
        let (namespace, name) = pool_key(pool);
        debug!("monitor agent for ippool {}/{}", namespace, name);

        if self.options.no_agent {
            return Ok(());
        }

        let pod_ref = status
            .agent_pod_ref
            .as_ref()
            .ok_or_else(|| ControllerError::AgentNotDeployed(format!("{namespace}/{name}")))?;

        let agent_pod = self.pod_client.get(&pod_ref.namespace, &pod_ref.name).await?;
        if !is_pod_ready(&agent_pod) {
            return Err(ControllerError::AgentNotReady(format!("{namespace}/{name}")));
        }

        Ok(())
    }

    async fn write_status_if_changed(
        &self,
        pool: &IPPool,
        observed: &IPPoolStatus,
        mut status: IPPoolStatus,
    ) -> Result<(), ControllerError> {
        if status.same_ignoring_last_update(observed) {
            return Ok(());
        }
        let (namespace, name) = pool_key(pool);
        info!("update ippool {}/{}", namespace, name);
        status.last_update = Some(Utc::now());
        let mut updated = pool.clone();
        updated.status = Some(status);
        self.ippool_client.update_status(&updated).await?;
        Ok(())
    }
}

fn pool_key(pool: &IPPool) -> (&str, &str) {
    (
        pool.metadata.namespace.as_deref().unwrap_or("default"),
        pool.metadata.name.as_deref().unwrap_or_default(),
    )
}

fn parse_ipv4(field: &str, value: &str) -> Result<Ipv4Addr, ControllerError> {
    value.parse().map_err(|_| {
        ControllerError::InvalidConfig(format!("{field} ip {value} is not a valid address"))
    })
}

fn parse_opt_ipv4(field: &str, value: Option<&str>) -> Result<Option<Ipv4Addr>, ControllerError> {
    match value {
        Some(v) if !v.is_empty() => parse_ipv4(field, v).map(Some),
        _ => Ok(None),
    }
}
