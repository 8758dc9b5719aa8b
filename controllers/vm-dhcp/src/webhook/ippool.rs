//! IPPool admission validator.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crds::{split_network_name, IPPool, EXCLUDED_MARK};

use super::ValidationError;
use crate::clients::NadClient;
use crate::error::api_error_message;

/// Static checks on a pool declaration against CIDR arithmetic and the
/// live network-attachment records. Never mutates the candidate.
pub struct Validator {
    nad_client: Box<dyn NadClient>,
}

impl Validator {
    pub fn new(nad_client: Box<dyn NadClient>) -> Self {
        Self { nad_client }
    }

    pub async fn create(&self, pool: &IPPool) -> Result<(), ValidationError> {
        self.validate(pool, None).await
    }

    pub async fn update(&self, old_pool: &IPPool, new_pool: &IPPool) -> Result<(), ValidationError> {
        self.validate(new_pool, Some(old_pool)).await
    }

    async fn validate(
        &self,
        pool: &IPPool,
        old_pool: Option<&IPPool>,
    ) -> Result<(), ValidationError> {
        let namespace = pool.metadata.namespace.as_deref().unwrap_or_default();
        let name = pool.metadata.name.as_deref().unwrap_or_default();
        let reject = |cause: String| ValidationError::new(namespace, name, cause);

        // The referenced network attachment must exist.
        let (nad_namespace, nad_name) = split_network_name(&pool.spec.network_name);
        self.nad_client
            .get(nad_namespace, nad_name)
            .await
            .map_err(|e| reject(api_error_message(&e)))?;

        let ipv4 = &pool.spec.ipv4;
        let cidr: Ipv4Net = ipv4
            .cidr
            .parse()
            .map_err(|_| reject(format!("cidr {} is not a valid network", ipv4.cidr)))?;
        let network_ip = cidr.network();
        let broadcast_ip = cidr.broadcast();

        if !ipv4.server_ip.is_empty() {
            let server_ip: Ipv4Addr = ipv4.server_ip.parse().map_err(|_| {
                reject(format!(
                    "server ip {} is not a valid address",
                    ipv4.server_ip
                ))
            })?;
            if !cidr.contains(&server_ip) {
                return Err(reject(format!("server ip {server_ip} is not within subnet")));
            }
            if server_ip == network_ip {
                return Err(reject(format!(
                    "server ip {server_ip} cannot be the same as network ip"
                )));
            }
            if server_ip == broadcast_ip {
                return Err(reject(format!(
                    "server ip {server_ip} cannot be the same as broadcast ip"
                )));
            }
            if ipv4.router.as_deref() == Some(ipv4.server_ip.as_str()) {
                return Err(reject(format!(
                    "server ip {server_ip} cannot be the same as router ip"
                )));
            }
            // On update, a moved server address must not land on an
            // address that is already leased out.
            if let Some(old_pool) = old_pool {
                if old_pool.spec.ipv4.server_ip != ipv4.server_ip {
                    let holder = pool
                        .status
                        .as_ref()
                        .and_then(|s| s.ipv4.as_ref())
                        .and_then(|s| s.allocated.get(&server_ip.to_string()));
                    if holder.is_some_and(|mac| mac != EXCLUDED_MARK) {
                        return Err(reject(format!(
                            "server ip {server_ip} is already allocated"
                        )));
                    }
                }
            }
        }

        if let Some(router) = ipv4.router.as_deref().filter(|r| !r.is_empty()) {
            let router_ip: Ipv4Addr = router
                .parse()
                .map_err(|_| reject(format!("router ip {router} is not a valid address")))?;
            if !cidr.contains(&router_ip) {
                return Err(reject(format!("router ip {router_ip} is not within subnet")));
            }
            if router_ip == network_ip {
                return Err(reject(format!(
                    "router ip {router_ip} is the same as network ip"
                )));
            }
            if router_ip == broadcast_ip {
                return Err(reject(format!(
                    "router ip {router_ip} is the same as broadcast ip"
                )));
            }
        }

        for (field, value) in [("start", &ipv4.pool.start), ("end", &ipv4.pool.end)] {
            let Some(addr) = value.as_deref().filter(|v| !v.is_empty()) else {
                continue;
            };
            let ip: Ipv4Addr = addr
                .parse()
                .map_err(|_| reject(format!("{field} ip {addr} is not a valid address")))?;
            if !cidr.contains(&ip) {
                return Err(reject(format!("{field} ip {ip} is not within subnet")));
            }
            if ip == network_ip {
                return Err(reject(format!("{field} ip {ip} is the same as network ip")));
            }
            if ip == broadcast_ip {
                return Err(reject(format!(
                    "{field} ip {ip} is the same as broadcast ip"
                )));
            }
        }

        Ok(())
    }
}
