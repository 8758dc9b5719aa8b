//! Fluent builders for test fixtures.
//!
//! Shared by the unit tests across the workspace so pool, NAD, and pod
//! objects can be assembled piecewise without spelling out full structs.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Pod, PodCondition, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::condition::{ConditionStatus, IPPoolConditionType};
use crate::ip_pool::{IPPool, IPPoolSpec, IPv4Config, IPv4Status, PodReference};
use crate::nad::{NetworkAttachmentDefinition, NetworkAttachmentDefinitionSpec};

pub struct IPPoolBuilder {
    ip_pool: IPPool,
}

impl IPPoolBuilder {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            ip_pool: IPPool {
                metadata: ObjectMeta {
                    namespace: Some(namespace.to_string()),
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                spec: IPPoolSpec {
                    network_name: String::new(),
                    paused: None,
                    ipv4: IPv4Config::default(),
                },
                status: None,
            },
        }
    }

    pub fn network_name(mut self, network_name: &str) -> Self {
        self.ip_pool.spec.network_name = network_name.to_string();
        self
    }

    pub fn paused(mut self) -> Self {
        self.ip_pool.spec.paused = Some(true);
        self
    }

    pub fn unpaused(mut self) -> Self {
        self.ip_pool.spec.paused = Some(false);
        self
    }

    pub fn cidr(mut self, cidr: &str) -> Self {
        self.ip_pool.spec.ipv4.cidr = cidr.to_string();
        self
    }

    pub fn server_ip(mut self, server_ip: &str) -> Self {
        self.ip_pool.spec.ipv4.server_ip = server_ip.to_string();
        self
    }

    pub fn router(mut self, router: &str) -> Self {
        self.ip_pool.spec.ipv4.router = Some(router.to_string());
        self
    }

    pub fn pool_range(mut self, start: &str, end: &str) -> Self {
        self.ip_pool.spec.ipv4.pool.start = (!start.is_empty()).then(|| start.to_string());
        self.ip_pool.spec.ipv4.pool.end = (!end.is_empty()).then(|| end.to_string());
        self
    }

    pub fn exclude<'a>(mut self, addresses: impl IntoIterator<Item = &'a str>) -> Self {
        self.ip_pool
            .spec
            .ipv4
            .pool
            .exclude
            .extend(addresses.into_iter().map(String::from));
        self
    }

    pub fn agent_pod_ref(mut self, namespace: &str, name: &str) -> Self {
        self.status_mut().agent_pod_ref = Some(PodReference {
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
        self
    }

    pub fn allocated(mut self, ip: &str, mac: &str) -> Self {
        self.ipv4_status_mut()
            .allocated
            .insert(ip.to_string(), mac.to_string());
        self
    }

    pub fn used(mut self, count: u32) -> Self {
        self.ipv4_status_mut().used = count;
        self
    }

    pub fn available(mut self, count: u32) -> Self {
        self.ipv4_status_mut().available = count;
        self
    }

    pub fn condition(
        mut self,
        type_: IPPoolConditionType,
        status: ConditionStatus,
        reason: &str,
        message: &str,
    ) -> Self {
        self.status_mut()
            .set_condition(type_, status, reason, message);
        self
    }

    pub fn build(self) -> IPPool {
        self.ip_pool
    }

    fn status_mut(&mut self) -> &mut crate::ip_pool::IPPoolStatus {
        self.ip_pool.status.get_or_insert_with(Default::default)
    }

    fn ipv4_status_mut(&mut self) -> &mut IPv4Status {
        self.status_mut().ipv4.get_or_insert_with(IPv4Status::default)
    }
}

pub struct NetworkAttachmentDefinitionBuilder {
    nad: NetworkAttachmentDefinition,
}

impl NetworkAttachmentDefinitionBuilder {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            nad: NetworkAttachmentDefinition {
                metadata: ObjectMeta {
                    namespace: Some(namespace.to_string()),
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                spec: NetworkAttachmentDefinitionSpec::default(),
            },
        }
    }

    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.nad
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> NetworkAttachmentDefinition {
        self.nad
    }
}

pub struct PodBuilder {
    pod: Pod,
}

impl PodBuilder {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            pod: Pod {
                metadata: ObjectMeta {
                    namespace: Some(namespace.to_string()),
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    pub fn ready(mut self, ready: bool) -> Self {
        let status = self.pod.status.get_or_insert_with(PodStatus::default);
        let conditions = status.conditions.get_or_insert_with(Vec::new);
        let value = if ready { "True" } else { "False" };
        match conditions.iter_mut().find(|c| c.type_ == "Ready") {
            Some(condition) => condition.status = value.to_string(),
            None => conditions.push(PodCondition {
                type_: "Ready".to_string(),
                status: value.to_string(),
                ..Default::default()
            }),
        }
        self
    }

    pub fn build(self) -> Pod {
        self.pod
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EXCLUDED_MARK;

    #[test]
    fn test_ip_pool_builder() {
        let pool = IPPoolBuilder::new("default", "net-1")
            .network_name("default/net-1")
            .cidr("192.168.0.0/24")
            .server_ip("192.168.0.2")
            .pool_range("192.168.0.10", "192.168.0.20")
            .exclude(["192.168.0.15"])
            .allocated("192.168.0.15", EXCLUDED_MARK)
            .used(0)
            .available(10)
            .build();

        assert_eq!(pool.metadata.name.as_deref(), Some("net-1"));
        assert_eq!(pool.spec.ipv4.pool.start.as_deref(), Some("192.168.0.10"));
        let ipv4 = pool.status.unwrap().ipv4.unwrap();
        assert_eq!(ipv4.available, 10);
        assert_eq!(
            ipv4.allocated.get("192.168.0.15").map(String::as_str),
            Some(EXCLUDED_MARK)
        );
    }

    #[test]
    fn test_pool_range_keeps_excludes() {
        let pool = IPPoolBuilder::new("default", "net-1")
            .exclude(["192.168.0.15"])
            .pool_range("192.168.0.10", "")
            .build();
        assert_eq!(pool.spec.ipv4.pool.exclude.len(), 1);
        assert!(pool.spec.ipv4.pool.end.is_none());
    }

    #[test]
    fn test_pod_builder_ready_flips_existing_condition() {
        let pod = PodBuilder::new("default", "agent").ready(false).ready(true).build();
        let conditions = pod.status.unwrap().conditions.unwrap();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].status, "True");
    }
}
