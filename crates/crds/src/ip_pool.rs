//! IPPool CRD
//!
//! Declares one DHCP-served IPv4 subnet on a virtual network. The spec is
//! user-authored; the status is written exclusively by the controller and
//! is the only cross-restart source of truth for allocations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::{
    find_condition, set_condition, Condition, ConditionStatus, IPPoolConditionType,
};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "network.vmdhcp.io",
    version = "v1alpha1",
    kind = "IPPool",
    namespaced,
    status = "IPPoolStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct IPPoolSpec {
    /// "namespace/name" reference to the NetworkAttachmentDefinition the
    /// pool serves.
    pub network_name: String,

    /// Disables reconciliation when true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,

    pub ipv4: IPv4Config,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IPv4Config {
    /// Network in CIDR form; defines the network and broadcast addresses.
    pub cidr: String,

    /// The DHCP server address.
    #[serde(rename = "serverIP", default, skip_serializing_if = "String::is_empty")]
    pub server_ip: String,

    /// Optional gateway address handed out in leases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router: Option<String>,

    #[serde(default)]
    pub pool: PoolRange,
}

/// Inclusive allocatable range inside the CIDR, with operator-withheld
/// addresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PoolRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IPPoolStatus {
    /// The launched agent workload, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_pod_ref: Option<PodReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<IPv4Status>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Timestamp of the last status mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IPv4Status {
    pub used: u32,

    pub available: u32,

    /// IP to MAC, with the reserved markers `EXCLUDED` and `SERVER` in MAC
    /// position for withheld addresses and the in-range server address.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub allocated: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodReference {
    pub namespace: String,
    pub name: String,
}

impl IPPoolStatus {
    pub fn set_condition(
        &mut self,
        type_: IPPoolConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) {
        set_condition(
            &mut self.conditions,
            Condition::new(type_, status, reason, message),
        );
    }

    pub fn condition(&self, type_: IPPoolConditionType) -> Option<&Condition> {
        find_condition(&self.conditions, type_)
    }

    pub fn is_condition_true(&self, type_: IPPoolConditionType) -> bool {
        self.condition(type_)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Structural equality excluding `last_update`. The reconciler compares
    /// derived status against observed status with this before writing, so
    /// the write timestamp itself never causes another write.
    pub fn same_ignoring_last_update(&self, other: &IPPoolStatus) -> bool {
        self.agent_pod_ref == other.agent_pod_ref
            && self.ipv4 == other.ipv4
            && self.conditions == other.conditions
    }
}
