//! Agent pod construction.
//!
//! The pod is the controller's half of the agent contract: a multus
//! annotation attaching eth1 to the pool's network, node affinity pinning
//! it to nodes on the pool's cluster network, an init container that puts
//! the server address on eth1, and the agent container itself.

use std::collections::BTreeMap;

use ipnet::Ipv4Net;
use k8s_openapi::api::core::v1::{
    Affinity, Capabilities, Container, EnvVar, HTTPGetAction, NodeAffinity, NodeSelector,
    NodeSelectorRequirement, NodeSelectorTerm, Pod, PodSpec, Probe, SecurityContext,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::Serialize;

use crds::{split_network_name, IPPool, GROUP};

use super::{
    IPPOOL_NAMESPACE_LABEL_KEY, IPPOOL_NAME_LABEL_KEY, MULTUS_NETWORKS_ANNOTATION_KEY,
    VM_DHCP_CONTROLLER_LABEL_KEY,
};
use crate::config::ControllerOptions;
use crate::error::ControllerError;

#[derive(Serialize)]
struct Network<'a> {
    namespace: &'a str,
    name: &'a str,
    interface: &'a str,
}

pub fn prepare_agent_pod(
    pool: &IPPool,
    options: &ControllerOptions,
    cluster_network: &str,
) -> Result<Pod, ControllerError> {
    let pool_namespace = pool.metadata.namespace.as_deref().unwrap_or("default");
    let pool_name = pool.metadata.name.as_deref().unwrap_or_default();
    let name = format!("{pool_namespace}-{pool_name}-agent");

    let (nad_namespace, nad_name) = split_network_name(&pool.spec.network_name);
    let networks = serde_json::to_string(&[Network {
        namespace: nad_namespace,
        name: nad_name,
        interface: "eth1",
    }])?;

    let cidr: Ipv4Net = pool.spec.ipv4.cidr.parse().map_err(|_| {
        ControllerError::InvalidConfig(format!(
            "cidr {} is not a valid network",
            pool.spec.ipv4.cidr
        ))
    })?;
    let set_ip_addr_script = format!(
        r#"#!/usr/bin/env sh
set -ex

ip address flush dev eth1
ip address add {}/{} dev eth1
"#,
        pool.spec.ipv4.server_ip,
        cidr.prefix_len()
    );

    let mut args = vec![
        "--ippool-ref".to_string(),
        format!("{pool_namespace}/{pool_name}"),
    ];
    if options.no_dhcp {
        args.push("--dry-run".to_string());
    }

    Ok(Pod {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(options.agent_namespace.clone()),
            annotations: Some(BTreeMap::from([(
                MULTUS_NETWORKS_ANNOTATION_KEY.to_string(),
                networks,
            )])),
            labels: Some(BTreeMap::from([
                (
                    VM_DHCP_CONTROLLER_LABEL_KEY.to_string(),
                    "agent".to_string(),
                ),
                (
                    IPPOOL_NAMESPACE_LABEL_KEY.to_string(),
                    pool_namespace.to_string(),
                ),
                (IPPOOL_NAME_LABEL_KEY.to_string(), pool_name.to_string()),
            ])),
            ..Default::default()
        },
        spec: Some(PodSpec {
            affinity: Some(Affinity {
                node_affinity: Some(NodeAffinity {
                    required_during_scheduling_ignored_during_execution: Some(NodeSelector {
                        node_selector_terms: vec![NodeSelectorTerm {
                            match_expressions: Some(vec![NodeSelectorRequirement {
                                key: format!("{GROUP}/{cluster_network}"),
                                operator: "In".to_string(),
                                values: Some(vec!["true".to_string()]),
                            }]),
                            ..Default::default()
                        }],
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            service_account_name: Some(options.agent_service_account_name.clone()),
            init_containers: Some(vec![Container {
                name: "ip-setter".to_string(),
                image: Some("busybox".to_string()),
                command: Some(vec![
                    "/bin/sh".to_string(),
                    "-c".to_string(),
                    set_ip_addr_script,
                ]),
                security_context: Some(agent_security_context()),
                ..Default::default()
            }]),
            containers: vec![Container {
                name: "agent".to_string(),
                image: Some(options.agent_image.to_string()),
                args: Some(args),
                env: Some(vec![EnvVar {
                    name: "VM_DHCP_AGENT_NAME".to_string(),
                    value: Some(name),
                    ..Default::default()
                }]),
                security_context: Some(agent_security_context()),
                liveness_probe: Some(http_probe("/healthz")),
                readiness_probe: Some(http_probe("/readyz")),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn agent_security_context() -> SecurityContext {
    SecurityContext {
        run_as_user: Some(0),
        run_as_group: Some(0),
        capabilities: Some(Capabilities {
            add: Some(vec!["NET_ADMIN".to_string()]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn http_probe(path: &str) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(8080),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}
