//! Unit tests for agent pod construction

#[cfg(test)]
mod tests {
    use crds::builder::{IPPoolBuilder, PodBuilder};
    use crds::IPPool;

    use crate::config::{AgentImage, ControllerOptions};
    use crate::reconciler::agent_pod::{is_pod_ready, prepare_agent_pod};
    use crate::reconciler::{
        IPPOOL_NAMESPACE_LABEL_KEY, IPPOOL_NAME_LABEL_KEY, MULTUS_NETWORKS_ANNOTATION_KEY,
        VM_DHCP_CONTROLLER_LABEL_KEY,
    };

    fn test_options() -> ControllerOptions {
        ControllerOptions {
            agent_namespace: "vm-dhcp-system".to_string(),
            agent_image: AgentImage::new("vm-dhcp-agent", "v0.3.0"),
            agent_service_account_name: "vm-dhcp-agent".to_string(),
            no_agent: false,
            no_dhcp: false,
        }
    }

    fn test_pool() -> IPPool {
        IPPoolBuilder::new("default", "net-1")
            .network_name("default/net-1")
            .cidr("192.168.0.0/24")
            .server_ip("192.168.0.2")
            .build()
    }

    #[test]
    fn test_agent_pod_metadata() {
        let pod = prepare_agent_pod(&test_pool(), &test_options(), "provider").unwrap();

        assert_eq!(pod.metadata.name.as_deref(), Some("default-net-1-agent"));
        assert_eq!(pod.metadata.namespace.as_deref(), Some("vm-dhcp-system"));

        let annotations = pod.metadata.annotations.as_ref().unwrap();
        assert_eq!(
            annotations.get(MULTUS_NETWORKS_ANNOTATION_KEY).map(String::as_str),
            Some(r#"[{"namespace":"default","name":"net-1","interface":"eth1"}]"#),
        );

        let labels = pod.metadata.labels.as_ref().unwrap();
        assert_eq!(
            labels.get(VM_DHCP_CONTROLLER_LABEL_KEY).map(String::as_str),
            Some("agent")
        );
        assert_eq!(
            labels.get(IPPOOL_NAMESPACE_LABEL_KEY).map(String::as_str),
            Some("default")
        );
        assert_eq!(
            labels.get(IPPOOL_NAME_LABEL_KEY).map(String::as_str),
            Some("net-1")
        );
    }

    #[test]
    fn test_agent_pod_node_affinity_requires_cluster_network() {
        let pod = prepare_agent_pod(&test_pool(), &test_options(), "provider").unwrap();

        let terms = &pod
            .spec
            .as_ref()
            .unwrap()
            .affinity
            .as_ref()
            .unwrap()
            .node_affinity
            .as_ref()
            .unwrap()
            .required_during_scheduling_ignored_during_execution
            .as_ref()
            .unwrap()
            .node_selector_terms;
        assert_eq!(terms.len(), 1);
        let requirement = &terms[0].match_expressions.as_ref().unwrap()[0];
        assert_eq!(requirement.key, "network.vmdhcp.io/provider");
        assert_eq!(requirement.operator, "In");
        assert_eq!(requirement.values.as_ref().unwrap(), &["true".to_string()]);
    }

    #[test]
    fn test_agent_pod_init_container_sets_server_address() {
        let pod = prepare_agent_pod(&test_pool(), &test_options(), "provider").unwrap();
        let spec = pod.spec.as_ref().unwrap();

        let init = &spec.init_containers.as_ref().unwrap()[0];
        assert_eq!(init.name, "ip-setter");
        assert_eq!(init.image.as_deref(), Some("busybox"));
        let script = &init.command.as_ref().unwrap()[2];
        assert!(script.contains("ip address flush dev eth1"));
        assert!(script.contains("ip address add 192.168.0.2/24 dev eth1"));

        let security = init.security_context.as_ref().unwrap();
        assert_eq!(security.run_as_user, Some(0));
        assert_eq!(security.run_as_group, Some(0));
        assert_eq!(
            security.capabilities.as_ref().unwrap().add.as_ref().unwrap(),
            &["NET_ADMIN".to_string()]
        );
    }

    #[test]
    fn test_agent_pod_main_container_contract() {
        let pod = prepare_agent_pod(&test_pool(), &test_options(), "provider").unwrap();
        let spec = pod.spec.as_ref().unwrap();
        assert_eq!(spec.service_account_name.as_deref(), Some("vm-dhcp-agent"));

        let agent = &spec.containers[0];
        assert_eq!(agent.name, "agent");
        assert_eq!(agent.image.as_deref(), Some("vm-dhcp-agent:v0.3.0"));
        assert_eq!(
            agent.args.as_ref().unwrap(),
            &["--ippool-ref".to_string(), "default/net-1".to_string()]
        );

        let env = &agent.env.as_ref().unwrap()[0];
        assert_eq!(env.name, "VM_DHCP_AGENT_NAME");
        assert_eq!(env.value.as_deref(), Some("default-net-1-agent"));

        let liveness = agent.liveness_probe.as_ref().unwrap();
        assert_eq!(
            liveness.http_get.as_ref().unwrap().path.as_deref(),
            Some("/healthz")
        );
        let readiness = agent.readiness_probe.as_ref().unwrap();
        assert_eq!(
            readiness.http_get.as_ref().unwrap().path.as_deref(),
            Some("/readyz")
        );
    }

    #[test]
    fn test_agent_pod_dry_run_arg() {
        let mut options = test_options();
        options.no_dhcp = true;
        let pod = prepare_agent_pod(&test_pool(), &options, "provider").unwrap();
        let args = pod.spec.as_ref().unwrap().containers[0]
            .args
            .as_ref()
            .unwrap()
            .clone();
        assert_eq!(
            args,
            vec![
                "--ippool-ref".to_string(),
                "default/net-1".to_string(),
                "--dry-run".to_string()
            ]
        );
    }

    #[test]
    fn test_agent_pod_rejects_malformed_cidr() {
        let pool = IPPoolBuilder::new("default", "net-1")
            .network_name("default/net-1")
            .cidr("not-a-network")
            .build();
        assert!(prepare_agent_pod(&pool, &test_options(), "provider").is_err());
    }

    #[test]
    fn test_is_pod_ready() {
        assert!(!is_pod_ready(&PodBuilder::new("ns", "pod").build()));
        assert!(!is_pod_ready(&PodBuilder::new("ns", "pod").ready(false).build()));
        assert!(is_pod_ready(&PodBuilder::new("ns", "pod").ready(true).build()));
    }
}
