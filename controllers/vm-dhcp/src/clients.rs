//! Kubernetes client surfaces used by the reconciler and the admission
//! validator.
//!
//! The reconciler only ever touches three narrow slices of the cluster:
//! NetworkAttachmentDefinition lookups, agent pod lifecycle, and IPPool
//! status writes. Each slice sits behind a trait so unit tests can swap in
//! the in-memory fakes from [`crate::fakeclient`].

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::{Api, Client};
use serde_json::json;

use crds::{IPPool, NetworkAttachmentDefinition};

#[async_trait]
pub trait NadClient: Send + Sync {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<NetworkAttachmentDefinition, kube::Error>;
}

#[async_trait]
pub trait PodClient: Send + Sync {
    async fn create(&self, pod: &Pod) -> Result<Pod, kube::Error>;
    async fn get(&self, namespace: &str, name: &str) -> Result<Pod, kube::Error>;
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error>;
}

#[async_trait]
pub trait IpPoolClient: Send + Sync {
    async fn update_status(&self, pool: &IPPool) -> Result<IPPool, kube::Error>;
}

pub struct KubeNadClient {
    client: Client,
}

impl KubeNadClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NadClient for KubeNadClient {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<NetworkAttachmentDefinition, kube::Error> {
        let api: Api<NetworkAttachmentDefinition> =
            Api::namespaced(self.client.clone(), namespace);
        api.get(name).await
    }
}

pub struct KubePodClient {
    client: Client,
}

impl KubePodClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl PodClient for KubePodClient {
    async fn create(&self, pod: &Pod) -> Result<Pod, kube::Error> {
        let namespace = pod.metadata.namespace.as_deref().unwrap_or_default();
        self.api(namespace).create(&PostParams::default(), pod).await
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Pod, kube::Error> {
        self.api(namespace).get(name).await
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        self.api(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
    }
}

pub struct KubeIpPoolClient {
    client: Client,
}

impl KubeIpPoolClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IpPoolClient for KubeIpPoolClient {
    async fn update_status(&self, pool: &IPPool) -> Result<IPPool, kube::Error> {
        let namespace = pool.metadata.namespace.as_deref().unwrap_or_default();
        let name = pool.metadata.name.as_deref().unwrap_or_default();
        let api: Api<IPPool> = Api::namespaced(self.client.clone(), namespace);
        api.patch_status(
            name,
            &PatchParams::default(),
            &Patch::Merge(&json!({ "status": pool.status })),
        )
        .await
    }
}
