//! In-memory fakes of the Kubernetes client traits.
//!
//! Hash-map-backed implementations that reproduce the API server behaviors
//! the reconciler and validator depend on: NotFound messages in the server's
//! own wording, AlreadyExists on duplicate create, and status capture for
//! assertions. Storage sits behind an `Arc` so a clone kept by the test
//! observes everything the reconciler does through its own copy.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::core::ErrorResponse;

use crds::{IPPool, NetworkAttachmentDefinition};

use crate::clients::{IpPoolClient, NadClient, PodClient};

fn not_found(kind: &str, name: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{kind} \"{name}\" not found"),
        reason: "NotFound".to_string(),
        code: 404,
    })
}

fn already_exists(kind: &str, name: &str) -> kube::Error {
    kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("{kind} \"{name}\" already exists"),
        reason: "AlreadyExists".to_string(),
        code: 409,
    })
}

fn key(namespace: Option<&str>, name: Option<&str>) -> (String, String) {
    (
        namespace.unwrap_or_default().to_string(),
        name.unwrap_or_default().to_string(),
    )
}

#[derive(Clone, Default)]
pub struct FakeNadClient {
    nads: Arc<Mutex<HashMap<(String, String), NetworkAttachmentDefinition>>>,
}

impl FakeNadClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, nad: NetworkAttachmentDefinition) {
        let k = key(nad.metadata.namespace.as_deref(), nad.metadata.name.as_deref());
        self.nads.lock().unwrap().insert(k, nad);
    }

    pub fn with(self, nad: NetworkAttachmentDefinition) -> Self {
        self.add(nad);
        self
    }
}

#[async_trait]
impl NadClient for FakeNadClient {
    async fn get(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<NetworkAttachmentDefinition, kube::Error> {
        self.nads
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found("network-attachment-definitions.k8s.cni.cncf.io", name))
    }
}

#[derive(Clone, Default)]
pub struct FakePodClient {
    pods: Arc<Mutex<HashMap<(String, String), Pod>>>,
}

impl FakePodClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a pod, bypassing create semantics.
    pub fn add(&self, pod: Pod) {
        let k = key(pod.metadata.namespace.as_deref(), pod.metadata.name.as_deref());
        self.pods.lock().unwrap().insert(k, pod);
    }

    pub fn with(self, pod: Pod) -> Self {
        self.add(pod);
        self
    }

    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.pods
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.pods.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PodClient for FakePodClient {
    async fn create(&self, pod: &Pod) -> Result<Pod, kube::Error> {
        let k = key(pod.metadata.namespace.as_deref(), pod.metadata.name.as_deref());
        let mut pods = self.pods.lock().unwrap();
        if pods.contains_key(&k) {
            return Err(already_exists("pods", &k.1));
        }
        pods.insert(k, pod.clone());
        Ok(pod.clone())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Pod, kube::Error> {
        self.pods
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| not_found("pods", name))
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), kube::Error> {
        self.pods
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| not_found("pods", name))
    }
}

/// Captures status writes for assertions instead of talking to a cluster.
#[derive(Clone, Default)]
pub struct FakeIpPoolClient {
    updates: Arc<Mutex<Vec<IPPool>>>,
}

impl FakeIpPoolClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<IPPool> {
        self.updates.lock().unwrap().clone()
    }

    pub fn last_update(&self) -> Option<IPPool> {
        self.updates.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl IpPoolClient for FakeIpPoolClient {
    async fn update_status(&self, pool: &IPPool) -> Result<IPPool, kube::Error> {
        self.updates.lock().unwrap().push(pool.clone());
        Ok(pool.clone())
    }
}
