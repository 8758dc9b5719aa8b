//! Controller-specific error types.

use thiserror::Error;

/// Errors that can occur in the VM DHCP controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// IPAM error
    #[error(transparent)]
    Ipam(#[from] ipam::IpamError),

    /// Binding cache error
    #[error(transparent)]
    Cache(#[from] cache::CacheError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The referenced network attachment carries no clusternetwork label
    #[error("could not find clusternetwork for nad {0}")]
    MissingClusterNetwork(String),

    /// The agent pod reference is not set yet
    #[error("agent for ippool {0} is not deployed")]
    AgentNotDeployed(String),

    /// The agent pod exists but does not report ready
    #[error("agent for ippool {0} is not ready")]
    AgentNotReady(String),

    /// Resource watch failed
    #[error("resource watch failed: {0}")]
    Watch(String),
}

/// True for a 404 from the API server.
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// True for a 409 AlreadyExists from the API server.
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.reason == "AlreadyExists")
}

/// The API server's own message for API errors, the error display otherwise.
/// Admission rejections embed this verbatim.
pub fn api_error_message(err: &kube::Error) -> String {
    match err {
        kube::Error::Api(ae) => ae.message.clone(),
        other => other.to_string(),
    }
}
