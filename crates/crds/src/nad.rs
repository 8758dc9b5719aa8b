//! NetworkAttachmentDefinition CRD (external)
//!
//! Declared here so the controller can resolve `networkName` references and
//! read the clusternetwork label. The CNI config payload is opaque to us.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "k8s.cni.cncf.io",
    version = "v1",
    kind = "NetworkAttachmentDefinition",
    plural = "network-attachment-definitions",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAttachmentDefinitionSpec {
    /// Raw CNI configuration in JSON form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}
