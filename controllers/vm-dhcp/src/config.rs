//! Process-level configuration, loaded from environment variables.

use std::env;
use std::fmt;

use crate::error::ControllerError;

/// Container image reference for the DHCP agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentImage {
    pub repository: String,
    pub tag: String,
}

impl AgentImage {
    pub fn new(repository: &str, tag: &str) -> Self {
        Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
        }
    }

    /// Parses "repository[:tag]". The tag separator is the last colon after
    /// the final slash, so registry ports survive.
    pub fn parse(image: &str) -> Result<Self, ControllerError> {
        if image.is_empty() {
            return Err(ControllerError::InvalidConfig(
                "agent image must not be empty".to_string(),
            ));
        }
        let slash = image.rfind('/').map_or(0, |i| i + 1);
        match image[slash..].rfind(':') {
            Some(colon) => {
                let (repository, tag) = image.split_at(slash + colon);
                let tag = &tag[1..];
                if repository.is_empty() || tag.is_empty() {
                    return Err(ControllerError::InvalidConfig(format!(
                        "invalid agent image {image}"
                    )));
                }
                Ok(Self::new(repository, tag))
            }
            None => Ok(Self::new(image, "latest")),
        }
    }
}

impl fmt::Display for AgentImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Options handed to the reconciler at startup.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Namespace the agent pods are launched into.
    pub agent_namespace: String,

    pub agent_image: AgentImage,

    pub agent_service_account_name: String,

    /// Skip agent workload launch entirely (used by tests).
    pub no_agent: bool,

    /// Pass --dry-run to the agent so it never answers on the wire.
    pub no_dhcp: bool,
}

impl ControllerOptions {
    pub fn from_env() -> Result<Self, ControllerError> {
        let agent_namespace =
            env::var("AGENT_NAMESPACE").unwrap_or_else(|_| "vm-dhcp-system".to_string());
        let agent_image = AgentImage::parse(
            &env::var("AGENT_IMAGE").unwrap_or_else(|_| "vm-dhcp-agent:latest".to_string()),
        )?;
        let agent_service_account_name =
            env::var("AGENT_SERVICE_ACCOUNT_NAME").unwrap_or_else(|_| "vm-dhcp-agent".to_string());

        Ok(Self {
            agent_namespace,
            agent_image,
            agent_service_account_name,
            no_agent: flag("NO_AGENT"),
            no_dhcp: flag("NO_DHCP"),
        })
    }
}

fn flag(name: &str) -> bool {
    env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_image_parse() {
        let image = AgentImage::parse("vm-dhcp-agent:v0.3.0").unwrap();
        assert_eq!(image.repository, "vm-dhcp-agent");
        assert_eq!(image.tag, "v0.3.0");
        assert_eq!(image.to_string(), "vm-dhcp-agent:v0.3.0");
    }

    #[test]
    fn test_agent_image_parse_defaults_tag() {
        let image = AgentImage::parse("ghcr.io/acme/vm-dhcp-agent").unwrap();
        assert_eq!(image.repository, "ghcr.io/acme/vm-dhcp-agent");
        assert_eq!(image.tag, "latest");
    }

    #[test]
    fn test_agent_image_parse_keeps_registry_port() {
        let image = AgentImage::parse("registry.local:5000/vm-dhcp-agent:dev").unwrap();
        assert_eq!(image.repository, "registry.local:5000/vm-dhcp-agent");
        assert_eq!(image.tag, "dev");

        let image = AgentImage::parse("registry.local:5000/vm-dhcp-agent").unwrap();
        assert_eq!(image.repository, "registry.local:5000/vm-dhcp-agent");
        assert_eq!(image.tag, "latest");
    }

    #[test]
    fn test_agent_image_parse_rejects_empty() {
        assert!(AgentImage::parse("").is_err());
        assert!(AgentImage::parse("image:").is_err());
    }
}
