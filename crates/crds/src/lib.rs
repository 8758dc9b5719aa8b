//! CRD definitions for the VM DHCP controller.
//!
//! - `ip_pool` - the IPPool resource: one DHCP-served subnet per object
//! - `condition` - the lifecycle condition algebra used in IPPool status
//! - `nad` - the external NetworkAttachmentDefinition resource (multus)
//! - `builder` - fluent fixture builders shared by unit tests

pub mod builder;
pub mod condition;
pub mod ip_pool;
pub mod nad;

pub use condition::*;
pub use ip_pool::*;
pub use nad::*;

/// API group of the controller's own resources.
pub const GROUP: &str = "network.vmdhcp.io";

/// Marker stored in MAC position of the allocated map for addresses the
/// operator withheld from allocation.
pub const EXCLUDED_MARK: &str = "EXCLUDED";

/// Marker stored in MAC position of the allocated map for the pool's own
/// DHCP server address when it falls inside the allocatable range.
pub const SERVER_MARK: &str = "SERVER";

/// Splits a "namespace/name" network reference on the last slash. A
/// reference with no slash yields an empty namespace.
pub fn split_network_name(network_name: &str) -> (&str, &str) {
    match network_name.rsplit_once('/') {
        Some((namespace, name)) => (namespace, name),
        None => ("", network_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_network_name() {
        assert_eq!(split_network_name("default/net-1"), ("default", "net-1"));
        assert_eq!(split_network_name("nonexist"), ("", "nonexist"));
        assert_eq!(split_network_name("a/b/c"), ("a/b", "c"));
    }
}
