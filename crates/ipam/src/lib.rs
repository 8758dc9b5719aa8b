//! In-memory IPv4 address management for DHCP-served networks.
//!
//! The allocator owns one [`IpSubnet`] per network, keyed by the network
//! name. It is shared process-wide between the reconciler and the DHCP
//! agent surface, so all mutation goes through an internal lock; operations
//! on different networks never contend on anything but the map itself.

mod subnet;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::RwLock;

use ipnet::Ipv4Net;
use thiserror::Error;

pub use subnet::IpSubnet;

/// Errors surfaced by the allocator.
#[derive(Debug, Error)]
pub enum IpamError {
    #[error("network {0} already exists")]
    NetworkExists(String),

    #[error("network {0} is not initialized")]
    NetworkNotInitialized(String),

    #[error("network {0} has no usable addresses")]
    NoUsableAddresses(Ipv4Net),

    #[error("ip {ip} is not within subnet {cidr}")]
    OutOfSubnet { ip: Ipv4Addr, cidr: Ipv4Net },

    #[error("range start {start} is after range end {end}")]
    InvalidRange { start: Ipv4Addr, end: Ipv4Addr },

    #[error("ip {ip} is out of range [{start}, {end}]")]
    OutOfRange {
        ip: Ipv4Addr,
        start: Ipv4Addr,
        end: Ipv4Addr,
    },

    #[error("ip {0} is already allocated")]
    AlreadyAllocated(Ipv4Addr),

    #[error("ip {0} is excluded from allocation")]
    Excluded(Ipv4Addr),

    #[error("ip {0} is not allocated")]
    NotAllocated(Ipv4Addr),

    #[error("no addresses left")]
    Exhausted,
}

/// Process-wide allocator, one subnet per network name.
#[derive(Debug, Default)]
pub struct IpAllocator {
    subnets: RwLock<HashMap<String, IpSubnet>>,
}

impl IpAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subnet for `name`. Fails if the name is taken or the
    /// requested bounds do not fit the CIDR.
    pub fn new_subnet(
        &self,
        name: &str,
        cidr: Ipv4Net,
        start: Option<Ipv4Addr>,
        end: Option<Ipv4Addr>,
    ) -> Result<(), IpamError> {
        let mut subnets = self.subnets.write().unwrap();
        if subnets.contains_key(name) {
            return Err(IpamError::NetworkExists(name.to_string()));
        }
        subnets.insert(name.to_string(), IpSubnet::new(cidr, start, end)?);
        Ok(())
    }

    /// Pins a specific address in `name` as used.
    pub fn allocate(&self, name: &str, ip: Ipv4Addr) -> Result<Ipv4Addr, IpamError> {
        self.with_subnet_mut(name, |subnet| subnet.allocate(ip))
    }

    /// Hands out the numerically smallest free address in `name`.
    pub fn allocate_next(&self, name: &str) -> Result<Ipv4Addr, IpamError> {
        self.with_subnet_mut(name, |subnet| subnet.allocate_next())
    }

    /// Withholds an address from allocation without counting it as used.
    pub fn revoke(&self, name: &str, ip: Ipv4Addr) -> Result<(), IpamError> {
        self.with_subnet_mut(name, |subnet| subnet.revoke(ip))
    }

    /// Returns an allocated address to the free set.
    pub fn release(&self, name: &str, ip: Ipv4Addr) -> Result<(), IpamError> {
        self.with_subnet_mut(name, |subnet| subnet.release(ip))
    }

    /// Drops all state for `name`. Unknown names are ignored.
    pub fn delete_subnet(&self, name: &str) {
        self.subnets.write().unwrap().remove(name);
    }

    pub fn is_initialized(&self, name: &str) -> bool {
        self.subnets.read().unwrap().contains_key(name)
    }

    pub fn used(&self, name: &str) -> Result<u32, IpamError> {
        self.with_subnet(name, |subnet| subnet.used())
    }

    pub fn available(&self, name: &str) -> Result<u32, IpamError> {
        self.with_subnet(name, |subnet| subnet.available())
    }

    /// The inclusive allocatable range of `name`.
    pub fn range(&self, name: &str) -> Result<(Ipv4Addr, Ipv4Addr), IpamError> {
        self.with_subnet(name, |subnet| (subnet.start(), subnet.end()))
    }

    fn with_subnet<T>(&self, name: &str, f: impl FnOnce(&IpSubnet) -> T) -> Result<T, IpamError> {
        let subnets = self.subnets.read().unwrap();
        let subnet = subnets
            .get(name)
            .ok_or_else(|| IpamError::NetworkNotInitialized(name.to_string()))?;
        Ok(f(subnet))
    }

    fn with_subnet_mut<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut IpSubnet) -> Result<T, IpamError>,
    ) -> Result<T, IpamError> {
        let mut subnets = self.subnets.write().unwrap();
        let subnet = subnets
            .get_mut(name)
            .ok_or_else(|| IpamError::NetworkNotInitialized(name.to_string()))?;
        f(subnet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NET_1: &str = "default/net-1";
    const NET_2: &str = "default/net-2";

    fn cidr(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn new_allocator() -> IpAllocator {
        let allocator = IpAllocator::new();
        allocator
            .new_subnet(
                NET_1,
                cidr("192.168.0.0/24"),
                Some(ip("192.168.0.10")),
                Some(ip("192.168.0.20")),
            )
            .unwrap();
        allocator
    }

    #[test]
    fn test_new_subnet_rejects_duplicate_name() {
        let allocator = new_allocator();
        let result = allocator.new_subnet(NET_1, cidr("10.0.0.0/24"), None, None);
        assert!(matches!(result, Err(IpamError::NetworkExists(_))));
    }

    #[test]
    fn test_networks_are_independent() {
        let allocator = new_allocator();
        allocator
            .new_subnet(NET_2, cidr("10.0.0.0/24"), None, None)
            .unwrap();
        allocator.allocate(NET_1, ip("192.168.0.10")).unwrap();
        assert_eq!(allocator.used(NET_1).unwrap(), 1);
        assert_eq!(allocator.used(NET_2).unwrap(), 0);
        assert_eq!(allocator.available(NET_2).unwrap(), 254);
    }

    #[test]
    fn test_queries_on_unknown_network_fail() {
        let allocator = IpAllocator::new();
        assert!(!allocator.is_initialized(NET_1));
        assert!(matches!(
            allocator.used(NET_1),
            Err(IpamError::NetworkNotInitialized(_))
        ));
        assert!(matches!(
            allocator.allocate_next(NET_1),
            Err(IpamError::NetworkNotInitialized(_))
        ));
    }

    #[test]
    fn test_delete_subnet_drops_state() {
        let allocator = new_allocator();
        allocator.delete_subnet(NET_1);
        assert!(!allocator.is_initialized(NET_1));
        // Unknown names are tolerated.
        allocator.delete_subnet(NET_1);
    }

    #[test]
    fn test_range_query() {
        let allocator = new_allocator();
        assert_eq!(
            allocator.range(NET_1).unwrap(),
            (ip("192.168.0.10"), ip("192.168.0.20"))
        );
    }

    // After `new_subnet; revoke E1..Ek; allocate A1..Aj`, allocate_next
    // returns the smallest address of the range minus the revoked and
    // allocated sets.
    #[test]
    fn test_allocate_next_skips_revoked_and_allocated() {
        let allocator = new_allocator();
        allocator.revoke(NET_1, ip("192.168.0.10")).unwrap();
        allocator.revoke(NET_1, ip("192.168.0.12")).unwrap();
        allocator.allocate(NET_1, ip("192.168.0.11")).unwrap();
        assert_eq!(allocator.allocate_next(NET_1).unwrap(), ip("192.168.0.13"));
        assert_eq!(allocator.used(NET_1).unwrap(), 2);
        assert_eq!(allocator.available(NET_1).unwrap(), 7);
    }
}
