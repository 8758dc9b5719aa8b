//! MAC-to-IP binding cache for DHCP lease lookup.
//!
//! One namespace per network, keyed by the network name. Inside a
//! namespace the mapping is unique in both directions: a MAC holds at most
//! one IP and an IP belongs to at most one MAC. The cache carries no TTLs;
//! entries live until the reconciler or the agent protocol removes them.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::RwLock;

use macaddr::MacAddr6;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("network {0} already exists")]
    NetworkExists(String),

    #[error("network {0} is not initialized")]
    NetworkNotInitialized(String),

    #[error("invalid mac address {0}")]
    InvalidMac(String),

    #[error("no binding for mac {0}")]
    NotFound(MacAddr6),

    #[error("ip {ip} is already bound to {mac}")]
    Conflict { ip: Ipv4Addr, mac: MacAddr6 },

    #[error("ip {0} is reserved for the dhcp server")]
    ServerReserved(Ipv4Addr),
}

/// Parses a client MAC address. Reserved sentinel markers that show up in
/// MAC position elsewhere (the excluded and server markers in pool status)
/// are not client MACs and fail here along with anything else that does
/// not parse.
pub fn parse_client_mac(mac: &str) -> Result<MacAddr6, CacheError> {
    mac.parse::<MacAddr6>()
        .map_err(|_| CacheError::InvalidMac(mac.to_string()))
}

#[derive(Debug, Default)]
struct MacIpMap {
    mac_to_ip: HashMap<MacAddr6, Ipv4Addr>,
    ip_to_mac: HashMap<Ipv4Addr, MacAddr6>,
    server_ip: Option<Ipv4Addr>,
}

/// Process-wide binding cache, one [`MacIpMap`] per network name.
#[derive(Debug, Default)]
pub struct CacheAllocator {
    networks: RwLock<HashMap<String, MacIpMap>>,
}

impl CacheAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty namespace for `name`.
    pub fn new_ns(&self, name: &str) -> Result<(), CacheError> {
        let mut networks = self.networks.write().unwrap();
        if networks.contains_key(name) {
            return Err(CacheError::NetworkExists(name.to_string()));
        }
        networks.insert(name.to_string(), MacIpMap::default());
        Ok(())
    }

    /// Binds `mac` to `ip`. Re-adding a known MAC rebinds it and drops the
    /// old reverse entry; binding an IP held by a different MAC fails.
    pub fn add(&self, name: &str, mac: &str, ip: Ipv4Addr) -> Result<(), CacheError> {
        let mac = parse_client_mac(mac)?;
        let mut networks = self.networks.write().unwrap();
        let map = networks
            .get_mut(name)
            .ok_or_else(|| CacheError::NetworkNotInitialized(name.to_string()))?;

        if map.server_ip == Some(ip) {
            return Err(CacheError::ServerReserved(ip));
        }
        if let Some(&holder) = map.ip_to_mac.get(&ip) {
            if holder != mac {
                return Err(CacheError::Conflict { ip, mac: holder });
            }
        }
        if let Some(old_ip) = map.mac_to_ip.insert(mac, ip) {
            map.ip_to_mac.remove(&old_ip);
        }
        map.ip_to_mac.insert(ip, mac);
        Ok(())
    }

    /// Drops the binding for `mac`. Unknown MACs are tolerated.
    pub fn remove(&self, name: &str, mac: &str) -> Result<(), CacheError> {
        let mac = parse_client_mac(mac)?;
        let mut networks = self.networks.write().unwrap();
        let map = networks
            .get_mut(name)
            .ok_or_else(|| CacheError::NetworkNotInitialized(name.to_string()))?;
        if let Some(ip) = map.mac_to_ip.remove(&mac) {
            map.ip_to_mac.remove(&ip);
        }
        Ok(())
    }

    /// Looks up the IP bound to `mac`.
    pub fn lookup(&self, name: &str, mac: &str) -> Result<Ipv4Addr, CacheError> {
        let mac = parse_client_mac(mac)?;
        let networks = self.networks.read().unwrap();
        let map = networks
            .get(name)
            .ok_or_else(|| CacheError::NetworkNotInitialized(name.to_string()))?;
        map.mac_to_ip
            .get(&mac)
            .copied()
            .ok_or(CacheError::NotFound(mac))
    }

    /// Records the DHCP server's own address for the network so it is
    /// never offered to a client.
    pub fn bind_server(&self, name: &str, ip: Ipv4Addr) -> Result<(), CacheError> {
        let mut networks = self.networks.write().unwrap();
        let map = networks
            .get_mut(name)
            .ok_or_else(|| CacheError::NetworkNotInitialized(name.to_string()))?;
        if let Some(&holder) = map.ip_to_mac.get(&ip) {
            return Err(CacheError::Conflict { ip, mac: holder });
        }
        map.server_ip = Some(ip);
        Ok(())
    }

    /// Clears the server reservation for the network.
    pub fn unbind_server(&self, name: &str) -> Result<(), CacheError> {
        let mut networks = self.networks.write().unwrap();
        let map = networks
            .get_mut(name)
            .ok_or_else(|| CacheError::NetworkNotInitialized(name.to_string()))?;
        map.server_ip = None;
        Ok(())
    }

    /// The server address recorded for the network, if any.
    pub fn server_ip(&self, name: &str) -> Result<Option<Ipv4Addr>, CacheError> {
        let networks = self.networks.read().unwrap();
        let map = networks
            .get(name)
            .ok_or_else(|| CacheError::NetworkNotInitialized(name.to_string()))?;
        Ok(map.server_ip)
    }

    /// Drops all state for `name`. Unknown names are ignored.
    pub fn delete_ns(&self, name: &str) {
        self.networks.write().unwrap().remove(name);
    }

    pub fn has_ns(&self, name: &str) -> bool {
        self.networks.read().unwrap().contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NET_1: &str = "default/net-1";

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn new_cache() -> CacheAllocator {
        let cache = CacheAllocator::new();
        cache.new_ns(NET_1).unwrap();
        cache
    }

    #[test]
    fn test_new_ns_rejects_duplicate() {
        let cache = new_cache();
        assert!(matches!(
            cache.new_ns(NET_1),
            Err(CacheError::NetworkExists(_))
        ));
    }

    #[test]
    fn test_add_and_lookup() {
        let cache = new_cache();
        cache
            .add(NET_1, "11:22:33:44:55:66", ip("192.168.0.11"))
            .unwrap();
        assert_eq!(
            cache.lookup(NET_1, "11:22:33:44:55:66").unwrap(),
            ip("192.168.0.11")
        );
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let cache = new_cache();
        cache
            .add(NET_1, "AA:BB:CC:DD:EE:01", ip("192.168.0.11"))
            .unwrap();
        assert_eq!(
            cache.lookup(NET_1, "aa:bb:cc:dd:ee:01").unwrap(),
            ip("192.168.0.11")
        );
    }

    #[test]
    fn test_readding_mac_rebinds_and_frees_old_ip() {
        let cache = new_cache();
        cache
            .add(NET_1, "11:22:33:44:55:66", ip("192.168.0.11"))
            .unwrap();
        cache
            .add(NET_1, "11:22:33:44:55:66", ip("192.168.0.12"))
            .unwrap();
        assert_eq!(
            cache.lookup(NET_1, "11:22:33:44:55:66").unwrap(),
            ip("192.168.0.12")
        );
        // The previous IP is free for another MAC again.
        cache
            .add(NET_1, "11:22:33:44:55:67", ip("192.168.0.11"))
            .unwrap();
    }

    #[test]
    fn test_binding_taken_ip_conflicts() {
        let cache = new_cache();
        cache
            .add(NET_1, "11:22:33:44:55:66", ip("192.168.0.11"))
            .unwrap();
        let result = cache.add(NET_1, "11:22:33:44:55:67", ip("192.168.0.11"));
        assert!(matches!(result, Err(CacheError::Conflict { .. })));
    }

    #[test]
    fn test_sentinel_markers_are_not_client_macs() {
        let cache = new_cache();
        for marker in ["EXCLUDED", "SERVER"] {
            assert!(matches!(
                cache.add(NET_1, marker, ip("192.168.0.11")),
                Err(CacheError::InvalidMac(_))
            ));
        }
        assert!(parse_client_mac("EXCLUDED").is_err());
        assert!(parse_client_mac("11:22:33:44:55:66").is_ok());
    }

    #[test]
    fn test_remove_drops_both_directions() {
        let cache = new_cache();
        cache
            .add(NET_1, "11:22:33:44:55:66", ip("192.168.0.11"))
            .unwrap();
        cache.remove(NET_1, "11:22:33:44:55:66").unwrap();
        assert!(matches!(
            cache.lookup(NET_1, "11:22:33:44:55:66"),
            Err(CacheError::NotFound(_))
        ));
        cache
            .add(NET_1, "11:22:33:44:55:67", ip("192.168.0.11"))
            .unwrap();
    }

    #[test]
    fn test_server_address_is_never_offered() {
        let cache = new_cache();
        cache.bind_server(NET_1, ip("192.168.0.2")).unwrap();
        assert_eq!(cache.server_ip(NET_1).unwrap(), Some(ip("192.168.0.2")));
        assert!(matches!(
            cache.add(NET_1, "11:22:33:44:55:66", ip("192.168.0.2")),
            Err(CacheError::ServerReserved(_))
        ));
    }

    #[test]
    fn test_unbind_server_frees_the_address() {
        let cache = new_cache();
        cache.bind_server(NET_1, ip("192.168.0.2")).unwrap();
        cache.unbind_server(NET_1).unwrap();
        assert_eq!(cache.server_ip(NET_1).unwrap(), None);
        cache
            .add(NET_1, "11:22:33:44:55:66", ip("192.168.0.2"))
            .unwrap();
    }

    #[test]
    fn test_server_binding_conflicts_with_client_holder() {
        let cache = new_cache();
        cache
            .add(NET_1, "11:22:33:44:55:66", ip("192.168.0.2"))
            .unwrap();
        assert!(matches!(
            cache.bind_server(NET_1, ip("192.168.0.2")),
            Err(CacheError::Conflict { .. })
        ));
    }

    #[test]
    fn test_unknown_network_fails() {
        let cache = CacheAllocator::new();
        assert!(matches!(
            cache.add(NET_1, "11:22:33:44:55:66", ip("192.168.0.11")),
            Err(CacheError::NetworkNotInitialized(_))
        ));
    }

    #[test]
    fn test_delete_ns_drops_state() {
        let cache = new_cache();
        cache
            .add(NET_1, "11:22:33:44:55:66", ip("192.168.0.11"))
            .unwrap();
        cache.delete_ns(NET_1);
        assert!(!cache.has_ns(NET_1));
        // Unknown names are tolerated.
        cache.delete_ns(NET_1);
    }
}
