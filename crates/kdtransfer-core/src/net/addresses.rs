//! Enumeration of local addresses worth advertising to a peer.
//!
//! Filters out interfaces that are down, virtual (container/VPN bridges),
//! loopback, link-local, or multicast — none of those are useful dial
//! targets for a peer on another host.

use if_addrs::IfAddr;

/// Case-insensitive prefixes of interface names that are virtual and
/// never worth advertising: container bridges, VPN/tunnel interfaces,
/// and virtualization bridges.
const VIRTUAL_INTERFACE_PREFIXES: &[&str] = &[
    "docker", "br-", "veth", "virbr", "vmnet", "vboxnet", "utun", "tun", "tap",
];

/// Enumerate this host's local addresses, formatted as `"host:port"`
/// (IPv6 addresses bracketed), filtering down/virtual/loopback/link-local/
/// multicast interfaces.
///
/// # Errors
///
/// Returns the underlying I/O error if the OS interface list can't be read.
pub fn local_addresses(port: u16) -> std::io::Result<Vec<String>> {
    let interfaces = if_addrs::get_if_addrs()?;

    Ok(interfaces
        .into_iter()
        .filter(|iface| !is_virtual_interface(&iface.name))
        .filter_map(|iface| usable_addr(&iface.addr))
        .map(|ip| format_host_port(ip, port))
        .collect())
}

fn is_virtual_interface(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    VIRTUAL_INTERFACE_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

fn usable_addr(addr: &IfAddr) -> Option<std::net::IpAddr> {
    let ip = addr.ip();

    if ip.is_loopback() || ip.is_multicast() {
        return None;
    }

    match ip {
        std::net::IpAddr::V4(v4) => {
            if v4.is_link_local() {
                return None;
            }
        }
        std::net::IpAddr::V6(v6) => {
            // Unicast link-local IPv6 addresses start with fe80::/10.
            if (v6.segments()[0] & 0xffc0) == 0xfe80 {
                return None;
            }
        }
    }

    Some(ip)
}

fn format_host_port(ip: std::net::IpAddr, port: u16) -> String {
    match ip {
        std::net::IpAddr::V4(v4) => format!("{v4}:{port}"),
        std::net::IpAddr::V6(v6) => format!("[{v6}]:{port}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn filters_known_virtual_interface_prefixes() {
        for name in ["docker0", "br-abc123", "veth1234", "virbr0", "utun3", "tun0", "tap0"] {
            assert!(is_virtual_interface(name), "{name} should be filtered");
        }
        assert!(!is_virtual_interface("eth0"));
        assert!(!is_virtual_interface("en0"));
        assert!(!is_virtual_interface("wlan0"));
    }

    #[test]
    fn virtual_interface_match_is_case_insensitive() {
        assert!(is_virtual_interface("DOCKER0"));
        assert!(is_virtual_interface("VEth5"));
    }

    #[test]
    fn loopback_and_link_local_are_excluded() {
        let loopback = IfAddr::V4(if_addrs::Ifv4Addr {
            ip: Ipv4Addr::new(127, 0, 0, 1),
            netmask: Ipv4Addr::new(255, 0, 0, 0),
            broadcast: None,
        });
        assert!(usable_addr(&loopback).is_none());

        let link_local = IfAddr::V4(if_addrs::Ifv4Addr {
            ip: Ipv4Addr::new(169, 254, 1, 1),
            netmask: Ipv4Addr::new(255, 255, 0, 0),
            broadcast: None,
        });
        assert!(usable_addr(&link_local).is_none());
    }

    #[test]
    fn ordinary_lan_address_is_kept_and_formatted() {
        let lan = IfAddr::V4(if_addrs::Ifv4Addr {
            ip: Ipv4Addr::new(192, 168, 1, 42),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            broadcast: None,
        });
        let ip = usable_addr(&lan).unwrap();
        assert_eq!(format_host_port(ip, 2502), "192.168.1.42:2502");
    }

    #[test]
    fn ipv6_addresses_are_bracketed() {
        let ip: std::net::IpAddr = "fd00::1".parse().unwrap();
        assert_eq!(format_host_port(ip, 2502), "[fd00::1]:2502");
    }
}
