//! Address this server binds to and advertises in its authority record.

use crate::error::ConfigError;
use std::net::{IpAddr, Ipv4Addr};
use sysinfo::Networks;
use tracing::{debug, info};

/// First IPv4 address assigned to `interface`.
pub fn detect_ipv4(interface: &str) -> Result<Ipv4Addr, ConfigError> {
    let networks = Networks::new_with_refreshed_list();
    let data = networks
        .list()
        .get(interface)
        .ok_or_else(|| ConfigError::HostDetection {
            interface: interface.to_string(),
            reason: format!(
                "no such interface (have: {})",
                networks.list().keys().cloned().collect::<Vec<_>>().join(", ")
            ),
        })?;

    let addrs: Vec<IpAddr> = data.ip_networks().iter().map(|net| net.addr).collect();
    debug!("Interface {} has addresses {:?}", interface, addrs);

    first_ipv4(&addrs).ok_or_else(|| ConfigError::HostDetection {
        interface: interface.to_string(),
        reason: "no IPv4 address assigned".to_string(),
    })
}

fn first_ipv4(addrs: &[IpAddr]) -> Option<Ipv4Addr> {
    addrs.iter().find_map(|addr| match addr {
        IpAddr::V4(v4) => Some(*v4),
        IpAddr::V6(_) => None,
    })
}

/// Picks the host address: command line first, then configuration, then the
/// interface's IPv4 address.
pub fn resolve_host(
    cli_host: Option<&str>,
    config_host: Option<&str>,
    interface: &str,
) -> Result<String, ConfigError> {
    if let Some(host) = cli_host.or(config_host).map(str::trim) {
        if host.is_empty() {
            return Err(ConfigError::InvalidBindAddress(
                "host must not be empty".to_string(),
            ));
        }
        info!("Using configured host {}", host);
        return Ok(host.to_string());
    }

    let addr = detect_ipv4(interface)?;
    info!("Detected host {} on interface {}", addr, interface);
    Ok(addr.to_string())
}
