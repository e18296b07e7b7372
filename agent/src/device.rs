//! Host identity shown in the dashboard header

use std::net::{IpAddr, Ipv4Addr};

use serde::Serialize;
use sysinfo::{Networks, System};

/// Hostname and outward-facing address of this appliance
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub hostname: String,
    pub interface: String,
    pub ipv4: Option<Ipv4Addr>,
}

impl DeviceInfo {
    pub fn label(&self) -> String {
        match self.ipv4 {
            Some(ip) => format!("{} ({} {})", self.hostname, self.interface, ip),
            None => format!("{} ({} has no IPv4 address)", self.hostname, self.interface),
        }
    }
}

/// Collect device info for `interface`
pub fn collect_device_info(interface: &str) -> DeviceInfo {
    let networks = Networks::new_with_refreshed_list();
    let ipv4 = networks
        .list()
        .get(interface)
        .and_then(|data| {
            data.ip_networks().iter().find_map(|net| match net.addr {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            })
        });

    DeviceInfo {
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        interface: interface.to_string(),
        ipv4,
    }
}
