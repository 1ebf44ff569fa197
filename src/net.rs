//! UDP socket setup
//!
//! Boards multicast to a fixed group. The inbound socket joins that group on
//! every non-loopback IPv4 interface so the bridge hears boards on any
//! attached network.

use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::{info, warn};

/// Port boards multicast their state to
pub const DEFAULT_LISTEN_PORT: u16 = 31337;

/// Multicast group boards send to
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 0, 13, 37);

/// Local address cue commands are sent from
pub const DEFAULT_OSC_BIND: &str = "0.0.0.0:53005";

/// TTL for outgoing multicast
pub const MULTICAST_TTL: u32 = 10;

/// Bind the inbound socket and join `group` on all usable interfaces
///
/// Fails when the port cannot be bound or no membership could be added.
pub async fn bind_inbound(port: u16, group: Ipv4Addr) -> Result<UdpSocket> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .with_context(|| format!("Failed to bind UDP port {}", port))?;

    let interfaces = multicast_interfaces().context("Failed to list network interfaces")?;

    let mut joined = 0;
    for (name, addr) in &interfaces {
        match socket.join_multicast_v4(group, *addr) {
            Ok(()) => {
                info!(" 🔹 Added mcast membership to {} ({})", addr, name);
                joined += 1;
            }
            Err(e) => {
                warn!(" ❌ Error adding membership to {} ({}): {}", addr, name, e);
            }
        }
    }

    if joined == 0 {
        anyhow::bail!(
            "Could not join multicast group {} on any interface ({} candidates)",
            group,
            interfaces.len()
        );
    }

    socket
        .set_multicast_ttl_v4(MULTICAST_TTL)
        .context("Failed to set multicast TTL")?;

    Ok(socket)
}

/// Bind the socket cue commands are sent from
pub async fn bind_outbound(addr: SocketAddr) -> Result<UdpSocket> {
    UdpSocket::bind(addr)
        .await
        .with_context(|| format!("Failed to bind OSC socket on {}", addr))
}

/// Non-loopback IPv4 interfaces as (name, address)
pub fn multicast_interfaces() -> Result<Vec<(String, Ipv4Addr)>> {
    let interfaces = if_addrs::get_if_addrs()?
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.ip() {
            IpAddr::V4(v4) => Some((iface.name, v4)),
            IpAddr::V6(_) => None,
        })
        .collect();

    Ok(interfaces)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interfaces_exclude_loopback() {
        let interfaces = multicast_interfaces().unwrap();
        assert!(interfaces.iter().all(|(_, addr)| !addr.is_loopback()));
    }

    #[tokio::test]
    async fn test_bind_outbound_ephemeral() {
        let socket = bind_outbound("127.0.0.1:0".parse().unwrap()).await.unwrap();
        assert!(socket.local_addr().unwrap().port() != 0);
    }

    #[test]
    fn test_default_group_is_multicast() {
        assert!(DEFAULT_MULTICAST_GROUP.is_multicast());
    }
}
