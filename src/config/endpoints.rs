//! Address resolution for the QLab endpoint and the keepalive peer
//!
//! Hosts may be IP literals or names. Literals resolve immediately; names go
//! through the system resolver with a short timeout so a slow DNS server only
//! delays the slow tick that asked for it.

use anyhow::{Context, Result};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::lookup_host;
use tracing::debug;

use super::MainConfig;

/// Upper bound for one name lookup
pub const RESOLVE_TIMEOUT: Duration = Duration::from_millis(500);

/// Resolved outbound addresses for the active configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Endpoints {
    /// QLab OSC address; `None` while the host is unresolved
    pub trigger: Option<SocketAddr>,
    /// Keepalive peer; `None` when unset or unresolved
    pub keepalive: Option<IpAddr>,
}

impl Endpoints {
    /// Resolve IP literals only, leaving host names unresolved
    pub fn literal(main: &MainConfig) -> Self {
        Self {
            trigger: main
                .trigger_host()
                .parse::<IpAddr>()
                .ok()
                .map(|ip| SocketAddr::new(ip, main.trigger_port())),
            keepalive: main.keepalive_host().and_then(|host| host.parse().ok()),
        }
    }

    /// Resolve every configured host; failures leave that address unset
    pub async fn resolve(main: &MainConfig) -> Self {
        let trigger = match resolve_host(main.trigger_host(), main.trigger_port()).await {
            Ok(addr) => Some(addr),
            Err(e) => {
                debug!("QLab host unresolved: {:#}", e);
                None
            }
        };

        let keepalive = match main.keepalive_host() {
            Some(host) => match resolve_host(host, 0).await {
                Ok(addr) => Some(addr.ip()),
                Err(e) => {
                    debug!("Keepalive peer unresolved: {:#}", e);
                    None
                }
            },
            None => None,
        };

        Self { trigger, keepalive }
    }

    /// Whether every configured host has an address
    pub fn is_complete(&self, main: &MainConfig) -> bool {
        self.trigger.is_some() && (main.keepalive_host().is_none() || self.keepalive.is_some())
    }
}

/// Resolve `host` to a single address, preferring IPv4 to match the sockets
pub async fn resolve_host(host: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    let addrs: Vec<SocketAddr> = tokio::time::timeout(RESOLVE_TIMEOUT, lookup_host((host, port)))
        .await
        .with_context(|| format!("Timed out resolving {}", host))?
        .with_context(|| format!("Failed to resolve {}", host))?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| anyhow::anyhow!("No address found for {}", host))
}
