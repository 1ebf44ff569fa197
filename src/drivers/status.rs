//! Board status requests
//!
//! A board answers `{"status":"get"}` on its status port by resending its full
//! state. The bridge asks after a sequence gap, and polls a fixed peer when one
//! is configured.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, trace};

use super::DatagramSink;
use crate::packet::STATUS_REQUEST;

/// Port boards listen on for status requests
pub const DEFAULT_STATUS_PORT: u16 = 1337;

/// Sends status requests to boards
pub struct StatusRequester {
    sink: Arc<dyn DatagramSink>,
    port: u16,
}

impl StatusRequester {
    pub fn new(sink: Arc<dyn DatagramSink>, port: u16) -> Self {
        Self { sink, port }
    }

    /// Ask the board at `ip` for its state; returns whether the send succeeded
    pub fn request(&self, ip: IpAddr) -> bool {
        let target = SocketAddr::new(ip, self.port);
        match self.sink.send_datagram(STATUS_REQUEST, target) {
            Ok(_) => {
                trace!("Status request sent to {}", target);
                true
            }
            Err(e) => {
                debug!("Status request to {} failed: {}", target, e);
                false
            }
        }
    }
}
