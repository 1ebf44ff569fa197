//! QLab cue trigger driver
//!
//! Sends `/cue/<id>/start` over OSC/UDP. QLab does not acknowledge plain UDP
//! OSC, so a lost command is only recovered by the operator toggling the
//! input again once the cooldown is over.

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::DatagramSink;
use crate::osc::OscMessage;

/// QLab OSC trigger driver
pub struct QlabDriver {
    sink: Arc<dyn DatagramSink>,
}

impl QlabDriver {
    pub fn new(sink: Arc<dyn DatagramSink>) -> Self {
        Self { sink }
    }

    /// Send one start command for `cue` to `endpoint`
    ///
    /// Returns whether the datagram left the socket. Failures are logged and
    /// otherwise dropped.
    pub fn fire(&self, endpoint: SocketAddr, cue: &str) -> bool {
        let message = OscMessage::cue_start(cue);
        let packet = message.encode();

        match self.sink.send_datagram(&packet, endpoint) {
            Ok(_) => {
                info!(
                    "🎬 [{}] Sending OSC {} → {}",
                    chrono::Local::now().format("%H:%M:%S%.3f"),
                    message,
                    endpoint
                );
                debug!(cue = cue, endpoint = %endpoint, bytes = packet.len(), "OSC cue start sent");
                true
            }
            Err(e) => {
                warn!("❌ OSC send to {} failed (not retried): {}", endpoint, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::testing::{FailingSink, RecordingSink};

    #[test]
    fn test_fire_sends_single_cue_start() {
        let sink = Arc::new(RecordingSink::default());
        let driver = QlabDriver::new(sink.clone());
        let endpoint: SocketAddr = "127.0.0.1:53000".parse().unwrap();

        assert!(driver.fire(endpoint, "12"));

        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, endpoint);

        let message = OscMessage::decode(&sent[0].0).unwrap();
        assert_eq!(message.address, "/cue/12/start");
    }

    #[test]
    fn test_fire_failure_is_swallowed() {
        let driver = QlabDriver::new(Arc::new(FailingSink));
        assert!(!driver.fire("192.0.2.1:53000".parse().unwrap(), "1"));
    }
}
