//! Outbound drivers (QLab cue trigger, board status requests)
//!
//! Both drivers are fire-and-forget: they hand one datagram to a
//! [`DatagramSink`], log a failed send and move on. Nothing is retried and
//! no acknowledgement is awaited, so a dead endpoint never stalls frame
//! processing.

use std::io;
use std::net::SocketAddr;

pub mod qlab;
pub mod status;

pub use qlab::QlabDriver;
pub use status::StatusRequester;

/// Non-blocking datagram output
///
/// Implementations must not wait for the network; a send that cannot complete
/// immediately is reported as an error.
pub trait DatagramSink: Send + Sync {
    fn send_datagram(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize>;
}

impl DatagramSink for tokio::net::UdpSocket {
    fn send_datagram(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.try_send_to(payload, target)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory sinks for driver and gateway tests

    use super::DatagramSink;
    use std::io;
    use std::net::SocketAddr;
    use std::sync::Mutex;

    /// Records every datagram instead of sending it
    #[derive(Default)]
    pub struct RecordingSink {
        sent: Mutex<Vec<(Vec<u8>, SocketAddr)>>,
    }

    impl RecordingSink {
        pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn sent_to(&self, target: SocketAddr) -> usize {
            self.sent().iter().filter(|(_, t)| *t == target).count()
        }
    }

    impl DatagramSink for RecordingSink {
        fn send_datagram(&self, payload: &[u8], target: SocketAddr) -> io::Result<usize> {
            self.sent.lock().unwrap().push((payload.to_vec(), target));
            Ok(payload.len())
        }
    }

    /// Fails every send, like an unreachable network
    pub struct FailingSink;

    impl DatagramSink for FailingSink {
        fn send_datagram(&self, _payload: &[u8], _target: SocketAddr) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "destination unreachable"))
        }
    }
}
