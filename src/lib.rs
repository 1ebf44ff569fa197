//! GPIO OSC Bridge
//!
//! Listens to GPIO-over-Ethernet boards on a UDP multicast group and starts a
//! QLab cue over OSC when a monitored input goes high, with a retrigger
//! cooldown and packet-loss recovery through status requests.

pub mod config;
pub mod debounce;
pub mod display;
pub mod drivers;
pub mod gateway;
pub mod net;
pub mod osc;
pub mod packet;
pub mod sequence;

/// Tracing target routed to the error log file
pub const ERROR_LOG_TARGET: &str = "error_log";

pub use config::GatewayConfig;
pub use gateway::{FrameOutcome, Gateway};
