//! Gateway context
//!
//! Owns every piece of mutable state (packet counters, edge detector, last
//! snapshot, active configuration) and is driven by a single event loop:
//! inbound frames, the fast keepalive tick and the slow refresh tick. Because
//! all three run on one task, "check cooldown then record trigger" can never
//! interleave with another evaluation.

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{ConfigReloader, Endpoints, GatewayConfig, ReloadOutcome};
use crate::debounce::{Action, EdgeDebouncer};
use crate::display::{StatusLine, StatusMessage};
use crate::drivers::{QlabDriver, StatusRequester};
use crate::packet::DeviceSnapshot;
use crate::sequence::{SequenceStatus, SequenceTracker};
use crate::ERROR_LOG_TARGET;

#[cfg(test)]
mod tests;

/// Keepalive status request period
pub const FAST_TICK: Duration = Duration::from_millis(100);

/// Config reload and status refresh period
pub const SLOW_TICK: Duration = Duration::from_secs(1);

/// Delay before the placeholder line and the keepalive start
pub const STARTUP_DELAY: Duration = Duration::from_secs(1);

/// Counters for the shutdown summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub frames: u64,
    pub malformed: u64,
    pub filtered: u64,
    pub gaps: u64,
    pub status_requests: u64,
    pub keepalives: u64,
    pub triggers: u64,
    pub trigger_send_failures: u64,
}

impl fmt::Display for GatewayStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames ({} malformed, {} filtered), {} gaps, {} status requests, {} keepalives, {} triggers ({} send failures)",
            self.frames,
            self.malformed,
            self.filtered,
            self.gaps,
            self.status_requests,
            self.keepalives,
            self.triggers,
            self.trigger_send_failures
        )
    }
}

/// What happened to one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Not decodable; recorded in the error log and dropped
    Malformed,
    /// Decoded but from a board other than the configured one
    Filtered,
    /// Evaluated by the edge detector
    Processed {
        action: Action,
        status: Option<StatusLine>,
    },
}

/// Bridge state and collaborators
pub struct Gateway {
    config: ConfigReloader,
    endpoints: Endpoints,
    tracker: SequenceTracker,
    debouncer: EdgeDebouncer,
    last_snapshot: Option<DeviceSnapshot>,
    trigger: QlabDriver,
    status: StatusRequester,
    stats: GatewayStats,
}

impl Gateway {
    /// IP-literal hosts are usable immediately; call
    /// [`Gateway::resolve_endpoints`] to look up host names.
    pub fn new(config: ConfigReloader, trigger: QlabDriver, status: StatusRequester) -> Self {
        Self {
            endpoints: Endpoints::literal(&config.current().main),
            config,
            tracker: SequenceTracker::new(),
            debouncer: EdgeDebouncer::new(),
            last_snapshot: None,
            trigger,
            status,
            stats: GatewayStats::default(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        self.config.current()
    }

    pub fn endpoints(&self) -> Endpoints {
        self.endpoints
    }

    /// Resolve the configured hosts and cache the addresses
    pub async fn resolve_endpoints(&mut self) {
        let main = &self.config.current().main;
        self.endpoints = Endpoints::resolve(main).await;

        if self.endpoints.trigger.is_none() {
            warn!("⚠️  QLab host '{}' could not be resolved, retrying every second", main.trigger_host());
        }
        if let (Some(host), None) = (main.keepalive_host(), self.endpoints.keepalive) {
            warn!("⚠️  Keepalive peer '{}' could not be resolved, retrying every second", host);
        }
    }

    pub fn stats(&self) -> GatewayStats {
        self.stats
    }

    /// Most recent snapshot with channel data
    pub fn last_snapshot(&self) -> Option<&DeviceSnapshot> {
        self.last_snapshot.as_ref()
    }

    /// Process one datagram received from `from`
    pub fn handle_frame(&mut self, payload: &[u8], from: SocketAddr, now: Instant) -> FrameOutcome {
        self.stats.frames += 1;

        let snapshot = match DeviceSnapshot::decode(payload) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.stats.malformed += 1;
                error!(target: ERROR_LOG_TARGET, "Packet parsing error from {}: {}", from, e);
                return FrameOutcome::Malformed;
            }
        };

        // Counters are tracked for every board, filtered or not
        if let (Some(source), Some(seq)) = (snapshot.source.as_deref(), snapshot.sequence) {
            let status = self.tracker.observe(source, seq);
            if let SequenceStatus::Gap { previous, received } = status {
                self.stats.gaps += 1;
                debug!(
                    source = source,
                    previous = previous,
                    received = received,
                    kind = ?status.gap_kind(),
                    "Sequence gap, requesting status from {}",
                    from.ip()
                );
                if self.status.request(from.ip()) {
                    self.stats.status_requests += 1;
                }
            }
        }

        let main = &self.config.current().main;
        if !main.accepts_source(snapshot.source.as_deref()) {
            self.stats.filtered += 1;
            return FrameOutcome::Filtered;
        }

        let action = self
            .debouncer
            .apply(&snapshot, &main.trigger_policy(), now);

        if action == Action::Fire {
            self.stats.triggers += 1;
            let sent = match self.endpoints.trigger {
                Some(endpoint) => self.trigger.fire(endpoint, main.cue()),
                None => {
                    warn!("❌ Cue {} not sent: QLab host '{}' unresolved", main.cue(), main.trigger_host());
                    false
                }
            };
            if !sent {
                self.stats.trigger_send_failures += 1;
            }
        }

        let status = StatusLine::for_snapshot(&snapshot, StatusMessage::from_action(&action, main.cue()));
        if snapshot.channels.is_some() {
            self.last_snapshot = Some(snapshot);
        }

        FrameOutcome::Processed { action, status }
    }

    /// Keepalive: poll the configured peer, if any
    pub fn on_fast_tick(&mut self) {
        if let Some(peer) = self.endpoints.keepalive {
            if self.status.request(peer) {
                self.stats.keepalives += 1;
            }
        }
    }

    /// Refresh the countdown, reload the configuration and resolve hosts
    ///
    /// Returns a status line while a recent trigger's cooldown is still being
    /// counted down. Hosts are looked up again when the configuration changed
    /// or a previous lookup failed.
    pub async fn on_slow_tick(&mut self, now: Instant) -> Option<StatusLine> {
        let line = self.refresh(now);

        let updated = self.config.reload().await == ReloadOutcome::Updated;
        if updated {
            debug!("Active config: {:?}", self.config.current().main);
        }
        if updated || !self.endpoints.is_complete(&self.config.current().main) {
            self.endpoints = Endpoints::resolve(&self.config.current().main).await;
        }

        line
    }

    /// Show the last snapshot (or a placeholder) without evaluating a trigger
    pub fn show_placeholder(&mut self, now: Instant) -> Option<StatusLine> {
        let snapshot = self
            .last_snapshot
            .get_or_insert_with(DeviceSnapshot::placeholder);
        let main = &self.config.current().main;
        let action = self.debouncer.preview(snapshot, &main.trigger_policy(), now);
        StatusLine::for_snapshot(snapshot, StatusMessage::from_action(&action, main.cue()))
    }

    fn refresh(&self, now: Instant) -> Option<StatusLine> {
        let main = &self.config.current().main;
        let policy = main.trigger_policy();
        if !self.debouncer.recently_fired(&policy, now) {
            return None;
        }

        let snapshot = self.last_snapshot.as_ref()?;
        let action = self.debouncer.preview(snapshot, &policy, now);
        StatusLine::for_snapshot(snapshot, StatusMessage::from_action(&action, main.cue()))
    }

    /// Log the run summary
    pub fn log_summary(&self) {
        info!(
            "📊 {} ({} boards seen)",
            self.stats,
            self.tracker.source_count()
        );
    }
}
