//! Tests for the Gateway context

use super::*;
use crate::config::{ConfigSource, GatewayConfig};
use crate::debounce::CooldownNotice;
use crate::drivers::status::DEFAULT_STATUS_PORT;
use crate::drivers::testing::{FailingSink, RecordingSink};
use crate::osc::OscMessage;
use crate::packet::PLACEHOLDER_HOST;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

const CONFIG: &str = r#"
main:
  pin: 3
  cue: "12"
  cue_retrigger_delay: 5
"#;

/// Config held in memory so tests can rewrite it between ticks
struct MemorySource {
    contents: Arc<Mutex<String>>,
}

#[async_trait]
impl ConfigSource for MemorySource {
    async fn load(&self) -> Result<GatewayConfig> {
        let contents = self.contents.lock().unwrap().clone();
        GatewayConfig::parse(&contents)
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

struct Harness {
    gateway: Gateway,
    config: Arc<Mutex<String>>,
    osc: Arc<RecordingSink>,
    status: Arc<RecordingSink>,
    t0: Instant,
}

impl Harness {
    async fn new(yaml: &str) -> Self {
        let config = Arc::new(Mutex::new(yaml.to_string()));
        let reloader = ConfigReloader::new(Box::new(MemorySource {
            contents: config.clone(),
        }))
        .await
        .unwrap();

        let osc = Arc::new(RecordingSink::default());
        let status = Arc::new(RecordingSink::default());
        let gateway = Gateway::new(
            reloader,
            QlabDriver::new(osc.clone()),
            StatusRequester::new(status.clone(), DEFAULT_STATUS_PORT),
        );

        Self {
            gateway,
            config,
            osc,
            status,
            t0: Instant::now(),
        }
    }

    fn at(&self, secs: f64) -> Instant {
        self.t0 + Duration::from_secs_f64(secs)
    }

    fn send(&mut self, frame: &str, secs: f64) -> FrameOutcome {
        let now = self.at(secs);
        self.gateway.handle_frame(frame.as_bytes(), board_addr(), now)
    }

    fn level(&mut self, source: &str, seq: i64, channel2: bool, secs: f64) -> FrameOutcome {
        self.send(&frame(source, seq, channel2), secs)
    }

    fn set_config(&self, yaml: &str) {
        *self.config.lock().unwrap() = yaml.to_string();
    }

    fn fired_cues(&self) -> Vec<String> {
        self.osc
            .sent()
            .iter()
            .map(|(packet, _)| OscMessage::decode(packet).unwrap().address)
            .collect()
    }
}

fn board_addr() -> SocketAddr {
    "10.0.0.5:40000".parse().unwrap()
}

/// Frame with channel index 2 (pin 3) at the given level
fn frame(source: &str, seq: i64, channel2: bool) -> String {
    format!(
        r#"{{"host":"{}","pno":{},"gpi":{{"gpi0":0,"gpi1":0,"gpi2":{},"gpi3":0,"gpi4":0,"gpi5":0,"gpi6":0,"gpi7":0}}}}"#,
        source,
        seq,
        u8::from(channel2)
    )
}

fn action(outcome: &FrameOutcome) -> Option<Action> {
    match outcome {
        FrameOutcome::Processed { action, .. } => Some(*action),
        _ => None,
    }
}

#[tokio::test]
async fn test_gap_requests_status_once() {
    let mut h = Harness::new(CONFIG).await;

    for seq in [0, 1, 2, 4] {
        h.level("A", seq, false, 0.0);
    }

    assert_eq!(h.gateway.stats().gaps, 1);
    assert_eq!(h.gateway.stats().status_requests, 1);

    let sent = h.status.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, crate::packet::STATUS_REQUEST.to_vec());
    assert_eq!(sent[0].1, "10.0.0.5:1337".parse().unwrap());
}

#[tokio::test]
async fn test_trigger_and_cooldown_scenario() {
    let mut h = Harness::new(CONFIG).await;

    // t=0 low, t=1 high: fire
    assert_eq!(action(&h.level("A", 0, false, 0.0)), Some(Action::Display(None)));
    assert_eq!(action(&h.level("A", 1, true, 1.0)), Some(Action::Fire));

    // t=3 toggled low then high again: inside the 5 s cooldown
    h.level("A", 2, false, 3.0);
    let suppressed = action(&h.level("A", 3, true, 3.0));
    assert_eq!(
        suppressed,
        Some(Action::Display(Some(CooldownNotice {
            remaining: Duration::from_secs(3)
        })))
    );

    // t=6 fresh edge: fire again
    h.level("A", 4, false, 6.0);
    assert_eq!(action(&h.level("A", 5, true, 6.0)), Some(Action::Fire));

    assert_eq!(h.fired_cues(), vec!["/cue/12/start", "/cue/12/start"]);
    assert_eq!(h.osc.sent_to("127.0.0.1:53000".parse().unwrap()), 2);
    assert_eq!(h.gateway.stats().triggers, 2);
    assert_eq!(h.gateway.stats().gaps, 0);
}

#[tokio::test]
async fn test_many_edges_within_cooldown_fire_once() {
    let mut h = Harness::new(CONFIG).await;
    h.level("A", 0, false, 0.0);

    let mut seq = 1;
    for step in 0..40 {
        let secs = 0.1 * step as f64;
        h.level("A", seq, step % 2 == 0, secs);
        seq += 1;
    }

    assert_eq!(h.fired_cues().len(), 1);
}

#[tokio::test]
async fn test_initially_high_does_not_fire() {
    let mut h = Harness::new(CONFIG).await;

    assert_eq!(action(&h.level("A", 0, true, 0.0)), Some(Action::Display(None)));
    assert!(h.osc.sent().is_empty());
}

#[tokio::test]
async fn test_placeholder_is_not_a_baseline() {
    let mut h = Harness::new(CONFIG).await;

    let line = h.gateway.show_placeholder(h.at(1.0)).unwrap();
    assert_eq!(line.host, PLACEHOLDER_HOST);
    assert_eq!(line.message, StatusMessage::None);

    // First real frame already high: no edge against the placeholder
    assert_eq!(action(&h.level("A", 0, true, 1.5)), Some(Action::Display(None)));
    assert!(h.osc.sent().is_empty());
}

#[tokio::test]
async fn test_board_filter() {
    let mut h = Harness::new(&format!("{}  board: GPIOoE-ABC\n", CONFIG)).await;

    assert_eq!(h.level("GPIOoE-XYZ", 0, false, 0.0), FrameOutcome::Filtered);
    assert_eq!(h.level("GPIOoE-XYZ", 1, true, 1.0), FrameOutcome::Filtered);
    assert_eq!(h.send(r#"{"gpi":{"gpi2":1}}"#, 1.0), FrameOutcome::Filtered);
    assert!(h.osc.sent().is_empty());
    assert_eq!(h.gateway.stats().filtered, 3);

    // Filtered boards still get gap recovery
    h.level("GPIOoE-XYZ", 7, false, 2.0);
    assert_eq!(h.gateway.stats().gaps, 1);

    h.level("GPIOoE-ABC", 0, false, 3.0);
    assert_eq!(action(&h.level("GPIOoE-ABC", 1, true, 4.0)), Some(Action::Fire));
}

#[tokio::test]
async fn test_malformed_frame_changes_nothing() {
    let mut h = Harness::new(CONFIG).await;
    h.level("A", 0, false, 0.0);

    assert_eq!(h.send("{not json", 0.5), FrameOutcome::Malformed);
    assert_eq!(h.send(r#""just a string""#, 0.5), FrameOutcome::Malformed);
    assert_eq!(h.send(r#"{"host":"A","pno":1,"gpi":{"gpi12":1}}"#, 0.5), FrameOutcome::Malformed);

    let stats = h.gateway.stats();
    assert_eq!(stats.malformed, 3);
    assert_eq!(stats.gaps, 0);
    assert!(h.status.sent().is_empty());

    // Baseline and counter untouched by the bad frames
    assert_eq!(action(&h.level("A", 1, true, 1.0)), Some(Action::Fire));
    assert_eq!(h.gateway.stats().gaps, 0);
}

#[tokio::test]
async fn test_frame_without_channels_is_noop() {
    let mut h = Harness::new(CONFIG).await;
    h.level("A", 0, false, 0.0);

    let outcome = h.send(r#"{"host":"A","pno":1}"#, 0.5);
    assert_eq!(
        outcome,
        FrameOutcome::Processed {
            action: Action::NoOp,
            status: None
        }
    );
    assert_eq!(h.gateway.last_snapshot().and_then(|s| s.sequence), Some(0));
}

#[tokio::test]
async fn test_status_line_for_processed_frame() {
    let mut h = Harness::new(CONFIG).await;
    h.level("A", 0, false, 0.0);

    match h.level("A", 1, true, 1.0) {
        FrameOutcome::Processed {
            status: Some(line), ..
        } => {
            assert_eq!(line.host, "A");
            assert!(line.channels.get(2));
            assert_eq!(line.message, StatusMessage::Triggered { cue: "12".to_string() });
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_bad_reload_keeps_prior_cue() {
    let mut h = Harness::new(CONFIG).await;

    // Truncated mid-write
    h.set_config("main:\n  pin: 3\n  cue_retri");
    assert!(h.gateway.on_slow_tick(h.at(0.0)).await.is_none());
    assert_eq!(h.gateway.config().main.cue(), "12");

    h.level("A", 0, false, 0.5);
    h.level("A", 1, true, 1.0);
    assert_eq!(h.fired_cues(), vec!["/cue/12/start"]);
}

#[tokio::test]
async fn test_good_reload_changes_cue_and_pin() {
    let mut h = Harness::new(CONFIG).await;

    h.set_config(&CONFIG.replace("\"12\"", "finale").replace("pin: 3", "pin: 1"));
    h.gateway.on_slow_tick(h.at(0.0)).await;
    assert_eq!(h.gateway.config().main.cue(), "finale");

    h.send(r#"{"host":"A","pno":0,"gpi":{"gpi0":0}}"#, 0.5);
    h.send(r#"{"host":"A","pno":1,"gpi":{"gpi0":1}}"#, 1.0);
    assert_eq!(h.fired_cues(), vec!["/cue/finale/start"]);
}

#[tokio::test]
async fn test_slow_tick_counts_down_without_firing() {
    let mut h = Harness::new(CONFIG).await;

    // Nothing fired yet: no refresh
    assert!(h.gateway.on_slow_tick(h.at(0.0)).await.is_none());

    h.level("A", 0, false, 0.0);
    h.level("A", 1, true, 1.0);

    let line = h.gateway.on_slow_tick(h.at(2.0)).await.unwrap();
    assert_eq!(
        line.message,
        StatusMessage::Cooldown(CooldownNotice {
            remaining: Duration::from_secs(4)
        })
    );

    // Countdown finished but still inside cooldown + 1 s
    let line = h.gateway.on_slow_tick(h.at(6.5)).await.unwrap();
    assert_eq!(line.message, StatusMessage::None);

    assert!(h.gateway.on_slow_tick(h.at(7.5)).await.is_none());
    assert_eq!(h.fired_cues().len(), 1);
}

#[tokio::test]
async fn test_refresh_never_fires() {
    let mut h = Harness::new(CONFIG).await;
    h.level("A", 0, false, 0.0);
    h.level("A", 1, true, 1.0);
    h.level("A", 2, false, 2.0);

    // Last snapshot is low; refresh after the cooldown must not fire or move the window
    h.gateway.on_slow_tick(h.at(6.2)).await;
    assert_eq!(h.fired_cues().len(), 1);

    assert_eq!(action(&h.level("A", 3, true, 6.3)), Some(Action::Fire));
}

#[tokio::test]
async fn test_fast_tick_keepalive() {
    let mut h = Harness::new(CONFIG).await;
    h.gateway.on_fast_tick();
    assert!(h.status.sent().is_empty());

    h.set_config(&format!("{}  unicast_ip: 10.0.0.42\n", CONFIG));
    h.gateway.on_slow_tick(h.at(0.0)).await;

    h.gateway.on_fast_tick();
    h.gateway.on_fast_tick();
    assert_eq!(h.status.sent_to("10.0.0.42:1337".parse().unwrap()), 2);
    assert_eq!(h.gateway.stats().keepalives, 2);
}

#[tokio::test]
async fn test_trigger_send_failure_does_not_block() {
    let reloader = ConfigReloader::new(Box::new(MemorySource {
        contents: Arc::new(Mutex::new(CONFIG.to_string())),
    }))
    .await
    .unwrap();
    let mut gateway = Gateway::new(
        reloader,
        QlabDriver::new(Arc::new(FailingSink)),
        StatusRequester::new(Arc::new(FailingSink), DEFAULT_STATUS_PORT),
    );
    let t0 = Instant::now();

    gateway.handle_frame(frame("A", 0, false).as_bytes(), board_addr(), t0);
    let outcome = gateway.handle_frame(frame("A", 5, true).as_bytes(), board_addr(), t0 + Duration::from_secs(1));
    assert_eq!(action(&outcome), Some(Action::Fire));

    let stats = gateway.stats();
    assert_eq!(stats.triggers, 1);
    assert_eq!(stats.trigger_send_failures, 1);
    assert_eq!(stats.gaps, 1);
    assert_eq!(stats.status_requests, 0);

    // The cooldown window closed even though the send failed
    gateway.handle_frame(frame("A", 6, false).as_bytes(), board_addr(), t0 + Duration::from_secs(2));
    let outcome = gateway.handle_frame(frame("A", 7, true).as_bytes(), board_addr(), t0 + Duration::from_secs(3));
    assert_ne!(action(&outcome), Some(Action::Fire));
}

#[tokio::test]
async fn test_unrepresentable_delay_blocks_retrigger() {
    let mut h = Harness::new("main:\n  pin: 3\n  cue: \"12\"\n  cue_retrigger_delay: 1e20\n").await;

    h.level("A", 0, false, 0.0);
    assert_eq!(action(&h.level("A", 1, true, 1.0)), Some(Action::Fire));
    h.level("A", 2, false, 1.1);
    assert_ne!(action(&h.level("A", 3, true, 1.2)), Some(Action::Fire));
    assert_ne!(action(&h.level("A", 5, true, 3600.0)), Some(Action::Fire));

    assert_eq!(h.fired_cues(), vec!["/cue/12/start".to_string()]);
    assert!(h.gateway.on_slow_tick(h.at(2.0)).await.is_some());
}

#[tokio::test]
async fn test_qlab_host_name_resolved() {
    let mut h = Harness::new(&format!("{}  qlab_ip: localhost\n  qlab_port: 53100\n", CONFIG)).await;

    // Names are looked up asynchronously; until then the cue cannot be sent
    assert_eq!(h.gateway.endpoints().trigger, None);
    h.level("A", 0, false, 0.0);
    assert_eq!(action(&h.level("A", 1, true, 1.0)), Some(Action::Fire));
    assert!(h.osc.sent().is_empty());
    assert_eq!(h.gateway.stats().trigger_send_failures, 1);

    h.gateway.on_slow_tick(h.at(1.5)).await;
    let endpoint = h.gateway.endpoints().trigger.expect("localhost resolves");
    assert!(endpoint.ip().is_loopback());
    assert_eq!(endpoint.port(), 53100);

    h.level("A", 2, false, 6.0);
    assert_eq!(action(&h.level("A", 3, true, 7.0)), Some(Action::Fire));
    let sent = h.osc.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1, endpoint);
}

#[tokio::test]
async fn test_keepalive_host_name_from_reload() {
    let mut h = Harness::new(CONFIG).await;
    h.gateway.resolve_endpoints().await;
    assert_eq!(h.gateway.endpoints().keepalive, None);

    h.set_config(&format!("{}  unicast_ip: localhost\n", CONFIG));
    h.gateway.on_slow_tick(h.at(0.0)).await;

    let peer = h.gateway.endpoints().keepalive.expect("localhost resolves");
    assert!(peer.is_loopback());
    h.gateway.on_fast_tick();
    assert_eq!(h.status.sent_to(SocketAddr::new(peer, DEFAULT_STATUS_PORT)), 1);
}
