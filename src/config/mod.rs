//! Configuration management for the GPIO OSC bridge
//!
//! Handles loading, parsing, and periodic reloading of the YAML configuration.

pub mod endpoints;
pub mod reload;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::debounce::TriggerPolicy;
use crate::packet::CHANNEL_COUNT;

pub use endpoints::Endpoints;
pub use reload::{ConfigReloader, ConfigSource, FileConfigSource, ReloadOutcome};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub main: MainConfig,
}

/// Trigger settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MainConfig {
    /// Monitored GPI channel, 1-based
    pub pin: i64,

    /// QLab cue number or name
    #[serde(default, deserialize_with = "deserialize_cue")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cue: Option<String>,

    /// Seconds to wait before the cue may fire again
    #[serde(default)]
    pub cue_retrigger_delay: f64,

    /// Only accept frames from this board
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board: Option<String>,

    /// QLab host name or IP
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qlab_ip: Option<String>,

    /// QLab OSC port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qlab_port: Option<u16>,

    /// Board polled for status every 100 ms, host name or IP
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unicast_ip: Option<String>,
}

impl GatewayConfig {
    /// Load configuration from file with validation
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse and validate YAML contents
    pub fn parse(contents: &str) -> Result<Self> {
        let config: GatewayConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for correctness
    pub fn validate(&self) -> Result<()> {
        let main = &self.main;

        if main.pin < 1 || main.pin > CHANNEL_COUNT as i64 {
            anyhow::bail!("Invalid GPI pin {} (must be 1-{})", main.pin, CHANNEL_COUNT);
        }

        match main.cue.as_deref() {
            None => anyhow::bail!("main.cue is required"),
            Some(cue) if cue.trim().is_empty() => anyhow::bail!("main.cue cannot be empty"),
            Some(_) => {}
        }

        if !main.cue_retrigger_delay.is_finite() || main.cue_retrigger_delay < 0.0 {
            anyhow::bail!(
                "Invalid cue_retrigger_delay {} (must be a non-negative number of seconds)",
                main.cue_retrigger_delay
            );
        }

        for (field, host) in [("qlab_ip", &main.qlab_ip), ("unicast_ip", &main.unicast_ip)] {
            if host.as_deref().is_some_and(|h| h.trim().is_empty()) {
                anyhow::bail!("main.{} cannot be empty", field);
            }
        }

        Ok(())
    }
}

impl MainConfig {
    /// Monitored channel as a 0-based index
    pub fn channel_index(&self) -> usize {
        (self.pin.clamp(1, CHANNEL_COUNT as i64) - 1) as usize
    }

    /// Retrigger delay; delays too large to represent never expire
    pub fn cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.cue_retrigger_delay).unwrap_or(Duration::MAX)
    }

    pub fn trigger_policy(&self) -> TriggerPolicy {
        TriggerPolicy {
            channel: self.channel_index(),
            cooldown: self.cooldown(),
        }
    }

    pub fn cue(&self) -> &str {
        self.cue.as_deref().unwrap_or_default()
    }

    /// Host cue commands are sent to
    pub fn trigger_host(&self) -> &str {
        self.qlab_ip.as_deref().map(str::trim).unwrap_or(DEFAULT_QLAB_HOST)
    }

    pub fn trigger_port(&self) -> u16 {
        self.qlab_port.unwrap_or(DEFAULT_QLAB_PORT)
    }

    /// Host polled on the fast tick
    pub fn keepalive_host(&self) -> Option<&str> {
        self.unicast_ip.as_deref().map(str::trim)
    }

    /// Whether a frame from `source` passes the board filter
    pub fn accepts_source(&self, source: Option<&str>) -> bool {
        match self.board.as_deref() {
            Some(board) => source == Some(board),
            None => true,
        }
    }
}

/// QLab's default OSC port
pub const DEFAULT_QLAB_PORT: u16 = 53000;

/// QLab host when none is configured
pub const DEFAULT_QLAB_HOST: &str = "127.0.0.1";

/// Cue ids may be written as numbers or strings
fn deserialize_cue<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum CueValue {
        Int(i64),
        Float(f64),
        Text(String),
    }

    Ok(Option::<CueValue>::deserialize(deserializer)?.map(|value| match value {
        CueValue::Int(n) => n.to_string(),
        CueValue::Float(n) => n.to_string(),
        CueValue::Text(s) => s,
    }))
}
