//! Periodic configuration reload
//!
//! The configuration file may be edited while the bridge runs. It is reread on
//! every slow tick and a new snapshot is only adopted when it parses and
//! validates, so a file caught half-written never replaces a good one.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info};

use super::GatewayConfig;

/// Somewhere a configuration snapshot can be read from
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Read and validate the current configuration
    async fn load(&self) -> Result<GatewayConfig>;

    /// Human-readable location for logs
    fn describe(&self) -> String;
}

/// Configuration stored in a YAML file
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn load(&self) -> Result<GatewayConfig> {
        GatewayConfig::load(&self.path).await
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Result of one reload attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// File read fine and matches the active configuration
    Unchanged,
    /// New configuration adopted
    Updated,
    /// Read or validation failed; the active configuration was kept
    Rejected,
}

/// Holds the last good configuration and refreshes it from a source
pub struct ConfigReloader {
    source: Box<dyn ConfigSource>,
    active: GatewayConfig,
}

impl ConfigReloader {
    /// Load the initial configuration; failure here is fatal for the caller
    pub async fn new(source: Box<dyn ConfigSource>) -> Result<Self> {
        let active = source
            .load()
            .await
            .context("Failed to load initial config")?;

        info!("Configuration loaded from: {}", source.describe());

        Ok(Self { source, active })
    }

    /// Active configuration snapshot
    pub fn current(&self) -> &GatewayConfig {
        &self.active
    }

    /// Reread the source, keeping the active snapshot on any failure
    pub async fn reload(&mut self) -> ReloadOutcome {
        match self.source.load().await {
            Ok(config) if config == self.active => ReloadOutcome::Unchanged,
            Ok(config) => {
                info!(
                    "📝 Configuration reloaded: pin {} → cue {} (retrigger delay {}s)",
                    config.main.pin,
                    config.main.cue(),
                    config.main.cue_retrigger_delay
                );
                self.active = config;
                ReloadOutcome::Updated
            }
            Err(e) => {
                // Editors often leave the file briefly empty or partial
                debug!("Ignoring config reload (keeping old config): {:#}", e);
                ReloadOutcome::Rejected
            }
        }
    }
}
