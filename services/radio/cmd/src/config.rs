//! Configuration handling for the radio client.
//!
//! Settings come from a YAML file, then environment variables, then command
//! line flags, each layer overriding the previous one.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Radio client configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Device URL, e.g. `tcp://192.168.1.40:4403`
    pub device: String,
    /// Base64 channel key used to decrypt packets the radio could not
    pub channel_key: String,
    /// Buffered messages per queue before the oldest is dropped
    pub queue_capacity: usize,
    /// Upper bound for the configuration handshake
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device: "tcp://127.0.0.1:4403".to_string(),
            channel_key: "AQ==".to_string(),
            queue_capacity: radio_session::DEFAULT_QUEUE_CAPACITY,
            handshake_timeout: Duration::from_secs(30),
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    radio: Option<RadioSection>,
}

#[derive(Debug, Deserialize)]
struct RadioSection {
    device: Option<String>,
    channel_key: Option<String>,
    queue_capacity: Option<usize>,
    handshake_timeout: Option<String>,
}

impl ClientConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();
        let path = config_path.as_ref();

        match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root) => {
                    config.apply_root_config(root)?;
                    info!("Loaded configuration from {:?}", path);
                }
                Err(e) => warn!("Failed to parse config file {:?} ({}), using defaults", path, e),
            },
            Err(_) => warn!("Config file {:?} not found, using defaults", path),
        }

        config.apply_overrides(|key| std::env::var(key).ok())?;

        info!(
            "Final radio configuration: device={}, queue_capacity={}, handshake_timeout={}",
            config.device,
            config.queue_capacity,
            humantime::format_duration(config.handshake_timeout)
        );

        Ok(config)
    }

    fn apply_root_config(&mut self, root: RootConfig) -> Result<()> {
        let Some(radio) = root.radio else {
            return Ok(());
        };

        if let Some(device) = radio.device {
            self.device = device;
        }
        if let Some(key) = radio.channel_key {
            self.channel_key = key;
        }
        if let Some(capacity) = radio.queue_capacity {
            self.queue_capacity = capacity;
        }
        if let Some(timeout) = radio.handshake_timeout {
            self.handshake_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("invalid radio.handshake_timeout {:?}", timeout))?;
        }

        Ok(())
    }

    /// Apply `RADIO_*` overrides from `lookup`
    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(device) = lookup("RADIO_DEVICE") {
            info!("Device overridden by environment: {}", device);
            self.device = device;
        }

        if let Some(key) = lookup("RADIO_CHANNEL_KEY") {
            info!("Channel key overridden by environment");
            self.channel_key = key;
        }

        if let Some(capacity) = lookup("RADIO_QUEUE_CAPACITY") {
            match capacity.parse::<usize>() {
                Ok(capacity) => {
                    self.queue_capacity = capacity;
                    info!("Queue capacity overridden by environment: {}", capacity);
                }
                Err(_) => warn!("Ignoring RADIO_QUEUE_CAPACITY={:?}, not a number", capacity),
            }
        }

        if let Some(timeout) = lookup("RADIO_HANDSHAKE_TIMEOUT") {
            self.handshake_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("invalid RADIO_HANDSHAKE_TIMEOUT {:?}", timeout))?;
            info!("Handshake timeout overridden by environment: {}", timeout);
        }

        Ok(())
    }
}
