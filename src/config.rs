//! Configuration for the adapter monitor
//!
//! Handles loading and validating the YAML configuration file and parsing
//! `<type>:<port>` device specs given on the command line.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;

use crate::error::AdapterError;
use crate::instrument::DeviceKind;

/// Devices a host can emulate at once
pub const MAX_DEVICES: usize = 3;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// One emulated adapter and the MIDI input feeding it
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct DeviceConfig {
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    /// Port to publish, or substring of an existing port to connect to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default = "default_true")]
    pub virtual_port: bool,
}

impl DeviceConfig {
    pub fn new(kind: DeviceKind, port: Option<String>) -> Self {
        Self {
            kind,
            port,
            virtual_port: true,
        }
    }

    /// Configured port name, or the mode's default when unset or empty
    pub fn port_name(&self) -> &str {
        match self.port.as_deref() {
            Some(port) if !port.trim().is_empty() => port,
            _ => self.kind.default_port_name(),
        }
    }
}

impl FromStr for DeviceConfig {
    type Err = AdapterError;

    /// Parse `<type>:<port>`, or a bare `<type>` for the default port
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, port) = match s.split_once(':') {
            Some((kind, port)) => (kind, Some(port.trim())),
            None => (s, None),
        };

        if kind.trim().is_empty() {
            return Err(AdapterError::InvalidDeviceSpec(s.to_string()));
        }
        let kind: DeviceKind = kind.parse()?;

        Ok(Self::new(
            kind,
            port.filter(|p| !p.is_empty()).map(str::to_string),
        ))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl AppConfig {
    /// Load configuration from YAML file
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        config.validate()?;

        Ok(config)
    }

    /// Load the file if it exists, defaults otherwise
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Replace the configured devices, when any are given
    pub fn override_devices(&mut self, devices: Vec<DeviceConfig>) {
        if !devices.is_empty() {
            self.devices = devices;
        }
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.devices.len() > MAX_DEVICES {
            return Err(AdapterError::TooManyDevices {
                count: self.devices.len(),
                max: MAX_DEVICES,
            }
            .into());
        }

        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than 0");
        }

        Ok(())
    }
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_poll_interval_ms() -> u64 {
    10
}
