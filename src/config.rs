//! Configuration types for the PHD2 remote client

use serde::{Deserialize, Serialize};
use std::path::Path;

/// TCP port of PHD2 instance 1
pub const BASE_PORT: u16 = 4400;

/// Derive the event-socket port for a 1-based PHD2 instance number
pub fn instance_port(instance: u16) -> u16 {
    BASE_PORT + instance.saturating_sub(1)
}

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub phd2: Phd2Config,
    #[serde(default)]
    pub settling: SettleParams,
}

/// PHD2 connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phd2Config {
    #[serde(default = "default_host")]
    pub host: String,
    /// 1-based instance number; instance N listens on 4400 + N - 1
    #[serde(default = "default_instance")]
    pub instance: u16,
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_seconds: u64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
}

impl Phd2Config {
    /// The event-socket port for the configured instance
    pub fn port(&self) -> u16 {
        instance_port(self.instance)
    }

    /// The full address string for the configured instance
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port())
    }
}

impl Default for Phd2Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            instance: default_instance(),
            connection_timeout_seconds: default_connection_timeout(),
            command_timeout_seconds: default_command_timeout(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_instance() -> u16 {
    1
}

fn default_connection_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    30
}

/// Settling parameters for guide and dither operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleParams {
    #[serde(default = "default_settle_pixels")]
    pub pixels: f64,
    #[serde(default = "default_settle_time")]
    pub time: u32,
    #[serde(default = "default_settle_timeout")]
    pub timeout: u32,
}

impl Default for SettleParams {
    fn default() -> Self {
        Self {
            pixels: default_settle_pixels(),
            time: default_settle_time(),
            timeout: default_settle_timeout(),
        }
    }
}

fn default_settle_pixels() -> f64 {
    0.5
}

fn default_settle_time() -> u32 {
    10
}

fn default_settle_timeout() -> u32 {
    60
}

/// Load configuration from a JSON file
pub fn load_config(path: &Path) -> std::result::Result<Config, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    Ok(config)
}
