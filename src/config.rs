//! Daemon configuration tree, loaded from JSON by `main.rs`.
//!
//! Shape mirrors the distilled spec's §6 external-interfaces config
//! description field for field; defaults for `batch_size` and
//! `queue_length` match the values named there.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::Deserialize;

use crate::error::ConfigError;

fn default_batch_size() -> usize {
    1024
}

fn default_queue_length() -> usize {
    16
}

fn default_detect_interval_secs() -> u64 {
    30
}

fn default_detect_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectConfig {
    pub remote_address: IpAddr,
    pub local_address: IpAddr,
    pub local_port: u16,
    #[serde(default = "default_detect_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_detect_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfigConfig {
    pub sntp_server: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetConfig {
    pub local_address: IpAddr,
    pub detect: DetectConfig,
    #[serde(default)]
    pub config: Option<DeviceConfigConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RangeConfig {
    pub part: String,
    pub subpart: Option<String>,
    pub range: (f64, f64),
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamsConfig {
    pub datadir: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,
    #[serde(default)]
    pub ranges: Vec<RangeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewriteRuleConfig {
    pub expression: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRewriteConfig {
    #[serde(default)]
    pub rewrite: Vec<RewriteRuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplesConfig {
    #[serde(default)]
    pub rewrite: Vec<RewriteRuleConfig>,
    #[serde(default)]
    pub batch: BatchRewriteConfig,
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,
}

impl Default for BatchRewriteConfig {
    fn default() -> Self {
        Self { rewrite: Vec::new() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "protocol")]
pub enum SinkConfig {
    #[serde(rename = "channel")]
    Channel { queue_length: Option<usize> },
    #[serde(rename = "pubsub")]
    PubSub { via: String, node_prefix: Option<String> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorsConfig {
    pub module_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub verbose_status: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub net: NetConfig,
    pub streams: StreamsConfig,
    #[serde(default)]
    pub samples: Option<SamplesConfig>,
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
    #[serde(default)]
    pub sensors: Option<SensorsConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for sink in &self.sinks {
            if let SinkConfig::PubSub { via, .. } = sink {
                if via.is_empty() {
                    return Err(ConfigError::UnknownSinkProtocol { protocol: via.clone() });
                }
            }
        }
        for rule in self.samples.iter().flat_map(|s| s.rewrite.iter()) {
            if rule.expression.trim().is_empty() {
                return Err(ConfigError::InvalidRewriteRule("empty expression".to_string()));
            }
        }
        Ok(())
    }
}

/// Parsed interrupt-name-to-counter-index map, derived at runtime from
/// [`crate::message::status::INTERRUPT_NAMES`] — kept here rather than
/// in `status.rs` since only the ambient CLI/tooling layer needs a
/// name-keyed view.
pub fn interrupt_index_map() -> HashMap<&'static str, usize> {
    crate::message::status::INTERRUPT_NAMES.iter().enumerate().map(|(i, name)| (*name, 2 + i)).collect()
}
