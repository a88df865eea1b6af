//! Server configuration with TOML file support.

use serde::{Deserialize, Serialize};

use cinder_types::U128;

use crate::device::DeviceKind;
use crate::error::ServerError;

/// Configuration for the work server.
///
/// Can be loaded from a TOML file via [`Config::from_toml_file`] or built
/// programmatically (e.g. for tests). Every field has a default, so an
/// empty file is a valid configuration, albeit one with no devices.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub work: WorkSection,

    /// One `[[device]]` entry per compute device. Workers are spawned
    /// one-to-one with this list.
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerSection {
    /// Address the daemon listens on.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Port the daemon listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bound on queued jobs; submits beyond it are rejected.
    #[serde(default = "default_request_limit")]
    pub request_limit: usize,

    /// Whether control requests (queue purge) are allowed.
    #[serde(default)]
    pub allow_control: bool,

    /// Whether the `priority` request field influences dequeue order.
    #[serde(default)]
    pub allow_prioritization: bool,

    /// Capacity of the completed-job ring; older entries are evicted FIFO.
    #[serde(default = "default_completed_limit")]
    pub completed_limit: usize,

    /// Log level filter, used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkSection {
    /// Denominator for multiplier math and the difficulty applied to
    /// requests that don't carry one.
    #[serde(default = "default_base_difficulty")]
    pub base_difficulty: U128,

    /// Seconds; when non-zero the search is bypassed and a fixed mock
    /// result is emitted after the delay. For client integration testing.
    #[serde(default)]
    pub mock_work_generation_delay: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(rename = "type")]
    pub kind: DeviceKind,

    #[serde(default)]
    pub index: u32,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8076
}

fn default_request_limit() -> usize {
    64
}

fn default_completed_limit() -> usize {
    32
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_base_difficulty() -> U128 {
    U128::new(0x2000000000000000)
}

// ── Impl ───────────────────────────────────────────────────────────────

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, ServerError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ServerError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ServerError> {
        toml::from_str(s).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("Config is always serializable to TOML")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            work: WorkSection::default(),
            devices: Vec::new(),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            request_limit: default_request_limit(),
            allow_control: false,
            allow_prioritization: false,
            completed_limit: default_completed_limit(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for WorkSection {
    fn default() -> Self {
        Self {
            base_difficulty: default_base_difficulty(),
            mock_work_generation_delay: 0,
        }
    }
}
