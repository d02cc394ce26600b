//! Gateway configuration: the tunables named in the configuration surface
//! table, plus the configured link roster (§6).

use serde_derive::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    Server,
    Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub link_id: i64,
    pub name: String,
    pub mode: LinkMode,
    pub ip: String,
    pub port: u16,
    pub protocol: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub base_delay_sec: f64,
    pub max_delay_sec: f64,
    pub jitter_ratio: f64,
}

impl Default for ReconnectConfig {
    fn default() -> ReconnectConfig {
        ReconnectConfig {
            base_delay_sec: 2.0,
            max_delay_sec: 300.0,
            jitter_ratio: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub session_timeout_ms: u64,
    pub max_buffer_size: usize,
    pub max_session_count: usize,
}

impl Default for ProtocolConfig {
    fn default() -> ProtocolConfig {
        ProtocolConfig {
            session_timeout_ms: 900_000,
            max_buffer_size: 65_536,
            max_session_count: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub io_threads: usize,
    pub reconnect: ReconnectConfig,
    pub protocol: ProtocolConfig,
    pub links: Vec<LinkConfig>,
}

impl Default for GatewayConfig {
    fn default() -> GatewayConfig {
        GatewayConfig {
            io_threads: 0,
            reconnect: ReconnectConfig::default(),
            protocol: ProtocolConfig::default(),
            links: Vec::new(),
        }
    }
}

impl GatewayConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> GatewayConfig {
        serdeconv::from_toml_file(path).expect("error loading gateway configuration file")
    }
}
