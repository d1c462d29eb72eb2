use super::types::{default_port, CaptureConfig};
use crate::error_handling::types::ConfigError;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Daemon configuration, loaded once at startup from a TOML file.
///
/// ```toml
/// host_key_path = "/perm/tapd/host_key"
/// listen_addresses = ["10.0.0.1", "192.168.1.1"]
///
/// [capture]
/// interfaces = ["uplink0", "lan0"]
/// ```
///
/// `listen_addresses` carries the result of local address discovery, which
/// happens outside this daemon. `port`, `capture.filter` and
/// `capture.snaplen` fall back to deployment defaults when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the host's SSH private key.
    pub host_key_path: PathBuf,

    /// Local addresses to bind; one listener per address.
    pub listen_addresses: Vec<IpAddr>,

    /// TCP port shared by every listener.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Capture parameters applied to every session.
    pub capture: CaptureConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw).map_err(ConfigError::TomlError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.interfaces.is_empty() {
            return Err(ConfigError::NoInterfaces);
        }
        if self.listen_addresses.is_empty() {
            return Err(ConfigError::NoListenAddresses);
        }
        if self.capture.snaplen == 0 {
            return Err(ConfigError::SnaplenZero);
        }
        Ok(())
    }
}
