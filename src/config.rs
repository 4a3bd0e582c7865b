use crate::error::{OnionError, Result};
use crate::protocol::Destination;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub user: UserConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Directory,
    Relay,
    User,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DirectoryConfig {
    pub listen_addr: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RelayConfig {
    pub id: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UserConfig {
    pub id: u32,
}

/// Where relays and users listen. Every process shares one host and
/// derives its port from its id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    pub base_relay_port: u64,
    pub base_user_port: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            base_relay_port: 4000,
            base_user_port: 3000,
        }
    }
}

impl NetworkConfig {
    pub fn relay_destination(&self, relay_id: u32) -> Result<Destination> {
        Destination::new(self.base_relay_port + u64::from(relay_id))
    }

    pub fn user_destination(&self, user_id: u32) -> Result<Destination> {
        Destination::new(self.base_user_port + u64::from(user_id))
    }

    pub fn listen_addr(&self, destination: Destination) -> String {
        format!("{}:{}", self.host, destination.address())
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path)
        .map_err(|e| OnionError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    parse_config(&config_str)
}

pub fn parse_config(config_str: &str) -> Result<Config> {
    toml::from_str(config_str).map_err(|e| OnionError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config_uses_network_defaults() {
        let config = parse_config(
            r#"
mode = "Relay"

[directory]
listen_addr = "127.0.0.1:8080"

[relay]
id = 7
"#,
        )
        .unwrap();

        assert_eq!(config.mode, Mode::Relay);
        assert_eq!(config.relay.id, 7);
        assert_eq!(config.network, NetworkConfig::default());
        assert_eq!(config.network.relay_destination(7).unwrap().address(), 4007);
        assert_eq!(config.network.user_destination(1).unwrap().address(), 3001);
    }

    #[test]
    fn test_parse_network_overrides() {
        let config = parse_config(
            r#"
mode = "User"

[directory]
listen_addr = "10.0.0.1:9000"

[user]
id = 2

[network]
host = "10.0.0.1"
base_user_port = 5000
"#,
        )
        .unwrap();

        assert_eq!(config.network.host, "10.0.0.1");
        assert_eq!(config.network.base_relay_port, 4000);
        let dest = config.network.user_destination(2).unwrap();
        assert_eq!(config.network.listen_addr(dest), "10.0.0.1:5002");
    }

    #[test]
    fn test_load_config_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path().join("config.toml")).unwrap_err();
        assert!(matches!(err, OnionError::Config(_)));
    }

    #[test]
    fn test_config_roundtrips_through_toml() {
        let config = Config {
            mode: Mode::Directory,
            directory: DirectoryConfig {
                listen_addr: "127.0.0.1:8080".into(),
            },
            relay: RelayConfig::default(),
            user: UserConfig::default(),
            network: NetworkConfig::default(),
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.mode, Mode::Directory);
        assert_eq!(loaded.directory.listen_addr, "127.0.0.1:8080");
    }
}
