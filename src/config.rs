//! Server configuration loaded from TOML.

use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_new::new;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Configuration for the game server.
///
/// Every field has a default, so an empty file (or no file) is valid.
#[derive(Debug, Clone, PartialEq, Getters, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the game listener binds to.
    #[serde(default = "default_game_addr")]
    game_addr: SocketAddr,

    /// Address the standings web view binds to.
    #[serde(default = "default_web_addr")]
    web_addr: SocketAddr,

    /// Seconds a player has to answer a turn prompt.
    #[serde(default = "default_turn_timeout_secs")]
    turn_timeout_secs: u64,

    /// Seconds a new connection has to send its nickname.
    #[serde(default = "default_nickname_timeout_secs")]
    nickname_timeout_secs: u64,

    /// Directory holding `scoreboard.json` and `history.json`.
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,

    /// Write standings to disk after every recorded match.
    #[serde(default = "default_autosave")]
    autosave: bool,

    /// Seed for forced-move selection. Unset means entropy.
    #[serde(default)]
    rng_seed: Option<u64>,

    /// LAN discovery responder.
    #[serde(default)]
    discovery: DiscoveryConfig,

    /// TLS for game connections. Absent means plain TCP.
    #[serde(default)]
    tls: Option<TlsConfig>,
}

/// PEM files for the game listener's TLS identity.
#[derive(Debug, Clone, PartialEq, Getters, new, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Certificate chain, leaf first.
    cert_path: PathBuf,
    /// Private key for the leaf certificate.
    key_path: PathBuf,
}

/// Settings for the UDP discovery responder.
#[derive(Debug, Clone, PartialEq, Getters, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Whether the responder runs at all.
    #[serde(default = "default_discovery_enabled")]
    enabled: bool,

    /// UDP port the responder listens on.
    #[serde(default = "default_discovery_port")]
    port: u16,

    /// IPv4 multicast group joined by the responder.
    #[serde(default = "default_discovery_group")]
    group: Ipv4Addr,

    /// Address announced to clients instead of the detected outbound one.
    #[serde(default)]
    advertise_ip: Option<Ipv4Addr>,
}

fn default_game_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5050))
}

fn default_web_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}

fn default_turn_timeout_secs() -> u64 {
    10
}

fn default_nickname_timeout_secs() -> u64 {
    60
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_autosave() -> bool {
    true
}

fn default_discovery_enabled() -> bool {
    true
}

fn default_discovery_port() -> u16 {
    5051
}

fn default_discovery_group() -> Ipv4Addr {
    Ipv4Addr::new(224, 0, 0, 1)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            game_addr: default_game_addr(),
            web_addr: default_web_addr(),
            turn_timeout_secs: default_turn_timeout_secs(),
            nickname_timeout_secs: default_nickname_timeout_secs(),
            data_dir: default_data_dir(),
            autosave: default_autosave(),
            rng_seed: None,
            discovery: DiscoveryConfig::default(),
            tls: None,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: default_discovery_enabled(),
            port: default_discovery_port(),
            group: default_discovery_group(),
            advertise_ip: None,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        info!(
            game_addr = %config.game_addr,
            web_addr = %config.web_addr,
            turn_timeout_secs = config.turn_timeout_secs,
            "Config loaded"
        );
        Ok(config)
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                debug!("No config file given, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Turn deadline as a duration.
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    /// Nickname deadline as a duration.
    pub fn nickname_timeout(&self) -> Duration {
        Duration::from_secs(self.nickname_timeout_secs)
    }

    /// Overrides the game listener address.
    pub fn with_game_addr(mut self, addr: SocketAddr) -> Self {
        self.game_addr = addr;
        self
    }

    /// Overrides the web view address.
    pub fn with_web_addr(mut self, addr: SocketAddr) -> Self {
        self.web_addr = addr;
        self
    }

    /// Overrides the data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Overrides the turn timeout.
    pub fn with_turn_timeout_secs(mut self, secs: u64) -> Self {
        self.turn_timeout_secs = secs;
        self
    }

    /// Overrides the forced-move seed.
    pub fn with_rng_seed(mut self, seed: Option<u64>) -> Self {
        self.rng_seed = seed;
        self
    }

    /// Enables or disables the discovery responder.
    pub fn with_discovery_enabled(mut self, enabled: bool) -> Self {
        self.discovery.enabled = enabled;
        self
    }

    /// Overrides the discovery port.
    pub fn with_discovery_port(mut self, port: u16) -> Self {
        self.discovery.port = port;
        self
    }

    /// Enables TLS on the game listener, or disables it with `None`.
    pub fn with_tls(mut self, tls: Option<TlsConfig>) -> Self {
        self.tls = tls;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.turn_timeout_secs == 0 {
            return Err(ConfigError::new(
                "turn_timeout_secs must be at least 1".to_string(),
            ));
        }
        if !self.discovery.group.is_multicast() {
            return Err(ConfigError::new(format!(
                "discovery group {} is not a multicast address",
                self.discovery.group
            )));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.game_addr().port(), 5050);
        assert_eq!(config.web_addr().port(), 5000);
        assert_eq!(config.turn_timeout(), Duration::from_secs(10));
        assert_eq!(*config.discovery().port(), 5051);
        assert_eq!(*config.discovery().group(), Ipv4Addr::new(224, 0, 0, 1));
    }

    #[test]
    fn test_partial_file_overrides() {
        let config = ServerConfig::from_toml(
            r#"
            game_addr = "127.0.0.1:6000"
            turn_timeout_secs = 3
            rng_seed = 42

            [discovery]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.game_addr().to_string(), "127.0.0.1:6000");
        assert_eq!(config.turn_timeout(), Duration::from_secs(3));
        assert_eq!(*config.rng_seed(), Some(42));
        assert!(!config.discovery().enabled());
        assert_eq!(*config.discovery().port(), 5051);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = ServerConfig::from_toml("turn_timeout_secs = 0").unwrap_err();
        assert!(err.message.contains("turn_timeout_secs"));
    }

    #[test]
    fn test_rejects_unicast_group() {
        let err = ServerConfig::from_toml("[discovery]\ngroup = \"10.0.0.1\"").unwrap_err();
        assert!(err.message.contains("multicast"));
    }

    #[test]
    fn test_missing_file_reports_location() {
        let err = ServerConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.message.contains("Failed to read"));
        assert!(err.file.ends_with("config.rs"));
    }

    #[test]
    fn test_tls_section_is_optional() {
        assert_eq!(*ServerConfig::from_toml("").unwrap().tls(), None);

        let config = ServerConfig::from_toml(
            r#"
            [tls]
            cert_path = "certs/server.pem"
            key_path = "certs/server.key"
            "#,
        )
        .unwrap();
        let tls = config.tls().as_ref().unwrap();
        assert_eq!(tls.cert_path(), Path::new("certs/server.pem"));
        assert_eq!(tls.key_path(), Path::new("certs/server.key"));
    }

    #[test]
    fn test_tls_section_needs_both_paths() {
        let err = ServerConfig::from_toml("[tls]\ncert_path = \"a.pem\"").unwrap_err();
        assert!(err.message.contains("key_path"));
    }
}
