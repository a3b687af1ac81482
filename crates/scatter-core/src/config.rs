//! Configuration system for scatter
//!
//! Supports TOML configuration files with sensible defaults.
//! Configuration is loaded from:
//! - macOS: ~/Library/Application Support/scatter/config.toml
//! - Linux: ~/.config/scatter/config.toml
//! - Windows: %APPDATA%/scatter/config.toml

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::placement::NodeId;
use crate::DEFAULT_MAX_FILE_SIZE;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Gateway listener
    pub gateway: GatewayConfig,
    /// Where the gateway finds S2, S3 and S4
    pub peers: PeerDirectory,
    /// Settings used when this process runs as a peer node
    pub peer: PeerNodeConfig,
    /// Storage layout and limits
    pub storage: StorageConfig,
    /// Socket timeouts
    pub network: NetworkConfig,
}

/// Gateway listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bind address
    pub bind: IpAddr,
    /// TCP port clients connect to
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9001,
        }
    }
}

impl GatewayConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Addresses of the three peer nodes
///
/// Passed explicitly to every gateway session; never mutated after startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerDirectory {
    pub s2: SocketAddr,
    pub s3: SocketAddr,
    pub s4: SocketAddr,
}

impl Default for PeerDirectory {
    fn default() -> Self {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        Self {
            s2: SocketAddr::new(localhost, 9002),
            s3: SocketAddr::new(localhost, 9003),
            s4: SocketAddr::new(localhost, 9004),
        }
    }
}

impl PeerDirectory {
    /// Address of a peer; `None` for the gateway's own node
    pub fn addr(&self, node: NodeId) -> Option<SocketAddr> {
        match node {
            NodeId::Local => None,
            NodeId::Peer2 => Some(self.s2),
            NodeId::Peer3 => Some(self.s3),
            NodeId::Peer4 => Some(self.s4),
        }
    }
}

/// Peer node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerNodeConfig {
    /// Bind address
    pub bind: IpAddr,
    /// Node number (2, 3 or 4)
    pub node: u8,
    /// TCP port; defaults to 9000 + node
    pub port: Option<u16>,
}

impl Default for PeerNodeConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            node: 2,
            port: None,
        }
    }
}

impl PeerNodeConfig {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(9000 + self.node as u16)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port())
    }

    /// Validated node id; the gateway's own node is not a peer
    pub fn node_id(&self) -> Result<NodeId, ConfigError> {
        match NodeId::from_number(self.node) {
            Some(node) if !node.is_local() => Ok(node),
            _ => Err(ConfigError::Invalid(format!(
                "peer node must be 2, 3 or 4 (got {})",
                self.node
            ))),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding S1..S4 (uses the home directory if None)
    pub root: Option<PathBuf>,
    /// Ceiling for any single file or archive in bytes (default 50MB)
    pub max_file_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl StorageConfig {
    /// Effective storage root (config override or home directory)
    pub fn root_dir(&self) -> PathBuf {
        self.root
            .clone()
            .or_else(|| BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Per read/write timeout in seconds
    pub io_timeout_secs: u64,
    /// How long a session may wait for its next command, in seconds
    pub idle_timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            io_timeout_secs: 30,
            idle_timeout_secs: 600, // 10 minutes
        }
    }
}

impl NetworkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_from(&path).unwrap_or_else(|e| {
                warn!("Failed to load config from {:?}: {}, using defaults", path, e);
                Self::default()
            }),
            None => {
                debug!("No config directory found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "scatter", "scatter")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Generate a sample configuration file content
    pub fn sample() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// I/O error
    Io(String),
    /// Parse error
    Parse(String),
    /// Serialization error
    Serialize(String),
    /// Value out of range
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "I/O error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialization error: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
