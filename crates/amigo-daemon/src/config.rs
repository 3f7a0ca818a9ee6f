//! Daemon configuration file.
//!
//! TOML at `$AMIGO_DATA_DIR/config.toml`; every section falls back to
//! its defaults when the file or key is absent.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Identity settings.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Development transport settings.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Mesh runtime settings, passed through to the core.
    #[serde(default)]
    pub mesh: amigo_mesh::MeshConfig,
}

/// Identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Pseudonym stamped into the credential on first launch.
    #[serde(default = "default_pseudonym")]
    pub pseudonym: String,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// UDP development transport configuration. Stands in for the platform
/// radio binding during LAN testing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// 0 = OS-assigned ephemeral port.
    #[serde(default)]
    pub listen_port: u16,
    /// Peer addresses (`host:port`) datagrams are broadcast to.
    #[serde(default)]
    pub peers: Vec<String>,
}

fn default_pseudonym() -> String {
    "anonymous".to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            pseudonym: default_pseudonym(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            listen_port: 0,
            peers: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration, falling back to defaults if the file does
    /// not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::data_dir_from_env().join("config.toml");
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// The effective data directory.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::data_dir_from_env()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    fn data_dir_from_env() -> PathBuf {
        if let Ok(dir) = std::env::var("AMIGO_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|home| PathBuf::from(home).join(".amigo"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/amigo"))
    }
}
