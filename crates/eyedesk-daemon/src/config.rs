//! Configuration loading and validation

use anyhow::Result;
use eyedesk_core::PANDA_JOINTS;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub robot: RobotConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for web server
    #[serde(default = "default_bind")]
    pub bind: String,
    /// TLS configuration (optional - enables HTTPS when present)
    #[serde(default)]
    pub tls: Option<TlsConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            tls: None,
        }
    }
}

/// TLS/HTTPS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM format)
    pub cert: String,
    /// Path to private key file (PEM format)
    pub key: String,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Broadcast buffer per channel; slow viewers skip older messages
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// How long to wait for a projector to report its drawable size
    #[serde(default = "default_size_timeout")]
    pub size_timeout_ms: u64,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            size_timeout_ms: default_size_timeout(),
        }
    }
}

fn default_capacity() -> usize {
    10
}

fn default_size_timeout() -> u64 {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Built frontend (WASM + index.html)
    #[serde(default = "default_web_dir")]
    pub web_dir: String,
    /// Robot description, object models and the object manifest
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            web_dir: default_web_dir(),
            assets_dir: default_assets_dir(),
        }
    }
}

fn default_web_dir() -> String {
    "web".to_string()
}

fn default_assets_dir() -> String {
    "./assets".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Joint names in kinematic frame order
    #[serde(default = "default_joints")]
    pub joints: Vec<String>,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            joints: default_joints(),
        }
    }
}

fn default_joints() -> Vec<String> {
    PANDA_JOINTS.iter().map(|j| j.to_string()).collect()
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        if config.robot.joints.is_empty() {
            anyhow::bail!("robot.joints must name at least one joint");
        }
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("eyedesk.toml")).unwrap();
        assert_eq!(config.daemon.bind, "127.0.0.1:8000");
        assert_eq!(config.robot.joints.len(), 7);
        assert!(config.daemon.tls.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eyedesk.toml");
        std::fs::write(&path, "[channels]\ncapacity = 32\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.channels.capacity, 32);
        assert_eq!(config.channels.size_timeout_ms, 2000);
        assert_eq!(config.assets.assets_dir, "./assets");
    }

    #[test]
    fn test_default_config_round_trips_through_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eyedesk.toml");
        save_default_config(&path).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.robot.joints[6], "panda_joint7");
    }

    #[test]
    fn test_empty_joint_list_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eyedesk.toml");
        std::fs::write(&path, "[robot]\njoints = []\n").unwrap();
        assert!(load_config(&path).is_err());
    }
}
