//! Server configuration
//!
//! Loaded from a TOML file; every field has a default so a missing or
//! partial file still produces a working configuration. The config path
//! comes from the `--config` CLI flag or the `LMS_CONFIG` environment
//! variable, falling back to `lms.toml` in the working directory.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Top-level server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// TCP port
    pub port: u16,
    /// SQLite database file path
    pub database_path: PathBuf,
    /// Directory for uploaded profile photos
    pub upload_dir: PathBuf,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,
    /// Payment gateway settings
    pub gateway: GatewayConfig,
    /// Mail relay settings
    pub mail: MailConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            database_path: PathBuf::from("lms.db"),
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: 5 * 1024 * 1024,
            gateway: GatewayConfig::default(),
            mail: MailConfig::default(),
        }
    }
}

/// Payment gateway configuration
///
/// In `offline` mode order references are minted locally and no network
/// calls are made; `online` mode talks to the gateway's order endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// "offline" or "online"
    pub mode: String,
    /// Base URL of the gateway API (online mode)
    pub base_url: String,
    /// Public key identifier, returned to clients at checkout
    pub key_id: String,
    /// Secret used to verify payment signatures
    pub key_secret: String,
    /// ISO currency code for new orders
    pub currency: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: "offline".to_string(),
            base_url: "https://gateway.invalid/api".to_string(),
            key_id: "key_local".to_string(),
            key_secret: "secret_local".to_string(),
            currency: "INR".to_string(),
        }
    }
}

/// Mail relay configuration
///
/// `offline` mode logs messages instead of delivering them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// "offline" or "online"
    pub mode: String,
    /// Base URL of the HTTP mail relay (online mode)
    pub base_url: String,
    /// From address stamped on outgoing mail
    pub from_address: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            mode: "offline".to_string(),
            base_url: "https://mail.invalid/api".to_string(),
            from_address: "noreply@lms.local".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the given path, or defaults when the file
    /// is absent.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => std::env::var("LMS_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("lms.toml")),
        };

        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Config::default());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        info!("Loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".to_string()));
        }
        match self.gateway.mode.as_str() {
            "offline" | "online" => {}
            other => {
                return Err(Error::Config(format!(
                    "gateway.mode must be \"offline\" or \"online\", got \"{}\"",
                    other
                )));
            }
        }
        match self.mail.mode.as_str() {
            "offline" | "online" => {}
            other => {
                return Err(Error::Config(format!(
                    "mail.mode must be \"offline\" or \"online\", got \"{}\"",
                    other
                )));
            }
        }
        Ok(())
    }
}
