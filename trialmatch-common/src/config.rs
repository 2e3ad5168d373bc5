//! Configuration loading and root folder resolution
//!
//! The service reads one TOML file. Every table is optional and every value
//! has a default, so an absent or empty file yields a working configuration.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "trialmatch.db";

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "TRIALMATCH_ROOT";

/// Shared TOML configuration (sections used by every trialmatch binary)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Root folder holding the database
    pub root_folder: Option<PathBuf>,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// HTTP listener configuration
    pub server: ServerConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset (e.g. "info", "trialmatch_engine=debug")
    pub level: String,
    /// Emit log lines as JSON instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5740,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for `TcpListener::bind`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Root folder resolution priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    config: Option<&TomlConfig>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        debug!(path = %path.display(), "Root folder from command line");
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            debug!(path = %path, "Root folder from environment");
            return PathBuf::from(path);
        }
    }

    if let Some(root) = config.and_then(|c| c.root_folder.clone()) {
        debug!(path = %root.display(), "Root folder from TOML config");
        return root;
    }

    default_root_folder()
}

/// Locate the default configuration file for the platform, if one exists
///
/// Linux checks `~/.config/trialmatch/config.toml` then
/// `/etc/trialmatch/config.toml`; other platforms only the user config dir.
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("trialmatch").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/trialmatch/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("trialmatch"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\trialmatch"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("trialmatch"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/trialmatch"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("trialmatch"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/trialmatch"))
    }
}

/// Create the root folder if missing and return the database path inside it
pub fn prepare_root_folder(root: &Path) -> Result<PathBuf> {
    if !root.exists() {
        std::fs::create_dir_all(root)?;
        info!(path = %root.display(), "Created root folder");
    }
    Ok(root.join(DATABASE_FILE_NAME))
}

/// Load a TOML file into any defaulted config type
///
/// A missing file is not an error: the type's `Default` is returned.
pub fn load_toml<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        debug!(path = %path.display(), "Config file absent, using defaults");
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Write a config value as TOML, atomically (temp file + rename)
pub fn write_toml_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
