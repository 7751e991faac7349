//! Daemon configuration.
//!
//! Loaded once at startup from a TOML file. A missing or invalid file is
//! fatal; the daemon never serves with a half-read configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use doomhost_instance::{DEFAULT_READY_MARKER, FieldPolicy, InstanceError, LaunchSettings, PortPool};
use doomhost_monitor::MonitorConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::StartupError;

/// The secret shipped in the sample configuration. Running with it is
/// refused.
pub const SECRET_PLACEHOLDER: &str = "fill this in with something random";

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "doomhost.toml";

fn default_bind_address() -> String {
    "127.0.0.1:10999".to_string()
}

fn default_ban_secs() -> u64 {
    3
}

fn default_actors_file() -> String {
    "skulltag_actors.pk3".to_string()
}

fn default_data_file() -> String {
    "skulltag_data.pk3".to_string()
}

fn default_ready_marker() -> String {
    DEFAULT_READY_MARKER.to_string()
}

fn default_startup_wait_secs() -> u64 {
    5
}

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub network: NetworkSettings,
    pub engine: EngineSettings,
    #[serde(default)]
    pub ports: PortSettings,
    #[serde(default)]
    pub directories: DirectorySettings,
    #[serde(default)]
    pub upload: UploadSettings,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Accounts loaded into the in-memory account store.
    #[serde(default)]
    pub accounts: Vec<AccountSeed>,
}

/// The `[network]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Address of the control listener.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Shared secret every control request must carry.
    pub secret: String,
    /// Lock-out after a wrong secret, in seconds.
    #[serde(default = "default_ban_secs")]
    pub ban_secs: u64,
}

/// The `[engine]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub executable: PathBuf,
    /// Prepended to every hosted server's name.
    #[serde(default)]
    pub host_label: String,
    #[serde(default = "default_actors_file")]
    pub actors_file: String,
    #[serde(default = "default_data_file")]
    pub data_file: String,
    #[serde(default = "default_ready_marker")]
    pub ready_marker: String,
    /// How long a host request waits for the engine before replying.
    #[serde(default = "default_startup_wait_secs")]
    pub startup_wait_secs: u64,
    #[serde(default)]
    pub field_policy: FieldPolicy,
}

/// The `[ports]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSettings {
    pub min_port: u16,
    pub max_port: u16,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            min_port: 10666,
            max_port: 10700,
        }
    }
}

/// The `[directories]` section: one directory per file category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySettings {
    pub iwad: PathBuf,
    pub wad: PathBuf,
    pub cfg: PathBuf,
}

impl Default for DirectorySettings {
    fn default() -> Self {
        Self {
            iwad: PathBuf::from("iwads"),
            wad: PathBuf::from("wads"),
            cfg: PathBuf::from("cfgs"),
        }
    }
}

/// The `[upload]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    pub max_bytes: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is not set.
    pub level: String,
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// One `[[accounts]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSeed {
    pub username: String,
    pub password: String,
}

impl AppConfig {
    /// Reads and parses the configuration file at `path`.
    pub async fn load_from_file(path: &Path) -> Result<Self, StartupError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| StartupError::ConfigRead {
                path: path.to_path_buf(),
                source,
            })?;
        let config: AppConfig = toml::from_str(&content).map_err(|source| StartupError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Checks everything that would otherwise fail later while serving.
    pub fn validate(&self) -> Result<(), StartupError> {
        let secret = self.network.secret.trim();
        if secret.is_empty() || secret == SECRET_PLACEHOLDER {
            return Err(StartupError::InvalidConfig(
                "network.secret must be changed from the sample value".into(),
            ));
        }
        if self.network.bind_address.parse::<SocketAddr>().is_err() {
            return Err(StartupError::InvalidConfig(format!(
                "invalid network.bind_address '{}'",
                self.network.bind_address
            )));
        }
        if self.ports.min_port > self.ports.max_port {
            return Err(StartupError::InvalidConfig(format!(
                "ports.min_port {} is above ports.max_port {}",
                self.ports.min_port, self.ports.max_port
            )));
        }
        if self.engine.executable.as_os_str().is_empty() {
            return Err(StartupError::InvalidConfig("engine.executable is empty".into()));
        }
        if self.engine.ready_marker.is_empty() {
            return Err(StartupError::InvalidConfig("engine.ready_marker is empty".into()));
        }
        if self.upload.max_bytes == 0 {
            return Err(StartupError::InvalidConfig("upload.max_bytes must be positive".into()));
        }
        if self.accounts.is_empty() {
            warn!("no accounts configured; every control request will be refused");
        }
        Ok(())
    }

    pub fn launch_settings(&self) -> LaunchSettings {
        LaunchSettings {
            executable: self.engine.executable.clone(),
            host_label: self.engine.host_label.clone(),
            iwad_dir: self.directories.iwad.clone(),
            wad_dir: self.directories.wad.clone(),
            cfg_dir: self.directories.cfg.clone(),
            actors_file: self.engine.actors_file.clone(),
            data_file: self.engine.data_file.clone(),
            ready_marker: self.engine.ready_marker.clone(),
        }
    }

    pub fn port_pool(&self) -> Result<PortPool, InstanceError> {
        PortPool::new(self.ports.min_port, self.ports.max_port)
    }

    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.network.ban_secs)
    }

    pub fn startup_wait(&self) -> Duration {
        Duration::from_secs(self.engine.startup_wait_secs)
    }

    /// Creates the iwad, wad and cfg directories if they are missing.
    pub async fn create_directories(&self) -> Result<(), StartupError> {
        for dir in [&self.directories.iwad, &self.directories.wad, &self.directories.cfg] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StartupError::CreateDirectory {
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}
