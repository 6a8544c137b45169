//! Configuration schema, defaults, and layered loading.
//!
//! Precedence: defaults < config file < environment < CLI
use anyhow::{ensure, Context, Result};
use directories::{ProjectDirs, UserDirs};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Name of the folder created under `uploads_root` for received files.
pub const UPLOAD_DIR_NAME: &str = "Friendly File Server Uploads";

const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1024 * 1024 * 1024;

pub fn config_path() -> PathBuf {
    ProjectDirs::from("", "", "ffs")
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("ffs.toml"))
}

/// External archiver invocation. The archive path and the inputs are appended to `args`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiverSettings {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ArchiverSettings {
    fn default() -> Self {
        Self {
            program: "7z".to_string(),
            args: ["-y", "-tzip", "-bd", "-mx=7", "a"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NatSettings {
    pub enabled: bool,
    pub search_timeout_secs: u64,
    /// Lease duration requested from the gateway, 0 = until removed
    pub lease_secs: u32,
}

impl Default for NatSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            search_timeout_secs: 5,
            lease_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    pub timeout_secs: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self { timeout_secs: 5 }
    }
}

/// Fully resolved application configuration after all layers merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub port: u16,
    pub allow_uploads: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploads_root: Option<PathBuf>,
    pub max_upload_bytes: u64,
    pub archiver: ArchiverSettings,
    pub nat: NatSettings,
    pub probe: ProbeSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 0,
            allow_uploads: false,
            display_name: None,
            uploads_root: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            archiver: ArchiverSettings::default(),
            nat: NatSettings::default(),
            probe: ProbeSettings::default(),
        }
    }
}

impl AppConfig {
    /// Directory the uploads folder is created in.
    pub fn uploads_root(&self) -> PathBuf {
        if let Some(root) = &self.uploads_root {
            return root.clone();
        }
        UserDirs::new()
            .and_then(|dirs| dirs.download_dir().map(|d| d.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Title shown on the status page, e.g. "Ada's Friendly File Server".
    pub fn app_title(&self) -> String {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => format!("{name}'s Friendly File Server"),
            _ => "Friendly File Server".to_string(),
        }
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.archiver.program.trim().is_empty(),
            "Invalid config: archiver.program must not be empty"
        );
        ensure!(
            self.max_upload_bytes > 0,
            "Invalid config: max_upload_bytes must be > 0"
        );
        ensure!(
            self.probe.timeout_secs > 0,
            "Invalid config: probe.timeout_secs must be > 0"
        );
        ensure!(
            self.nat.search_timeout_secs > 0,
            "Invalid config: nat.search_timeout_secs must be > 0"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// `-u` can only switch uploads on
    pub allow_uploads: bool,
    pub no_nat: bool,
}

/// Loads config from defaults/file/env.
pub fn load_config() -> Result<AppConfig> {
    let path = config_path();

    let config: AppConfig = Figment::new()
        .merge(Serialized::defaults(AppConfig::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("FFS_").split("__"))
        .extract()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    config.validate()?;

    Ok(config)
}

/// Applies command line overrides to a loaded config.
pub fn apply_overrides(mut config: AppConfig, overrides: &ConfigOverrides) -> AppConfig {
    if let Some(port) = overrides.port {
        config.port = port;
    }
    if overrides.allow_uploads {
        config.allow_uploads = true;
    }
    if overrides.no_nat {
        config.nat.enabled = false;
    }

    config
}
