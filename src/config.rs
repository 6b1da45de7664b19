//! Configuration surface: the out-of-scope "reading configuration from
//! disk" and part of the "CLI argument parsing" collaborators the core
//! spec names. Neither the update engine nor the supervisor ever reads a
//! file or an environment variable themselves — they only accept an
//! already-validated [`Config`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use update_engine::UpdateManifest;

/// The application being managed.
#[derive(Debug, Clone)]
pub struct Target {
    pub app_id: String,
    pub versions_root: PathBuf,
    pub executable_name: PathBuf,
    pub executable_args: Vec<String>,
    pub channel: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub target: Target,
    pub update_check_interval: Duration,
    pub update_manifests: Vec<UpdateManifest>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("target.versions_path must not be empty")]
    EmptyVersionsPath,
    #[error(r#"target.executable_name must not be "/""#)]
    RootExecutableName,
    #[error("update_check_interval must be non-zero")]
    ZeroInterval,
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    /// Construct and validate a `Config`. Violations are construction
    /// errors: the caller must fix and retry, not retry the same config.
    pub fn new(
        client_id: impl Into<String>,
        target: Target,
        update_check_interval: Duration,
        update_manifests: Vec<UpdateManifest>,
    ) -> Result<Self, ConfigError> {
        if target.versions_root.as_os_str().is_empty() {
            return Err(ConfigError::EmptyVersionsPath);
        }
        if target.executable_name == Path::new("/") {
            return Err(ConfigError::RootExecutableName);
        }
        if update_check_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(Self {
            client_id: client_id.into(),
            target,
            update_check_interval,
            update_manifests,
        })
    }

    /// Load and validate a `Config` from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw_text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&raw_text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        raw.into_config()
    }
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (with defaults applied when building the
// typed Config), following the forwarder/receiver config-loading pattern.
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    client_id: String,
    target: RawTarget,
    update_check_interval_secs: u64,
    #[serde(default)]
    update_manifests: Vec<RawUpdateManifest>,
}

#[derive(Debug, Deserialize)]
struct RawTarget {
    app_id: String,
    versions_path: PathBuf,
    executable_name: PathBuf,
    #[serde(default)]
    executable_args: Vec<String>,
    #[serde(default = "default_channel")]
    channel: String,
}

fn default_channel() -> String {
    "stable".to_owned()
}

#[derive(Debug, Deserialize)]
struct RawUpdateManifest {
    app_id: String,
    endpoint: String,
}

impl RawConfig {
    fn into_config(self) -> Result<Config, ConfigError> {
        Config::new(
            self.client_id,
            Target {
                app_id: self.target.app_id,
                versions_root: self.target.versions_path,
                executable_name: self.target.executable_name,
                executable_args: self.target.executable_args,
                channel: self.target.channel,
            },
            Duration::from_secs(self.update_check_interval_secs),
            self.update_manifests
                .into_iter()
                .map(|m| UpdateManifest {
                    app_id: m.app_id,
                    endpoint: m.endpoint,
                })
                .collect(),
        )
    }
}
