//! Shared configuration for the `pdm` tools.
//!
//! TOML settings layered under `PDM_` environment variables, translation to
//! the cloud client's environment and transport settings, and the two
//! persistent [`CredentialStore`](pdm_api::CredentialStore) backends.

mod store;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use pdm_api::{CloudEnvironment, CredentialStore, TransportConfig};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use store::{FileCredentialStore, KEYRING_SERVICE, KeyringCredentialStore};

/// Environment variable consulted for the login password.
pub const PASSWORD_ENV: &str = "PDM_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("failed to parse credential file {path}: {source}")]
    CredentialFile {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Named cloud deployment.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Environment {
    #[default]
    Production,
    Staging,
    Integration,
    /// Base URL taken from `custom_url`.
    Custom,
}

/// Where the session and developer flags are persisted.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StoreKind {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub environment: Environment,

    /// Developer override; required when `environment = "custom"`.
    pub custom_url: Option<String>,

    /// Connect and total request timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Network page size for workflow listings.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default)]
    pub credential_store: StoreKind,

    /// Downloaded workflow assets. Defaults to the platform data dir.
    pub assets_dir: Option<PathBuf>,

    /// Default output format for the CLI.
    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            custom_url: None,
            timeout_secs: default_timeout(),
            page_size: default_page_size(),
            credential_store: StoreKind::default(),
            assets_dir: None,
            output: default_output(),
        }
    }
}

fn default_timeout() -> u64 {
    10
}
fn default_page_size() -> u32 {
    50
}
fn default_output() -> String {
    "table".into()
}

impl Config {
    /// Resolve the configured deployment.
    pub fn cloud_environment(&self) -> Result<CloudEnvironment, ConfigError> {
        Ok(match self.environment {
            Environment::Production => CloudEnvironment::Production,
            Environment::Staging => CloudEnvironment::Staging,
            Environment::Integration => CloudEnvironment::Integration,
            Environment::Custom => {
                let raw = self
                    .custom_url
                    .as_deref()
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| ConfigError::Validation {
                        field: "custom_url".into(),
                        reason: "required when environment is 'custom'".into(),
                    })?;
                let url = url::Url::parse(raw).map_err(|e| ConfigError::Validation {
                    field: "custom_url".into(),
                    reason: format!("invalid URL '{raw}': {e}"),
                })?;
                CloudEnvironment::Custom(url)
            }
        })
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig::with_timeout(Duration::from_secs(self.timeout_secs.max(1)))
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.assets_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("assets"))
    }

    /// Open the configured credential store.
    pub fn credential_store(&self) -> Result<Arc<dyn CredentialStore>, ConfigError> {
        Ok(match self.credential_store {
            StoreKind::File => Arc::new(FileCredentialStore::open(credentials_path())?),
            StoreKind::Keyring => Arc::new(KeyringCredentialStore::new(KEYRING_SERVICE)),
        })
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "arm", "pdm")
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("pdm");
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Directory for persisted state and downloaded assets.
pub fn data_dir() -> PathBuf {
    project_dirs().map_or_else(dirs_fallback, |dirs| dirs.data_dir().to_path_buf())
}

/// File backing [`FileCredentialStore`].
pub fn credentials_path() -> PathBuf {
    data_dir().join("credentials.toml")
}

// ── Loading / saving ────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Defaults, then `path` if it exists, then `PDM_*` variables.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PDM_").ignore(&["password"]));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, falling back to defaults on any error.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credentials ─────────────────────────────────────────────────────

/// Password from `PDM_PASSWORD`, if set and non-empty.
pub fn password_from_env() -> Option<SecretString> {
    std::env::var(PASSWORD_ENV)
        .ok()
        .filter(|pw| !pw.is_empty())
        .map(SecretString::from)
}
