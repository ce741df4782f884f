//! Configuration parser for provider configuration and resource manifests.
//!
//! This module handles loading configuration from YAML files and environment
//! variables, with proper precedence and error handling.

use crate::error::{ConfigError, LifecycleError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::{ProviderConfig, ResourceManifest};

/// Environment variable naming the provider configuration file.
pub const CONFIG_ENV_VAR: &str = "QCLIFE_CONFIG";

/// Access key override.
pub const ACCESS_KEY_ENV_VAR: &str = "QINGCLOUD_ACCESS_KEY_ID";

/// Secret key override.
pub const SECRET_KEY_ENV_VAR: &str = "QINGCLOUD_SECRET_ACCESS_KEY";

/// Zone override.
pub const ZONE_ENV_VAR: &str = "QINGCLOUD_ZONE";

/// Host override.
pub const HOST_ENV_VAR: &str = "QINGCLOUD_HOST";

/// Configuration parser.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving the `.env` file.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path used to find the `.env` file.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads provider configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<ProviderConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = read_file(path)?;
        self.parse_yaml(&content, Some(path))
    }

    /// Parses provider configuration from a YAML string.
    ///
    /// An empty document yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or a polling window is zero.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<ProviderConfig> {
        debug!("Parsing provider configuration");

        if content.trim().is_empty() {
            return Ok(ProviderConfig::default());
        }

        let config: ProviderConfig = serde_yaml::from_str(content).map_err(|e| {
            LifecycleError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })?;
        config.lifecycle.validate()?;

        debug!("Configuration targets zone {}", config.zone);
        Ok(config)
    }

    /// Loads provider configuration and applies environment overrides.
    ///
    /// When `path` is `None` the default location is used if it exists;
    /// otherwise configuration comes from defaults and the environment only.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit file is missing or any file cannot be
    /// parsed.
    pub fn load_with_env(&self, path: Option<&Path>) -> Result<ProviderConfig> {
        let mut config = match path {
            Some(path) => self.load_file(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => self.load_file(path)?,
                None => {
                    debug!("No configuration file found, using defaults");
                    ProviderConfig::default()
                }
            },
        };

        Self::apply_env_overrides(&mut config);

        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(config: &mut ProviderConfig) {
        if let Ok(key) = std::env::var(ACCESS_KEY_ENV_VAR) {
            debug!("Overriding qy_access_key_id from environment");
            config.access_key_id = key;
        }

        if let Ok(secret) = std::env::var(SECRET_KEY_ENV_VAR) {
            debug!("Overriding qy_secret_access_key from environment");
            config.secret_access_key = secret;
        }

        if let Ok(zone) = std::env::var(ZONE_ENV_VAR) {
            debug!("Overriding zone from environment");
            config.zone = zone;
        }

        if let Ok(host) = std::env::var(HOST_ENV_VAR) {
            debug!("Overriding host from environment");
            config.host = host;
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                LifecycleError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Loads a resource manifest from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_manifest(&self, path: impl AsRef<Path>) -> Result<ResourceManifest> {
        let path = path.as_ref();
        info!("Loading manifest from: {}", path.display());

        let content = read_file(path)?;
        self.parse_manifest(&content, Some(path))
    }

    /// Parses a resource manifest from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or the kind is unknown.
    pub fn parse_manifest(&self, content: &str, source: Option<&Path>) -> Result<ResourceManifest> {
        let manifest: ResourceManifest = serde_yaml::from_str(content).map_err(|e| {
            LifecycleError::Config(ConfigError::ParseError {
                message: format!("Manifest parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })?;

        debug!("Parsed {} manifest '{}'", manifest.kind(), manifest.name());
        Ok(manifest)
    }
}

fn read_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(LifecycleError::Config(ConfigError::FileNotFound {
            path: path.to_path_buf(),
        }));
    }

    std::fs::read_to_string(path).map_err(|e| {
        LifecycleError::Config(ConfigError::ParseError {
            message: format!("Failed to read file: {e}"),
            location: Some(path.display().to_string()),
        })
    })
}

/// Default provider configuration location, `~/.qingcloud/config.yaml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".qingcloud").join("config.yaml"))
}
