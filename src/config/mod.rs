//! Configuration module for the lifecycle orchestrator.
//!
//! This module handles all configuration-related functionality:
//! - Loading the provider `config.yaml` with environment overrides
//! - Parsing and validating resource manifests

mod parser;
mod spec;
mod validator;

pub use parser::{
    ACCESS_KEY_ENV_VAR, CONFIG_ENV_VAR, ConfigParser, HOST_ENV_VAR, SECRET_KEY_ENV_VAR,
    ZONE_ENV_VAR, default_config_path,
};
pub use spec::{
    CacheSpec, InstanceSpec, LifecycleSettings, PollConfig, ProviderConfig, ResourceManifest,
    RetrySettings,
};
pub use validator::{ManifestValidator, ValidationError, ValidationResult};
