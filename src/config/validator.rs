//! Manifest validation.
//!
//! Field-level rules come from the `validator` derive on the spec types;
//! cross-field and catalogue rules (accepted CPU/memory sizes, keypairs,
//! backup window) are checked here. Everything is collected before failing so
//! `qclife validate` can report all problems at once.

use std::collections::BTreeSet;
use tracing::debug;
use validator::Validate;

use crate::error::{ConfigError, LifecycleError, Result};
use crate::qingcloud::{VALID_CPUS, VALID_MEMORY};

use super::spec::{CacheSpec, InstanceSpec, ResourceManifest};

/// Validator for resource manifests.
#[derive(Debug, Default)]
pub struct ManifestValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ManifestValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a manifest.
    ///
    /// # Errors
    ///
    /// Returns the first error if validation fails.
    pub fn validate(&self, manifest: &ResourceManifest) -> Result<ValidationResult> {
        let result = self.check(manifest);

        if let Some(first_error) = result.errors.first() {
            return Err(LifecycleError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }));
        }

        debug!("Manifest validation passed");
        Ok(result)
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, manifest: &ResourceManifest) -> ValidationResult {
        let mut result = ValidationResult::default();

        match manifest {
            ResourceManifest::Instance(spec) => {
                Self::collect_derived(spec, &mut result);
                Self::validate_instance(spec, &mut result);
            }
            ResourceManifest::Cache(spec) => {
                Self::collect_derived(spec, &mut result);
                Self::validate_cache(spec, &mut result);
            }
        }

        result
    }

    /// Converts the derive-based field errors.
    fn collect_derived(spec: &impl Validate, result: &mut ValidationResult) {
        let Err(errors) = spec.validate() else {
            return;
        };

        let mut found: Vec<ValidationError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, field_errors)| {
                field_errors.iter().map(move |e| ValidationError {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map_or_else(|| format!("invalid value ({})", e.code), ToString::to_string),
                })
            })
            .collect();
        found.sort_by(|a, b| a.field.cmp(&b.field));
        result.errors.extend(found);
    }

    fn validate_instance(spec: &InstanceSpec, result: &mut ValidationResult) {
        if spec.keypair_ids.is_empty() {
            result.errors.push(ValidationError {
                field: String::from("keypair_ids"),
                message: String::from("at least one login keypair is required"),
            });
        }

        if !VALID_CPUS.contains(&spec.cpu) {
            result.errors.push(ValidationError {
                field: String::from("cpu"),
                message: format!("cpu must be one of {VALID_CPUS:?}"),
            });
        }

        if !VALID_MEMORY.contains(&spec.memory) {
            result.errors.push(ValidationError {
                field: String::from("memory"),
                message: format!("memory must be one of {VALID_MEMORY:?}"),
            });
        }

        Self::validate_ids("volume_ids", &spec.volume_ids, "vol-", result);
        Self::validate_ids("tag_ids", &spec.tag_ids, "tag-", result);

        if spec.name.is_empty() {
            result
                .warnings
                .push(String::from("instance has no name; the console will show its ID"));
        }

        if spec.keypair_ids.len() > 1 {
            result.warnings.push(String::from(
                "only the first keypair is injected at boot; the rest are attached afterwards",
            ));
        }
    }

    fn validate_cache(spec: &CacheSpec, result: &mut ValidationResult) {
        if let Some(hour) = spec.auto_backup_time {
            if !(-1..=23).contains(&hour) {
                result.errors.push(ValidationError {
                    field: String::from("auto_backup_time"),
                    message: String::from("auto_backup_time must be between -1 and 23"),
                });
            }
        }

        Self::validate_ids("tag_ids", &spec.tag_ids, "tag-", result);

        if spec.name.is_empty() {
            result
                .warnings
                .push(String::from("cache has no name; the console will show its ID"));
        }
    }

    /// Warns about IDs that do not carry the expected prefix.
    fn validate_ids(
        field: &str,
        ids: &BTreeSet<String>,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        for id in ids.iter().filter(|id| !id.starts_with(prefix)) {
            result
                .warnings
                .push(format!("{field}: '{id}' does not look like a {prefix}* ID"));
        }
    }
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}
