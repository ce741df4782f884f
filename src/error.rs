//! Error types for the lifecycle orchestrator.
//!
//! This module provides the error hierarchy for every phase of a resource
//! lifecycle: configuration, remote API calls, and orchestration (retries,
//! transition waits, multi-step updates).

use std::path::PathBuf;
use thiserror::Error;

use crate::lifecycle::ResourceHandle;

/// The main error type for the lifecycle orchestrator.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Remote API errors.
    #[error("QingCloud API error: {0}")]
    Remote(#[from] RemoteError),

    /// Orchestration errors.
    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A required credential is missing.
    #[error("Missing credential: {name}")]
    MissingCredential {
        /// Name of the missing credential.
        name: String,
    },
}

/// Remote API errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The backend temporarily rejected the call.
    #[error("{action} rejected, server busy: {message}")]
    ServerBusy {
        /// Action that was rejected.
        action: String,
        /// Message returned by the API.
        message: String,
    },

    /// Authentication failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed.
    #[error("{action} failed with ret_code {ret_code}: {message}")]
    ApiRequestFailed {
        /// Action that failed.
        action: String,
        /// `ret_code` returned by the API.
        ret_code: i64,
        /// Error message from API.
        message: String,
    },

    /// The API reported the target resource as missing.
    #[error("{action} failed, resource not found: {message}")]
    ResourceNotFound {
        /// Action that failed.
        action: String,
        /// Message returned by the API.
        message: String,
    },

    /// Network error.
    #[error("Network error communicating with QingCloud: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from API.
    #[error("Invalid response from QingCloud API: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },
}

/// Orchestration errors raised by the retry policy, the poller and the
/// lifecycle orchestrator.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Transient errors persisted past the retry bound.
    #[error("{operation} on {resource_id} still busy after {attempts} attempts: {source}")]
    RetryExhausted {
        /// Operation that was retried.
        operation: String,
        /// Resource the operation targeted, or a label for one not yet created.
        resource_id: String,
        /// Number of attempts made.
        attempts: u32,
        /// The last transient error.
        source: Box<LifecycleError>,
    },

    /// The resource did not settle within the polling window.
    #[error("Timeout after {waited_secs}s waiting for {resource_id} to settle (last state: {last_state})")]
    TransitionTimeout {
        /// Resource being awaited.
        resource_id: String,
        /// Last observed remote state.
        last_state: String,
        /// Seconds spent polling.
        waited_secs: u64,
    },

    /// The resource vanished while a non-delete transition was awaited.
    #[error("Resource {resource_id} disappeared unexpectedly (last state: {last_state})")]
    UnexpectedDisappearance {
        /// Resource that disappeared.
        resource_id: String,
        /// Last observed remote state.
        last_state: String,
    },

    /// An update plan step failed. Steps already applied are listed so the
    /// caller can re-drive the same update and resume from the failed step.
    #[error(
        "Update of {resource_id} failed at step '{failed_step}' (applied: [{}], last state: {}): {source}",
        .applied_steps.join(", "),
        .last_state.as_deref().unwrap_or("unknown")
    )]
    PartialUpdateFailure {
        /// Resource being updated.
        resource_id: String,
        /// Step that failed.
        failed_step: String,
        /// Steps applied before the failure, in execution order.
        applied_steps: Vec<String>,
        /// Last observed remote state.
        last_state: Option<String>,
        /// Underlying error.
        source: Box<LifecycleError>,
    },

    /// The resource was provisioned but post-create configuration failed.
    #[error("{handle} was provisioned but is only partially configured: {source}")]
    PartiallyProvisioned {
        /// Handle of the provisioned resource, kept so it can be deleted or retried.
        handle: ResourceHandle,
        /// Underlying error.
        source: Box<LifecycleError>,
    },

    /// A precondition failed before any remote call was made.
    #[error("Precondition failed: {message}")]
    Precondition {
        /// Description of the failed precondition.
        message: String,
    },

    /// The caller cancelled the operation or its deadline elapsed.
    #[error("Cancelled while {phase} {resource_id}")]
    Cancelled {
        /// Resource being worked on.
        resource_id: String,
        /// Phase that was interrupted.
        phase: String,
    },
}

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

impl LifecycleError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if the backend temporarily rejected the call and it is
    /// safe to issue it again.
    #[must_use]
    pub const fn is_transient_busy(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::ServerBusy { .. }))
    }

    /// Returns true if the remote API reported the resource as missing.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::ResourceNotFound { .. }))
    }

    /// Returns the last observed remote state carried by this error, if any.
    #[must_use]
    pub fn last_observed_state(&self) -> Option<&str> {
        match self {
            Self::Orchestration(
                OrchestrationError::TransitionTimeout { last_state, .. }
                | OrchestrationError::UnexpectedDisappearance { last_state, .. },
            ) => Some(last_state.as_str()),
            Self::Orchestration(OrchestrationError::PartialUpdateFailure {
                last_state, ..
            }) => last_state.as_deref(),
            Self::Orchestration(
                OrchestrationError::RetryExhausted { source, .. }
                | OrchestrationError::PartiallyProvisioned { source, .. },
            ) => source.last_observed_state(),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl RemoteError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(action: impl Into<String>, ret_code: i64, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            action: action.into(),
            ret_code,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

impl OrchestrationError {
    /// Creates a precondition error.
    #[must_use]
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }
}
