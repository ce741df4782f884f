//! QingCloud API client implementation.
//!
//! This module provides the signed HTTP client for the QingCloud IaaS API and
//! the [`RemoteClient`] seam the resource drivers call through.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::ProviderConfig;
use crate::error::{ConfigError, LifecycleError, RemoteError, Result};

use super::signer::{RequestSigner, SIGNATURE_METHOD, SIGNATURE_VERSION};
use super::types::ApiRequest;

/// API version sent with every request.
const API_VERSION: &str = "1";

/// `ret_code` for a successful call.
const RET_OK: i64 = 0;

/// `ret_code` for an authentication failure.
const RET_AUTH_FAILED: i64 = 1200;

/// `ret_code` for a missing resource.
const RET_NOT_FOUND: i64 = 2100;

/// `ret_code` for a temporarily busy backend.
const RET_SERVER_BUSY: i64 = 5100;

/// Transport used by the resource drivers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Issues one API call and returns the response body once `ret_code`
    /// reports success.
    ///
    /// # Errors
    ///
    /// Returns a [`RemoteError`] classified from the HTTP status or `ret_code`.
    async fn call(&self, request: &ApiRequest) -> Result<Value>;
}

/// Signed HTTP client for the QingCloud API.
#[derive(Debug, Clone)]
pub struct QingCloudClient {
    /// HTTP client.
    http: Client,
    /// Full endpoint URL, e.g. `https://api.qingcloud.com:443/iaas/`.
    endpoint: String,
    /// Path component used in the string to sign.
    uri: String,
    /// Zone every request targets.
    zone: String,
    /// Request signer.
    signer: RequestSigner,
}

impl QingCloudClient {
    /// Creates a client from provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials are missing or the HTTP client cannot
    /// be created.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        if config.access_key_id.is_empty() {
            return Err(ConfigError::MissingCredential {
                name: String::from("qy_access_key_id"),
            }
            .into());
        }
        if config.secret_access_key.is_empty() {
            return Err(ConfigError::MissingCredential {
                name: String::from("qy_secret_access_key"),
            }
            .into());
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(config.connection_timeout))
            .build()
            .map_err(|e| RemoteError::network(format!("Failed to create HTTP client: {e}")))?;

        let uri = normalize_uri(&config.uri);
        let endpoint = format!("{}://{}:{}{uri}", config.protocol, config.host, config.port);

        Ok(Self {
            http,
            endpoint,
            uri,
            zone: config.zone.clone(),
            signer: RequestSigner::new(&config.access_key_id, &config.secret_access_key),
        })
    }

    /// Endpoint URL requests are sent to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Builds the signed query string for a request.
    fn signed_query(&self, request: &ApiRequest, time_stamp: &str) -> Result<String> {
        let mut params = request.params().clone();
        params.insert(String::from("action"), request.action().to_string());
        params.insert(String::from("zone"), self.zone.clone());
        params.insert(
            String::from("access_key_id"),
            self.signer.access_key_id().to_string(),
        );
        params.insert(String::from("signature_method"), SIGNATURE_METHOD.to_string());
        params.insert(String::from("signature_version"), SIGNATURE_VERSION.to_string());
        params.insert(String::from("time_stamp"), time_stamp.to_string());
        params.insert(String::from("version"), API_VERSION.to_string());

        let canonical = RequestSigner::canonical_query(&params);
        let signature = self.signer.sign("GET", &self.uri, &canonical)?;

        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("signature", &signature)
            .finish();

        Ok(format!("{canonical}&{encoded}"))
    }
}

#[async_trait]
impl RemoteClient for QingCloudClient {
    async fn call(&self, request: &ApiRequest) -> Result<Value> {
        let time_stamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let url = format!("{}?{}", self.endpoint, self.signed_query(request, &time_stamp)?);

        trace!("Calling {}: {:?}", request.action(), request.params());

        let response = self.http.get(&url).send().await.map_err(|e| {
            LifecycleError::Remote(RemoteError::network(format!(
                "{} request failed: {e}",
                request.action()
            )))
        })?;

        let status = response.status();

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(LifecycleError::Remote(RemoteError::AuthenticationFailed {
                message: format!("HTTP {status}"),
            }));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LifecycleError::Remote(RemoteError::api_error(
                request.action(),
                i64::from(status.as_u16()),
                body,
            )));
        }

        let body: Value = response.json().await.map_err(|e| {
            LifecycleError::Remote(RemoteError::invalid_response(format!(
                "Failed to parse {} response: {e}",
                request.action()
            )))
        })?;

        classify_response(request.action(), body)
    }
}

/// Maps a response body to success or a classified error by its `ret_code`.
///
/// # Errors
///
/// Returns the [`RemoteError`] matching a non-zero `ret_code`.
pub fn classify_response(action: &str, body: Value) -> Result<Value> {
    let ret_code = body
        .get("ret_code")
        .and_then(Value::as_i64)
        .ok_or_else(|| RemoteError::invalid_response(format!("{action} response has no ret_code")))?;

    if ret_code == RET_OK {
        return Ok(body);
    }

    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    debug!(action, ret_code, %message, "API call rejected");

    let error = match ret_code {
        RET_SERVER_BUSY => RemoteError::ServerBusy {
            action: action.to_string(),
            message,
        },
        RET_AUTH_FAILED => RemoteError::AuthenticationFailed { message },
        RET_NOT_FOUND => RemoteError::ResourceNotFound {
            action: action.to_string(),
            message,
        },
        _ => RemoteError::api_error(action, ret_code, message),
    };
    Err(error.into())
}

/// Ensures the path starts and ends with a slash.
fn normalize_uri(uri: &str) -> String {
    let trimmed = uri.trim_matches('/');
    if trimmed.is_empty() {
        String::from("/")
    } else {
        format!("/{trimmed}/")
    }
}
