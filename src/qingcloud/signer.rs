//! Request signing (`HmacSHA256`, signature version 1).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;

use crate::error::{LifecycleError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signature method sent with every request.
pub const SIGNATURE_METHOD: &str = "HmacSHA256";

/// Signature version sent with every request.
pub const SIGNATURE_VERSION: &str = "1";

/// Signs API requests with an access key pair.
#[derive(Clone)]
pub struct RequestSigner {
    access_key_id: String,
    secret_access_key: String,
}

impl RequestSigner {
    /// Creates a signer.
    #[must_use]
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    /// Public half of the key pair.
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Encodes parameters as a query string sorted by key, with spaces as
    /// `%20`.
    #[must_use]
    pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish()
            .replace('+', "%20")
    }

    /// Computes the base64 signature of `method`, `uri` and the canonical
    /// query.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret key cannot be used as an HMAC key.
    pub fn sign(&self, method: &str, uri: &str, canonical_query: &str) -> Result<String> {
        let string_to_sign = format!("{method}\n{uri}\n{canonical_query}");

        let mut mac = HmacSha256::new_from_slice(self.secret_access_key.as_bytes())
            .map_err(|e| LifecycleError::internal(format!("Invalid signing key: {e}")))?;
        mac.update(string_to_sign.as_bytes());

        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}
