// crates/agent-uri-transport/src/auth.rs
// ============================================================================
// Module: Auth Providers
// Description: Pluggable credential sources applied by bindings.
// Purpose: Attach bearer tokens and API keys without prescribing a protocol.
// Dependencies: crate::error
// ============================================================================

//! ## Overview
//! Authentication schemes are named and passed through; this module only
//! turns a credential into request headers. Bindings apply the provider's
//! headers before caller headers, so callers can still override.
//! Security posture: credentials never appear in `Debug` output.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use crate::error::TransportError;

// ============================================================================
// SECTION: Provider Contract
// ============================================================================

/// Credential source applied to outbound requests.
pub trait AuthProvider: Send + Sync {
    /// Returns the scheme label (e.g. `Bearer`, `ApiKey`).
    fn scheme(&self) -> &'static str;

    /// Returns the headers carrying the credential.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidRequest`] when the credential cannot
    /// be encoded as a header value.
    fn headers(&self) -> Result<Vec<(String, String)>, TransportError>;
}

// ============================================================================
// SECTION: Bearer Tokens
// ============================================================================

/// Bearer token credential.
pub struct BearerTokenAuth {
    /// The token, redacted from debug output.
    token: String,
}

impl BearerTokenAuth {
    /// Creates a bearer token provider.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl AuthProvider for BearerTokenAuth {
    fn scheme(&self) -> &'static str {
        "Bearer"
    }

    fn headers(&self) -> Result<Vec<(String, String)>, TransportError> {
        if self.token.chars().any(|c| c.is_control()) {
            return Err(TransportError::InvalidRequest(
                "bearer token contains control characters".to_string(),
            ));
        }
        Ok(vec![("Authorization".to_string(), format!("Bearer {}", self.token))])
    }
}

impl fmt::Debug for BearerTokenAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerTokenAuth").field("token", &"<redacted>").finish()
    }
}

// ============================================================================
// SECTION: API Keys
// ============================================================================

/// Static API key credential.
pub struct ApiKeyAuth {
    /// The key, redacted from debug output.
    key: String,
    /// Header carrying the key.
    header: String,
}

impl ApiKeyAuth {
    /// Creates an API key provider using the `X-API-Key` header.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            header: "X-API-Key".to_string(),
        }
    }

    /// Creates an API key provider with a custom header name.
    #[must_use]
    pub fn with_header(key: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            header: header.into(),
        }
    }
}

impl AuthProvider for ApiKeyAuth {
    fn scheme(&self) -> &'static str {
        "ApiKey"
    }

    fn headers(&self) -> Result<Vec<(String, String)>, TransportError> {
        if self.key.chars().any(|c| c.is_control()) {
            return Err(TransportError::InvalidRequest(
                "api key contains control characters".to_string(),
            ));
        }
        Ok(vec![(self.header.clone(), self.key.clone())])
    }
}

impl fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyAuth")
            .field("key", &"<redacted>")
            .field("header", &self.header)
            .finish()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions use unwraps for clarity.")]

    use super::ApiKeyAuth;
    use super::AuthProvider;
    use super::BearerTokenAuth;

    #[test]
    fn bearer_builds_authorization_header() {
        let headers = BearerTokenAuth::new("abc123").headers().unwrap();
        assert_eq!(headers, vec![("Authorization".to_string(), "Bearer abc123".to_string())]);
    }

    #[test]
    fn api_key_uses_default_and_custom_headers() {
        let headers = ApiKeyAuth::new("k1").headers().unwrap();
        assert_eq!(headers[0].0, "X-API-Key");
        let headers = ApiKeyAuth::with_header("k1", "X-Custom").headers().unwrap();
        assert_eq!(headers[0].0, "X-Custom");
    }

    #[test]
    fn control_characters_are_rejected() {
        assert!(BearerTokenAuth::new("a\nb").headers().is_err());
        assert!(ApiKeyAuth::new("a\rb").headers().is_err());
    }

    #[test]
    fn debug_redacts_credentials() {
        let debug = format!("{:?}", BearerTokenAuth::new("secret"));
        assert!(!debug.contains("secret"));
        let debug = format!("{:?}", ApiKeyAuth::new("secret"));
        assert!(!debug.contains("secret"));
    }
}
