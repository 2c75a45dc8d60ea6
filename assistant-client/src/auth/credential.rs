use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use client_core::ClientError;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    /// Seconds since the Unix epoch.
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Bearer token plus its decoded claims.
///
/// Claims are decoded without signature validation; the server remains the
/// authority. A token whose claims cannot be decoded is kept (so it can still
/// be shown to the server) but is treated as already expired.
#[derive(Clone)]
pub struct Credential {
    token: Arc<Secret<String>>,
    claims: Option<TokenClaims>,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let claims = match decode_claims(&token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::warn!(error = %e, "Credential claims could not be decoded");
                None
            }
        };

        Self {
            token: Arc::new(Secret::new(token)),
            claims,
        }
    }

    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn claims(&self) -> Option<&TokenClaims> {
        self.claims.as_ref()
    }

    pub fn subject(&self) -> Option<&str> {
        self.claims.as_ref().and_then(|c| c.sub.as_deref())
    }

    /// `None` when the token is malformed.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.claims
            .as_ref()
            .and_then(|c| Utc.timestamp_opt(c.exp, 0).single())
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expiry) => expiry <= now,
            None => true,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("claims", &self.claims)
            .finish()
    }
}

/// Decode the payload segment of a `header.payload.signature` token.
pub fn decode_claims(token: &str) -> Result<TokenClaims, ClientError> {
    let parts: Vec<&str> = token.split('.').collect();

    if parts.len() != 3 {
        return Err(ClientError::InvalidCredential(
            "Invalid token format".to_string(),
        ));
    }

    let payload = general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| {
            ClientError::InvalidCredential(format!("Failed to decode token payload: {}", e))
        })?;

    serde_json::from_slice(&payload).map_err(|e| {
        ClientError::InvalidCredential(format!("Failed to parse token claims: {}", e))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_token(exp: i64) -> String {
        let header = general_purpose::URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = general_purpose::URL_SAFE_NO_PAD
            .encode(format!(r#"{{"sub":"alice@example.com","exp":{exp}}}"#));
        format!("{header}.{payload}.signature")
    }

    #[test]
    fn test_decode_claims() {
        // Payload: {"sub":"user_123","email":"test@example.com","exp":9999999999,"iat":1736500000,"jti":"abc123"}
        let token = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.eyJzdWIiOiJ1c2VyXzEyMyIsImVtYWlsIjoidGVzdEBleGFtcGxlLmNvbSIsImV4cCI6OTk5OTk5OTk5OSwiaWF0IjoxNzM2NTAwMDAwLCJqdGkiOiJhYmMxMjMifQ.signature";

        let claims = decode_claims(token).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("user_123"));
        assert_eq!(claims.exp, 9_999_999_999);
        assert_eq!(claims.iat, Some(1_736_500_000));
    }

    #[test]
    fn test_future_expiry_is_valid() {
        let credential = Credential::new(make_token(Utc::now().timestamp() + 3600));
        assert!(!credential.is_expired());
        assert_eq!(credential.subject(), Some("alice@example.com"));
    }

    #[test]
    fn test_past_expiry_is_expired() {
        let credential = Credential::new(make_token(Utc::now().timestamp() - 1));
        assert!(credential.is_expired());
    }

    #[test]
    fn test_malformed_token_counts_as_expired() {
        for token in ["", "opaque", "a.b", "a.!!!.c", "a.eyJub3QiOiJjbGFpbXMifQ.c"] {
            let credential = Credential::new(token);
            assert!(credential.expires_at().is_none(), "token {token:?}");
            assert!(credential.is_expired(), "token {token:?}");
        }
    }

    #[test]
    fn test_debug_redacts_token() {
        let credential = Credential::new(make_token(0));
        assert!(!format!("{credential:?}").contains("signature"));
    }
}
