use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims the client reads out of a JWT payload.
///
/// The signature is never verified here: the backend is the authority, the
/// client only needs the expiry to decide whether a token is worth sending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Expiration, seconds since the Unix epoch.
    pub exp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl TokenClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    /// A token is expired once `now` has reached its `exp` second.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expires_at) => expires_at <= now,
            None => true,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenDecodeError {
    #[error("token is not a three-part JWT")]
    Malformed,

    #[error("token payload is not valid base64url: {0}")]
    Base64(String),

    #[error("token payload is not valid claims JSON: {0}")]
    Json(String),
}

/// Decode (without verifying) the payload segment of a JWT.
pub fn decode_claims(token: &str) -> Result<TokenClaims, TokenDecodeError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenDecodeError::Malformed);
    };

    // Issuers differ on padding; accept both.
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| TokenDecodeError::Base64(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| TokenDecodeError::Json(e.to_string()))
}

/// Fail-closed expiry check: anything that cannot be decoded counts as expired.
pub fn is_expired(token: &str, now: DateTime<Utc>) -> bool {
    match decode_claims(token) {
        Ok(claims) => claims.is_expired_at(now),
        Err(err) => {
            tracing::debug!(error = %err, "undecodable token treated as expired");
            true
        }
    }
}
