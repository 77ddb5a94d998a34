//! Client error model.

use serde_json::Value;
use thiserror::Error;

use crate::token_store::TokenStoreError;
use crate::transport::TransportError;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Credentials were rejected (401 on the login endpoint, or an unrecoverable
    /// 401 after the single retry).
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The session could not be recovered: refresh failed or no usable refresh
    /// token. Tokens have been cleared and the client sent to login.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// Non-success status from the backend.
    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("token storage error: {0}")]
    Storage(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The bare message, without the variant prefix. This is what users see.
    pub fn message(&self) -> &str {
        match self {
            ClientError::Authentication(message)
            | ClientError::SessionExpired(message)
            | ClientError::Transport(message)
            | ClientError::Decode(message)
            | ClientError::Storage(message) => message,
            ClientError::Status { message, .. } => message,
        }
    }

    /// Build a status error from a failed response, extracting the most
    /// specific message the backend offered.
    pub fn from_response(status: u16, body: &Value) -> Self {
        let message = extract_message(body).unwrap_or_else(|| format!("request failed with status {status}"));
        if status == 401 {
            ClientError::Authentication(message)
        } else {
            ClientError::Status { status, message }
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(value: TransportError) -> Self {
        ClientError::Transport(value.to_string())
    }
}

impl From<TokenStoreError> for ClientError {
    fn from(value: TokenStoreError) -> Self {
        ClientError::Storage(value.to_string())
    }
}

/// Message precedence: `message`, then `detail`, then the first entry of a
/// field-error object (`{"email": ["already taken"]}`).
pub fn extract_message(body: &Value) -> Option<String> {
    let obj = body.as_object()?;

    for key in ["message", "detail"] {
        if let Some(msg) = obj.get(key).and_then(Value::as_str) {
            return Some(msg.to_string());
        }
    }

    match obj.values().next()? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().map(value_text),
        other => Some(value_text(other)),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
