//! Wire transport seam.
//!
//! The interceptor works on `ApiRequest`/`ApiResponse` values so it can be
//! driven by `reqwest` in production and by fakes in tests.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ClientConfig;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
        }
    }
}

impl core::fmt::Display for Method {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request as it flows through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub request_id: Uuid,
    pub method: Method,
    /// Path relative to the configured base URL.
    pub path: String,
    pub body: Option<Value>,
    /// Bearer credential attached by the request phase.
    pub bearer: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            method,
            path: path.into(),
            body: None,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON body; `Value::Null` when empty or not JSON.
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request. Non-2xx statuses are responses, not errors.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    config: ClientConfig,
}

impl ReqwestTransport {
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client, config })
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.config.url(&request.path);
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
        };

        let mut builder = self
            .client
            .request(method, &url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(classify)?;
        let status = resp.status().as_u16();
        let bytes = resp.bytes().await.map_err(classify)?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builders_set_method_and_body() {
        let req = ApiRequest::post("/auth/login", json!({ "username": "a" }));
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.body, Some(json!({ "username": "a" })));
        assert!(req.bearer.is_none());

        let other = ApiRequest::get("/users/profile");
        assert_ne!(req.request_id, other.request_id);
        assert_eq!(other.method.to_string(), "GET");
    }

    #[test]
    fn success_range() {
        assert!(ApiResponse::new(204, Value::Null).is_success());
        assert!(!ApiResponse::new(401, Value::Null).is_success());
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        // Port 9 (discard) on localhost is essentially never listening.
        let transport = ReqwestTransport::new(ClientConfig::new("http://127.0.0.1:9")).unwrap();
        let err = transport.send(&ApiRequest::get("/users/profile")).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_) | TransportError::Other(_)));
    }
}
