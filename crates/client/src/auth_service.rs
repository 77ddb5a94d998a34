//! Backend authentication endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use felicita_auth::{Permission, ProfileUpdate, Role, TokenClaims, User, decode_claims};

use crate::error::ClientResult;
use crate::interceptor::ApiClient;
use crate::token_store::TokenPair;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl core::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    pub password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub message: String,
    pub user_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub password_confirmation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub browser: String,
    pub os: String,
    pub device: String,
}

/// A server-side session of the current user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub id: u64,
    pub token_jti: String,
    pub ip_address: String,
    pub user_agent: String,
    pub device: DeviceInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionVerification {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
    pub permissions: HashMap<String, bool>,
}

/// Typed wrapper over the auth/user endpoints.
#[derive(Debug, Clone)]
pub struct AuthService {
    client: Arc<ApiClient>,
}

impl AuthService {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    fn endpoints(&self) -> &crate::config::Endpoints {
        &self.client.config().endpoints
    }

    /// Authenticate and store the issued token pair.
    pub async fn login(&self, credentials: &Credentials) -> ClientResult<LoginResponse> {
        let response: LoginResponse = self.client.post_json(&self.endpoints().login, credentials).await?;

        self.client.tokens().set_tokens(&TokenPair {
            access: response.access.clone(),
            refresh: response.refresh.clone(),
        })?;

        tracing::info!(username = %response.user.username, role = %response.user.role, "login succeeded");
        Ok(response)
    }

    /// Best-effort server-side invalidation; local tokens are always cleared.
    pub async fn logout(&self) {
        if let Some(refresh) = self.client.tokens().refresh_token() {
            let result: ClientResult<Value> = self
                .client
                .post_json(&self.endpoints().logout, &json!({ "refresh": refresh }))
                .await;
            if let Err(err) = result {
                tracing::warn!(error = %err, "server-side logout failed; clearing local session anyway");
            }
        }

        if let Err(err) = self.client.tokens().clear() {
            tracing::error!(error = %err, "failed to clear tokens on logout");
        }
        tracing::info!("logged out");
    }

    pub async fn register(&self, registration: &Registration) -> ClientResult<RegistrationResponse> {
        self.client.post_json(&self.endpoints().register, registration).await
    }

    pub async fn current_user(&self) -> ClientResult<User> {
        self.client.get_json(&self.endpoints().profile).await
    }

    /// Fields echoed back by the backend; may be a partial profile.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> ClientResult<Value> {
        self.client.patch_json(&self.endpoints().profile, update).await
    }

    /// Changing the password invalidates every session, this one included.
    pub async fn change_password(&self, change: &PasswordChange) -> ClientResult<MessageResponse> {
        let response = self.client.post_json(&self.endpoints().change_password, change).await?;
        self.client.tokens().clear()?;
        Ok(response)
    }

    pub async fn active_sessions(&self) -> ClientResult<Vec<ActiveSession>> {
        self.client.get_json(&self.endpoints().sessions).await
    }

    pub async fn close_session(&self, token_jti: &str) -> ClientResult<MessageResponse> {
        self.client
            .post_json(&self.endpoints().close_session, &json!({ "token_jti": token_jti }))
            .await
    }

    pub async fn close_all_sessions(&self) -> ClientResult<MessageResponse> {
        let response = self
            .client
            .post_json(&self.endpoints().close_all_sessions, &json!({}))
            .await?;
        self.client.tokens().clear()?;
        Ok(response)
    }

    pub async fn verify_permissions(&self, codes: &[Permission]) -> ClientResult<PermissionVerification> {
        self.client
            .post_json(&self.endpoints().verify_permissions, &json!({ "codes": codes }))
            .await
    }

    /// Explicit refresh through the shared refresh queue.
    pub async fn refresh_token(&self) -> ClientResult<String> {
        self.client.refresh_access_token().await
    }

    /// A live (unexpired) access token is stored.
    pub fn is_authenticated(&self) -> bool {
        self.client.tokens().valid_access_token().is_some()
    }

    /// Claims of the stored access token, if it decodes.
    pub fn token_info(&self) -> Option<TokenClaims> {
        let token = self.client.tokens().access_token()?;
        decode_claims(&token).ok()
    }
}
