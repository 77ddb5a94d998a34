//! Authenticated user as seen by the client.
//!
//! The client never edits a user field by field: a fresh profile replaces it,
//! and a profile update response is merged over it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Permission, Role};

/// Backend identifier of a user account.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for UserId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub full_name: String,
    pub role: Role,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(default)]
    pub email_notifications: bool,
    #[serde(default)]
    pub system_notifications: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl User {
    /// Minimal user with the given identity; mostly useful for fixtures.
    pub fn new(id: impl Into<UserId>, username: impl Into<String>, role: Role) -> Self {
        let username = username.into();
        Self {
            id: id.into(),
            full_name: username.clone(),
            username,
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            role,
            permissions: Vec::new(),
            is_active: true,
            phone: None,
            document_id: None,
            company_id: None,
            company_name: None,
            email_notifications: false,
            system_notifications: false,
            last_login: None,
        }
    }

    pub fn with_permissions<I, P>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Permission>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    /// Name to greet the user with.
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            &self.username
        } else {
            &self.full_name
        }
    }
}

impl User {
    /// Overlay the fields of a (possibly partial) profile object.
    ///
    /// Unknown keys are ignored. If the result no longer forms a valid user,
    /// the update is dropped and the current profile kept.
    pub fn merge(&self, fields: &Value) -> User {
        let Some(patch) = fields.as_object() else {
            return self.clone();
        };

        let merged = serde_json::to_value(self).and_then(|mut current| {
            if let Value::Object(current_fields) = &mut current {
                for (key, value) in patch {
                    current_fields.insert(key.clone(), value.clone());
                }
            }
            serde_json::from_value::<User>(current)
        });

        match merged {
            Ok(user) => user,
            Err(err) => {
                tracing::warn!(error = %err, "profile update does not form a valid user; ignored");
                self.clone()
            }
        }
    }
}

/// Editable subset of the profile (`PATCH /users/profile`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_notifications: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_notifications: Option<bool>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
