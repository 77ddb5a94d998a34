//! Session state and its pure transition function.
//!
//! The controller in the client crate performs IO, then dispatches a
//! `SessionAction` here. `reduce` never performs IO and never panics.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::User;

/// Snapshot of the client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub current_user: Option<User>,
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub last_error: Option<String>,
}

impl Default for SessionState {
    /// A freshly mounted application is loading until `initialize` settles.
    fn default() -> Self {
        Self {
            current_user: None,
            is_loading: true,
            is_authenticated: false,
            last_error: None,
        }
    }
}

/// Coarse state-machine view of a `SessionState`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Loading,
    Unauthenticated,
    Authenticated,
    Error,
}

impl SessionState {
    pub fn status(&self) -> SessionStatus {
        if self.is_loading {
            SessionStatus::Loading
        } else if self.is_authenticated && self.current_user.is_some() {
            SessionStatus::Authenticated
        } else if self.last_error.is_some() {
            SessionStatus::Error
        } else {
            SessionStatus::Unauthenticated
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.current_user.as_ref()
    }
}

/// Session transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    SetLoading(bool),
    /// Replace the current user; `None` means signed out.
    SetUser(Option<User>),
    LoginSuccess(User),
    Logout,
    /// Merge profile fields into the signed-in user. Ignored when signed out.
    UpdateUser(Value),
    SetError(Option<String>),
}

pub fn reduce(state: SessionState, action: SessionAction) -> SessionState {
    match action {
        SessionAction::SetLoading(is_loading) => SessionState { is_loading, ..state },
        SessionAction::SetUser(user) => SessionState {
            is_authenticated: user.is_some(),
            current_user: user,
            is_loading: false,
            last_error: None,
        },
        SessionAction::LoginSuccess(user) => SessionState {
            current_user: Some(user),
            is_authenticated: true,
            is_loading: false,
            last_error: None,
        },
        SessionAction::Logout => SessionState {
            current_user: None,
            is_authenticated: false,
            is_loading: false,
            last_error: None,
        },
        SessionAction::UpdateUser(fields) => SessionState {
            current_user: state.current_user.map(|current| current.merge(&fields)),
            last_error: None,
            ..state
        },
        SessionAction::SetError(last_error) => SessionState {
            last_error,
            is_loading: false,
            ..state
        },
    }
}
