use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::permissions::module_of;
use crate::{Permission, Role, User};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("forbidden: role '{0}' is not allowed")]
    InsufficientRole(Role),

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// How a set of required permissions is aggregated.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    /// Every required permission must be granted.
    All,
    /// At least one required permission must be granted.
    #[default]
    Any,
}

impl PermissionMode {
    pub fn from_require_all(require_all: bool) -> Self {
        if require_all { Self::All } else { Self::Any }
    }

    /// Aggregate per-code results. Codes missing from `results` count as denied.
    pub fn evaluate(self, required: &[Permission], results: &HashMap<String, bool>) -> bool {
        let granted = |p: &Permission| results.get(p.as_str()).copied().unwrap_or(false);
        match self {
            PermissionMode::All => required.iter().all(granted),
            PermissionMode::Any => required.iter().any(granted),
        }
    }
}

/// Local permission check.
///
/// Granted when the user holds the privileged role, or their grants contain
/// the exact code, the `"*"` wildcard, or `"<module>.*"` for the code's module.
///
/// - No IO
/// - No panics
pub fn has_permission(user: Option<&User>, code: &str) -> bool {
    let Some(user) = user else {
        return false;
    };

    if user.role.is_privileged() {
        return true;
    }

    let module_wildcard = format!("{}.*", module_of(code));
    user.permissions.iter().any(|p| {
        let p = p.as_str();
        p == code || p == Permission::WILDCARD || p == module_wildcard
    })
}

/// Role membership test. No user means no role.
pub fn has_role(user: Option<&User>, roles: &[Role]) -> bool {
    user.is_some_and(|u| roles.contains(&u.role))
}

/// Authorize a user for one permission, reporting why access was refused.
pub fn authorize(user: Option<&User>, required: &Permission) -> Result<(), AuthzError> {
    if user.is_none() {
        return Err(AuthzError::NotAuthenticated);
    }

    if has_permission(user, required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}
