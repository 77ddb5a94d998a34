//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use felicita_auth::guard::{LANDING_PATH, LOGIN_PATH};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend paths, relative to `ClientConfig::base_url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub login: String,
    pub logout: String,
    pub refresh: String,
    pub register: String,
    pub profile: String,
    pub change_password: String,
    pub verify_permissions: String,
    pub sessions: String,
    pub close_session: String,
    pub close_all_sessions: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login".into(),
            logout: "/auth/logout".into(),
            refresh: "/auth/token/refresh".into(),
            register: "/auth/register".into(),
            profile: "/users/profile".into(),
            change_password: "/users/change-password".into(),
            verify_permissions: "/users/verify-permissions".into(),
            sessions: "/users/sessions".into(),
            close_session: "/users/sessions/close".into(),
            close_all_sessions: "/users/sessions/close-all".into(),
        }
    }
}

impl Endpoints {
    /// Endpoints whose 401 means "bad credentials", never "refresh and retry".
    pub fn skips_refresh(&self, path: &str) -> bool {
        path == self.login || path == self.refresh
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Where the client navigates when the session cannot be recovered.
    pub login_path: String,
    pub landing_path: String,
    /// Token file for `FileTokenStore`; `None` uses the platform data dir.
    pub token_path: Option<PathBuf>,
    pub endpoints: Endpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            login_path: LOGIN_PATH.to_string(),
            landing_path: LANDING_PATH.to_string(),
            token_path: None,
            endpoints: Endpoints::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Defaults overridden by `FELICITA_API_URL`, `FELICITA_API_TIMEOUT_SECS`
    /// and `FELICITA_TOKEN_PATH`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        match lookup("FELICITA_API_URL") {
            Some(url) if !url.trim().is_empty() => config.base_url = url.trim().to_string(),
            _ => tracing::warn!("FELICITA_API_URL not set; using {DEFAULT_API_URL}"),
        }

        if let Some(raw) = lookup("FELICITA_API_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout = Duration::from_secs(secs),
                _ => tracing::warn!(value = %raw, "invalid FELICITA_API_TIMEOUT_SECS; keeping default"),
            }
        }

        if let Some(path) = lookup("FELICITA_TOKEN_PATH").filter(|p| !p.trim().is_empty()) {
            config.token_path = Some(PathBuf::from(path));
        }

        config
    }

    /// Absolute URL for a backend path.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
