//! Access/refresh token persistence.
//!
//! The token store is the only owner of the token pair. Everything else asks
//! it for a *valid* token at the moment of use.

use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ACCESS_TOKEN_KEY: &str = "felicita_access_token";
pub const REFRESH_TOKEN_KEY: &str = "felicita_refresh_token";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("token file IO failed at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("token file is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no data directory available for the token file")]
    NoDataDir,
}

/// Persistence contract for the token pair.
pub trait TokenStore: Send + Sync {
    fn access_token(&self) -> Option<String>;

    fn refresh_token(&self) -> Option<String>;

    fn set_tokens(&self, tokens: &TokenPair) -> Result<(), TokenStoreError>;

    fn clear(&self) -> Result<(), TokenStoreError>;

    /// Fail-closed expiry check (see `felicita_auth::is_expired`).
    fn is_expired(&self, token: &str) -> bool {
        felicita_auth::is_expired(token, Utc::now())
    }

    fn valid_access_token(&self) -> Option<String> {
        self.access_token().filter(|t| !self.is_expired(t))
    }

    fn valid_refresh_token(&self) -> Option<String> {
        self.refresh_token().filter(|t| !self.is_expired(t))
    }
}

/// On-disk / in-memory shape: two strings under fixed keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoredTokens {
    #[serde(rename = "felicita_access_token", default, skip_serializing_if = "Option::is_none")]
    access: Option<String>,
    #[serde(rename = "felicita_refresh_token", default, skip_serializing_if = "Option::is_none")]
    refresh: Option<String>,
}

impl StoredTokens {
    fn from_pair(tokens: &TokenPair) -> Self {
        Self {
            access: Some(tokens.access.clone()),
            refresh: Some(tokens.refresh.clone()),
        }
    }

    fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}

/// Process-local token store.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<StoredTokens>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: &TokenPair) -> Self {
        Self {
            tokens: RwLock::new(StoredTokens::from_pair(tokens)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }
}

impl TokenStore for MemoryTokenStore {
    fn access_token(&self) -> Option<String> {
        self.tokens.read().access.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.tokens.read().refresh.clone()
    }

    fn set_tokens(&self, tokens: &TokenPair) -> Result<(), TokenStoreError> {
        *self.tokens.write() = StoredTokens::from_pair(tokens);
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        *self.tokens.write() = StoredTokens::default();
        Ok(())
    }
}

/// JSON-file token store, surviving restarts like browser local storage.
///
/// Reads are served from memory; every write is flushed to disk.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    tokens: RwLock<StoredTokens>,
}

impl FileTokenStore {
    /// Open (or lazily create) the token file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TokenStoreError> {
        let path = path.into();
        let tokens = match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => StoredTokens::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoredTokens::default(),
            Err(source) => return Err(TokenStoreError::Io { path, source }),
        };

        Ok(Self {
            path,
            tokens: RwLock::new(tokens),
        })
    }

    /// `<data dir>/felicita/session.json`.
    pub fn default_path() -> Result<PathBuf, TokenStoreError> {
        let base = dirs::data_dir().ok_or(TokenStoreError::NoDataDir)?;
        Ok(base.join("felicita").join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, tokens: &StoredTokens) -> Result<(), TokenStoreError> {
        let io_err = |source| TokenStoreError::Io {
            path: self.path.clone(),
            source,
        };

        if tokens.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_err(e)),
            };
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        // Write-then-rename so a crash never leaves a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(tokens)?).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)
    }
}

impl TokenStore for FileTokenStore {
    fn access_token(&self) -> Option<String> {
        self.tokens.read().access.clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.tokens.read().refresh.clone()
    }

    fn set_tokens(&self, tokens: &TokenPair) -> Result<(), TokenStoreError> {
        let mut guard = self.tokens.write();
        let next = StoredTokens::from_pair(tokens);
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        let mut guard = self.tokens.write();
        // Forget in memory even if the file cannot be removed.
        *guard = StoredTokens::default();
        self.persist(&guard)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose};
    use chrono::Duration;

    pub(crate) fn jwt_expiring_in(delta: Duration) -> String {
        let exp = (Utc::now() + delta).timestamp();
        let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = general_purpose::URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp},"user_id":1}}"#));
        format!("{header}.{body}.sig")
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("felicita-test-{}", uuid::Uuid::now_v7()))
            .join(name)
    }

    #[test]
    fn memory_store_set_and_clear() {
        let store = MemoryTokenStore::new();
        assert!(store.is_empty());

        store
            .set_tokens(&TokenPair {
                access: "a".into(),
                refresh: "r".into(),
            })
            .unwrap();
        assert_eq!(store.access_token().as_deref(), Some("a"));
        assert_eq!(store.refresh_token().as_deref(), Some("r"));

        store.clear().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn valid_tokens_filter_expired_and_garbage() {
        let store = MemoryTokenStore::with_tokens(&TokenPair {
            access: jwt_expiring_in(Duration::minutes(-1)),
            refresh: jwt_expiring_in(Duration::days(1)),
        });
        assert!(store.access_token().is_some());
        assert!(store.valid_access_token().is_none());
        assert!(store.valid_refresh_token().is_some());

        let garbage = MemoryTokenStore::with_tokens(&TokenPair {
            access: "garbage".into(),
            refresh: "garbage".into(),
        });
        assert!(garbage.valid_access_token().is_none());
        assert!(garbage.valid_refresh_token().is_none());
    }

    #[test]
    fn file_store_survives_reopen_and_removes_file_on_clear() {
        let path = temp_path("session.json");
        let store = FileTokenStore::open(&path).unwrap();
        assert!(store.access_token().is_none());

        store
            .set_tokens(&TokenPair {
                access: "acc".into(),
                refresh: "ref".into(),
            })
            .unwrap();

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw[ACCESS_TOKEN_KEY], "acc");
        assert_eq!(raw[REFRESH_TOKEN_KEY], "ref");

        let reopened = FileTokenStore::open(&path).unwrap();
        assert_eq!(reopened.refresh_token().as_deref(), Some("ref"));

        reopened.clear().unwrap();
        assert!(!path.exists());
        assert!(reopened.access_token().is_none());
        reopened.clear().unwrap();
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let path = temp_path("corrupt.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{not json").unwrap();
        assert!(matches!(FileTokenStore::open(&path), Err(TokenStoreError::Serde(_))));
    }
}
