//! Session credential retrieval.
//!
//! The session is persisted as a JSON blob mapping cookie names to
//! `{ "value": ..., "expires": ... }` entries under a fixed storage key.
//! [`CredentialProvider`] reads that blob, drops expired cookies, and joins
//! the rest into a single `Cookie` header value.
//!
//! ## Failure rules
//!
//! - Nothing stored, unreadable JSON, or an empty map: `AuthenticationMissing`
//! - Every cookie expired: `AuthenticationExpired`
//!
//! In both cases no network call is ever made with a partial header.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::debug;

/// On-device key/value storage for secrets.
pub trait SecureStorage: Send + Sync {
    /// Reads an item.
    fn get_item(&self, key: &str) -> SyncResult<Option<String>>;

    /// Writes an item.
    fn set_item(&self, key: &str, value: &str) -> SyncResult<()>;

    /// Deletes an item. Deleting a missing item is not an error.
    fn remove_item(&self, key: &str) -> SyncResult<()>;
}

/// In-memory secure storage for tests.
#[derive(Debug, Default)]
pub struct MemorySecureStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemorySecureStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStorage for MemorySecureStorage {
    fn get_item(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self.items.read().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> SyncResult<()> {
        self.items.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> SyncResult<()> {
        self.items.write().remove(key);
        Ok(())
    }
}

/// Secure storage backed by one file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileSecureStorage {
    dir: PathBuf,
}

impl FileSecureStorage {
    /// Creates a storage rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> SyncResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(SyncError::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(self.dir.join(key))
    }
}

impl SecureStorage for FileSecureStorage {
    fn get_item(&self, key: &str) -> SyncResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::Storage(e.to_string())),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> SyncResult<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).map_err(|e| SyncError::Storage(e.to_string()))?;
        fs::write(path, value).map_err(|e| SyncError::Storage(e.to_string()))
    }

    fn remove_item(&self, key: &str) -> SyncResult<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::Storage(e.to_string())),
        }
    }
}

/// One cookie of a stored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieEntry {
    /// Cookie value.
    pub value: String,
    /// Expiry; `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

impl CookieEntry {
    /// Creates a cookie entry.
    pub fn new(value: impl Into<String>, expires: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires,
        }
    }

    /// Returns true if the cookie is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }
}

/// A stored session: cookie name to entry.
pub type SessionCookies = BTreeMap<String, CookieEntry>;

/// A ready-to-send `Cookie` header value.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthHeader(String);

impl AuthHeader {
    /// Wraps a raw header value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the header value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthHeader(<redacted>)")
    }
}

/// Reads the session blob and assembles the authorization header.
pub struct CredentialProvider {
    storage: Box<dyn SecureStorage>,
    key: String,
}

impl CredentialProvider {
    /// Creates a provider reading `key` from `storage`.
    pub fn new(storage: impl SecureStorage + 'static, key: impl Into<String>) -> Self {
        Self {
            storage: Box::new(storage),
            key: key.into(),
        }
    }

    /// Returns the storage key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Builds the header from the cookies valid now.
    pub fn get_auth_header(&self) -> SyncResult<AuthHeader> {
        self.get_auth_header_at(Utc::now())
    }

    /// Builds the header from the cookies valid at `now`.
    pub fn get_auth_header_at(&self, now: DateTime<Utc>) -> SyncResult<AuthHeader> {
        let cookies = self.load_session()?;

        let valid: Vec<String> = cookies
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(name, entry)| format!("{}={}", name, entry.value))
            .collect();

        debug!(
            stored = cookies.len(),
            valid = valid.len(),
            "assembled session cookies"
        );

        if valid.is_empty() {
            return Err(SyncError::AuthenticationExpired);
        }
        Ok(AuthHeader(valid.join("; ")))
    }

    /// Returns the names of cookies valid at `now`.
    pub fn valid_cookie_names_at(&self, now: DateTime<Utc>) -> SyncResult<Vec<String>> {
        Ok(self
            .load_session()?
            .into_iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(name, _)| name)
            .collect())
    }

    /// Persists a session blob, replacing any previous one.
    pub fn store_session(&self, cookies: &SessionCookies) -> SyncResult<()> {
        let blob = serde_json::to_string(cookies)
            .map_err(|e| SyncError::Internal(format!("encode session: {e}")))?;
        self.storage.set_item(&self.key, &blob)
    }

    /// Removes the stored session.
    pub fn clear_session(&self) -> SyncResult<()> {
        self.storage.remove_item(&self.key)
    }

    /// Loads the non-empty stored session.
    fn load_session(&self) -> SyncResult<SessionCookies> {
        let blob = self
            .storage
            .get_item(&self.key)?
            .ok_or(SyncError::AuthenticationMissing)?;

        // Unreadable blobs fail closed.
        let cookies: SessionCookies =
            serde_json::from_str(&blob).map_err(|_| SyncError::AuthenticationMissing)?;

        if cookies.is_empty() {
            return Err(SyncError::AuthenticationMissing);
        }
        Ok(cookies)
    }
}
