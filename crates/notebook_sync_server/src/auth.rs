//! Session cookies for the sync server.
//!
//! Sessions are stateless signed cookie values using HMAC-SHA256.
//!
//! ## Cookie Format
//!
//! `session=<user>.<expires>.<signature>` where:
//! - `user` is the account name (`[A-Za-z0-9_-]`)
//! - `expires` is the expiry in Unix millis
//! - `signature` is the URL-safe base64 HMAC of `<user>.<expires>`

use crate::error::{ServerError, ServerResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "session";

/// A freshly issued session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSession {
    /// Cookie value.
    pub value: String,
    /// Expiry.
    pub expires: DateTime<Utc>,
}

/// One entry of the client-side session blob.
#[derive(Debug, Clone, Serialize)]
pub struct SessionBlobEntry {
    /// Cookie value.
    pub value: String,
    /// Expiry.
    pub expires: DateTime<Utc>,
}

impl IssuedSession {
    /// Returns the session in the cookie-map form clients persist.
    pub fn to_blob(&self) -> BTreeMap<String, SessionBlobEntry> {
        BTreeMap::from([(
            SESSION_COOKIE.to_string(),
            SessionBlobEntry {
                value: self.value.clone(),
                expires: self.expires,
            },
        )])
    }
}

/// Issues and validates signed session cookie values.
#[derive(Clone)]
pub struct SessionSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl SessionSigner {
    /// Creates a signer.
    pub fn new(secret: Vec<u8>, ttl: Duration) -> Self {
        Self { secret, ttl }
    }

    /// Issues a session for `user`, valid from `now` for the configured ttl.
    pub fn issue(&self, user: &str, now: DateTime<Utc>) -> ServerResult<IssuedSession> {
        if user.is_empty()
            || !user
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ServerError::InvalidRequest(format!(
                "invalid user name {user:?}"
            )));
        }

        let ttl = TimeDelta::from_std(self.ttl)
            .map_err(|e| ServerError::Internal(format!("session ttl: {e}")))?;
        let expires = now + ttl;
        let payload = format!("{}.{}", user, expires.timestamp_millis());
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&payload)?.finalize().into_bytes());

        Ok(IssuedSession {
            value: format!("{payload}.{signature}"),
            expires,
        })
    }

    /// Validates a cookie value at `now` and returns the user.
    pub fn validate(&self, value: &str, now: DateTime<Utc>) -> ServerResult<String> {
        let (payload, signature) = value
            .rsplit_once('.')
            .ok_or_else(|| ServerError::NotAuthorized("malformed session".into()))?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| ServerError::NotAuthorized("malformed session".into()))?;

        self.mac(payload)?
            .verify_slice(&signature)
            .map_err(|_| ServerError::NotAuthorized("invalid signature".into()))?;

        let (user, expires) = payload
            .split_once('.')
            .ok_or_else(|| ServerError::NotAuthorized("malformed session".into()))?;
        let expires: i64 = expires
            .parse()
            .map_err(|_| ServerError::NotAuthorized("malformed session".into()))?;

        if now.timestamp_millis() >= expires {
            return Err(ServerError::NotAuthorized("session expired".into()));
        }
        Ok(user.to_string())
    }

    fn mac(&self, payload: &str) -> ServerResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ServerError::Internal(format!("hmac key: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }
}

/// Extracts the session cookie value from a `Cookie` header.
pub fn session_from_cookie_header(header: &str) -> Option<&str> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then_some(value)
    })
}
