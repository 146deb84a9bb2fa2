//! Resolution of bearer credentials to users.
//!
//! Tokens have the form `v1.<user_id>.<expires_at>.<signature>` where
//! `expires_at` is a Unix timestamp in seconds and `signature` is the
//! unpadded base64url HMAC-SHA256 of everything before the last dot.

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use common::UserId;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::DomainError;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: &str = "v1";

/// Turns an opaque credential into the user it identifies.
pub trait IdentityResolver: Send + Sync {
    /// Returns the user the credential belongs to, or
    /// [`DomainError::Unauthenticated`].
    fn resolve(&self, credential: &str) -> Result<UserId, DomainError>;
}

/// Issues and verifies HMAC-signed, expiring user tokens.
#[derive(Clone)]
pub struct SignedTokenResolver {
    mac: HmacSha256,
    ttl: Duration,
}

impl std::fmt::Debug for SignedTokenResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedTokenResolver")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl SignedTokenResolver {
    /// Creates a resolver signing with `secret`; issued tokens live for `ttl`.
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self, DomainError> {
        if secret.is_empty() {
            return Err(DomainError::Validation(
                "token secret must not be empty".to_string(),
            ));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| DomainError::Validation(format!("invalid token secret: {e}")))?;
        Ok(Self { mac, ttl })
    }

    /// Issues a token for the user, valid from now for the configured TTL.
    pub fn issue(&self, user_id: UserId) -> String {
        self.issue_at(user_id, Utc::now())
    }

    /// Issues a token as if the current time were `now`.
    pub fn issue_at(&self, user_id: UserId, now: DateTime<Utc>) -> String {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let expires_at = now.timestamp().saturating_add(ttl);
        let payload = format!("{TOKEN_VERSION}.{user_id}.{expires_at}");
        let signature = self.sign(&payload);
        format!("{payload}.{signature}")
    }

    /// Resolves a token as if the current time were `now`.
    pub fn resolve_at(&self, token: &str, now: DateTime<Utc>) -> Result<UserId, DomainError> {
        let (payload, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| unauthenticated("malformed token"))?;

        let mut parts = payload.split('.');
        let (Some(version), Some(user), Some(expires), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(unauthenticated("malformed token"));
        };

        if version != TOKEN_VERSION {
            return Err(unauthenticated("unsupported token version"));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| unauthenticated("malformed token signature"))?;
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| unauthenticated("invalid token signature"))?;

        let expires_at: i64 = expires
            .parse()
            .map_err(|_| unauthenticated("malformed token expiry"))?;
        if now.timestamp() >= expires_at {
            return Err(unauthenticated("token expired"));
        }

        let user_id = user
            .parse::<i64>()
            .map(UserId::new)
            .map_err(|_| unauthenticated("malformed token subject"))?;
        if !user_id.is_valid() {
            return Err(unauthenticated("invalid token subject"));
        }

        Ok(user_id)
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}

impl IdentityResolver for SignedTokenResolver {
    fn resolve(&self, credential: &str) -> Result<UserId, DomainError> {
        self.resolve_at(credential, Utc::now())
    }
}

fn unauthenticated(reason: &str) -> DomainError {
    DomainError::Unauthenticated(reason.to_string())
}
