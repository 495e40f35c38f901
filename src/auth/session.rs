//! JWT session token creation and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::{ConfigError, SessionError};

/// JWT session claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub email: String,
    pub account_id: i64,
    pub is_admin: bool,
    pub exp: i64,
    pub iat: i64,
}

/// Issues and verifies HS256 session tokens.
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    leeway: Duration,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys")
            .field("ttl", &self.ttl)
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

impl SessionKeys {
    pub fn new(secret: &SecretString, ttl: Duration, leeway: Duration) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            ttl,
            leeway,
        }
    }

    pub fn from_config(auth: &AuthConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            auth.require_jwt_secret()?,
            auth.session_ttl,
            auth.clock_skew_leeway,
        ))
    }

    pub fn issue(
        &self,
        email: &str,
        account_id: i64,
        is_admin: bool,
    ) -> Result<String, SessionError> {
        self.issue_at(email, account_id, is_admin, Utc::now())
    }

    pub(crate) fn issue_at(
        &self,
        email: &str,
        account_id: i64,
        is_admin: bool,
        now: DateTime<Utc>,
    ) -> Result<String, SessionError> {
        let expires_at = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| SessionError::Internal(format!("session TTL {} is out of range", self.ttl)))?;
        let claims = SessionClaims {
            email: email.to_string(),
            account_id,
            is_admin,
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| SessionError::Internal(format!("create JWT: {e}")))
    }

    /// Expired, malformed, and wrongly signed tokens are all `Unauthenticated`.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = u64::try_from(self.leeway.num_seconds()).unwrap_or(0);

        decode::<SessionClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidKeyFormat | ErrorKind::Crypto(_) => {
                    SessionError::Internal(format!("JWT verification: {e}"))
                }
                _ => SessionError::Unauthenticated,
            })
    }
}
