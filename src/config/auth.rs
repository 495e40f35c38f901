use chrono::Duration;
use secrecy::SecretString;

use crate::config::helpers::{optional_env, parse_string_env, parse_u64_env};
use crate::error::ConfigError;
use crate::settings::Settings;

// Upper bounds: one year for both TTLs, one hour of clock skew.
const MAX_SESSION_TTL_HOURS: u64 = 24 * 365;
const MAX_RESET_TTL_MINUTES: u64 = 60 * 24 * 365;
const MAX_CLOCK_SKEW_SECS: u64 = 60 * 60;

/// Credential, session, and password-reset policy.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: Option<SecretString>,
    pub session_ttl: Duration,
    pub reset_token_ttl: Duration,
    pub clock_skew_leeway: Duration,
    /// Local-part suffix that marks a sign-up as an admin account.
    pub admin_tag: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            session_ttl: Duration::hours(24),
            reset_token_ttl: Duration::minutes(15),
            clock_skew_leeway: Duration::seconds(10),
            admin_tag: "+admin".to_string(),
        }
    }
}

fn to_duration(
    key: &str,
    value: u64,
    max: u64,
    make: fn(i64) -> Option<Duration>,
) -> Result<Duration, ConfigError> {
    if value > max {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be at most {max}"),
        });
    }
    i64::try_from(value)
        .ok()
        .and_then(make)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is out of range".to_string(),
        })
}

fn validate_admin_tag(raw: &str) -> Result<String, ConfigError> {
    let tag = raw.trim();
    if tag.is_empty() || tag.contains('@') || tag.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidValue {
            key: "CLAUSEEASE_ADMIN_TAG".to_string(),
            message: "admin tag must be a non-empty local-part suffix without '@' or spaces"
                .to_string(),
        });
    }
    Ok(tag.to_ascii_lowercase())
}

impl AuthConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let jwt_secret = optional_env("CLAUSEEASE_JWT_SECRET")?
            .or_else(|| settings.auth.jwt_secret.clone())
            .map(SecretString::from);

        let session_hours = parse_u64_env(
            "CLAUSEEASE_SESSION_TTL_HOURS",
            settings.auth.session_ttl_hours,
        )?;
        let reset_minutes = parse_u64_env(
            "CLAUSEEASE_RESET_TTL_MINUTES",
            settings.auth.reset_token_ttl_minutes,
        )?;
        let leeway_secs = parse_u64_env(
            "CLAUSEEASE_CLOCK_SKEW_SECS",
            settings.auth.clock_skew_leeway_secs,
        )?;
        let admin_tag = parse_string_env("CLAUSEEASE_ADMIN_TAG", settings.auth.admin_tag.clone())?;

        Ok(Self {
            jwt_secret,
            session_ttl: to_duration(
                "CLAUSEEASE_SESSION_TTL_HOURS",
                session_hours,
                MAX_SESSION_TTL_HOURS,
                Duration::try_hours,
            )?,
            reset_token_ttl: to_duration(
                "CLAUSEEASE_RESET_TTL_MINUTES",
                reset_minutes,
                MAX_RESET_TTL_MINUTES,
                Duration::try_minutes,
            )?,
            clock_skew_leeway: to_duration(
                "CLAUSEEASE_CLOCK_SKEW_SECS",
                leeway_secs,
                MAX_CLOCK_SKEW_SECS,
                Duration::try_seconds,
            )?,
            admin_tag: validate_admin_tag(&admin_tag)?,
        })
    }

    /// The JWT secret, required only by commands that issue or verify sessions.
    pub fn require_jwt_secret(&self) -> Result<&SecretString, ConfigError> {
        self.jwt_secret
            .as_ref()
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "CLAUSEEASE_JWT_SECRET".to_string(),
                hint: "set it in the environment, .env, or [auth].jwt_secret".to_string(),
            })
    }
}
