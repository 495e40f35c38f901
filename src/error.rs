//! Error types shared across the crate.
//!
//! Each error maps onto a small taxonomy ([`ErrorClass`]) so callers that
//! orchestrate multi-step work can decide what to surface, what to retry, and
//! what to downgrade to a warning without matching every variant.

use std::path::PathBuf;

/// Coarse classification used by callers to decide how to react to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed input (bad email, weak credential, bad token). Never retried.
    Validation,
    /// Duplicate identity or key on an insert-only path.
    Conflict,
    /// The referenced account or store does not exist.
    NotFound,
    /// I/O or engine failure. Safe to retry through idempotent operations.
    TransientStorage,
    /// A secondary step failed after the authoritative step succeeded.
    PartialFailure,
}

/// Persistence-layer errors for both the master directory and tenant stores.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("failed to open database: {0}")]
    Pool(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Input the store will never accept, such as an empty glossary term.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("schema bootstrap failed: {0}")]
    Migration(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("store at {path:?} has no schema (expected version {expected}, found {found})")]
    SchemaMissing {
        path: PathBuf,
        expected: i64,
        found: i64,
    },

    #[error("{entity} already exists: {key}")]
    Conflict { entity: String, key: String },
}

impl DatabaseError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::Conflict { .. } => ErrorClass::Conflict,
            Self::InvalidInput(_) => ErrorClass::Validation,
            Self::Pool(_)
            | Self::Query(_)
            | Self::Serialization(_)
            | Self::Migration(_)
            | Self::SchemaMissing { .. } => ErrorClass::TransientStorage,
        }
    }
}

impl From<libsql::Error> for DatabaseError {
    fn from(err: libsql::Error) -> Self {
        Self::Query(err.to_string())
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration {key}: {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("failed to read configuration file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of master-directory operations (registration, login, password reset).
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("invalid email format: {0}")]
    InvalidEmail(String),

    #[error("password must be at least 8 characters with uppercase, lowercase, digit, and symbol")]
    WeakCredential,

    #[error("email already registered: {0}")]
    AlreadyRegistered(String),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("email address not found: {0}")]
    NotFound(String),

    #[error("invalid reset token")]
    InvalidResetToken,

    #[error("reset token has expired")]
    ExpiredResetToken,

    #[error("credential hashing failed: {0}")]
    Hashing(String),

    #[error("directory misconfigured: {0}")]
    Misconfigured(String),

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

impl DirectoryError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidEmail(_)
            | Self::WeakCredential
            | Self::InvalidCredentials
            | Self::InvalidResetToken
            | Self::ExpiredResetToken
            | Self::Misconfigured(_) => ErrorClass::Validation,
            Self::AlreadyRegistered(_) => ErrorClass::Conflict,
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Hashing(_) => ErrorClass::TransientStorage,
            Self::Storage(err) => err.class(),
        }
    }

    /// True for both reset-token failure modes.
    pub fn is_invalid_or_expired_token(&self) -> bool {
        matches!(self, Self::InvalidResetToken | Self::ExpiredResetToken)
    }
}

/// Failures while ensuring a tenant store exists.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("failed to create tenant directory {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

impl ProvisioningError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Io { .. } => ErrorClass::TransientStorage,
            Self::Storage(err) => err.class(),
        }
    }
}

/// Session token failures.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Expired, malformed, or wrongly signed token.
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("session token error: {0}")]
    Internal(String),
}

/// Document-processing failures that abort the whole operation.
///
/// Non-fatal problems (glossary merge, classification) are reported as
/// warnings on the processing report instead.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("no simplification model registered under '{0}'")]
    UnknownModel(String),

    #[error("simplification failed: {0}")]
    Simplification(String),

    #[error("input text is empty")]
    EmptyInput,

    #[error("failed to save document: {0}")]
    Save(#[source] DatabaseError),
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownModel(_) | Self::EmptyInput => ErrorClass::Validation,
            Self::Simplification(_) => ErrorClass::TransientStorage,
            Self::Save(err) => err.class(),
        }
    }
}
