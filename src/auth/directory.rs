//! Account registration, login, and password reset over the master directory.

use std::sync::{Arc, LazyLock};

use chrono::{Duration, Utc};
use regex::Regex;

use crate::auth::mailer::ResetMailer;
use crate::auth::password;
use crate::config::AuthConfig;
use crate::db::{AccountInsert, AccountStore, AccountSummary, NewAccountParams};
use crate::error::DirectoryError;

// No whitespace or path separators, so every accepted email maps to a file
// directly under the tenant root.
static EMAIL_SHAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^@\s/\\]+@[^@\s/\\]+\.[^@\s/\\]+$").ok());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredAccount {
    pub account_id: i64,
    /// Stored form: trimmed, admin tag removed.
    pub email: String,
    pub is_admin: bool,
    pub tenant_mapped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedAccount {
    pub account_id: i64,
    pub email: String,
    pub is_admin: bool,
}

/// How a reset token reached the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetDelivery {
    Delivered,
    /// No mailer, or the mailer failed: the caller must hand the token over.
    Surfaced(String),
}

/// An email after admin-tag handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEmail {
    pub email: String,
    pub admin_tagged: bool,
}

pub struct MasterDirectory {
    accounts: Arc<dyn AccountStore>,
    reset_token_ttl: Duration,
    admin_tag: String,
    mailer: Option<Arc<dyn ResetMailer>>,
}

impl MasterDirectory {
    pub fn new(accounts: Arc<dyn AccountStore>, auth: &AuthConfig) -> Self {
        Self {
            accounts,
            reset_token_ttl: auth.reset_token_ttl,
            admin_tag: auth.admin_tag.clone(),
            mailer: None,
        }
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn ResetMailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.accounts
    }

    /// Trim, validate the shape, and strip a trailing admin tag from the
    /// local part. The tag is matched case-insensitively.
    pub fn normalize_email(&self, raw: &str) -> Result<NormalizedEmail, DirectoryError> {
        let trimmed = raw.trim();
        if !is_valid_email(trimmed) {
            return Err(DirectoryError::InvalidEmail(trimmed.to_string()));
        }
        let Some((local, domain)) = trimmed.split_once('@') else {
            return Err(DirectoryError::InvalidEmail(trimmed.to_string()));
        };

        let tag_len = self.admin_tag.len();
        let split_at = local.len().saturating_sub(tag_len);
        let tagged = local.len() >= tag_len
            && local.is_char_boundary(split_at)
            && local[split_at..].eq_ignore_ascii_case(&self.admin_tag);
        if !tagged {
            return Ok(NormalizedEmail {
                email: trimmed.to_string(),
                admin_tagged: false,
            });
        }

        let email = format!("{}@{domain}", &local[..split_at]);
        if !is_valid_email(&email) {
            return Err(DirectoryError::InvalidEmail(trimmed.to_string()));
        }
        Ok(NormalizedEmail {
            email,
            admin_tagged: true,
        })
    }

    /// Create an account. Non-admin accounts also get a tenant mapping; a
    /// failure there is logged and does not fail registration.
    pub async fn register(
        &self,
        email: &str,
        credential: &str,
    ) -> Result<RegisteredAccount, DirectoryError> {
        let normalized = self.normalize_email(email)?;
        if !password::is_strong(credential) {
            return Err(DirectoryError::WeakCredential);
        }
        if normalized.admin_tagged {
            tracing::info!(email = %normalized.email, "Registering admin account via sign-up tag");
        }

        let credential_hash = hash_blocking(credential.to_string()).await?;
        let outcome = self
            .accounts
            .insert_account(&NewAccountParams {
                email: normalized.email.clone(),
                credential_hash,
                is_admin: normalized.admin_tagged,
            })
            .await?;

        match outcome {
            AccountInsert::Created {
                account_id,
                tenant_mapped,
            } => Ok(RegisteredAccount {
                account_id,
                email: normalized.email,
                is_admin: normalized.admin_tagged,
                tenant_mapped,
            }),
            AccountInsert::AlreadyExists => Err(DirectoryError::AlreadyRegistered(normalized.email)),
        }
    }

    /// Unknown emails and wrong credentials are indistinguishable.
    pub async fn authenticate(
        &self,
        email: &str,
        credential: &str,
    ) -> Result<AuthenticatedAccount, DirectoryError> {
        let Ok(normalized) = self.normalize_email(email) else {
            return Err(DirectoryError::InvalidCredentials);
        };
        let Some(account) = self.accounts.get_account_by_email(&normalized.email).await? else {
            return Err(DirectoryError::InvalidCredentials);
        };

        if !verify_blocking(credential.to_string(), account.credential_hash.clone()).await? {
            return Err(DirectoryError::InvalidCredentials);
        }
        Ok(AuthenticatedAccount {
            account_id: account.id,
            email: account.email,
            is_admin: account.is_admin,
        })
    }

    /// Issue a reset token for a registered email.
    ///
    /// Only the token digest is stored. Without a working mailer the token is
    /// returned to the caller, which is not suitable for production.
    pub async fn request_reset(&self, email: &str) -> Result<ResetDelivery, DirectoryError> {
        let normalized = self.normalize_email(email)?;
        let token = password::generate_reset_token();
        let expires_at = Utc::now()
            .checked_add_signed(self.reset_token_ttl)
            .ok_or_else(|| {
                DirectoryError::Misconfigured(format!(
                    "reset token TTL {} is out of range",
                    self.reset_token_ttl
                ))
            })?;

        let stored = self
            .accounts
            .set_reset_token(
                &normalized.email,
                &password::digest_token(&token),
                expires_at,
            )
            .await?;
        if !stored {
            return Err(DirectoryError::NotFound(normalized.email));
        }

        let Some(mailer) = self.mailer.as_ref() else {
            tracing::warn!(email = %normalized.email, "No reset mailer configured; surfacing token to caller");
            return Ok(ResetDelivery::Surfaced(token));
        };
        match mailer.send_reset(&normalized.email, &token).await {
            Ok(()) => Ok(ResetDelivery::Delivered),
            Err(err) => {
                tracing::warn!(
                    email = %normalized.email,
                    error = %err,
                    "Reset mail delivery failed; surfacing token to caller"
                );
                Ok(ResetDelivery::Surfaced(token))
            }
        }
    }

    /// Replace the credential if `token` is the outstanding, unexpired token.
    ///
    /// An expired token is cleared before the error is returned, so a second
    /// attempt with it reports `InvalidResetToken`.
    pub async fn reset_with_token(
        &self,
        email: &str,
        token: &str,
        new_credential: &str,
    ) -> Result<(), DirectoryError> {
        let Ok(normalized) = self.normalize_email(email) else {
            return Err(DirectoryError::InvalidResetToken);
        };
        let Some(account) = self.accounts.get_account_by_email(&normalized.email).await? else {
            return Err(DirectoryError::InvalidResetToken);
        };
        let (Some(stored_digest), Some(expires_at)) =
            (account.reset_token_hash, account.reset_token_expires)
        else {
            return Err(DirectoryError::InvalidResetToken);
        };

        let presented_digest = password::digest_token(token.trim());
        if !password::tokens_match(&stored_digest, &presented_digest) {
            return Err(DirectoryError::InvalidResetToken);
        }

        if expires_at < Utc::now() {
            // A token issued after our read stays in place.
            if self
                .accounts
                .clear_reset_token(&account.email, &stored_digest)
                .await?
            {
                tracing::info!(email = %account.email, "Expired reset token observed and cleared");
            }
            return Err(DirectoryError::ExpiredResetToken);
        }

        if !password::is_strong(new_credential) {
            return Err(DirectoryError::WeakCredential);
        }

        let new_hash = hash_blocking(new_credential.to_string()).await?;
        if !self
            .accounts
            .complete_password_reset(&account.email, &stored_digest, &new_hash)
            .await?
        {
            // Consumed by a concurrent reset.
            return Err(DirectoryError::InvalidResetToken);
        }
        Ok(())
    }

    /// Look up an account without a credential, for federated sign-in.
    pub async fn account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AccountSummary>, DirectoryError> {
        let normalized = self.normalize_email(email)?;
        Ok(self
            .accounts
            .get_account_by_email(&normalized.email)
            .await?
            .map(AccountSummary::from))
    }
}

fn is_valid_email(email: &str) -> bool {
    EMAIL_SHAPE.as_ref().is_some_and(|re| re.is_match(email))
}

async fn hash_blocking(credential: String) -> Result<String, DirectoryError> {
    tokio::task::spawn_blocking(move || password::hash_credential(&credential))
        .await
        .map_err(|e| DirectoryError::Hashing(format!("hashing task failed: {e}")))?
}

async fn verify_blocking(credential: String, hash: String) -> Result<bool, DirectoryError> {
    tokio::task::spawn_blocking(move || password::verify_credential(&credential, &hash))
        .await
        .map_err(|e| DirectoryError::Hashing(format!("verification task failed: {e}")))
}
