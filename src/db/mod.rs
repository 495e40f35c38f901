//! Persistence layer.
//!
//! Two kinds of store exist, both backed by embedded libSQL files:
//!
//! - the **master directory** (one per process): accounts and the
//!   account → tenant mapping. Persistence goes through [`AccountStore`].
//! - one **tenant store** per non-admin account: its user record, documents,
//!   chat transcripts, and glossary. Persistence goes through the
//!   [`TenantDatabase`] supertrait and its sub-traits.
//!
//! Tenant stores are created only by provisioning (`TenantStore::bootstrap`);
//! `TenantStore::open` refuses a store whose schema is not stamped.

pub mod libsql;
pub mod libsql_migrations;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

// ==================== Master directory records ====================

/// Full account row, including credential material. Never exported by reports.
#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub id: i64,
    pub email: String,
    pub credential_hash: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    /// SHA-256 hex digest of the outstanding reset token, if any.
    pub reset_token_hash: Option<String>,
    pub reset_token_expires: Option<DateTime<Utc>>,
}

/// Account row without credential material, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: i64,
    pub email: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl From<AccountRecord> for AccountSummary {
    fn from(record: AccountRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            is_admin: record.is_admin,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAccountParams {
    pub email: String,
    pub credential_hash: String,
    pub is_admin: bool,
}

/// Outcome of the registration transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountInsert {
    Created {
        account_id: i64,
        /// False when the tenant-mapping insert failed and was tolerated, or
        /// when the account is an admin (admins get no mapping).
        tenant_mapped: bool,
    },
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMappingRecord {
    pub id: i64,
    pub account_id: i64,
    pub tenant_name: String,
    pub created_at: DateTime<Utc>,
}

// ==================== Tenant store records ====================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUserRecord {
    pub id: i64,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Simplification depth requested for a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimplificationLevel {
    Basic,
    #[default]
    Intermediate,
    Advanced,
}

impl SimplificationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "Basic",
            Self::Intermediate => "Intermediate",
            Self::Advanced => "Advanced",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "Basic" => Some(Self::Basic),
            "Intermediate" => Some(Self::Intermediate),
            "Advanced" => Some(Self::Advanced),
            _ => None,
        }
    }
}

impl FromStr for SimplificationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            other => Err(format!("unknown simplification level '{other}'")),
        }
    }
}

/// Tri-state legal classification of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegalFlag {
    Legal,
    NotLegal,
    Unknown,
}

impl LegalFlag {
    pub fn as_db_value(self) -> i64 {
        match self {
            Self::Legal => 1,
            Self::NotLegal => 0,
            Self::Unknown => -1,
        }
    }

    pub fn from_db_value(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Legal),
            0 => Some(Self::NotLegal),
            -1 => Some(Self::Unknown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub user_id: i64,
    pub original_file_name: Option<String>,
    pub title: String,
    pub original_text: String,
    pub simplified_text: String,
    pub simplification_level: SimplificationLevel,
    pub is_legal: LegalFlag,
    pub original_word_count: i64,
    pub simplified_word_count: i64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocumentParams {
    pub user_id: i64,
    pub original_file_name: Option<String>,
    pub title: String,
    pub original_text: String,
    pub simplified_text: String,
    pub simplification_level: SimplificationLevel,
    pub is_legal: LegalFlag,
    pub original_word_count: i64,
    pub simplified_word_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

/// One turn of a chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub message: String,
}

impl ChatTurn {
    pub fn user(message: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            message: message.into(),
        }
    }

    pub fn assistant(message: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            message: message.into(),
        }
    }
}

/// Who last wrote a glossary entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlossarySource {
    Seed,
    Manual,
    Auto,
}

impl GlossarySource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seed => "seed",
            Self::Manual => "manual",
            Self::Auto => "auto",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "seed" => Some(Self::Seed),
            "manual" => Some(Self::Manual),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub term: String,
    pub definition: String,
    pub category: Option<String>,
    pub source: GlossarySource,
    /// Refreshed on every write; this is the last-updated time.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GlossaryTermParams {
    pub term: String,
    pub definition: String,
    pub category: Option<String>,
}

/// Result of one automatic glossary write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlossaryMergeOutcome {
    Inserted,
    Updated,
    /// A manually curated entry was kept because the scan found no explanation.
    KeptManual,
}

/// Canonical glossary key: trimmed and lowercased.
pub fn normalize_term(raw: &str) -> String {
    raw.trim().to_lowercase()
}

// ==================== Table allow-lists ====================

/// A read-only full-table export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDump {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Tables of a tenant store that may be read by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantTable {
    Users,
    Documents,
    ChatHistory,
    Glossary,
}

impl TenantTable {
    pub const ALL: [TenantTable; 4] = [
        Self::Users,
        Self::Documents,
        Self::ChatHistory,
        Self::Glossary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Documents => "documents",
            Self::ChatHistory => "chat_history",
            Self::Glossary => "glossary",
        }
    }

    /// Exported columns. Credential material is never listed.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Users => &["id", "email", "created_at"],
            Self::Documents => &[
                "id",
                "user_id",
                "original_file_name",
                "title",
                "original_text",
                "simplified_text",
                "simplification_level",
                "is_legal",
                "original_word_count",
                "simplified_word_count",
                "uploaded_at",
            ],
            Self::ChatHistory => &["id", "document_id", "user_id", "history_json", "updated_at"],
            Self::Glossary => &["id", "term", "definition", "category", "source", "created_at"],
        }
    }
}

impl fmt::Display for TenantTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantTable {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|table| table.as_str() == s)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "tenant table".to_string(),
                id: s.to_string(),
            })
    }
}

/// Tables of the master directory that may be read by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterTable {
    Accounts,
    Tenants,
}

impl MasterTable {
    pub const ALL: [MasterTable; 2] = [Self::Accounts, Self::Tenants];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accounts => "accounts",
            Self::Tenants => "tenants",
        }
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Accounts => &["id", "email", "is_admin", "created_at"],
            Self::Tenants => &["id", "account_id", "tenant_name", "created_at"],
        }
    }
}

impl fmt::Display for MasterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MasterTable {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|table| table.as_str() == s)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "master table".to_string(),
                id: s.to_string(),
            })
    }
}

// ==================== Master directory trait ====================

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert an account and, for non-admins, its tenant mapping in one
    /// transaction. A failing mapping insert is logged and tolerated.
    async fn insert_account(&self, input: &NewAccountParams)
    -> Result<AccountInsert, DatabaseError>;
    async fn get_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AccountRecord>, DatabaseError>;
    async fn get_credential_hash(&self, account_id: i64) -> Result<Option<String>, DatabaseError>;
    /// Returns false when no account has this email.
    async fn set_reset_token(
        &self,
        email: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;
    /// Clear the token pair only if the stored digest still equals
    /// `expected_token_hash`. Returns false when a newer token replaced it.
    async fn clear_reset_token(
        &self,
        email: &str,
        expected_token_hash: &str,
    ) -> Result<bool, DatabaseError>;
    /// Replace the credential and clear the token pair, only if the stored
    /// token digest still equals `expected_token_hash`.
    async fn complete_password_reset(
        &self,
        email: &str,
        expected_token_hash: &str,
        new_credential_hash: &str,
    ) -> Result<bool, DatabaseError>;
    async fn list_accounts(&self) -> Result<Vec<AccountSummary>, DatabaseError>;
    async fn list_tenant_emails(&self) -> Result<Vec<String>, DatabaseError>;
    async fn list_tenant_mappings(&self) -> Result<Vec<TenantMappingRecord>, DatabaseError>;
    async fn read_master_table(&self, table: MasterTable) -> Result<TableDump, DatabaseError>;
}

// ==================== Tenant store sub-traits ====================

#[async_trait]
pub trait TenantUserStore: Send + Sync {
    /// `INSERT OR IGNORE`: an existing row for the email is never overwritten.
    async fn insert_user_if_absent(
        &self,
        email: &str,
        credential_hash: &str,
    ) -> Result<bool, DatabaseError>;
    async fn get_user_id(&self, email: &str) -> Result<Option<i64>, DatabaseError>;
    async fn list_users(&self) -> Result<Vec<TenantUserRecord>, DatabaseError>;
    async fn count_users(&self) -> Result<i64, DatabaseError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn save_document(&self, input: &NewDocumentParams) -> Result<i64, DatabaseError>;
    async fn get_document(&self, id: i64) -> Result<Option<DocumentRecord>, DatabaseError>;
    /// Newest first.
    async fn list_documents(&self) -> Result<Vec<DocumentRecord>, DatabaseError>;
    async fn count_documents(&self) -> Result<i64, DatabaseError>;
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Replace the whole transcript for `(document_id, user_id)`.
    async fn save_chat(
        &self,
        document_id: i64,
        user_id: i64,
        turns: &[ChatTurn],
    ) -> Result<(), DatabaseError>;
    /// Empty when no transcript exists.
    async fn load_chat(&self, document_id: i64, user_id: i64)
    -> Result<Vec<ChatTurn>, DatabaseError>;
    async fn delete_chat(&self, document_id: i64, user_id: i64) -> Result<bool, DatabaseError>;
}

#[async_trait]
pub trait GlossaryStore: Send + Sync {
    /// Sorted by term.
    async fn list_glossary(&self) -> Result<Vec<GlossaryEntry>, DatabaseError>;
    async fn get_glossary_term(&self, term: &str) -> Result<Option<GlossaryEntry>, DatabaseError>;
    /// Manual add-or-update; the latest writer wins.
    async fn upsert_glossary_term(
        &self,
        input: &GlossaryTermParams,
    ) -> Result<GlossaryEntry, DatabaseError>;
    /// Insert-only path; an existing term is a `Conflict`.
    async fn create_glossary_term(
        &self,
        input: &GlossaryTermParams,
    ) -> Result<GlossaryEntry, DatabaseError>;
    async fn delete_glossary_term(&self, term: &str) -> Result<bool, DatabaseError>;
    /// Automatic write from the glossary merger.
    ///
    /// `found` is false when `definition` is the "no explanation" sentinel;
    /// in that case a manually curated entry is left untouched.
    async fn merge_detected_term(
        &self,
        term: &str,
        definition: &str,
        found: bool,
    ) -> Result<GlossaryMergeOutcome, DatabaseError>;
}

#[async_trait]
pub trait TableReader: Send + Sync {
    async fn read_table(&self, table: TenantTable) -> Result<TableDump, DatabaseError>;
}

/// Everything a tenant store can do.
#[async_trait]
pub trait TenantDatabase:
    TenantUserStore + DocumentStore + ChatStore + GlossaryStore + TableReader + Send + Sync
{
    /// `(users, documents)` row counts.
    async fn counts(&self) -> Result<(i64, i64), DatabaseError> {
        Ok((self.count_users().await?, self.count_documents().await?))
    }
}
