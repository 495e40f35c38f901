//! Schemas for the master directory and tenant stores.
//!
//! Each schema is applied as one transaction that also stamps
//! `PRAGMA user_version`, so a store with a non-zero version is complete.

use libsql::Value;

use crate::legal::glossary::SEED_TERMS;

pub const MASTER_SCHEMA_VERSION: i64 = 1;
pub const TENANT_SCHEMA_VERSION: i64 = 1;

pub const MASTER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    credential_hash TEXT NOT NULL,
    is_admin INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    reset_token_hash TEXT,
    reset_token_expires TEXT,
    CHECK ((reset_token_hash IS NULL) = (reset_token_expires IS NULL))
);

CREATE TABLE IF NOT EXISTS tenants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id INTEGER NOT NULL UNIQUE REFERENCES accounts(id),
    tenant_name TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

pub const TENANT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    credential_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    original_file_name TEXT,
    title TEXT NOT NULL,
    original_text TEXT NOT NULL,
    simplified_text TEXT NOT NULL,
    simplification_level TEXT NOT NULL
        CHECK (simplification_level IN ('Basic', 'Intermediate', 'Advanced')),
    is_legal INTEGER NOT NULL DEFAULT -1 CHECK (is_legal IN (-1, 0, 1)),
    original_word_count INTEGER NOT NULL DEFAULT 0,
    simplified_word_count INTEGER NOT NULL DEFAULT 0,
    uploaded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_documents_user ON documents(user_id);

CREATE TABLE IF NOT EXISTS chat_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id),
    history_json TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (document_id, user_id)
);

CREATE TABLE IF NOT EXISTS glossary (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    term TEXT NOT NULL UNIQUE,
    definition TEXT NOT NULL,
    category TEXT,
    source TEXT NOT NULL DEFAULT 'manual' CHECK (source IN ('seed', 'manual', 'auto')),
    created_at TEXT NOT NULL
);
"#;

/// One parameterized statement run after the DDL, inside the same transaction.
#[derive(Debug, Clone)]
pub struct SeedStatement {
    pub sql: &'static str,
    pub values: Vec<Value>,
}

/// Starter glossary rows. `INSERT OR IGNORE` keeps re-runs harmless.
pub fn tenant_seed(now: &str) -> Vec<SeedStatement> {
    SEED_TERMS
        .iter()
        .map(|(term, definition)| SeedStatement {
            sql: "INSERT OR IGNORE INTO glossary (term, definition, category, source, created_at) \
                  VALUES (?1, ?2, NULL, 'seed', ?3)",
            values: vec![
                Value::Text((*term).to_string()),
                Value::Text((*definition).to_string()),
                Value::Text(now.to_string()),
            ],
        })
        .collect()
}
