use std::path::Path;

use chrono::Utc;
use libsql::params;

use crate::db::libsql_migrations::{TENANT_SCHEMA, TENANT_SCHEMA_VERSION, tenant_seed};
use crate::db::{
    ChatStore, ChatTurn, DocumentRecord, DocumentStore, LegalFlag, NewDocumentParams,
    SimplificationLevel, TableDump, TableReader, TenantDatabase, TenantTable, TenantUserRecord,
    TenantUserStore,
};
use crate::error::DatabaseError;

use super::{
    LibSqlBackend, dump_table, fmt_ts, get_i64, get_opt_text, get_text, get_ts, opt_text,
};

/// Whether [`TenantStore::bootstrap`] had to create the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBootstrap {
    Created,
    AlreadyPresent,
}

/// One tenant's isolated store.
///
/// A handle only exists for a store whose schema is stamped, so every
/// operation can assume the tables are there.
#[derive(Debug)]
pub struct TenantStore {
    pub(super) backend: LibSqlBackend,
}

const DOCUMENT_COLUMNS: &str = "id, user_id, original_file_name, title, original_text, \
     simplified_text, simplification_level, is_legal, original_word_count, \
     simplified_word_count, uploaded_at";

fn row_to_document(row: &libsql::Row) -> Result<DocumentRecord, DatabaseError> {
    let level_raw = get_text(row, 6);
    let simplification_level = SimplificationLevel::from_db_value(&level_raw).ok_or_else(|| {
        DatabaseError::Serialization(format!("invalid simplification level '{level_raw}'"))
    })?;
    let legal_raw = get_i64(row, 7);
    let is_legal = LegalFlag::from_db_value(legal_raw).ok_or_else(|| {
        DatabaseError::Serialization(format!("invalid legal flag {legal_raw}"))
    })?;

    Ok(DocumentRecord {
        id: get_i64(row, 0),
        user_id: get_i64(row, 1),
        original_file_name: get_opt_text(row, 2),
        title: get_text(row, 3),
        original_text: get_text(row, 4),
        simplified_text: get_text(row, 5),
        simplification_level,
        is_legal,
        original_word_count: get_i64(row, 8),
        simplified_word_count: get_i64(row, 9),
        uploaded_at: get_ts(row, 10)?,
    })
}

impl TenantStore {
    /// Open an existing, fully bootstrapped store.
    ///
    /// Never creates anything: a missing file is `NotFound` and a file without
    /// a stamped schema is `SchemaMissing`.
    pub async fn open(path: &Path) -> Result<Self, DatabaseError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|e| DatabaseError::Pool(format!("failed to stat {path:?}: {e}")))?;
        if !exists {
            return Err(DatabaseError::NotFound {
                entity: "tenant store".to_string(),
                id: path.display().to_string(),
            });
        }

        let backend = LibSqlBackend::new_local(path).await?;
        let found = backend.schema_version().await?;
        if found < TENANT_SCHEMA_VERSION {
            return Err(DatabaseError::SchemaMissing {
                path: path.to_path_buf(),
                expected: TENANT_SCHEMA_VERSION,
                found,
            });
        }
        Ok(Self { backend })
    }

    /// Create the schema and starter glossary if they are not already there.
    ///
    /// The parent directory must exist. Safe to call concurrently: the
    /// version is re-checked under the write lock.
    pub async fn bootstrap(path: &Path) -> Result<(Self, StoreBootstrap), DatabaseError> {
        let backend = LibSqlBackend::new_local(path).await?;
        if backend.schema_version().await? >= TENANT_SCHEMA_VERSION {
            return Ok((Self { backend }, StoreBootstrap::AlreadyPresent));
        }

        let seed = tenant_seed(&fmt_ts(&Utc::now()));
        let applied = backend
            .bootstrap_schema(TENANT_SCHEMA_VERSION, TENANT_SCHEMA, &seed)
            .await?;
        let outcome = if applied {
            tracing::info!(path = %path.display(), "Tenant store created");
            StoreBootstrap::Created
        } else {
            StoreBootstrap::AlreadyPresent
        };
        Ok((Self { backend }, outcome))
    }

    pub fn path(&self) -> &Path {
        self.backend.path()
    }
}

#[async_trait::async_trait]
impl TenantUserStore for TenantStore {
    async fn insert_user_if_absent(
        &self,
        email: &str,
        credential_hash: &str,
    ) -> Result<bool, DatabaseError> {
        let conn = self.backend.connect().await?;
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO users (email, credential_hash, created_at) \
                 VALUES (?1, ?2, ?3)",
                params![email, credential_hash, fmt_ts(&Utc::now())],
            )
            .await?;
        Ok(inserted > 0)
    }

    async fn get_user_id(&self, email: &str) -> Result<Option<i64>, DatabaseError> {
        let conn = self.backend.connect().await?;
        let row = conn
            .query(
                "SELECT id FROM users WHERE email = ?1 LIMIT 1",
                params![email],
            )
            .await?
            .next()
            .await?;
        Ok(row.map(|row| get_i64(&row, 0)))
    }

    async fn list_users(&self) -> Result<Vec<TenantUserRecord>, DatabaseError> {
        let conn = self.backend.connect().await?;
        let mut rows = conn
            .query("SELECT id, email, created_at FROM users ORDER BY id", ())
            .await?;
        let mut users = Vec::new();
        while let Some(row) = rows.next().await? {
            users.push(TenantUserRecord {
                id: get_i64(&row, 0),
                email: get_text(&row, 1),
                created_at: get_ts(&row, 2)?,
            });
        }
        Ok(users)
    }

    async fn count_users(&self) -> Result<i64, DatabaseError> {
        let conn = self.backend.connect().await?;
        count(&conn, "SELECT COUNT(*) FROM users").await
    }
}

async fn count(conn: &libsql::Connection, sql: &str) -> Result<i64, DatabaseError> {
    let row = conn
        .query(sql, ())
        .await?
        .next()
        .await?
        .ok_or_else(|| DatabaseError::Query("COUNT returned no row".to_string()))?;
    Ok(get_i64(&row, 0))
}

#[async_trait::async_trait]
impl DocumentStore for TenantStore {
    async fn save_document(&self, input: &NewDocumentParams) -> Result<i64, DatabaseError> {
        let conn = self.backend.connect().await?;
        conn.execute(
            "INSERT INTO documents (user_id, original_file_name, title, original_text, \
                simplified_text, simplification_level, is_legal, original_word_count, \
                simplified_word_count, uploaded_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                input.user_id,
                opt_text(input.original_file_name.as_deref()),
                input.title.as_str(),
                input.original_text.as_str(),
                input.simplified_text.as_str(),
                input.simplification_level.as_str(),
                input.is_legal.as_db_value(),
                input.original_word_count,
                input.simplified_word_count,
                fmt_ts(&Utc::now())
            ],
        )
        .await?;
        Ok(conn.last_insert_rowid())
    }

    async fn get_document(&self, id: i64) -> Result<Option<DocumentRecord>, DatabaseError> {
        let conn = self.backend.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
                params![id],
            )
            .await?
            .next()
            .await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>, DatabaseError> {
        let conn = self.backend.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY uploaded_at DESC, id DESC"
                ),
                (),
            )
            .await?;
        let mut documents = Vec::new();
        while let Some(row) = rows.next().await? {
            documents.push(row_to_document(&row)?);
        }
        Ok(documents)
    }

    async fn count_documents(&self) -> Result<i64, DatabaseError> {
        let conn = self.backend.connect().await?;
        count(&conn, "SELECT COUNT(*) FROM documents").await
    }
}

#[async_trait::async_trait]
impl ChatStore for TenantStore {
    async fn save_chat(
        &self,
        document_id: i64,
        user_id: i64,
        turns: &[ChatTurn],
    ) -> Result<(), DatabaseError> {
        let history_json =
            serde_json::to_string(turns).map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let conn = self.backend.connect().await?;
        conn.execute(
            "INSERT INTO chat_history (document_id, user_id, history_json, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(document_id, user_id) DO UPDATE SET \
                history_json = excluded.history_json, \
                updated_at = excluded.updated_at",
            params![document_id, user_id, history_json, fmt_ts(&Utc::now())],
        )
        .await?;
        Ok(())
    }

    async fn load_chat(
        &self,
        document_id: i64,
        user_id: i64,
    ) -> Result<Vec<ChatTurn>, DatabaseError> {
        let conn = self.backend.connect().await?;
        let row = conn
            .query(
                "SELECT history_json FROM chat_history WHERE document_id = ?1 AND user_id = ?2",
                params![document_id, user_id],
            )
            .await?
            .next()
            .await?;
        let Some(row) = row else {
            return Ok(Vec::new());
        };
        serde_json::from_str(&get_text(&row, 0))
            .map_err(|e| DatabaseError::Serialization(format!("corrupt chat history: {e}")))
    }

    async fn delete_chat(&self, document_id: i64, user_id: i64) -> Result<bool, DatabaseError> {
        let conn = self.backend.connect().await?;
        let deleted = conn
            .execute(
                "DELETE FROM chat_history WHERE document_id = ?1 AND user_id = ?2",
                params![document_id, user_id],
            )
            .await?;
        Ok(deleted > 0)
    }
}

#[async_trait::async_trait]
impl TableReader for TenantStore {
    async fn read_table(&self, table: TenantTable) -> Result<TableDump, DatabaseError> {
        let conn = self.backend.connect().await?;
        dump_table(&conn, table.as_str(), table.columns()).await
    }
}

impl TenantDatabase for TenantStore {}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::db::{GlossaryStore, Speaker};

    struct TestTenant {
        store: TenantStore,
        _tmpdir: tempfile::TempDir,
    }

    async fn setup_tenant() -> TestTenant {
        let tmpdir = tempfile::tempdir().expect("tempdir");
        let (store, outcome) = TenantStore::bootstrap(&tmpdir.path().join("a_at_x_dot_com.db"))
            .await
            .expect("tenant store should bootstrap");
        assert_eq!(outcome, StoreBootstrap::Created);
        store
            .insert_user_if_absent("a@x.com", "hash")
            .await
            .expect("insert user");
        TestTenant {
            store,
            _tmpdir: tmpdir,
        }
    }

    fn document(user_id: i64, title: &str) -> NewDocumentParams {
        NewDocumentParams {
            user_id,
            original_file_name: Some(format!("{title}.pdf")),
            title: title.to_string(),
            original_text: "The party shall indemnify the other party.".to_string(),
            simplified_text: "You must pay for their losses.".to_string(),
            simplification_level: SimplificationLevel::Basic,
            is_legal: LegalFlag::Legal,
            original_word_count: 100,
            simplified_word_count: 40,
        }
    }

    #[tokio::test]
    async fn open_refuses_missing_files_without_creating_them() {
        let tmpdir = tempfile::tempdir().expect("tempdir");
        let path = tmpdir.path().join("nobody.db");
        let err = TenantStore::open(&path).await.expect_err("missing store");
        assert!(matches!(err, DatabaseError::NotFound { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn open_refuses_files_without_a_schema() {
        let tmpdir = tempfile::tempdir().expect("tempdir");
        let path = tmpdir.path().join("empty.db");
        LibSqlBackend::new_local(&path)
            .await
            .expect("create bare file")
            .connect()
            .await
            .expect("connect");
        let err = TenantStore::open(&path).await.expect_err("no schema");
        assert!(matches!(
            err,
            DatabaseError::SchemaMissing {
                expected: 1,
                found: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent_and_seeds_once() {
        let fixture = setup_tenant().await;
        let path = fixture.store.path().to_path_buf();
        let (again, outcome) = TenantStore::bootstrap(&path).await.expect("re-bootstrap");
        assert_eq!(outcome, StoreBootstrap::AlreadyPresent);
        assert_eq!(again.list_glossary().await.expect("glossary").len(), 4);
        assert_eq!(again.count_users().await.expect("users"), 1);
        TenantStore::open(&path).await.expect("open after bootstrap");
    }

    #[tokio::test]
    async fn insert_user_never_overwrites_an_existing_row() {
        let fixture = setup_tenant().await;
        assert!(
            !fixture
                .store
                .insert_user_if_absent("a@x.com", "other-hash")
                .await
                .expect("second insert")
        );
        let conn = fixture.store.backend.connect().await.expect("connect");
        let row = conn
            .query("SELECT credential_hash FROM users WHERE email = 'a@x.com'", ())
            .await
            .expect("query")
            .next()
            .await
            .expect("row read")
            .expect("row");
        assert_eq!(get_text(&row, 0), "hash");
    }

    #[tokio::test]
    async fn saved_document_round_trips_and_lists_newest_first() {
        let fixture = setup_tenant().await;
        let user_id = fixture
            .store
            .get_user_id("a@x.com")
            .await
            .expect("lookup")
            .expect("user");
        let first = fixture
            .store
            .save_document(&document(user_id, "lease"))
            .await
            .expect("save first");
        let second = fixture
            .store
            .save_document(&document(user_id, "nda"))
            .await
            .expect("save second");
        assert!(second > first);

        let stored = fixture
            .store
            .get_document(first)
            .await
            .expect("get")
            .expect("document");
        assert_eq!(stored.title, "lease");
        assert_eq!(stored.original_file_name.as_deref(), Some("lease.pdf"));
        assert_eq!(stored.is_legal, LegalFlag::Legal);
        assert_eq!(stored.simplification_level, SimplificationLevel::Basic);
        assert_eq!(
            (stored.original_word_count, stored.simplified_word_count),
            (100, 40)
        );

        let listed = fixture.store.list_documents().await.expect("list");
        assert_eq!(
            listed.iter().map(|d| d.id).collect::<Vec<_>>(),
            vec![second, first]
        );
        assert_eq!(fixture.store.counts().await.expect("counts"), (1, 2));
    }

    #[tokio::test]
    async fn document_for_unknown_user_violates_foreign_key() {
        let fixture = setup_tenant().await;
        let err = fixture
            .store
            .save_document(&document(999, "orphan"))
            .await
            .expect_err("fk violation");
        assert!(matches!(err, DatabaseError::Query(_)));
    }

    #[tokio::test]
    async fn chat_save_replaces_the_whole_transcript() {
        let fixture = setup_tenant().await;
        let doc_id = fixture
            .store
            .save_document(&document(1, "lease"))
            .await
            .expect("save");

        assert!(fixture.store.load_chat(doc_id, 1).await.expect("empty").is_empty());

        fixture
            .store
            .save_chat(
                doc_id,
                1,
                &[ChatTurn::user("what is this?"), ChatTurn::assistant("a lease")],
            )
            .await
            .expect("first save");
        let replacement = vec![ChatTurn::user("summarize")];
        fixture
            .store
            .save_chat(doc_id, 1, &replacement)
            .await
            .expect("second save");

        let loaded = fixture.store.load_chat(doc_id, 1).await.expect("load");
        assert_eq!(loaded, replacement);
        assert_eq!(loaded[0].speaker, Speaker::User);

        assert!(fixture.store.delete_chat(doc_id, 1).await.expect("delete"));
        assert!(!fixture.store.delete_chat(doc_id, 1).await.expect("delete again"));
        assert!(fixture.store.load_chat(doc_id, 1).await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn transcripts_for_different_documents_are_independent() {
        let fixture = setup_tenant().await;
        let a = fixture.store.save_document(&document(1, "a")).await.expect("a");
        let b = fixture.store.save_document(&document(1, "b")).await.expect("b");
        fixture
            .store
            .save_chat(a, 1, &[ChatTurn::user("about a")])
            .await
            .expect("save a");
        fixture
            .store
            .save_chat(b, 1, &[ChatTurn::user("about b")])
            .await
            .expect("save b");
        assert_eq!(
            fixture.store.load_chat(a, 1).await.expect("load a"),
            vec![ChatTurn::user("about a")]
        );
    }

    #[tokio::test]
    async fn user_table_export_never_includes_credentials() {
        let fixture = setup_tenant().await;
        let dump = fixture
            .store
            .read_table(TenantTable::Users)
            .await
            .expect("dump");
        assert_eq!(dump.columns, vec!["id", "email", "created_at"]);
        assert_eq!(dump.rows.len(), 1);
        assert!(
            dump.rows[0]
                .iter()
                .all(|cell| cell != &serde_json::json!("hash"))
        );
    }
}
