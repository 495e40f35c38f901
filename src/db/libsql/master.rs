use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::params;

use crate::db::libsql_migrations::{MASTER_SCHEMA, MASTER_SCHEMA_VERSION};
use crate::db::{
    AccountInsert, AccountRecord, AccountStore, AccountSummary, MasterTable, NewAccountParams,
    TableDump, TenantMappingRecord,
};
use crate::error::DatabaseError;

use super::{LibSqlBackend, dump_table, fmt_ts, get_i64, get_opt_text, get_opt_ts, get_text, get_ts};

/// The process-wide master directory store.
#[derive(Debug)]
pub struct MasterStore {
    backend: LibSqlBackend,
}

const ACCOUNT_COLUMNS: &str =
    "id, email, credential_hash, is_admin, created_at, reset_token_hash, reset_token_expires";

fn row_to_account(row: &libsql::Row) -> Result<AccountRecord, DatabaseError> {
    Ok(AccountRecord {
        id: get_i64(row, 0),
        email: get_text(row, 1),
        credential_hash: get_text(row, 2),
        is_admin: get_i64(row, 3) != 0,
        created_at: get_ts(row, 4)?,
        reset_token_hash: get_opt_text(row, 5),
        reset_token_expires: get_opt_ts(row, 6)?,
    })
}

impl MasterStore {
    /// Open the master directory, creating the file and schema on first use.
    pub async fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DatabaseError::Pool(format!("failed to create directory {parent:?}: {e}"))
            })?;
        }
        let backend = LibSqlBackend::new_local(path).await?;
        if backend
            .bootstrap_schema(MASTER_SCHEMA_VERSION, MASTER_SCHEMA, &[])
            .await?
        {
            tracing::info!(path = %path.display(), "Master directory schema created");
        }
        Ok(Self { backend })
    }

    pub fn path(&self) -> &Path {
        self.backend.path()
    }

    async fn find_account_id(
        conn: &libsql::Connection,
        email: &str,
    ) -> Result<Option<i64>, DatabaseError> {
        let row = conn
            .query(
                "SELECT id FROM accounts WHERE email = ?1 LIMIT 1",
                params![email],
            )
            .await?
            .next()
            .await?;
        Ok(row.map(|row| get_i64(&row, 0)))
    }
}

#[async_trait::async_trait]
impl AccountStore for MasterStore {
    async fn insert_account(
        &self,
        input: &NewAccountParams,
    ) -> Result<AccountInsert, DatabaseError> {
        let conn = self.backend.connect().await?;
        let now = fmt_ts(&Utc::now());

        conn.execute("BEGIN IMMEDIATE", ()).await?;
        let insert_result = async {
            if Self::find_account_id(&conn, &input.email).await?.is_some() {
                return Ok(AccountInsert::AlreadyExists);
            }

            if let Err(err) = conn
                .execute(
                    "INSERT INTO accounts (email, credential_hash, is_admin, created_at) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        input.email.as_str(),
                        input.credential_hash.as_str(),
                        i64::from(input.is_admin),
                        now.as_str()
                    ],
                )
                .await
            {
                // A writer outside this process can still race past the check.
                if Self::find_account_id(&conn, &input.email).await?.is_some() {
                    return Ok(AccountInsert::AlreadyExists);
                }
                return Err(err.into());
            }
            let account_id = conn.last_insert_rowid();

            let tenant_mapped = if input.is_admin {
                false
            } else {
                match conn
                    .execute(
                        "INSERT INTO tenants (account_id, tenant_name, created_at) \
                         VALUES (?1, ?2, ?3)",
                        params![account_id, input.email.as_str(), now.as_str()],
                    )
                    .await
                {
                    Ok(_) => true,
                    Err(err) => {
                        tracing::warn!(
                            account_id,
                            error = %err,
                            "Tenant mapping insert failed; keeping the account"
                        );
                        false
                    }
                }
            };

            Ok::<_, DatabaseError>(AccountInsert::Created {
                account_id,
                tenant_mapped,
            })
        }
        .await;

        match insert_result {
            Ok(outcome) => {
                conn.execute("COMMIT", ()).await?;
                Ok(outcome)
            }
            Err(err) => {
                let _ = conn.execute("ROLLBACK", ()).await;
                Err(err)
            }
        }
    }

    async fn get_account_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AccountRecord>, DatabaseError> {
        let conn = self.backend.connect().await?;
        let row = conn
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?1 LIMIT 1"),
                params![email],
            )
            .await?
            .next()
            .await?;
        row.as_ref().map(row_to_account).transpose()
    }

    async fn get_credential_hash(&self, account_id: i64) -> Result<Option<String>, DatabaseError> {
        let conn = self.backend.connect().await?;
        let row = conn
            .query(
                "SELECT credential_hash FROM accounts WHERE id = ?1",
                params![account_id],
            )
            .await?
            .next()
            .await?;
        Ok(row
            .map(|row| get_text(&row, 0))
            .filter(|hash| !hash.is_empty()))
    }

    async fn set_reset_token(
        &self,
        email: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let conn = self.backend.connect().await?;
        let updated = conn
            .execute(
                "UPDATE accounts SET reset_token_hash = ?2, reset_token_expires = ?3 \
                 WHERE email = ?1",
                params![email, token_hash, fmt_ts(&expires_at)],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn clear_reset_token(
        &self,
        email: &str,
        expected_token_hash: &str,
    ) -> Result<bool, DatabaseError> {
        let conn = self.backend.connect().await?;
        let cleared = conn
            .execute(
                "UPDATE accounts SET reset_token_hash = NULL, reset_token_expires = NULL \
                 WHERE email = ?1 AND reset_token_hash = ?2",
                params![email, expected_token_hash],
            )
            .await?;
        Ok(cleared == 1)
    }

    async fn complete_password_reset(
        &self,
        email: &str,
        expected_token_hash: &str,
        new_credential_hash: &str,
    ) -> Result<bool, DatabaseError> {
        let conn = self.backend.connect().await?;
        let updated = conn
            .execute(
                "UPDATE accounts SET credential_hash = ?3, \
                    reset_token_hash = NULL, reset_token_expires = NULL \
                 WHERE email = ?1 AND reset_token_hash = ?2",
                params![email, expected_token_hash, new_credential_hash],
            )
            .await?;
        Ok(updated == 1)
    }

    async fn list_accounts(&self) -> Result<Vec<AccountSummary>, DatabaseError> {
        let conn = self.backend.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at DESC, id DESC"),
                (),
            )
            .await?;
        let mut accounts = Vec::new();
        while let Some(row) = rows.next().await? {
            accounts.push(AccountSummary::from(row_to_account(&row)?));
        }
        Ok(accounts)
    }

    async fn list_tenant_emails(&self) -> Result<Vec<String>, DatabaseError> {
        let conn = self.backend.connect().await?;
        let mut rows = conn
            .query(
                "SELECT email FROM accounts WHERE is_admin = 0 ORDER BY id",
                (),
            )
            .await?;
        let mut emails = Vec::new();
        while let Some(row) = rows.next().await? {
            emails.push(get_text(&row, 0));
        }
        Ok(emails)
    }

    async fn list_tenant_mappings(&self) -> Result<Vec<TenantMappingRecord>, DatabaseError> {
        let conn = self.backend.connect().await?;
        let mut rows = conn
            .query(
                "SELECT id, account_id, tenant_name, created_at FROM tenants ORDER BY id",
                (),
            )
            .await?;
        let mut mappings = Vec::new();
        while let Some(row) = rows.next().await? {
            mappings.push(TenantMappingRecord {
                id: get_i64(&row, 0),
                account_id: get_i64(&row, 1),
                tenant_name: get_text(&row, 2),
                created_at: get_ts(&row, 3)?,
            });
        }
        Ok(mappings)
    }

    async fn read_master_table(&self, table: MasterTable) -> Result<TableDump, DatabaseError> {
        let conn = self.backend.connect().await?;
        dump_table(&conn, table.as_str(), table.columns()).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    use super::*;

    struct TestMaster {
        store: MasterStore,
        _tmpdir: tempfile::TempDir,
    }

    async fn setup_master() -> TestMaster {
        let tmpdir = tempfile::tempdir().expect("tempdir");
        let store = MasterStore::open(&tmpdir.path().join("db").join("master.db"))
            .await
            .expect("master store should open");
        TestMaster {
            store,
            _tmpdir: tmpdir,
        }
    }

    fn account(email: &str, is_admin: bool) -> NewAccountParams {
        NewAccountParams {
            email: email.to_string(),
            credential_hash: format!("hash-of-{email}"),
            is_admin,
        }
    }

    #[tokio::test]
    async fn first_account_gets_id_one_and_a_tenant_mapping() {
        let fixture = setup_master().await;
        let outcome = fixture
            .store
            .insert_account(&account("a@x.com", false))
            .await
            .expect("insert");
        assert_eq!(
            outcome,
            AccountInsert::Created {
                account_id: 1,
                tenant_mapped: true
            }
        );

        let mappings = fixture.store.list_tenant_mappings().await.expect("mappings");
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].account_id, 1);
        assert_eq!(mappings[0].tenant_name, "a@x.com");
    }

    #[tokio::test]
    async fn duplicate_email_is_reported_without_a_second_row() {
        let fixture = setup_master().await;
        fixture
            .store
            .insert_account(&account("a@x.com", false))
            .await
            .expect("first insert");
        let second = fixture
            .store
            .insert_account(&account("a@x.com", false))
            .await
            .expect("second insert");
        assert_eq!(second, AccountInsert::AlreadyExists);
        assert_eq!(fixture.store.list_accounts().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn admin_accounts_get_no_tenant_mapping() {
        let fixture = setup_master().await;
        let outcome = fixture
            .store
            .insert_account(&account("boss@x.com", true))
            .await
            .expect("insert");
        assert!(matches!(
            outcome,
            AccountInsert::Created {
                tenant_mapped: false,
                ..
            }
        ));
        assert!(
            fixture
                .store
                .list_tenant_mappings()
                .await
                .expect("mappings")
                .is_empty()
        );
        assert!(
            fixture
                .store
                .list_tenant_emails()
                .await
                .expect("emails")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn stale_tenant_mapping_is_tolerated() {
        let fixture = setup_master().await;
        {
            // Pre-seed a mapping row for the id the next account will receive.
            let conn = fixture.store.backend.connect().await.expect("connect");
            conn.query("PRAGMA foreign_keys = OFF", ())
                .await
                .expect("disable fks");
            conn.execute(
                "INSERT INTO tenants (account_id, tenant_name, created_at) \
                 VALUES (1, 'ghost@x.com', '2026-01-01T00:00:00Z')",
                (),
            )
            .await
            .expect("seed stale mapping");
        }

        let outcome = fixture
            .store
            .insert_account(&account("a@x.com", false))
            .await
            .expect("registration still succeeds");
        assert_eq!(
            outcome,
            AccountInsert::Created {
                account_id: 1,
                tenant_mapped: false
            }
        );
        assert!(
            fixture
                .store
                .get_account_by_email("a@x.com")
                .await
                .expect("lookup")
                .is_some()
        );
    }

    #[tokio::test]
    async fn reset_token_pair_is_set_and_cleared_together() {
        let fixture = setup_master().await;
        fixture
            .store
            .insert_account(&account("a@x.com", false))
            .await
            .expect("insert");

        let expires = Utc::now() + Duration::minutes(15);
        assert!(
            fixture
                .store
                .set_reset_token("a@x.com", "digest", expires)
                .await
                .expect("set")
        );
        assert!(
            !fixture
                .store
                .set_reset_token("nobody@x.com", "digest", expires)
                .await
                .expect("set for unknown")
        );

        let record = fixture
            .store
            .get_account_by_email("a@x.com")
            .await
            .expect("lookup")
            .expect("account");
        assert_eq!(record.reset_token_hash.as_deref(), Some("digest"));
        assert!(record.reset_token_expires.is_some());

        assert!(
            !fixture
                .store
                .clear_reset_token("a@x.com", "stale-digest")
                .await
                .expect("clear with stale digest")
        );
        assert!(
            fixture
                .store
                .get_account_by_email("a@x.com")
                .await
                .expect("lookup")
                .expect("account")
                .reset_token_hash
                .is_some()
        );

        assert!(
            fixture
                .store
                .clear_reset_token("a@x.com", "digest")
                .await
                .expect("clear")
        );
        let record = fixture
            .store
            .get_account_by_email("a@x.com")
            .await
            .expect("lookup")
            .expect("account");
        assert_eq!(record.reset_token_hash, None);
        assert_eq!(record.reset_token_expires, None);
    }

    #[tokio::test]
    async fn password_reset_requires_the_current_token_digest() {
        let fixture = setup_master().await;
        fixture
            .store
            .insert_account(&account("a@x.com", false))
            .await
            .expect("insert");
        fixture
            .store
            .set_reset_token("a@x.com", "digest", Utc::now() + Duration::minutes(5))
            .await
            .expect("set");

        assert!(
            !fixture
                .store
                .complete_password_reset("a@x.com", "other", "new-hash")
                .await
                .expect("mismatch")
        );
        assert!(
            fixture
                .store
                .complete_password_reset("a@x.com", "digest", "new-hash")
                .await
                .expect("match")
        );
        // Single use.
        assert!(
            !fixture
                .store
                .complete_password_reset("a@x.com", "digest", "again")
                .await
                .expect("reuse")
        );
        assert_eq!(
            fixture
                .store
                .get_credential_hash(1)
                .await
                .expect("hash")
                .as_deref(),
            Some("new-hash")
        );
    }

    #[tokio::test]
    async fn account_table_export_omits_credential_columns() {
        let fixture = setup_master().await;
        fixture
            .store
            .insert_account(&account("a@x.com", false))
            .await
            .expect("insert");
        let dump = fixture
            .store
            .read_master_table(MasterTable::Accounts)
            .await
            .expect("dump");
        assert_eq!(dump.columns, vec!["id", "email", "is_admin", "created_at"]);
        assert_eq!(dump.rows.len(), 1);
        assert_eq!(dump.rows[0][1], serde_json::json!("a@x.com"));
    }

    #[tokio::test]
    async fn reopening_keeps_existing_accounts() {
        let tmpdir = tempfile::tempdir().expect("tempdir");
        let path = tmpdir.path().join("master.db");
        {
            let store = MasterStore::open(&path).await.expect("open");
            store
                .insert_account(&account("a@x.com", false))
                .await
                .expect("insert");
        }
        let store = MasterStore::open(&path).await.expect("reopen");
        assert_eq!(store.list_tenant_emails().await.expect("emails"), vec!["a@x.com"]);
    }
}
